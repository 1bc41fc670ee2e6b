mod common;

use common::{CUSTOMER, Harness, HarnessOptions};
use rust_decimal_macros::dec;
use rxflow::application::delivery::CourierUpdate;
use rxflow::application::lifecycle::TransitionRequest;
use rxflow::application::notifications::NotificationDispatcher;
use rxflow::domain::delivery::DeliveryStatus;
use rxflow::domain::order::{Amount, OrderStatus, PaymentMethod};
use rxflow::domain::party::Pharmacy;
use rxflow::domain::ports::MessageStore;
use rxflow::error::RxError;
use rxflow::infrastructure::in_memory::InMemoryMessageStore;
use rxflow::infrastructure::simulated::RecordingTransport;
use std::sync::Arc;

#[tokio::test]
async fn test_new_order_from_chat() {
    let h = Harness::new().await;
    let outcome = h.send("Crocin x2, Insulin x1").await;

    let order = h.latest_order().await;
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(order.requires_rx);
    assert_eq!(order.items.as_ref().map(Vec::len), Some(2));

    let reply = outcome.reply.unwrap();
    assert!(reply.contains(order.order_number.as_str()));
    assert!(reply.contains("prescription"));

    let history = h.engine.lifecycle().history(order.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from, None);
    assert_eq!(history[0].to, OrderStatus::Pending);
}

#[tokio::test]
async fn test_upi_order_end_to_end() {
    let h = Harness::new().await;
    h.send("Crocin x2, Insulin x1").await;
    let order = h.latest_order().await;

    let order = h.move_to(&order, OrderStatus::UnderReview).await;
    let order = h.confirm(&order, PaymentMethod::Upi).await;
    assert_eq!(order.status, OrderStatus::AwaitingPayment);
    assert_eq!(order.total_amount, Some(Amount::new(dec!(240.50)).unwrap()));

    let messages = h.customer_messages();
    assert_eq!(messages.len(), 3);
    assert!(messages[1].contains("confirmed"));
    assert!(messages[2].contains("care@upi"));

    // Payment acknowledgement is only acknowledged.
    let reply = h.send("paid").await.reply.unwrap();
    assert!(reply.contains("verify your payment"));
    assert_eq!(h.latest_order().await.status, OrderStatus::AwaitingPayment);
    assert_eq!(h.customer_messages().len(), 3);

    let order = h.move_to(&order, OrderStatus::PaymentConfirmed).await;
    let reply = h.send("12, Residency Road, Bengaluru 560025").await.reply.unwrap();
    assert!(reply.contains("12, Residency Road, Bengaluru 560025"));

    let order = h.move_to(&order, OrderStatus::ReadyForPickup).await;
    assert_eq!(order.status, OrderStatus::ReadyForPickup);

    let delivery = h.engine.lifecycle().delivery(order.id).await.unwrap().unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Booked);
    assert_eq!(delivery.final_price, Some(dec!(49)));
    assert_eq!(delivery.delivery_address, "12, Residency Road, Bengaluru 560025");

    let messages = h.customer_messages();
    assert_eq!(messages.len(), 5);
    assert!(messages[4].contains("https://track.courier.local/SIM-1"));
    assert!(!messages.iter().any(|m| m.contains("ready for pickup")));

    let provider_order_id = delivery.provider_order_id.unwrap();
    h.engine
        .handle_courier_webhook(CourierUpdate {
            provider_order_id: provider_order_id.clone(),
            status: "active".to_string(),
            courier_name: Some("Ravi".to_string()),
            courier_phone: Some("+919000000000".to_string()),
        })
        .await;
    let messages = h.customer_messages();
    assert_eq!(messages.len(), 6);
    assert!(messages[5].contains("Ravi (+919000000000)"));

    h.engine
        .handle_courier_webhook(CourierUpdate {
            provider_order_id,
            status: "completed".to_string(),
            ..Default::default()
        })
        .await;

    let order = h.latest_order().await;
    assert_eq!(order.status, OrderStatus::Completed);
    let delivery = h.engine.lifecycle().delivery(order.id).await.unwrap().unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Delivered);
    assert!(delivery.delivered_at.is_some());

    let messages = h.customer_messages();
    assert_eq!(messages.len(), 7);
    assert!(messages[6].contains("has been delivered"));

    let statuses: Vec<_> = h
        .engine
        .lifecycle()
        .history(order.id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.to)
        .collect();
    assert_eq!(
        statuses,
        vec![
            OrderStatus::Pending,
            OrderStatus::UnderReview,
            OrderStatus::AwaitingPayment,
            OrderStatus::PaymentConfirmed,
            OrderStatus::ReadyForPickup,
            OrderStatus::Completed,
        ]
    );
}

#[tokio::test]
async fn test_upi_without_payment_details_sends_only_confirmation() {
    let h = Harness::with(HarnessOptions {
        upi_id: None,
        ..HarnessOptions::default()
    })
    .await;
    h.send("Crocin x2").await;
    let order = h.latest_order().await;
    let order = h.move_to(&order, OrderStatus::UnderReview).await;
    h.confirm(&order, PaymentMethod::Upi).await;
    // One for review, one for the confirmation.
    assert_eq!(h.customer_messages().len(), 2);
}

#[tokio::test]
async fn test_invalid_transition_is_rejected_without_side_effects() {
    let h = Harness::new().await;
    h.send("Crocin x2").await;
    let order = h.latest_order().await;

    let err = h
        .engine
        .transition(order.id, TransitionRequest::to(OrderStatus::ReadyForPickup))
        .await
        .unwrap_err();
    assert!(matches!(err, RxError::InvalidTransition(_)));
    assert!(err.is_client_error());
    let message = err.to_string();
    assert!(message.contains("pending"));
    assert!(message.contains("MARK_READY"));

    assert_eq!(h.latest_order().await.status, OrderStatus::Pending);
    assert_eq!(h.engine.lifecycle().history(order.id).await.unwrap().len(), 1);
    assert!(h.customer_messages().is_empty());
    assert!(h.engine.lifecycle().delivery(order.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_confirmation_branch_must_match_payment_method() {
    let h = Harness::new().await;
    h.send("Crocin x2").await;
    let order = h.latest_order().await;
    let order = h.move_to(&order, OrderStatus::UnderReview).await;

    let request = TransitionRequest {
        total_amount: Some(Amount::new(dec!(99)).unwrap()),
        payment_method: Some(PaymentMethod::Cod),
        ..TransitionRequest::to(OrderStatus::AwaitingPayment)
    };
    let err = h.engine.transition(order.id, request).await.unwrap_err();
    assert!(matches!(err, RxError::InvalidTransition(_)));

    let missing_amount = TransitionRequest {
        payment_method: Some(PaymentMethod::Cod),
        ..TransitionRequest::to(OrderStatus::Confirmed)
    };
    let err = h.engine.transition(order.id, missing_amount).await.unwrap_err();
    assert!(matches!(err, RxError::Validation(_)));
    assert_eq!(h.latest_order().await.total_amount, None);
}

#[tokio::test]
async fn test_stale_expected_status_is_a_conflict() {
    let h = Harness::new().await;
    h.send("Crocin x2").await;
    let order = h.latest_order().await;
    h.move_to(&order, OrderStatus::UnderReview).await;

    let request = TransitionRequest {
        expected_status: Some(OrderStatus::Pending),
        reason: Some("Duplicate".to_string()),
        ..TransitionRequest::to(OrderStatus::Cancelled)
    };
    let err = h.engine.transition(order.id, request).await.unwrap_err();
    assert!(matches!(
        err,
        RxError::Conflict {
            expected: OrderStatus::Pending,
            found: OrderStatus::UnderReview,
            ..
        }
    ));
    assert_eq!(h.latest_order().await.status, OrderStatus::UnderReview);
}

#[tokio::test]
async fn test_items_unavailable_after_review() {
    let h = Harness::new().await;
    h.send("Crocin x2").await;
    let order = h.latest_order().await;

    let from_pending = TransitionRequest {
        items_unavailable: true,
        ..TransitionRequest::to(OrderStatus::Cancelled)
    };
    let err = h.engine.transition(order.id, from_pending).await.unwrap_err();
    assert!(matches!(err, RxError::InvalidTransition(_)));
    assert!(err.to_string().contains("ITEMS_UNAVAILABLE"));

    let order = h.move_to(&order, OrderStatus::UnderReview).await;
    let request = TransitionRequest {
        items_unavailable: true,
        reason: Some("Out of stock".to_string()),
        actor: Some("pharmacist@care".to_string()),
        ..TransitionRequest::to(OrderStatus::Cancelled)
    };
    let order = h.engine.transition(order.id, request).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.notes.as_deref(), Some("ITEMS_UNAVAILABLE: Out of stock"));

    let history = h.engine.lifecycle().history(order.id).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.from, Some(OrderStatus::UnderReview));
    assert_eq!(last.reason.as_deref(), Some("Out of stock"));

    let last_message = h.customer_messages().pop().unwrap();
    assert!(last_message.contains("has been cancelled. Reason: Out of stock"));
}

#[tokio::test]
async fn test_cancelled_is_terminal_and_reason_is_sent() {
    let h = Harness::new().await;
    h.send("Crocin x2").await;
    let order = h.latest_order().await;

    let request = TransitionRequest {
        reason: Some("Out of stock".to_string()),
        actor: Some("pharmacist@care".to_string()),
        ..TransitionRequest::to(OrderStatus::Cancelled)
    };
    let order = h.engine.transition(order.id, request).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert!(order.notes.unwrap().contains("Out of stock"));

    let history = h.engine.lifecycle().history(order.id).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.actor.as_deref(), Some("pharmacist@care"));
    assert_eq!(last.reason.as_deref(), Some("Out of stock"));

    let messages = h.customer_messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Reason: Out of stock"));

    for target in [
        OrderStatus::UnderReview,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ] {
        let result = h
            .engine
            .transition(order.id, TransitionRequest::to(target))
            .await;
        assert!(matches!(result, Err(RxError::InvalidTransition(_))), "{target}");
    }

    // A new message after the only order ended starts a new order.
    h.send("Vicks x1").await;
    assert_eq!(h.order_count().await, 2);
}

#[tokio::test]
async fn test_silent_transition_sends_nothing() {
    let h = Harness::new().await;
    h.send("Crocin x2").await;
    let order = h.latest_order().await;
    let request = TransitionRequest {
        notify: false,
        ..TransitionRequest::to(OrderStatus::UnderReview)
    };
    h.engine.transition(order.id, request).await.unwrap();
    assert!(h.customer_messages().is_empty());
}

#[tokio::test]
async fn test_notification_failure_does_not_undo_transition() {
    let h = Harness::new().await;
    h.send("Crocin x2").await;
    let order = h.latest_order().await;

    h.transport.set_failing(true);
    let order = h.move_to(&order, OrderStatus::UnderReview).await;
    assert_eq!(order.status, OrderStatus::UnderReview);
    assert_eq!(h.latest_order().await.status, OrderStatus::UnderReview);

    let recorded = h
        .engine
        .repositories()
        .messages
        .list_for_order(order.id)
        .await
        .unwrap();
    assert!(
        recorded
            .iter()
            .any(|m| m.delivery_status.as_deref() == Some("failed"))
    );
}

#[tokio::test]
async fn test_idempotency_key_suppresses_duplicate_notification() {
    let transport = Arc::new(RecordingTransport::new());
    let messages = Arc::new(InMemoryMessageStore::new());
    let dispatcher = NotificationDispatcher::new(transport.clone(), messages.clone());
    let pharmacy = Pharmacy::new("Care Pharmacy", "+910000000001");

    let key = Some("order-1:2:under_review:0".to_string());
    assert!(
        dispatcher
            .send(&pharmacy, CUSTOMER, "first".to_string(), None, key.clone())
            .await
    );
    assert!(
        !dispatcher
            .send(&pharmacy, CUSTOMER, "again".to_string(), None, key.clone())
            .await
    );
    assert_eq!(transport.sent_to(CUSTOMER), vec!["first".to_string()]);
    assert!(messages.has_idempotency_key("order-1:2:under_review:0").await.unwrap());
}

#[tokio::test]
async fn test_failed_send_does_not_burn_idempotency_key() {
    let transport = Arc::new(RecordingTransport::new());
    let messages = Arc::new(InMemoryMessageStore::new());
    let dispatcher = NotificationDispatcher::new(transport.clone(), messages.clone());
    let pharmacy = Pharmacy::new("Care Pharmacy", "+910000000001");
    let key = Some("order-1:3:confirmed:0".to_string());

    transport.set_failing(true);
    assert!(
        !dispatcher
            .send(&pharmacy, CUSTOMER, "hello".to_string(), None, key.clone())
            .await
    );
    transport.set_failing(false);
    assert!(
        dispatcher
            .send(&pharmacy, CUSTOMER, "hello".to_string(), None, key)
            .await
    );
    assert_eq!(transport.sent_to(CUSTOMER).len(), 1);
}
