//! Decides what an inbound chat message means for the customer's orders.
//!
//! [`classify`] is pure: it looks at the message and the conversation snapshot
//! and picks exactly one [`Intent`], checking the branches in a fixed priority
//! order. [`IntentResolver`] then carries the intent out through the lifecycle
//! orchestrator and produces the single reply for the webhook response.

use super::conversation::Conversation;
use super::lifecycle::OrderLifecycle;
use crate::domain::extractor;
use crate::domain::message::{InboundMessage, MessageId};
use crate::domain::order::{Order, OrderId};
use crate::domain::ports::Repositories;
use crate::error::Result;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

/// Address-shaped messages shorter than this are not treated as addresses.
pub const ADDRESS_MIN_LEN: usize = 15;

static AFFIRMATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:same address|okay|confirm|same|yes|ok|y)\b")
        .expect("affirmation pattern is valid")
});

static PAYMENT_ACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:payment done|completed|paid|done)\b")
        .expect("payment acknowledgement pattern is valid")
});

static PIN_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{6}\b").expect("pin code pattern is valid"));

static NUMBER_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\s*,").expect("house number pattern is valid"));

static ADDRESS_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:road|rd|street|st|lane|nagar|colony|sector|block|flat|floor|apartment|apartments|apt|house|near|opp|opposite|society|phase|layout|cross|main|tower|building|plot|village|district)\b",
    )
    .expect("address word pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Media sent while an order waits for its prescription.
    AttachPrescription { order_id: OrderId },
    /// "Same address" style reply: reuse the customer's last address.
    ReusePriorAddress { order_id: OrderId, address: String },
    /// The message body is the delivery address.
    SetAddress { order_id: OrderId },
    /// Customer says they paid. Acknowledged only; a pharmacist confirms payment.
    AcknowledgePayment { order_id: OrderId },
    /// Anything else while an order is open is part of that order's conversation.
    AppendToConversation { order_id: OrderId },
    CreateOrder,
}

impl Intent {
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            Intent::AttachPrescription { order_id }
            | Intent::ReusePriorAddress { order_id, .. }
            | Intent::SetAddress { order_id }
            | Intent::AcknowledgePayment { order_id }
            | Intent::AppendToConversation { order_id } => Some(*order_id),
            Intent::CreateOrder => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Intent::AttachPrescription { .. } => "attach_prescription",
            Intent::ReusePriorAddress { .. } => "reuse_prior_address",
            Intent::SetAddress { .. } => "set_address",
            Intent::AcknowledgePayment { .. } => "acknowledge_payment",
            Intent::AppendToConversation { .. } => "append_to_conversation",
            Intent::CreateOrder => "create_order",
        }
    }
}

pub fn is_affirmation(body: &str) -> bool {
    AFFIRMATION.is_match(body)
}

pub fn is_payment_ack(body: &str) -> bool {
    PAYMENT_ACK.is_match(body)
}

pub fn looks_like_address(body: &str) -> bool {
    let body = body.trim();
    body.chars().count() >= ADDRESS_MIN_LEN
        && (PIN_CODE.is_match(body) || NUMBER_COMMA.is_match(body) || ADDRESS_WORDS.is_match(body))
}

/// Picks the first matching branch, in priority order.
pub fn classify(message: &InboundMessage, conversation: &Conversation) -> Intent {
    let body = message.body.trim();

    if message.has_media()
        && let Some(order) = conversation.awaiting_prescription()
    {
        return Intent::AttachPrescription { order_id: order.id };
    }

    if let Some(order) = conversation.awaiting_address() {
        if is_affirmation(body)
            && let Some(address) = &conversation.customer.last_address
        {
            return Intent::ReusePriorAddress {
                order_id: order.id,
                address: address.clone(),
            };
        }
        if looks_like_address(body) {
            return Intent::SetAddress { order_id: order.id };
        }
    }

    if is_payment_ack(body)
        && let Some(order) = conversation.awaiting_payment()
    {
        return Intent::AcknowledgePayment { order_id: order.id };
    }

    if let Some(order) = conversation.active() {
        return Intent::AppendToConversation { order_id: order.id };
    }

    Intent::CreateOrder
}

/// Carries out classified intents. Reads orders, never writes status itself.
pub struct IntentResolver {
    repos: Repositories,
    lifecycle: Arc<OrderLifecycle>,
}

impl IntentResolver {
    pub fn new(repos: Repositories, lifecycle: Arc<OrderLifecycle>) -> Self {
        Self { repos, lifecycle }
    }

    /// Classifies and acts on one message. Returns the intent and the reply text.
    pub async fn resolve(
        &self,
        message: &InboundMessage,
        message_id: MessageId,
        conversation: &Conversation,
    ) -> Result<(Intent, String)> {
        let intent = classify(message, conversation);
        debug!(intent = intent.name(), from = %message.from, "message classified");

        let (order_id, reply) = match &intent {
            Intent::AttachPrescription { order_id } => {
                let media_url = message.media_url.as_deref().unwrap_or_default();
                let order = self
                    .lifecycle
                    .attach_prescription(
                        *order_id,
                        &conversation.customer,
                        media_url,
                        message.media_content_type.clone(),
                    )
                    .await?;
                let reply = format!(
                    "Thank you! We received your prescription for order {}. Our pharmacist will review it shortly.",
                    order.order_number
                );
                (order.id, reply)
            }
            Intent::ReusePriorAddress { order_id, address } => {
                let order = self.lifecycle.set_delivery_address(*order_id, address).await?;
                (order.id, address_reply(&order, address))
            }
            Intent::SetAddress { order_id } => {
                let order = self.lifecycle.set_delivery_address(*order_id, &message.body).await?;
                let address = order.delivery_address.clone().unwrap_or_default();
                let mut customer = conversation.customer.clone();
                customer.last_address = Some(address.clone());
                self.repos.customers.store(customer).await?;
                (order.id, address_reply(&order, &address))
            }
            Intent::AcknowledgePayment { order_id } => {
                let order = self.lifecycle.order(*order_id).await?;
                let reply = format!(
                    "Thanks! We will verify your payment for order {} and confirm shortly.",
                    order.order_number
                );
                (order.id, reply)
            }
            Intent::AppendToConversation { order_id } => {
                let order = self.lifecycle.order(*order_id).await?;
                let reply = format!(
                    "We've added your message to order {} ({}). Our pharmacist will get back to you.",
                    order.order_number,
                    order.status.label()
                );
                (order.id, reply)
            }
            Intent::CreateOrder => {
                let extraction = extractor::extract(&message.body);
                let order = self
                    .lifecycle
                    .create_order(
                        &conversation.pharmacy,
                        &conversation.customer,
                        &message.body,
                        extraction,
                    )
                    .await?;
                (order.id, new_order_reply(&order))
            }
        };

        self.repos.messages.attribute(message_id, order_id).await?;
        info!(intent = intent.name(), order_id = %order_id, "inbound message handled");
        Ok((intent, reply))
    }
}

fn address_reply(order: &Order, address: &str) -> String {
    format!(
        "Got it! Order {} will be delivered to: {address}",
        order.order_number
    )
}

fn new_order_reply(order: &Order) -> String {
    let mut reply = format!("Thanks! Your order {} has been received.", order.order_number);
    if order.items.is_some() {
        reply.push_str(&format!(" Items: {}.", order.items_summary()));
    }
    if order.requires_rx {
        reply.push_str(
            " Some items need a valid prescription (Rx). Please keep a photo of it ready to send here.",
        );
    }
    reply.push_str(" Our pharmacist will review it and confirm availability shortly.");
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderNumber, OrderStatus};
    use crate::domain::party::{Customer, Pharmacy};

    fn conversation(orders: &[(OrderStatus, Option<&str>)], last_address: Option<&str>) -> Conversation {
        let pharmacy = Pharmacy::new("Care Pharmacy", "+910000000001");
        let mut customer = Customer::new("+919999999999", None);
        customer.last_address = last_address.map(str::to_string);
        let orders = orders
            .iter()
            .map(|(status, address)| {
                let mut order = Order::new(
                    OrderNumber::generate(),
                    pharmacy.id,
                    customer.id,
                    "Crocin x2",
                    Vec::new(),
                    false,
                );
                order.status = *status;
                order.delivery_address = address.map(str::to_string);
                order
            })
            .collect();
        Conversation {
            pharmacy,
            customer,
            orders,
        }
    }

    fn text(body: &str) -> InboundMessage {
        InboundMessage {
            from: "+919999999999".to_string(),
            to: "+910000000001".to_string(),
            body: body.to_string(),
            provider_message_id: "SM1".to_string(),
            ..Default::default()
        }
    }

    fn photo() -> InboundMessage {
        InboundMessage {
            media_count: 1,
            media_url: Some("https://media.example/rx.jpg".to_string()),
            media_content_type: Some("image/jpeg".to_string()),
            ..text("12, MG Road, Bengaluru 560001")
        }
    }

    #[test]
    fn test_affirmation_tokens() {
        for body in ["yes", "Y", "ok", "Okay", "confirm", "same", "Same address", "yes, 12 MG Road"] {
            assert!(is_affirmation(body), "{body}");
        }
        for body in ["yellow", "okra", "no", "confirmed my order?", "sameer"] {
            assert!(!is_affirmation(body), "{body}");
        }
    }

    #[test]
    fn test_payment_ack_tokens() {
        for body in ["paid", "PAID", "Payment done", "done", "completed", "paid."] {
            assert!(is_payment_ack(body), "{body}");
        }
        assert!(!is_payment_ack("will pay later"));
        assert!(!is_payment_ack("donepezil 5mg"));
    }

    #[test]
    fn test_address_heuristic() {
        assert!(looks_like_address("Flat 4B, Lake View, Pune 411001"));
        assert!(looks_like_address("221 Baker Street London"));
        assert!(looks_like_address("42, Shanti Kunj, Indore"));
        assert!(!looks_like_address("Crocin x2"));
        assert!(!looks_like_address("Rd 12, Pune"));
        assert!(!looks_like_address("Please send some paracetamol tablets"));
    }

    #[test]
    fn test_media_with_awaiting_rx_attaches_prescription() {
        let conv = conversation(&[(OrderStatus::AwaitingRx, None)], None);
        let intent = classify(&photo(), &conv);
        assert_eq!(
            intent,
            Intent::AttachPrescription {
                order_id: conv.orders[0].id
            }
        );
    }

    #[test]
    fn test_media_outranks_address() {
        // The body is address-shaped and an order awaits an address, but the
        // photo for the awaiting_rx order wins.
        let conv = conversation(
            &[(OrderStatus::AwaitingRx, None), (OrderStatus::Confirmed, None)],
            None,
        );
        assert!(matches!(
            classify(&photo(), &conv),
            Intent::AttachPrescription { .. }
        ));
    }

    #[test]
    fn test_affirmation_outranks_address_shape() {
        let conv = conversation(
            &[(OrderStatus::Confirmed, None)],
            Some("7, Park Street, Kolkata 700016"),
        );
        let intent = classify(&text("yes, 12, MG Road, Bengaluru 560001"), &conv);
        assert_eq!(
            intent,
            Intent::ReusePriorAddress {
                order_id: conv.orders[0].id,
                address: "7, Park Street, Kolkata 700016".to_string(),
            }
        );
    }

    #[test]
    fn test_affirmation_without_prior_address_falls_through() {
        let conv = conversation(&[(OrderStatus::Confirmed, None)], None);
        assert!(matches!(
            classify(&text("yes"), &conv),
            Intent::AppendToConversation { .. }
        ));
    }

    #[test]
    fn test_address_for_eligible_order() {
        for status in [
            OrderStatus::Confirmed,
            OrderStatus::PaymentConfirmed,
            OrderStatus::ReadyForPickup,
        ] {
            let conv = conversation(&[(status, None)], Some("old address, 560001"));
            assert!(
                matches!(
                    classify(&text("12, MG Road, Bengaluru 560001"), &conv),
                    Intent::SetAddress { .. }
                ),
                "{status}"
            );
        }
    }

    #[test]
    fn test_address_ignored_when_order_already_has_one() {
        let conv = conversation(&[(OrderStatus::Confirmed, Some("7, Park Street, Kolkata"))], None);
        assert!(matches!(
            classify(&text("12, MG Road, Bengaluru 560001"), &conv),
            Intent::AppendToConversation { .. }
        ));
    }

    #[test]
    fn test_payment_ack_does_not_need_address_order() {
        let conv = conversation(&[(OrderStatus::AwaitingPayment, None)], None);
        assert_eq!(
            classify(&text("Paid"), &conv),
            Intent::AcknowledgePayment {
                order_id: conv.orders[0].id
            }
        );
    }

    #[test]
    fn test_open_order_absorbs_other_messages() {
        let conv = conversation(&[(OrderStatus::UnderReview, None)], None);
        assert!(matches!(
            classify(&text("Also add Vicks x1"), &conv),
            Intent::AppendToConversation { .. }
        ));
    }

    #[test]
    fn test_only_terminal_orders_creates_new_order() {
        let conv = conversation(
            &[(OrderStatus::Completed, None), (OrderStatus::Cancelled, None)],
            None,
        );
        assert_eq!(classify(&text("Crocin x2"), &conv), Intent::CreateOrder);
        assert_eq!(classify(&photo(), &conv), Intent::CreateOrder);
    }

    #[test]
    fn test_new_order_reply_mentions_number_items_and_rx() {
        let pharmacy = Pharmacy::new("Care Pharmacy", "+910000000001");
        let customer = Customer::new("+919999999999", None);
        let extraction = extractor::extract("Crocin x2, Insulin x1");
        let order = Order::new(
            "ABC234".parse().unwrap(),
            pharmacy.id,
            customer.id,
            "Crocin x2, Insulin x1",
            extraction.items,
            extraction.requires_rx,
        );
        let reply = new_order_reply(&order);
        assert!(reply.contains("ABC234"));
        assert!(reply.contains("Crocin x2; Insulin x1"));
        assert!(reply.contains("prescription"));
    }
}
