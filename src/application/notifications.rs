//! Customer-facing notifications.
//!
//! The `*_messages` functions are a pure mapping from what happened to the text
//! we send. [`NotificationDispatcher`] does the sending and never fails the
//! caller: by the time it runs, the transition it reports is already committed.

use crate::domain::delivery::Delivery;
use crate::domain::message::{Message, OutboundMessage};
use crate::domain::order::{Order, OrderId, OrderStatus, PaymentMethod};
use crate::domain::party::Pharmacy;
use crate::domain::ports::{ChatTransport, MessageStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// What the delivery side produced when an order became ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// A courier was booked and the provider gave us a tracking link.
    Tracking { url: String },
    /// The order has an address but no courier booking (failed or not offered).
    DeliveryPending,
    /// No delivery address: the customer collects in store.
    Ready,
}

pub struct StatusContext<'a> {
    pub order: &'a Order,
    pub pharmacy: &'a Pharmacy,
    pub reason: Option<&'a str>,
    pub ready: Option<&'a ReadyOutcome>,
}

/// Messages announcing that `ctx.order` reached `status`, in send order.
pub fn status_messages(status: OrderStatus, ctx: &StatusContext<'_>) -> Vec<String> {
    let number = &ctx.order.order_number;
    let total = ctx
        .order
        .total_amount
        .map(|amount| format!("₹{amount}"))
        .unwrap_or_else(|| "the quoted amount".to_string());

    match status {
        OrderStatus::Pending => Vec::new(),
        OrderStatus::AwaitingRx => vec![format!(
            "Order {number} needs a valid prescription. Please send a clear photo of it in this chat."
        )],
        OrderStatus::RxReceived => vec![format!(
            "Prescription received for order {number}. Our pharmacist will review it shortly."
        )],
        OrderStatus::UnderReview => vec![format!(
            "Our pharmacist is now reviewing order {number}."
        )],
        OrderStatus::Confirmed => {
            let method = match ctx.order.payment_method {
                Some(PaymentMethod::Upi) => "UPI",
                _ => "cash on delivery",
            };
            vec![format!(
                "Good news! Order {number} is confirmed. Total: {total}, payment by {method}. \
                 Please reply with your delivery address, or 'same' to use your last one."
            )]
        }
        OrderStatus::AwaitingPayment => {
            let mut messages = vec![format!(
                "Good news! Order {number} is confirmed. Total: {total}."
            )];
            if let Some(upi_id) = &ctx.pharmacy.upi_id {
                messages.push(format!(
                    "Please pay {total} by UPI to {upi_id} and reply PAID once done."
                ));
            }
            messages
        }
        OrderStatus::PaymentConfirmed => vec![format!(
            "Payment received for order {number}. Thank you! \
             Please reply with your delivery address if you have not shared it yet."
        )],
        OrderStatus::ReadyForPickup => {
            let message = match ctx.ready.unwrap_or(&ReadyOutcome::Ready) {
                ReadyOutcome::Tracking { url } => {
                    format!("Order {number} is on its way! Track your delivery here: {url}")
                }
                ReadyOutcome::DeliveryPending => format!(
                    "Order {number} is ready. We are arranging delivery and will share the details soon."
                ),
                ReadyOutcome::Ready => format!(
                    "Order {number} is ready for pickup at {}.",
                    ctx.pharmacy.name
                ),
            };
            vec![message]
        }
        OrderStatus::Completed => vec![format!(
            "Order {number} is complete. Thank you for choosing {}!",
            ctx.pharmacy.name
        )],
        OrderStatus::Cancelled => vec![match ctx.reason.filter(|r| !r.trim().is_empty()) {
            Some(reason) => format!("Order {number} has been cancelled. Reason: {reason}"),
            None => format!("Order {number} has been cancelled."),
        }],
    }
}

pub fn courier_assigned_message(order: &Order, delivery: &Delivery) -> String {
    let courier = match (&delivery.courier_name, &delivery.courier_phone) {
        (Some(name), Some(phone)) => format!("{name} ({phone})"),
        (Some(name), None) => name.clone(),
        (None, Some(phone)) => format!("a courier ({phone})"),
        (None, None) => "a courier".to_string(),
    };
    format!(
        "{courier} will deliver order {}. They are heading to the pharmacy now.",
        order.order_number
    )
}

pub fn delivered_message(order: &Order, pharmacy: &Pharmacy) -> String {
    format!(
        "Order {} has been delivered. Thank you for choosing {}!",
        order.order_number, pharmacy.name
    )
}

/// Sends chat messages and records them in the message audit trail.
pub struct NotificationDispatcher {
    transport: Arc<dyn ChatTransport>,
    messages: Arc<dyn MessageStore>,
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn ChatTransport>, messages: Arc<dyn MessageStore>) -> Self {
        Self {
            transport,
            messages,
        }
    }

    /// Sends one message. Returns whether it went out.
    ///
    /// A message whose idempotency key was already recorded is skipped. Send
    /// failures are logged and recorded, never returned.
    pub async fn send(
        &self,
        pharmacy: &Pharmacy,
        to: &str,
        body: String,
        order_id: Option<OrderId>,
        idempotency_key: Option<String>,
    ) -> bool {
        if let Some(key) = &idempotency_key {
            match self.messages.has_idempotency_key(key).await {
                Ok(true) => {
                    debug!(key = %key, "notification already sent, skipping");
                    return false;
                }
                Ok(false) => {}
                Err(e) => warn!(key = %key, error = %e, "could not check notification key"),
            }
        }

        let outbound = OutboundMessage {
            to: to.to_string(),
            body,
            media_url: None,
        };
        let mut record = Message::outbound(&pharmacy.chat_number, &outbound, order_id);

        let sent = match self.transport.send(&pharmacy.chat_number, &outbound).await {
            Ok(provider_id) => {
                record.provider_message_id = Some(provider_id);
                record.delivery_status = Some("sent".to_string());
                record.idempotency_key = idempotency_key;
                true
            }
            Err(e) => {
                warn!(to = %to, error = %e, "failed to send chat notification");
                record.delivery_status = Some("failed".to_string());
                false
            }
        };

        if let Err(e) = self.messages.insert(record).await {
            warn!(error = %e, "failed to record outbound message");
        }
        sent
    }

    /// Sends every message [`status_messages`] maps `status` to.
    ///
    /// `key_base` identifies the transition; each part gets its own key.
    pub async fn notify_status(
        &self,
        to: &str,
        status: OrderStatus,
        ctx: &StatusContext<'_>,
        key_base: &str,
    ) -> usize {
        let mut sent = 0;
        for (part, body) in status_messages(status, ctx).into_iter().enumerate() {
            let key = format!("{key_base}:{part}");
            if self
                .send(ctx.pharmacy, to, body, Some(ctx.order.id), Some(key))
                .await
            {
                sent += 1;
            }
        }
        sent
    }
}
