use super::entity_id;
use super::order::OrderId;
use super::party::CustomerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

entity_id!(MessageId);
entity_id!(PrescriptionId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Payload of the chat transport's inbound webhook.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    /// Chat number of the pharmacy the customer wrote to.
    pub to: String,
    pub body: String,
    pub media_count: u32,
    pub media_url: Option<String>,
    pub media_content_type: Option<String>,
    pub provider_message_id: String,
    pub profile_name: Option<String>,
}

impl InboundMessage {
    pub fn has_media(&self) -> bool {
        self.media_count > 0 && self.media_url.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    pub body: String,
    pub media_url: Option<String>,
}

/// Audit record of one chat message in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub direction: Direction,
    pub provider_message_id: Option<String>,
    pub from: String,
    pub to: String,
    pub body: String,
    pub media_url: Option<String>,
    pub delivery_status: Option<String>,
    /// Set after classification; inbound messages arrive unattributed.
    pub order_id: Option<OrderId>,
    /// Guards outbound notifications against being sent twice.
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn inbound(msg: &InboundMessage) -> Self {
        Self {
            id: MessageId::new(),
            direction: Direction::Inbound,
            provider_message_id: Some(msg.provider_message_id.clone()),
            from: msg.from.clone(),
            to: msg.to.clone(),
            body: msg.body.clone(),
            media_url: msg.media_url.clone(),
            delivery_status: Some("received".to_string()),
            order_id: None,
            idempotency_key: None,
            created_at: Utc::now(),
        }
    }

    pub fn outbound(from: &str, msg: &OutboundMessage, order_id: Option<OrderId>) -> Self {
        Self {
            id: MessageId::new(),
            direction: Direction::Outbound,
            provider_message_id: None,
            from: from.to_string(),
            to: msg.to.clone(),
            body: msg.body.clone(),
            media_url: msg.media_url.clone(),
            delivery_status: None,
            order_id,
            idempotency_key: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: PrescriptionId,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub media_url: String,
    pub media_type: Option<String>,
    /// Pharmacist verdict; `None` until reviewed.
    pub is_valid: Option<bool>,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Prescription {
    pub fn new(
        order_id: OrderId,
        customer_id: CustomerId,
        media_url: impl Into<String>,
        media_type: Option<String>,
    ) -> Self {
        Self {
            id: PrescriptionId::new(),
            order_id,
            customer_id,
            media_url: media_url.into(),
            media_type,
            is_valid: None,
            verified_by: None,
            verified_at: None,
            created_at: Utc::now(),
        }
    }
}
