use crate::application::lifecycle::TransitionRequest;
use crate::domain::message::InboundMessage;
use crate::domain::order::{Amount, OrderStatus, PaymentMethod};
use crate::error::{Result, RxError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    Transition,
    Courier,
    ChatStatus,
}

/// One row of a replay file. Columns a kind does not use stay empty.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventRecord {
    pub kind: EventKind,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub pharmacy: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub courier_name: Option<String>,
    #[serde(default)]
    pub courier_phone: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplayEvent {
    Message(InboundMessage),
    /// Dashboard transition on the customer's latest order at the pharmacy.
    Transition {
        pharmacy: String,
        customer: String,
        request: TransitionRequest,
    },
    /// Courier status report for the customer's latest order at the pharmacy.
    Courier {
        pharmacy: String,
        customer: String,
        status: String,
        courier_name: Option<String>,
        courier_phone: Option<String>,
    },
    ChatStatus { message_id: String, status: String },
}

fn required(value: Option<String>, column: &str, kind: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| RxError::Validation(format!("{kind} event needs a {column}")))
}

impl TryFrom<EventRecord> for ReplayEvent {
    type Error = RxError;

    fn try_from(record: EventRecord) -> Result<Self> {
        match record.kind {
            EventKind::Message => {
                let media_url = record.media_url.filter(|u| !u.is_empty());
                Ok(ReplayEvent::Message(InboundMessage {
                    from: required(record.customer, "customer", "message")?,
                    to: required(record.pharmacy, "pharmacy", "message")?,
                    body: record.body.unwrap_or_default(),
                    media_count: u32::from(media_url.is_some()),
                    media_content_type: media_url.as_ref().map(|_| "image/jpeg".to_string()),
                    media_url,
                    provider_message_id: record.message_id.unwrap_or_default(),
                    profile_name: None,
                }))
            }
            EventKind::Transition => {
                let target: OrderStatus = required(record.status, "status", "transition")?.parse()?;
                let total_amount = record.amount.map(Amount::new).transpose()?;
                let payment_method = record
                    .payment_method
                    .map(|m| m.parse::<PaymentMethod>())
                    .transpose()?;
                Ok(ReplayEvent::Transition {
                    pharmacy: required(record.pharmacy, "pharmacy", "transition")?,
                    customer: required(record.customer, "customer", "transition")?,
                    request: TransitionRequest {
                        total_amount,
                        payment_method,
                        reason: record.reason,
                        actor: Some("replay".to_string()),
                        ..TransitionRequest::to(target)
                    },
                })
            }
            EventKind::Courier => Ok(ReplayEvent::Courier {
                pharmacy: required(record.pharmacy, "pharmacy", "courier")?,
                customer: required(record.customer, "customer", "courier")?,
                status: required(record.status, "status", "courier")?,
                courier_name: record.courier_name,
                courier_phone: record.courier_phone,
            }),
            EventKind::ChatStatus => Ok(ReplayEvent::ChatStatus {
                message_id: required(record.message_id, "message_id", "chat_status")?,
                status: required(record.status, "status", "chat_status")?,
            }),
        }
    }
}

/// Reads replay events from a CSV source.
///
/// Whitespace is trimmed and rows may omit trailing columns.
pub struct EventReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> EventReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and validates events, one result per row.
    pub fn events(self) -> impl Iterator<Item = Result<ReplayEvent>> {
        self.reader
            .into_deserialize::<EventRecord>()
            .map(|result| result.map_err(RxError::from).and_then(ReplayEvent::try_from))
    }
}
