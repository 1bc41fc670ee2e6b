use super::entity_id;
use super::party::{CustomerId, PharmacyId};
use crate::error::RxError;
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

entity_id!(
    /// System identity of an order.
    OrderId
);

/// Characters used for pharmacist-facing order numbers. Visually confusable
/// glyphs (I, L, O, 0, 1) are left out so numbers survive being read aloud.
pub const ORDER_NUMBER_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
pub const ORDER_NUMBER_LEN: usize = 6;

/// Human order number quoted in every customer message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let number: String = (0..ORDER_NUMBER_LEN)
            .map(|_| ORDER_NUMBER_ALPHABET[rng.gen_range(0..ORDER_NUMBER_ALPHABET.len())] as char)
            .collect();
        Self(number)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderNumber {
    type Err = RxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        if normalized.len() == ORDER_NUMBER_LEN
            && normalized.bytes().all(|b| ORDER_NUMBER_ALPHABET.contains(&b))
        {
            Ok(Self(normalized))
        } else {
            Err(RxError::Validation(format!("Invalid order number: {s}")))
        }
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    AwaitingRx,
    RxReceived,
    UnderReview,
    Confirmed,
    AwaitingPayment,
    PaymentConfirmed,
    ReadyForPickup,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 10] = [
        OrderStatus::Pending,
        OrderStatus::AwaitingRx,
        OrderStatus::RxReceived,
        OrderStatus::UnderReview,
        OrderStatus::Confirmed,
        OrderStatus::AwaitingPayment,
        OrderStatus::PaymentConfirmed,
        OrderStatus::ReadyForPickup,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::AwaitingRx => "awaiting_rx",
            OrderStatus::RxReceived => "rx_received",
            OrderStatus::UnderReview => "under_review",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::AwaitingPayment => "awaiting_payment",
            OrderStatus::PaymentConfirmed => "payment_confirmed",
            OrderStatus::ReadyForPickup => "ready_for_pickup",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Wording used when the status is shown to a customer.
    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Pending => "received",
            OrderStatus::AwaitingRx => "waiting for prescription",
            OrderStatus::RxReceived => "prescription received",
            OrderStatus::UnderReview => "under review",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::AwaitingPayment => "waiting for payment",
            OrderStatus::PaymentConfirmed => "paid",
            OrderStatus::ReadyForPickup => "ready",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Statuses in which the order can still be given a delivery address.
    pub fn accepts_delivery_address(self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed | OrderStatus::PaymentConfirmed | OrderStatus::ReadyForPickup
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = RxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| RxError::Validation(format!("Unknown order status: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Upi,
    Cod,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Upi => "upi",
            PaymentMethod::Cod => "cod",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = RxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upi" => Ok(PaymentMethod::Upi),
            "cod" => Ok(PaymentMethod::Cod),
            other => Err(RxError::Validation(format!(
                "Unknown payment method: {other}"
            ))),
        }
    }
}

/// A positive order total.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub const ONE: Self = Self(Decimal::ONE);

    pub fn new(value: Decimal) -> Result<Self, RxError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(RxError::Validation("Amount must be positive".to_string()))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = RxError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.normalize().fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    /// The order line the item was extracted from, before cleanup.
    pub original: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub pharmacy_id: PharmacyId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub raw_text: String,
    pub items: Option<Vec<LineItem>>,
    pub requires_rx: bool,
    pub rx_verified: bool,
    pub payment_method: Option<PaymentMethod>,
    pub total_amount: Option<Amount>,
    /// Per-order address. Once set it is never replaced.
    pub delivery_address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        order_number: OrderNumber,
        pharmacy_id: PharmacyId,
        customer_id: CustomerId,
        raw_text: impl Into<String>,
        items: Vec<LineItem>,
        requires_rx: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            order_number,
            pharmacy_id,
            customer_id,
            status: OrderStatus::Pending,
            raw_text: raw_text.into(),
            items: (!items.is_empty()).then_some(items),
            requires_rx,
            rx_verified: false,
            payment_method: None,
            total_amount: None,
            delivery_address: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends a line to the free-text notes.
    pub fn add_note(&mut self, note: &str) {
        match &mut self.notes {
            Some(notes) => {
                notes.push('\n');
                notes.push_str(note);
            }
            None => self.notes = Some(note.to_string()),
        }
    }

    pub fn items_summary(&self) -> String {
        self.items
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|item| format!("{} x{}", item.name, item.quantity))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Append-only audit record, one per successful transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub order_id: OrderId,
    /// `None` for the entry written when the order is first inserted.
    pub from: Option<OrderStatus>,
    pub to: OrderStatus,
    /// `None` for chat-driven transitions.
    pub actor: Option<String>,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_stored_amount_must_be_positive() {
        let amount: Amount = serde_json::from_str("\"240.50\"").unwrap();
        assert_eq!(amount.value(), dec!(240.50));
        assert_eq!(serde_json::to_string(&amount).unwrap(), "\"240.50\"");

        assert!(serde_json::from_str::<Amount>("\"0\"").is_err());
        assert!(serde_json::from_str::<Amount>("\"-1\"").is_err());
    }

    #[test]
    fn test_order_number_alphabet() {
        for _ in 0..200 {
            let number = OrderNumber::generate();
            assert_eq!(number.as_str().len(), ORDER_NUMBER_LEN);
            assert!(!number.as_str().contains(['I', 'L', 'O', '0', '1']));
        }
    }

    #[test]
    fn test_order_number_parse() {
        assert_eq!(
            "abc234".parse::<OrderNumber>().unwrap().as_str(),
            "ABC234"
        );
        assert!("ABC10Z".parse::<OrderNumber>().is_err());
        assert!("ABC".parse::<OrderNumber>().is_err());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(10.50)).is_ok());
        assert!(matches!(Amount::new(dec!(0)), Err(RxError::Validation(_))));
        assert!(matches!(Amount::new(dec!(-1)), Err(RxError::Validation(_))));
        assert_eq!(Amount::new(dec!(120.50)).unwrap().to_string(), "120.5");
    }

    #[test]
    fn test_new_order_without_items() {
        let order = Order::new(
            OrderNumber::generate(),
            PharmacyId::new(),
            CustomerId::new(),
            "",
            Vec::new(),
            false,
        );
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.items.is_none());
        assert!(order.total_amount.is_none());
    }

    #[test]
    fn test_add_note_appends() {
        let mut order = Order::new(
            OrderNumber::generate(),
            PharmacyId::new(),
            CustomerId::new(),
            "Crocin x2",
            Vec::new(),
            false,
        );
        order.add_note("first");
        order.add_note("second");
        assert_eq!(order.notes.as_deref(), Some("first\nsecond"));
    }
}
