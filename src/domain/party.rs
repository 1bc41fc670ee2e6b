use super::entity_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

entity_id!(PharmacyId);
entity_id!(CustomerId);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pharmacy {
    pub id: PharmacyId,
    pub name: String,
    /// Chat number customers write to; identifies the pharmacy on inbound messages.
    pub chat_number: String,
    pub pickup_address: String,
    pub phone: String,
    /// UPI id quoted in payment instructions. Without it only the confirmation is sent.
    pub upi_id: Option<String>,
    pub courier_enabled: bool,
}

impl Pharmacy {
    pub fn new(name: impl Into<String>, chat_number: impl Into<String>) -> Self {
        Self {
            id: PharmacyId::new(),
            name: name.into(),
            chat_number: chat_number.into(),
            pickup_address: String::new(),
            phone: String::new(),
            upi_id: None,
            courier_enabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub phone: String,
    pub name: Option<String>,
    /// Last address the customer gave us. Only a default for new orders.
    pub last_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    pub fn new(phone: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: CustomerId::new(),
            phone: phone.into(),
            name,
            last_address: None,
            created_at: Utc::now(),
        }
    }
}
