use super::delivery::Delivery;
use super::message::{Message, MessageId, OutboundMessage, Prescription, PrescriptionId};
use super::order::{Order, OrderId, OrderNumber, OrderStatus, StatusChange};
use super::party::{Customer, CustomerId, Pharmacy, PharmacyId};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: Order) -> Result<()>;
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;
    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>>;
    /// Orders of one customer at one pharmacy, newest first.
    async fn list_for_customer(
        &self,
        pharmacy_id: PharmacyId,
        customer_id: CustomerId,
    ) -> Result<Vec<Order>>;
    async fn list_all(&self) -> Result<Vec<Order>>;
    /// Replaces the stored order only if its status is still `expected`.
    ///
    /// Returns `false` without writing when the status has moved on. This is
    /// the single write path for orders, so status can never be clobbered by a
    /// stale read.
    async fn update_if_status(&self, order: Order, expected: OrderStatus) -> Result<bool>;
}

#[async_trait]
pub trait StatusHistoryStore: Send + Sync {
    async fn append(&self, change: StatusChange) -> Result<()>;
    async fn list(&self, order_id: OrderId) -> Result<Vec<StatusChange>>;
}

#[async_trait]
pub trait PrescriptionStore: Send + Sync {
    async fn store(&self, prescription: Prescription) -> Result<()>;
    async fn get(&self, id: PrescriptionId) -> Result<Option<Prescription>>;
    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<Prescription>>;
}

#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn store(&self, delivery: Delivery) -> Result<()>;
    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Delivery>>;
    async fn get_by_provider_order(&self, provider_order_id: &str) -> Result<Option<Delivery>>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: Message) -> Result<()>;
    async fn find_by_provider_id(&self, provider_message_id: &str) -> Result<Option<Message>>;
    async fn attribute(&self, id: MessageId, order_id: OrderId) -> Result<()>;
    /// Returns `false` when no message carries that provider id.
    async fn update_delivery_status(&self, provider_message_id: &str, status: &str)
    -> Result<bool>;
    async fn has_idempotency_key(&self, key: &str) -> Result<bool>;
    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<Message>>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn store(&self, customer: Customer) -> Result<()>;
    async fn get(&self, id: CustomerId) -> Result<Option<Customer>>;
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Customer>>;
}

#[async_trait]
pub trait PharmacyStore: Send + Sync {
    async fn store(&self, pharmacy: Pharmacy) -> Result<()>;
    async fn get(&self, id: PharmacyId) -> Result<Option<Pharmacy>>;
    async fn find_by_chat_number(&self, chat_number: &str) -> Result<Option<Pharmacy>>;
}

/// Shared handles to every store the engine uses.
#[derive(Clone)]
pub struct Repositories {
    pub orders: Arc<dyn OrderStore>,
    pub history: Arc<dyn StatusHistoryStore>,
    pub prescriptions: Arc<dyn PrescriptionStore>,
    pub deliveries: Arc<dyn DeliveryStore>,
    pub messages: Arc<dyn MessageStore>,
    pub customers: Arc<dyn CustomerStore>,
    pub pharmacies: Arc<dyn PharmacyStore>,
}

/// Structured failure reported by the courier provider.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CourierError {
    pub message: String,
    /// Field-level validation errors, keyed by request field.
    pub fields: BTreeMap<String, Vec<String>>,
}

impl CourierError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn timeout(operation: &str) -> Self {
        Self::new(format!("courier {operation} timed out"))
    }
}

impl fmt::Display for CourierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for (field, errors) in &self.fields {
            write!(f, "; {field}: {}", errors.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for CourierError {}

#[derive(Debug, Clone, PartialEq)]
pub struct CourierPoint {
    pub address: String,
    pub phone: String,
    pub contact: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CourierBooking {
    pub provider_order_id: String,
    pub provider_order_number: Option<String>,
    pub tracking_url: Option<String>,
    pub price: Option<Decimal>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CourierOrderStatus {
    pub status: String,
    pub courier_name: Option<String>,
    pub courier_phone: Option<String>,
}

#[async_trait]
pub trait CourierClient: Send + Sync {
    async fn calculate_price(
        &self,
        pickup: &CourierPoint,
        dropoff: &CourierPoint,
    ) -> std::result::Result<Decimal, CourierError>;
    async fn create_order(
        &self,
        pickup: &CourierPoint,
        dropoff: &CourierPoint,
        reference: &str,
    ) -> std::result::Result<CourierBooking, CourierError>;
    async fn cancel_order(&self, provider_order_id: &str) -> std::result::Result<(), CourierError>;
    async fn get_order(
        &self,
        provider_order_id: &str,
    ) -> std::result::Result<CourierOrderStatus, CourierError>;
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct TransportError(pub String);

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends one message and returns the provider message id.
    async fn send(&self, from: &str, message: &OutboundMessage)
    -> std::result::Result<String, TransportError>;
}
