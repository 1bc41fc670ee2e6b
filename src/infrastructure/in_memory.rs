use crate::domain::delivery::Delivery;
use crate::domain::message::{Message, MessageId, Prescription, PrescriptionId};
use crate::domain::order::{Order, OrderId, OrderNumber, OrderStatus, StatusChange};
use crate::domain::party::{Customer, CustomerId, Pharmacy, PharmacyId};
use crate::domain::ports::{
    CustomerStore, DeliveryStore, MessageStore, OrderStore, PharmacyStore, PrescriptionStore,
    Repositories, StatusHistoryStore,
};
use crate::error::{Result, RxError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Builds a full set of empty in-memory stores.
pub fn repositories() -> Repositories {
    Repositories {
        orders: Arc::new(InMemoryOrderStore::new()),
        history: Arc::new(InMemoryHistoryStore::new()),
        prescriptions: Arc::new(InMemoryPrescriptionStore::new()),
        deliveries: Arc::new(InMemoryDeliveryStore::new()),
        messages: Arc::new(InMemoryMessageStore::new()),
        customers: Arc::new(InMemoryCustomerStore::new()),
        pharmacies: Arc::new(InMemoryPharmacyStore::new()),
    }
}

#[derive(Default)]
struct OrderTable {
    /// Insertion order, so "newest first" does not depend on clock resolution.
    orders: Vec<Order>,
    by_id: HashMap<OrderId, usize>,
}

/// Orders kept in insertion order behind a single lock.
///
/// The conditional update holds the write lock across the status check and
/// the write, which makes it atomic with respect to every other writer.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    table: Arc<RwLock<OrderTable>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<()> {
        let mut table = self.table.write().await;
        if table.by_id.contains_key(&order.id)
            || table
                .orders
                .iter()
                .any(|o| o.order_number == order.order_number)
        {
            return Err(RxError::Validation(format!(
                "Order {} already exists",
                order.order_number
            )));
        }
        let index = table.orders.len();
        table.by_id.insert(order.id, index);
        table.orders.push(order);
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let table = self.table.read().await;
        Ok(table.by_id.get(&id).map(|&i| table.orders[i].clone()))
    }

    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        let table = self.table.read().await;
        Ok(table
            .orders
            .iter()
            .find(|o| &o.order_number == number)
            .cloned())
    }

    async fn list_for_customer(
        &self,
        pharmacy_id: PharmacyId,
        customer_id: CustomerId,
    ) -> Result<Vec<Order>> {
        let table = self.table.read().await;
        Ok(table
            .orders
            .iter()
            .rev()
            .filter(|o| o.pharmacy_id == pharmacy_id && o.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        Ok(self.table.read().await.orders.clone())
    }

    async fn update_if_status(&self, order: Order, expected: OrderStatus) -> Result<bool> {
        let mut table = self.table.write().await;
        let Some(&index) = table.by_id.get(&order.id) else {
            return Err(RxError::not_found("order", order.id));
        };
        if table.orders[index].status != expected {
            return Ok(false);
        }
        table.orders[index] = order;
        Ok(true)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryHistoryStore {
    entries: Arc<RwLock<HashMap<OrderId, Vec<StatusChange>>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusHistoryStore for InMemoryHistoryStore {
    async fn append(&self, change: StatusChange) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.entry(change.order_id).or_default().push(change);
        Ok(())
    }

    async fn list(&self, order_id: OrderId) -> Result<Vec<StatusChange>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&order_id).cloned().unwrap_or_default())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPrescriptionStore {
    prescriptions: Arc<RwLock<Vec<Prescription>>>,
}

impl InMemoryPrescriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PrescriptionStore for InMemoryPrescriptionStore {
    async fn store(&self, prescription: Prescription) -> Result<()> {
        let mut prescriptions = self.prescriptions.write().await;
        match prescriptions.iter_mut().find(|p| p.id == prescription.id) {
            Some(existing) => *existing = prescription,
            None => prescriptions.push(prescription),
        }
        Ok(())
    }

    async fn get(&self, id: PrescriptionId) -> Result<Option<Prescription>> {
        let prescriptions = self.prescriptions.read().await;
        Ok(prescriptions.iter().find(|p| p.id == id).cloned())
    }

    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<Prescription>> {
        let prescriptions = self.prescriptions.read().await;
        Ok(prescriptions
            .iter()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect())
    }
}

/// Deliveries keyed by order; there is at most one per order.
#[derive(Default, Clone)]
pub struct InMemoryDeliveryStore {
    deliveries: Arc<RwLock<HashMap<OrderId, Delivery>>>,
}

impl InMemoryDeliveryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeliveryStore for InMemoryDeliveryStore {
    async fn store(&self, delivery: Delivery) -> Result<()> {
        let mut deliveries = self.deliveries.write().await;
        deliveries.insert(delivery.order_id, delivery);
        Ok(())
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Delivery>> {
        let deliveries = self.deliveries.read().await;
        Ok(deliveries.get(&order_id).cloned())
    }

    async fn get_by_provider_order(&self, provider_order_id: &str) -> Result<Option<Delivery>> {
        let deliveries = self.deliveries.read().await;
        Ok(deliveries
            .values()
            .find(|d| d.provider_order_id.as_deref() == Some(provider_order_id))
            .cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryMessageStore {
    messages: Arc<RwLock<Vec<Message>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert(&self, message: Message) -> Result<()> {
        self.messages.write().await.push(message);
        Ok(())
    }

    async fn find_by_provider_id(&self, provider_message_id: &str) -> Result<Option<Message>> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .find(|m| m.provider_message_id.as_deref() == Some(provider_message_id))
            .cloned())
    }

    async fn attribute(&self, id: MessageId, order_id: OrderId) -> Result<()> {
        let mut messages = self.messages.write().await;
        let message = messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| RxError::not_found("message", id))?;
        message.order_id = Some(order_id);
        Ok(())
    }

    async fn update_delivery_status(
        &self,
        provider_message_id: &str,
        status: &str,
    ) -> Result<bool> {
        let mut messages = self.messages.write().await;
        match messages
            .iter_mut()
            .find(|m| m.provider_message_id.as_deref() == Some(provider_message_id))
        {
            Some(message) => {
                message.delivery_status = Some(status.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn has_idempotency_key(&self, key: &str) -> Result<bool> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .any(|m| m.idempotency_key.as_deref() == Some(key)))
    }

    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<Message>> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .filter(|m| m.order_id == Some(order_id))
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryCustomerStore {
    customers: Arc<RwLock<HashMap<CustomerId, Customer>>>,
}

impl InMemoryCustomerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerStore for InMemoryCustomerStore {
    async fn store(&self, customer: Customer) -> Result<()> {
        self.customers.write().await.insert(customer.id, customer);
        Ok(())
    }

    async fn get(&self, id: CustomerId) -> Result<Option<Customer>> {
        Ok(self.customers.read().await.get(&id).cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Customer>> {
        let customers = self.customers.read().await;
        Ok(customers.values().find(|c| c.phone == phone).cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPharmacyStore {
    pharmacies: Arc<RwLock<HashMap<PharmacyId, Pharmacy>>>,
}

impl InMemoryPharmacyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PharmacyStore for InMemoryPharmacyStore {
    async fn store(&self, pharmacy: Pharmacy) -> Result<()> {
        self.pharmacies.write().await.insert(pharmacy.id, pharmacy);
        Ok(())
    }

    async fn get(&self, id: PharmacyId) -> Result<Option<Pharmacy>> {
        Ok(self.pharmacies.read().await.get(&id).cloned())
    }

    async fn find_by_chat_number(&self, chat_number: &str) -> Result<Option<Pharmacy>> {
        let pharmacies = self.pharmacies.read().await;
        Ok(pharmacies
            .values()
            .find(|p| p.chat_number == chat_number)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::{InboundMessage, OutboundMessage};

    fn order(pharmacy_id: PharmacyId, customer_id: CustomerId) -> Order {
        Order::new(
            OrderNumber::generate(),
            pharmacy_id,
            customer_id,
            "Crocin x2",
            Vec::new(),
            false,
        )
    }

    #[tokio::test]
    async fn test_update_if_status_rejects_stale_writes() {
        let store = InMemoryOrderStore::new();
        let original = order(PharmacyId::new(), CustomerId::new());
        store.insert(original.clone()).await.unwrap();

        let mut reviewed = original.clone();
        reviewed.status = OrderStatus::UnderReview;
        assert!(
            store
                .update_if_status(reviewed, OrderStatus::Pending)
                .await
                .unwrap()
        );

        let mut stale = original.clone();
        stale.status = OrderStatus::AwaitingRx;
        assert!(
            !store
                .update_if_status(stale, OrderStatus::Pending)
                .await
                .unwrap()
        );

        let stored = store.get(original.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::UnderReview);
    }

    #[tokio::test]
    async fn test_duplicate_order_number_is_rejected() {
        let store = InMemoryOrderStore::new();
        let first = order(PharmacyId::new(), CustomerId::new());
        let mut second = order(PharmacyId::new(), CustomerId::new());
        second.order_number = first.order_number.clone();

        store.insert(first).await.unwrap();
        assert!(matches!(
            store.insert(second).await,
            Err(RxError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_list_for_customer_is_newest_first_and_scoped() {
        let store = InMemoryOrderStore::new();
        let (pharmacy, customer) = (PharmacyId::new(), CustomerId::new());
        let older = order(pharmacy, customer);
        let newer = order(pharmacy, customer);
        let elsewhere = order(PharmacyId::new(), customer);
        for o in [older.clone(), elsewhere, newer.clone()] {
            store.insert(o).await.unwrap();
        }

        let listed = store.list_for_customer(pharmacy, customer).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn test_message_store_keys_and_attribution() {
        let store = InMemoryMessageStore::new();
        let inbound = Message::inbound(&InboundMessage {
            from: "+919999999999".to_string(),
            to: "+910000000001".to_string(),
            body: "Crocin x2".to_string(),
            provider_message_id: "SM1".to_string(),
            ..Default::default()
        });
        let id = inbound.id;
        store.insert(inbound).await.unwrap();

        let mut outbound = Message::outbound(
            "+910000000001",
            &OutboundMessage {
                to: "+919999999999".to_string(),
                body: "hello".to_string(),
                media_url: None,
            },
            None,
        );
        outbound.idempotency_key = Some("k:1".to_string());
        store.insert(outbound).await.unwrap();

        let order_id = OrderId::new();
        store.attribute(id, order_id).await.unwrap();
        assert_eq!(store.list_for_order(order_id).await.unwrap().len(), 1);
        assert!(store.has_idempotency_key("k:1").await.unwrap());
        assert!(!store.has_idempotency_key("k:2").await.unwrap());
        assert!(store.update_delivery_status("SM1", "read").await.unwrap());
        assert!(!store.update_delivery_status("SM404", "read").await.unwrap());
        assert!(matches!(
            store.attribute(MessageId::new(), order_id).await,
            Err(RxError::NotFound { .. })
        ));
    }
}
