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
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

pub const CF_ORDERS: &str = "orders";
pub const CF_HISTORY: &str = "status_history";
pub const CF_PRESCRIPTIONS: &str = "prescriptions";
/// Keyed by order id.
pub const CF_DELIVERIES: &str = "deliveries";
pub const CF_MESSAGES: &str = "messages";
pub const CF_CUSTOMERS: &str = "customers";
pub const CF_PHARMACIES: &str = "pharmacies";

const COLUMN_FAMILIES: [&str; 7] = [
    CF_ORDERS,
    CF_HISTORY,
    CF_PRESCRIPTIONS,
    CF_DELIVERIES,
    CF_MESSAGES,
    CF_CUSTOMERS,
    CF_PHARMACIES,
];

/// Persistent store for every entity, one column family each, values as JSON.
///
/// `Clone` shares the underlying database. Read-modify-write operations take
/// `write_lock` so the conditional order update stays atomic.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates the database at `path`, creating missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn repositories(&self) -> Repositories {
        Repositories {
            orders: Arc::new(self.clone()),
            history: Arc::new(self.clone()),
            prescriptions: Arc::new(self.clone()),
            deliveries: Arc::new(self.clone()),
            messages: Arc::new(self.clone()),
            customers: Arc::new(self.clone()),
            pharmacies: Arc::new(self.clone()),
        }
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            RxError::Internal(Box::new(std::io::Error::other(format!(
                "column family {name} not found"
            ))))
        })
    }

    fn put_json<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| RxError::Internal(Box::new(e)))?;
        self.db.put_cf(self.cf(cf)?, key, bytes)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_pinned_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).map_err(|e| RxError::Internal(Box::new(e)))?,
            )),
            None => Ok(None),
        }
    }

    fn scan_json<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let mut values = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(serde_json::from_slice(&value).map_err(|e| RxError::Internal(Box::new(e)))?);
        }
        Ok(values)
    }
}

#[async_trait]
impl OrderStore for RocksDbStore {
    async fn insert(&self, order: Order) -> Result<()> {
        let _guard = self.write_lock.lock();
        let orders: Vec<Order> = self.scan_json(CF_ORDERS)?;
        if orders
            .iter()
            .any(|o| o.id == order.id || o.order_number == order.order_number)
        {
            return Err(RxError::Validation(format!(
                "Order {} already exists",
                order.order_number
            )));
        }
        self.put_json(CF_ORDERS, order.id.0.as_bytes(), &order)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        self.get_json(CF_ORDERS, id.0.as_bytes())
    }

    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        let orders: Vec<Order> = self.scan_json(CF_ORDERS)?;
        Ok(orders.into_iter().find(|o| &o.order_number == number))
    }

    async fn list_for_customer(
        &self,
        pharmacy_id: PharmacyId,
        customer_id: CustomerId,
    ) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .scan_json::<Order>(CF_ORDERS)?
            .into_iter()
            .filter(|o| o.pharmacy_id == pharmacy_id && o.customer_id == customer_id)
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self.scan_json(CF_ORDERS)?;
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    async fn update_if_status(&self, order: Order, expected: OrderStatus) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let current: Order = self
            .get_json(CF_ORDERS, order.id.0.as_bytes())?
            .ok_or_else(|| RxError::not_found("order", order.id))?;
        if current.status != expected {
            return Ok(false);
        }
        self.put_json(CF_ORDERS, order.id.0.as_bytes(), &order)?;
        Ok(true)
    }
}

#[async_trait]
impl StatusHistoryStore for RocksDbStore {
    async fn append(&self, change: StatusChange) -> Result<()> {
        let _guard = self.write_lock.lock();
        let key = change.order_id.0.as_bytes().to_vec();
        let mut entries: Vec<StatusChange> =
            self.get_json(CF_HISTORY, &key)?.unwrap_or_default();
        entries.push(change);
        self.put_json(CF_HISTORY, &key, &entries)
    }

    async fn list(&self, order_id: OrderId) -> Result<Vec<StatusChange>> {
        Ok(self.get_json(CF_HISTORY, order_id.0.as_bytes())?.unwrap_or_default())
    }
}

#[async_trait]
impl PrescriptionStore for RocksDbStore {
    async fn store(&self, prescription: Prescription) -> Result<()> {
        self.put_json(CF_PRESCRIPTIONS, prescription.id.0.as_bytes(), &prescription)
    }

    async fn get(&self, id: PrescriptionId) -> Result<Option<Prescription>> {
        self.get_json(CF_PRESCRIPTIONS, id.0.as_bytes())
    }

    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<Prescription>> {
        let mut prescriptions: Vec<Prescription> = self
            .scan_json::<Prescription>(CF_PRESCRIPTIONS)?
            .into_iter()
            .filter(|p| p.order_id == order_id)
            .collect();
        prescriptions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(prescriptions)
    }
}

#[async_trait]
impl DeliveryStore for RocksDbStore {
    async fn store(&self, delivery: Delivery) -> Result<()> {
        self.put_json(CF_DELIVERIES, delivery.order_id.0.as_bytes(), &delivery)
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Delivery>> {
        self.get_json(CF_DELIVERIES, order_id.0.as_bytes())
    }

    async fn get_by_provider_order(&self, provider_order_id: &str) -> Result<Option<Delivery>> {
        let deliveries: Vec<Delivery> = self.scan_json(CF_DELIVERIES)?;
        Ok(deliveries
            .into_iter()
            .find(|d| d.provider_order_id.as_deref() == Some(provider_order_id)))
    }
}

#[async_trait]
impl MessageStore for RocksDbStore {
    async fn insert(&self, message: Message) -> Result<()> {
        self.put_json(CF_MESSAGES, message.id.0.as_bytes(), &message)
    }

    async fn find_by_provider_id(&self, provider_message_id: &str) -> Result<Option<Message>> {
        let messages: Vec<Message> = self.scan_json(CF_MESSAGES)?;
        Ok(messages
            .into_iter()
            .find(|m| m.provider_message_id.as_deref() == Some(provider_message_id)))
    }

    async fn attribute(&self, id: MessageId, order_id: OrderId) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut message: Message = self
            .get_json(CF_MESSAGES, id.0.as_bytes())?
            .ok_or_else(|| RxError::not_found("message", id))?;
        message.order_id = Some(order_id);
        self.put_json(CF_MESSAGES, id.0.as_bytes(), &message)
    }

    async fn update_delivery_status(
        &self,
        provider_message_id: &str,
        status: &str,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let messages: Vec<Message> = self.scan_json(CF_MESSAGES)?;
        let Some(mut message) = messages
            .into_iter()
            .find(|m| m.provider_message_id.as_deref() == Some(provider_message_id))
        else {
            return Ok(false);
        };
        message.delivery_status = Some(status.to_string());
        self.put_json(CF_MESSAGES, message.id.0.as_bytes(), &message)?;
        Ok(true)
    }

    async fn has_idempotency_key(&self, key: &str) -> Result<bool> {
        let messages: Vec<Message> = self.scan_json(CF_MESSAGES)?;
        Ok(messages
            .iter()
            .any(|m| m.idempotency_key.as_deref() == Some(key)))
    }

    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .scan_json::<Message>(CF_MESSAGES)?
            .into_iter()
            .filter(|m| m.order_id == Some(order_id))
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }
}

#[async_trait]
impl CustomerStore for RocksDbStore {
    async fn store(&self, customer: Customer) -> Result<()> {
        self.put_json(CF_CUSTOMERS, customer.id.0.as_bytes(), &customer)
    }

    async fn get(&self, id: CustomerId) -> Result<Option<Customer>> {
        self.get_json(CF_CUSTOMERS, id.0.as_bytes())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Customer>> {
        let customers: Vec<Customer> = self.scan_json(CF_CUSTOMERS)?;
        Ok(customers.into_iter().find(|c| c.phone == phone))
    }
}

#[async_trait]
impl PharmacyStore for RocksDbStore {
    async fn store(&self, pharmacy: Pharmacy) -> Result<()> {
        self.put_json(CF_PHARMACIES, pharmacy.id.0.as_bytes(), &pharmacy)
    }

    async fn get(&self, id: PharmacyId) -> Result<Option<Pharmacy>> {
        self.get_json(CF_PHARMACIES, id.0.as_bytes())
    }

    async fn find_by_chat_number(&self, chat_number: &str) -> Result<Option<Pharmacy>> {
        let pharmacies: Vec<Pharmacy> = self.scan_json(CF_PHARMACIES)?;
        Ok(pharmacies.into_iter().find(|p| p.chat_number == chat_number))
    }
}
