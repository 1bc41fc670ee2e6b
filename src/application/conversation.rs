//! Per-conversation state and serialization.
//!
//! A conversation is one customer talking to one pharmacy. Inbound messages
//! for the same conversation are processed strictly one at a time, so two
//! messages arriving together cannot both decide there is no open order.

use crate::domain::order::{Order, OrderStatus};
use crate::domain::party::{Customer, Pharmacy};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub pharmacy_number: String,
    pub customer_phone: String,
}

impl ConversationKey {
    pub fn new(pharmacy_number: &str, customer_phone: &str) -> Self {
        Self {
            pharmacy_number: pharmacy_number.trim().to_string(),
            customer_phone: customer_phone.trim().to_string(),
        }
    }
}

/// Keyed async mutexes, one per conversation.
#[derive(Default)]
pub struct ConversationLocks {
    slots: Mutex<HashMap<ConversationKey, Arc<AsyncMutex<()>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other task holds `key`, then holds it until the guard drops.
    pub async fn acquire(&self, key: ConversationKey) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock();
            // Slots nobody is waiting on can go; the map is the only holder.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(key).or_default().clone()
        };
        slot.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Snapshot of one conversation, loaded under its lock.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub pharmacy: Pharmacy,
    pub customer: Customer,
    /// The customer's orders at this pharmacy, newest first.
    pub orders: Vec<Order>,
}

impl Conversation {
    fn newest_where(&self, pred: impl Fn(&Order) -> bool) -> Option<&Order> {
        self.orders.iter().find(|order| pred(order))
    }

    pub fn awaiting_prescription(&self) -> Option<&Order> {
        self.newest_where(|order| order.status == OrderStatus::AwaitingRx)
    }

    /// Newest order that is past confirmation and still has no delivery address.
    pub fn awaiting_address(&self) -> Option<&Order> {
        self.newest_where(|order| {
            order.status.accepts_delivery_address() && order.delivery_address.is_none()
        })
    }

    pub fn awaiting_payment(&self) -> Option<&Order> {
        self.newest_where(|order| order.status == OrderStatus::AwaitingPayment)
    }

    pub fn active(&self) -> Option<&Order> {
        self.newest_where(|order| !order.status.is_terminal())
    }
}
