//! In-process collaborators: a courier that books everything and chat
//! transports that only record or log what they would send.

use crate::domain::message::OutboundMessage;
use crate::domain::ports::{
    ChatTransport, CourierBooking, CourierClient, CourierError, CourierOrderStatus, CourierPoint,
    TransportError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

const SIMULATED_TRACKING_BASE: &str = "https://track.courier.local";

/// Courier that accepts every request, unless told to fail or stall.
#[derive(Default)]
pub struct SimulatedCourier {
    price: Decimal,
    next_id: AtomicU64,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    statuses: Mutex<HashMap<String, CourierOrderStatus>>,
    calls: Mutex<Vec<String>>,
}

impl SimulatedCourier {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            ..Self::default()
        }
    }

    /// While set, every call fails as a network error would.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes every call sleep first. Used to exercise timeouts.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// What `get_order` will report for a provider order.
    pub fn set_remote_status(&self, provider_order_id: &str, status: CourierOrderStatus) {
        self.statuses
            .lock()
            .insert(provider_order_id.to_string(), status);
    }

    /// Operations received so far, e.g. `create_order:ABC234`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    async fn enter(&self, call: String) -> Result<(), CourierError> {
        self.calls.lock().push(call);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CourierError::new("simulated courier is unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl CourierClient for SimulatedCourier {
    async fn calculate_price(
        &self,
        _pickup: &CourierPoint,
        dropoff: &CourierPoint,
    ) -> Result<Decimal, CourierError> {
        self.enter("calculate_price".to_string()).await?;
        if dropoff.address.trim().is_empty() {
            let mut error = CourierError::new("invalid parameters");
            error
                .fields
                .insert("address".to_string(), vec!["required".to_string()]);
            return Err(error);
        }
        Ok(self.price)
    }

    async fn create_order(
        &self,
        _pickup: &CourierPoint,
        _dropoff: &CourierPoint,
        reference: &str,
    ) -> Result<CourierBooking, CourierError> {
        self.enter(format!("create_order:{reference}")).await?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let provider_order_id = format!("SIM-{n}");
        self.set_remote_status(
            &provider_order_id,
            CourierOrderStatus {
                status: "available".to_string(),
                courier_name: None,
                courier_phone: None,
            },
        );
        Ok(CourierBooking {
            tracking_url: Some(format!("{SIMULATED_TRACKING_BASE}/{provider_order_id}")),
            provider_order_number: Some(n.to_string()),
            provider_order_id,
            price: Some(self.price),
            status: "available".to_string(),
        })
    }

    async fn cancel_order(&self, provider_order_id: &str) -> Result<(), CourierError> {
        self.enter(format!("cancel_order:{provider_order_id}")).await?;
        if let Some(status) = self.statuses.lock().get_mut(provider_order_id) {
            status.status = "canceled".to_string();
        }
        Ok(())
    }

    async fn get_order(&self, provider_order_id: &str) -> Result<CourierOrderStatus, CourierError> {
        self.enter(format!("get_order:{provider_order_id}")).await?;
        self.statuses
            .lock()
            .get(provider_order_id)
            .cloned()
            .ok_or_else(|| CourierError::new(format!("order {provider_order_id} not found")))
    }
}

/// A message handed to a transport, with the number it was sent from.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub from: String,
    pub message: OutboundMessage,
}

/// Keeps every outbound message in memory.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, to: &str) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|s| s.message.to == to)
            .map(|s| s.message.body.clone())
            .collect()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send(&self, from: &str, message: &OutboundMessage) -> Result<String, TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError("recording transport set to fail".to_string()));
        }
        let mut sent = self.sent.lock();
        sent.push(SentMessage {
            from: from.to_string(),
            message: message.clone(),
        });
        Ok(format!("SMOUT{}", sent.len()))
    }
}

/// Writes outbound messages to the log instead of sending them.
#[derive(Default)]
pub struct LogTransport;

#[async_trait]
impl ChatTransport for LogTransport {
    async fn send(&self, from: &str, message: &OutboundMessage) -> Result<String, TransportError> {
        let id = format!("LOG{}", uuid::Uuid::new_v4().simple());
        info!(from, to = %message.to, body = %message.body, message_id = %id, "outbound chat message");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn point(address: &str) -> CourierPoint {
        CourierPoint {
            address: address.to_string(),
            phone: "+919999999999".to_string(),
            contact: None,
        }
    }

    #[tokio::test]
    async fn test_simulated_courier_books_and_reports() {
        let courier = SimulatedCourier::new(dec!(45));
        let booking = courier
            .create_order(&point("pharmacy"), &point("home"), "ABC234")
            .await
            .unwrap();
        assert_eq!(booking.provider_order_id, "SIM-1");
        assert_eq!(booking.price, Some(dec!(45)));
        assert!(booking.tracking_url.unwrap().ends_with("/SIM-1"));

        let remote = courier.get_order("SIM-1").await.unwrap();
        assert_eq!(remote.status, "available");
        assert_eq!(courier.calls(), vec!["create_order:ABC234", "get_order:SIM-1"]);
    }

    #[tokio::test]
    async fn test_simulated_courier_failure_switch() {
        let courier = SimulatedCourier::new(dec!(45));
        courier.set_failing(true);
        assert!(
            courier
                .calculate_price(&point("pharmacy"), &point("home"))
                .await
                .is_err()
        );
        courier.set_failing(false);
        let err = courier
            .calculate_price(&point("pharmacy"), &point(""))
            .await
            .unwrap_err();
        assert_eq!(err.fields["address"], vec!["required".to_string()]);
    }

    #[tokio::test]
    async fn test_recording_transport() {
        let transport = RecordingTransport::new();
        let message = OutboundMessage {
            to: "+919999999999".to_string(),
            body: "hi".to_string(),
            media_url: None,
        };
        assert_eq!(transport.send("+910000000001", &message).await.unwrap(), "SMOUT1");
        transport.set_failing(true);
        assert!(transport.send("+910000000001", &message).await.is_err());
        assert_eq!(transport.sent_to("+919999999999"), vec!["hi".to_string()]);
    }
}
