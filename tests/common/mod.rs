#![allow(dead_code)]

use rust_decimal_macros::dec;
use rxflow::application::engine::{Engine, InboundOutcome};
use rxflow::application::lifecycle::TransitionRequest;
use rxflow::domain::message::InboundMessage;
use rxflow::domain::order::{Amount, Order, OrderStatus, PaymentMethod};
use rxflow::domain::party::Pharmacy;
use rxflow::domain::ports::CourierClient;
use rxflow::infrastructure::in_memory;
use rxflow::infrastructure::simulated::{RecordingTransport, SimulatedCourier};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const PHARMACY_NUMBER: &str = "+910000000001";
pub const CUSTOMER: &str = "+919999999999";
pub const COURIER_TIMEOUT: Duration = Duration::from_millis(200);

pub struct Harness {
    pub engine: Engine,
    pub courier: Arc<SimulatedCourier>,
    pub transport: Arc<RecordingTransport>,
    pub pharmacy: Pharmacy,
    next_message: AtomicU64,
}

pub struct HarnessOptions {
    pub courier_enabled: bool,
    pub upi_id: Option<&'static str>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            courier_enabled: true,
            upi_id: Some("care@upi"),
        }
    }
}

impl Harness {
    pub async fn new() -> Self {
        Self::with(HarnessOptions::default()).await
    }

    pub async fn with(options: HarnessOptions) -> Self {
        let courier = Arc::new(SimulatedCourier::new(dec!(49)));
        let transport = Arc::new(RecordingTransport::new());
        let engine = Engine::new(
            in_memory::repositories(),
            transport.clone(),
            Some(courier.clone() as Arc<dyn CourierClient>),
            COURIER_TIMEOUT,
        );

        let mut pharmacy = Pharmacy::new("Care Pharmacy", PHARMACY_NUMBER);
        pharmacy.pickup_address = "1, MG Road, Bengaluru 560001".to_string();
        pharmacy.phone = "+918000000000".to_string();
        pharmacy.upi_id = options.upi_id.map(str::to_string);
        pharmacy.courier_enabled = options.courier_enabled;
        let pharmacy = engine.register_pharmacy(pharmacy).await.unwrap();

        Self {
            engine,
            courier,
            transport,
            pharmacy,
            next_message: AtomicU64::new(1),
        }
    }

    pub fn message(&self, body: &str) -> InboundMessage {
        let n = self.next_message.fetch_add(1, Ordering::SeqCst);
        InboundMessage {
            from: CUSTOMER.to_string(),
            to: PHARMACY_NUMBER.to_string(),
            body: body.to_string(),
            provider_message_id: format!("SMIN{n}"),
            profile_name: Some("Asha".to_string()),
            ..Default::default()
        }
    }

    pub async fn send(&self, body: &str) -> InboundOutcome {
        self.engine.handle_inbound(self.message(body)).await.unwrap()
    }

    pub async fn send_photo(&self, url: &str) -> InboundOutcome {
        let message = InboundMessage {
            media_count: 1,
            media_url: Some(url.to_string()),
            media_content_type: Some("image/jpeg".to_string()),
            ..self.message("")
        };
        self.engine.handle_inbound(message).await.unwrap()
    }

    pub async fn latest_order(&self) -> Order {
        self.engine
            .latest_order(PHARMACY_NUMBER, CUSTOMER)
            .await
            .unwrap()
    }

    pub async fn order_count(&self) -> usize {
        self.engine
            .repositories()
            .orders
            .list_all()
            .await
            .unwrap()
            .len()
    }

    pub async fn move_to(&self, order: &Order, target: OrderStatus) -> Order {
        self.engine
            .transition(order.id, TransitionRequest::to(target))
            .await
            .unwrap()
    }

    pub async fn confirm(&self, order: &Order, method: PaymentMethod) -> Order {
        let request = TransitionRequest {
            total_amount: Some(Amount::new(dec!(240.50)).unwrap()),
            payment_method: Some(method),
            ..TransitionRequest::to(match method {
                PaymentMethod::Upi => OrderStatus::AwaitingPayment,
                PaymentMethod::Cod => OrderStatus::Confirmed,
            })
        };
        self.engine.transition(order.id, request).await.unwrap()
    }

    /// New order taken through review and confirmation, with a delivery address.
    pub async fn confirmed_order_with_address(&self, method: PaymentMethod) -> Order {
        self.send("Crocin x2, Vicks x1").await;
        let order = self.latest_order().await;
        let order = self.move_to(&order, OrderStatus::UnderReview).await;
        let order = self.confirm(&order, method).await;
        let order = if method == PaymentMethod::Upi {
            self.move_to(&order, OrderStatus::PaymentConfirmed).await
        } else {
            order
        };
        self.send("12, Residency Road, Bengaluru 560025").await;
        let order = self.latest_order().await;
        assert!(order.delivery_address.is_some());
        order
    }

    pub fn customer_messages(&self) -> Vec<String> {
        self.transport.sent_to(CUSTOMER)
    }
}
