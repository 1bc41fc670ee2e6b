use super::notifications::{NotificationDispatcher, ReadyOutcome, courier_assigned_message, delivered_message};
use crate::domain::delivery::{Delivery, DeliveryId, DeliveryStatus};
use crate::domain::order::{Order, OrderId};
use crate::domain::party::{Customer, Pharmacy};
use crate::domain::ports::{CourierClient, CourierError, CourierPoint, DeliveryStore};
use crate::error::{Result, RxError};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A status report from the courier, via webhook or polling.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CourierUpdate {
    pub provider_order_id: String,
    pub status: String,
    pub courier_name: Option<String>,
    pub courier_phone: Option<String>,
}

/// Books and tracks courier deliveries. The only writer of `Delivery::status`.
///
/// Locally a delivery walks `pending → calculating → quoted → booked`; from
/// there the courier's reports drive it. Every courier call is bounded by
/// `timeout`. A call that fails or times out leaves the delivery in `failed`,
/// never in `calculating`.
pub struct DeliveryOrchestrator {
    deliveries: Arc<dyn DeliveryStore>,
    courier: Option<Arc<dyn CourierClient>>,
    notifier: Arc<NotificationDispatcher>,
    timeout: Duration,
}

impl DeliveryOrchestrator {
    pub fn new(
        deliveries: Arc<dyn DeliveryStore>,
        courier: Option<Arc<dyn CourierClient>>,
        notifier: Arc<NotificationDispatcher>,
        timeout: Duration,
    ) -> Self {
        Self {
            deliveries,
            courier,
            notifier,
            timeout,
        }
    }

    pub async fn delivery_for(&self, order_id: OrderId) -> Result<Option<Delivery>> {
        self.deliveries.get_by_order(order_id).await
    }

    /// Books a courier for an order that just became ready.
    ///
    /// Never fails: whatever happens with the courier, the caller gets the
    /// outcome to tell the customer about.
    pub async fn dispatch(&self, order: &Order, pharmacy: &Pharmacy, customer: &Customer) -> ReadyOutcome {
        if order.delivery_address.is_none() {
            return ReadyOutcome::Ready;
        }
        let Some(courier) = self.courier.as_ref().filter(|_| pharmacy.courier_enabled) else {
            return ReadyOutcome::DeliveryPending;
        };

        match self.book(courier.as_ref(), order, pharmacy, customer).await {
            Ok(delivery) => match delivery.tracking_url {
                Some(url) => ReadyOutcome::Tracking { url },
                None => ReadyOutcome::DeliveryPending,
            },
            Err(e) => {
                warn!(
                    order_number = %order.order_number,
                    error = %e,
                    "courier booking failed, order stays ready"
                );
                ReadyOutcome::DeliveryPending
            }
        }
    }

    async fn book(
        &self,
        courier: &dyn CourierClient,
        order: &Order,
        pharmacy: &Pharmacy,
        customer: &Customer,
    ) -> Result<Delivery> {
        let mut delivery = self.open_delivery(order, pharmacy, customer).await?;
        if delivery.status.is_booked() {
            info!(order_number = %order.order_number, "reusing existing courier booking");
            return Ok(delivery);
        }

        // A standing quote is booked as is.
        if delivery.status != DeliveryStatus::Quoted {
            self.price(courier, &mut delivery).await?;
        }

        let (pickup, dropoff) = points(&delivery);
        let booking = self
            .bounded("booking", courier.create_order(&pickup, &dropoff, order.order_number.as_str()))
            .await;

        match booking {
            Ok(booking) => {
                delivery.provider_order_id = Some(booking.provider_order_id);
                delivery.provider_order_number = booking.provider_order_number;
                delivery.tracking_url = booking.tracking_url;
                if delivery.final_price.is_none() {
                    delivery.final_price = booking.price;
                }
                delivery.booked_at = Some(Utc::now());
                self.advance(&mut delivery, DeliveryStatus::Booked).await?;
                info!(
                    order_number = %order.order_number,
                    provider_order_id = delivery.provider_order_id.as_deref().unwrap_or_default(),
                    provider_status = %booking.status,
                    "courier booked"
                );
                Ok(delivery)
            }
            Err(e) => {
                self.advance(&mut delivery, DeliveryStatus::Failed).await?;
                Err(e.into())
            }
        }
    }

    /// Asks the courier for a price without creating a provider order.
    ///
    /// A courier failure is recorded on the delivery, not returned.
    pub async fn quote(&self, order: &Order, pharmacy: &Pharmacy, customer: &Customer) -> Result<Delivery> {
        let courier = self
            .courier
            .as_ref()
            .filter(|_| pharmacy.courier_enabled)
            .ok_or_else(|| RxError::Validation("Courier integration is not enabled".to_string()))?;
        if order.delivery_address.is_none() {
            return Err(RxError::Validation(format!(
                "Order {} has no delivery address",
                order.order_number
            )));
        }

        let mut delivery = self.open_delivery(order, pharmacy, customer).await?;
        if delivery.status.is_booked() {
            return Err(RxError::Validation(format!(
                "Delivery for order {} is already {}",
                order.order_number, delivery.status
            )));
        }

        match self.price(courier.as_ref(), &mut delivery).await {
            Ok(()) => Ok(delivery),
            Err(RxError::Courier(e)) => {
                warn!(order_number = %order.order_number, error = %e, "courier price quote failed");
                Ok(delivery)
            }
            Err(e) => Err(e),
        }
    }

    /// `calculating → quoted`, or `failed` when the courier cannot price the route.
    async fn price(&self, courier: &dyn CourierClient, delivery: &mut Delivery) -> Result<()> {
        self.advance(delivery, DeliveryStatus::Calculating).await?;
        let (pickup, dropoff) = points(delivery);
        match self.bounded("price quote", courier.calculate_price(&pickup, &dropoff)).await {
            Ok(price) => {
                delivery.estimated_price = Some(price);
                self.advance(delivery, DeliveryStatus::Quoted).await
            }
            Err(e) => {
                self.advance(delivery, DeliveryStatus::Failed).await?;
                Err(e.into())
            }
        }
    }

    /// Applies a courier status report. Returns the delivery when its status changed.
    ///
    /// Unknown deliveries and unrecognized statuses are logged and ignored.
    pub async fn apply_courier_update(&self, update: &CourierUpdate) -> Result<Option<Delivery>> {
        let Some(mut delivery) = self
            .deliveries
            .get_by_provider_order(&update.provider_order_id)
            .await?
        else {
            warn!(provider_order_id = %update.provider_order_id, "courier update for unknown delivery");
            return Ok(None);
        };
        let Some(status) = DeliveryStatus::from_provider(&update.status) else {
            warn!(
                provider_order_id = %update.provider_order_id,
                provider_status = %update.status,
                "unrecognized courier status ignored"
            );
            return Ok(None);
        };
        if delivery.status.is_terminal() {
            info!(
                provider_order_id = %update.provider_order_id,
                current = %delivery.status,
                reported = %status,
                "delivery already settled, update ignored"
            );
            return Ok(None);
        }

        let mut courier_changed = false;
        if update.courier_name.is_some() && update.courier_name != delivery.courier_name {
            delivery.courier_name = update.courier_name.clone();
            courier_changed = true;
        }
        if update.courier_phone.is_some() && update.courier_phone != delivery.courier_phone {
            delivery.courier_phone = update.courier_phone.clone();
            courier_changed = true;
        }

        if status == delivery.status {
            if courier_changed {
                delivery.updated_at = Utc::now();
                self.deliveries.store(delivery).await?;
            }
            return Ok(None);
        }

        match status {
            DeliveryStatus::InTransit if delivery.picked_up_at.is_none() => {
                delivery.picked_up_at = Some(Utc::now());
            }
            DeliveryStatus::Delivered => delivery.delivered_at = Some(Utc::now()),
            _ => {}
        }
        info!(
            provider_order_id = %update.provider_order_id,
            from = %delivery.status,
            to = %status,
            "delivery status changed"
        );
        self.set_status(&mut delivery, status).await?;
        Ok(Some(delivery))
    }

    /// Polls the courier for the current status of a booked delivery.
    pub async fn refresh(&self, order_id: OrderId) -> Result<Option<Delivery>> {
        let courier = self
            .courier
            .as_ref()
            .ok_or_else(|| RxError::Validation("Courier integration is not enabled".to_string()))?;
        let delivery = self
            .deliveries
            .get_by_order(order_id)
            .await?
            .ok_or_else(|| RxError::not_found("delivery", order_id))?;
        let Some(provider_order_id) = delivery.provider_order_id.clone() else {
            return Err(RxError::Validation(
                "Delivery has not been booked with the courier".to_string(),
            ));
        };

        match self.bounded("status lookup", courier.get_order(&provider_order_id)).await {
            Ok(remote) => {
                self.apply_courier_update(&CourierUpdate {
                    provider_order_id,
                    status: remote.status,
                    courier_name: remote.courier_name,
                    courier_phone: remote.courier_phone,
                })
                .await
            }
            Err(e) => {
                warn!(provider_order_id = %provider_order_id, error = %e, "courier status lookup failed");
                Ok(None)
            }
        }
    }

    /// Cancels a delivery locally, and with the provider when it holds a booking.
    ///
    /// The local cancel stands even if the provider refuses.
    pub async fn cancel(&self, order_id: OrderId) -> Result<Delivery> {
        let mut delivery = self
            .deliveries
            .get_by_order(order_id)
            .await?
            .ok_or_else(|| RxError::not_found("delivery", order_id))?;
        if matches!(
            delivery.status,
            DeliveryStatus::Delivered | DeliveryStatus::Cancelled
        ) {
            return Err(RxError::Validation(format!(
                "Delivery is already {}",
                delivery.status
            )));
        }

        if delivery.status.is_provider_cancellable()
            && let (Some(courier), Some(provider_order_id)) =
                (self.courier.as_ref(), delivery.provider_order_id.as_deref())
            && let Err(e) = self
                .bounded("cancellation", courier.cancel_order(provider_order_id))
                .await
        {
            warn!(
                provider_order_id = %provider_order_id,
                error = %e,
                "courier refused cancellation, cancelling locally"
            );
        }

        self.set_status(&mut delivery, DeliveryStatus::Cancelled).await?;
        Ok(delivery)
    }

    pub async fn notify_courier_assigned(
        &self,
        delivery: &Delivery,
        order: &Order,
        pharmacy: &Pharmacy,
        customer: &Customer,
    ) {
        let key = format!("{}:delivery:{}", order.id, DeliveryStatus::CourierAssigned);
        self.notifier
            .send(
                pharmacy,
                &customer.phone,
                courier_assigned_message(order, delivery),
                Some(order.id),
                Some(key),
            )
            .await;
    }

    pub async fn notify_delivered(&self, order: &Order, pharmacy: &Pharmacy, customer: &Customer) {
        let key = format!("{}:delivery:{}", order.id, DeliveryStatus::Delivered);
        self.notifier
            .send(
                pharmacy,
                &customer.phone,
                delivered_message(order, pharmacy),
                Some(order.id),
                Some(key),
            )
            .await;
    }

    /// Existing delivery for the order, or a fresh `pending` one.
    async fn open_delivery(&self, order: &Order, pharmacy: &Pharmacy, customer: &Customer) -> Result<Delivery> {
        if let Some(existing) = self.deliveries.get_by_order(order.id).await? {
            return Ok(existing);
        }
        let now = Utc::now();
        let delivery = Delivery {
            id: DeliveryId::new(),
            order_id: order.id,
            pharmacy_id: pharmacy.id,
            customer_id: customer.id,
            provider_order_id: None,
            provider_order_number: None,
            tracking_url: None,
            status: DeliveryStatus::Pending,
            pickup_address: pharmacy.pickup_address.clone(),
            pickup_phone: pharmacy.phone.clone(),
            pickup_contact: pharmacy.name.clone(),
            delivery_address: order.delivery_address.clone().unwrap_or_default(),
            delivery_phone: customer.phone.clone(),
            delivery_contact: customer.name.clone(),
            estimated_price: None,
            final_price: None,
            courier_name: None,
            courier_phone: None,
            booked_at: None,
            picked_up_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        };
        self.deliveries.store(delivery.clone()).await?;
        Ok(delivery)
    }

    /// A step on the local dispatch path. Courier reports go through `set_status`.
    async fn advance(&self, delivery: &mut Delivery, status: DeliveryStatus) -> Result<()> {
        if !delivery.status.can_dispatch_to(status) {
            return Err(RxError::Validation(format!(
                "Delivery cannot move from {} to {status}",
                delivery.status
            )));
        }
        self.set_status(delivery, status).await
    }

    async fn set_status(&self, delivery: &mut Delivery, status: DeliveryStatus) -> Result<()> {
        delivery.status = status;
        delivery.updated_at = Utc::now();
        self.deliveries.store(delivery.clone()).await
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = std::result::Result<T, CourierError>>,
    ) -> std::result::Result<T, CourierError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CourierError::timeout(operation)),
        }
    }
}

fn points(delivery: &Delivery) -> (CourierPoint, CourierPoint) {
    (
        CourierPoint {
            address: delivery.pickup_address.clone(),
            phone: delivery.pickup_phone.clone(),
            contact: Some(delivery.pickup_contact.clone()),
        },
        CourierPoint {
            address: delivery.delivery_address.clone(),
            phone: delivery.delivery_phone.clone(),
            contact: delivery.delivery_contact.clone(),
        },
    )
}
