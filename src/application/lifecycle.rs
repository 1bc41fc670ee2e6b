use super::delivery::{CourierUpdate, DeliveryOrchestrator};
use super::notifications::{NotificationDispatcher, ReadyOutcome, StatusContext};
use crate::domain::delivery::{Delivery, DeliveryStatus};
use crate::domain::extractor::Extraction;
use crate::domain::message::{Prescription, PrescriptionId};
use crate::domain::order::{
    Amount, Order, OrderId, OrderNumber, OrderStatus, PaymentMethod, StatusChange,
};
use crate::domain::order_machine::{EventKind, OrderEvent, TransitionError, next_status};
use crate::domain::party::{Customer, Pharmacy};
use crate::domain::ports::Repositories;
use crate::error::{Result, RxError};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

const ORDER_NUMBER_ATTEMPTS: usize = 16;
const DETAIL_UPDATE_ATTEMPTS: usize = 3;

/// A dashboard request to move an order to `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRequest {
    pub target: OrderStatus,
    pub total_amount: Option<Amount>,
    pub payment_method: Option<PaymentMethod>,
    pub reason: Option<String>,
    /// Suppresses the status message. Courier dispatch news is sent regardless.
    pub notify: bool,
    pub actor: Option<String>,
    /// With target `cancelled`, records the pharmacist's verdict that the items
    /// cannot be supplied (ITEMS_UNAVAILABLE) rather than a plain cancel.
    pub items_unavailable: bool,
    /// Status the caller last saw. The request is rejected if the order has moved on.
    pub expected_status: Option<OrderStatus>,
}

impl TransitionRequest {
    pub fn to(target: OrderStatus) -> Self {
        Self {
            target,
            total_amount: None,
            payment_method: None,
            reason: None,
            notify: true,
            actor: None,
            items_unavailable: false,
            expected_status: None,
        }
    }

    /// Derives the event that should carry an order in `current` to `self.target`.
    pub fn event(&self, current: OrderStatus) -> Result<OrderEvent> {
        if self.items_unavailable && self.target != OrderStatus::Cancelled {
            return Err(RxError::Validation(
                "Items can only be marked unavailable when cancelling".to_string(),
            ));
        }
        let event = match self.target {
            OrderStatus::Pending => {
                return Err(RxError::Validation(
                    "Orders cannot be moved back to pending".to_string(),
                ));
            }
            OrderStatus::AwaitingRx => OrderEvent::RxRequired,
            OrderStatus::RxReceived => OrderEvent::RxUploaded,
            OrderStatus::UnderReview => OrderEvent::StartReview,
            OrderStatus::Confirmed | OrderStatus::AwaitingPayment => {
                let total_amount = self.total_amount.ok_or_else(|| {
                    RxError::Validation("A total amount is required to confirm an order".to_string())
                })?;
                let payment_method = self.payment_method.ok_or_else(|| {
                    RxError::Validation(
                        "A payment method is required to confirm an order".to_string(),
                    )
                })?;
                OrderEvent::ConfirmAvailability {
                    total_amount,
                    payment_method,
                }
            }
            OrderStatus::PaymentConfirmed => OrderEvent::PaymentReceived,
            OrderStatus::ReadyForPickup => OrderEvent::MarkReady,
            OrderStatus::Completed => OrderEvent::MarkCompleted,
            OrderStatus::Cancelled if self.items_unavailable => OrderEvent::ItemsUnavailable {
                reason: self
                    .reason
                    .clone()
                    .unwrap_or_else(|| "Items are not available".to_string()),
            },
            OrderStatus::Cancelled => OrderEvent::Cancel {
                reason: self
                    .reason
                    .clone()
                    .unwrap_or_else(|| "Cancelled by the pharmacy".to_string()),
            },
        };

        // CONFIRM_AVAILABILITY lands on confirmed or awaiting_payment depending
        // on the payment method; a target that disagrees is not a legal move.
        let next = next_status(current, &event)?;
        if next != self.target {
            return Err(TransitionError {
                from: current,
                event: event.kind(),
            }
            .into());
        }
        Ok(event)
    }
}

/// Owns every write to `Order::status`.
///
/// Transitions are validated against the state machine and written with an
/// optimistic status check, then the side effects run: delivery dispatch when
/// an order becomes ready, and customer notifications. Side effects never undo
/// a committed transition.
pub struct OrderLifecycle {
    repos: Repositories,
    delivery: Arc<DeliveryOrchestrator>,
    notifier: Arc<NotificationDispatcher>,
}

impl OrderLifecycle {
    pub fn new(
        repos: Repositories,
        delivery: Arc<DeliveryOrchestrator>,
        notifier: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            repos,
            delivery,
            notifier,
        }
    }

    pub async fn order(&self, order_id: OrderId) -> Result<Order> {
        self.repos
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| RxError::not_found("order", order_id))
    }

    pub async fn order_by_number(&self, number: &OrderNumber) -> Result<Order> {
        self.repos
            .orders
            .find_by_number(number)
            .await?
            .ok_or_else(|| RxError::not_found("order", number))
    }

    pub async fn history(&self, order_id: OrderId) -> Result<Vec<StatusChange>> {
        self.repos.history.list(order_id).await
    }

    pub async fn delivery(&self, order_id: OrderId) -> Result<Option<Delivery>> {
        self.delivery.delivery_for(order_id).await
    }

    /// Inserts a new `pending` order with a fresh, unused order number.
    pub async fn create_order(
        &self,
        pharmacy: &Pharmacy,
        customer: &Customer,
        raw_text: &str,
        extraction: Extraction,
    ) -> Result<Order> {
        let mut number = None;
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let candidate = OrderNumber::generate();
            if self.repos.orders.find_by_number(&candidate).await?.is_none() {
                number = Some(candidate);
                break;
            }
        }
        let number = number.ok_or_else(|| {
            RxError::Internal("could not allocate an unused order number".into())
        })?;

        let order = Order::new(
            number,
            pharmacy.id,
            customer.id,
            raw_text,
            extraction.items,
            extraction.requires_rx,
        );
        self.repos.orders.insert(order.clone()).await?;
        self.repos
            .history
            .append(StatusChange {
                order_id: order.id,
                from: None,
                to: OrderStatus::Pending,
                actor: None,
                reason: None,
                at: order.created_at,
            })
            .await?;
        info!(
            order_number = %order.order_number,
            requires_rx = order.requires_rx,
            "order created"
        );
        Ok(order)
    }

    /// The dashboard entry point: move an order to a target status.
    pub async fn transition(&self, order_id: OrderId, request: TransitionRequest) -> Result<Order> {
        let order = self.order(order_id).await?;
        if let Some(expected) = request.expected_status
            && expected != order.status
        {
            return Err(RxError::Conflict {
                order_number: order.order_number.to_string(),
                expected,
                found: order.status,
            });
        }
        let event = request.event(order.status).inspect_err(|e| {
            warn!(order_number = %order.order_number, error = %e, "transition rejected");
        })?;
        self.apply(order, event, request.actor, request.notify).await
    }

    async fn apply(
        &self,
        mut order: Order,
        event: OrderEvent,
        actor: Option<String>,
        notify: bool,
    ) -> Result<Order> {
        let current = order.status;
        let next = next_status(current, &event).inspect_err(|e| {
            warn!(order_number = %order.order_number, error = %e, "transition rejected");
        })?;

        order.status = next;
        order.updated_at = Utc::now();
        if let OrderEvent::ConfirmAvailability {
            total_amount,
            payment_method,
        } = &event
        {
            order.total_amount = Some(*total_amount);
            order.payment_method = Some(*payment_method);
        }
        let reason = event.reason().map(str::to_string);
        if let Some(reason) = &reason {
            order.add_note(&format!("{}: {reason}", event.kind()));
        }

        self.write(&order, current).await?;
        self.repos
            .history
            .append(StatusChange {
                order_id: order.id,
                from: Some(current),
                to: next,
                actor: actor.clone(),
                reason: reason.clone(),
                at: order.updated_at,
            })
            .await?;
        info!(
            order_number = %order.order_number,
            from = %current,
            to = %next,
            event = %event.kind(),
            actor = actor.as_deref().unwrap_or("chat"),
            "order transitioned"
        );

        if let Err(e) = self.after_transition(&order, reason.as_deref(), notify).await {
            error!(
                order_number = %order.order_number,
                error = %e,
                "transition side effects failed"
            );
        }
        Ok(order)
    }

    async fn after_transition(&self, order: &Order, reason: Option<&str>, notify: bool) -> Result<()> {
        let (pharmacy, customer) = self.parties(order).await?;

        let ready = match order.status {
            OrderStatus::ReadyForPickup => {
                Some(self.delivery.dispatch(order, &pharmacy, &customer).await)
            }
            OrderStatus::Cancelled => {
                self.release_delivery(order).await;
                None
            }
            _ => None,
        };

        // The customer always hears about a courier, even on a silent transition.
        let courier_news = matches!(
            ready,
            Some(ReadyOutcome::Tracking { .. } | ReadyOutcome::DeliveryPending)
        );
        if notify || courier_news {
            let ordinal = self.repos.history.list(order.id).await?.len();
            let key_base = format!("{}:{ordinal}:{}", order.id, order.status);
            let ctx = StatusContext {
                order,
                pharmacy: &pharmacy,
                reason,
                ready: ready.as_ref(),
            };
            self.notifier
                .notify_status(&customer.phone, order.status, &ctx, &key_base)
                .await;
        }
        Ok(())
    }

    /// Calls off the courier for a cancelled order, unless the parcel is already moving.
    async fn release_delivery(&self, order: &Order) {
        let delivery = match self.delivery.delivery_for(order.id).await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => return,
            Err(e) => {
                warn!(order_number = %order.order_number, error = %e, "delivery lookup failed");
                return;
            }
        };
        if delivery.status.is_terminal() || delivery.status == DeliveryStatus::InTransit {
            return;
        }
        match self.delivery.cancel(order.id).await {
            Ok(_) => info!(order_number = %order.order_number, "delivery cancelled with the order"),
            Err(e) => warn!(
                order_number = %order.order_number,
                error = %e,
                "could not cancel delivery for cancelled order"
            ),
        }
    }

    /// Marks an order completed after its delivery arrived.
    ///
    /// Bypasses the table because the courier is the authority on arrival;
    /// orders that already ended are left alone. Returns `None` when nothing changed.
    pub async fn complete_delivered(&self, order_id: OrderId) -> Result<Option<Order>> {
        let mut order = self.order(order_id).await?;
        let current = order.status;
        if current.is_terminal() {
            return Ok(None);
        }
        order.status = OrderStatus::Completed;
        order.updated_at = Utc::now();
        self.write(&order, current).await?;
        self.repos
            .history
            .append(StatusChange {
                order_id: order.id,
                from: Some(current),
                to: OrderStatus::Completed,
                actor: None,
                reason: Some("Delivered by courier".to_string()),
                at: order.updated_at,
            })
            .await?;
        info!(order_number = %order.order_number, from = %current, "order completed on delivery");
        Ok(Some(order))
    }

    /// Stores the delivery address for an order. An address, once set, stays.
    pub async fn set_delivery_address(&self, order_id: OrderId, address: &str) -> Result<Order> {
        let address = address.trim().to_string();
        if address.is_empty() {
            return Err(RxError::Validation("Delivery address is empty".to_string()));
        }
        self.update_details(order_id, |order| {
            if order.delivery_address.is_some() {
                return Err(RxError::Validation(format!(
                    "Order {} already has a delivery address",
                    order.order_number
                )));
            }
            if order.status.is_terminal() {
                return Err(RxError::Validation(format!(
                    "Order {} is already {}",
                    order.order_number, order.status
                )));
            }
            order.delivery_address = Some(address.clone());
            Ok(())
        })
        .await
    }

    /// Records a prescription photo and moves the order out of `awaiting_rx`.
    pub async fn attach_prescription(
        &self,
        order_id: OrderId,
        customer: &Customer,
        media_url: &str,
        media_type: Option<String>,
    ) -> Result<Order> {
        let order = self.order(order_id).await?;
        if order.status != OrderStatus::AwaitingRx {
            return Err(TransitionError {
                from: order.status,
                event: EventKind::RxUploaded,
            }
            .into());
        }
        self.repos
            .prescriptions
            .store(Prescription::new(order.id, customer.id, media_url, media_type))
            .await?;
        self.apply(order, OrderEvent::RxUploaded, None, false).await
    }

    pub async fn prescriptions(&self, order_id: OrderId) -> Result<Vec<Prescription>> {
        self.repos.prescriptions.list_for_order(order_id).await
    }

    /// Pharmacist verdict on a prescription. A valid one marks the order verified.
    pub async fn verify_prescription(
        &self,
        prescription_id: PrescriptionId,
        valid: bool,
        verifier: &str,
    ) -> Result<Prescription> {
        let mut prescription = self
            .repos
            .prescriptions
            .get(prescription_id)
            .await?
            .ok_or_else(|| RxError::not_found("prescription", prescription_id))?;
        prescription.is_valid = Some(valid);
        prescription.verified_by = Some(verifier.to_string());
        prescription.verified_at = Some(Utc::now());
        self.repos.prescriptions.store(prescription.clone()).await?;

        if valid {
            self.update_details(prescription.order_id, |order| {
                order.rx_verified = true;
                Ok(())
            })
            .await?;
        }
        info!(prescription_id = %prescription.id, valid, verifier, "prescription reviewed");
        Ok(prescription)
    }

    /// Applies a courier status report and its consequences for the order.
    pub async fn handle_courier_update(&self, update: &CourierUpdate) -> Result<Option<Delivery>> {
        let changed = self.delivery.apply_courier_update(update).await?;
        if let Some(delivery) = &changed {
            self.after_delivery_change(delivery).await?;
        }
        Ok(changed)
    }

    /// Polls the courier and applies whatever it reports.
    pub async fn refresh_delivery(&self, order_id: OrderId) -> Result<Option<Delivery>> {
        let changed = self.delivery.refresh(order_id).await?;
        if let Some(delivery) = &changed {
            self.after_delivery_change(delivery).await?;
        }
        Ok(changed)
    }

    pub async fn quote_delivery(&self, order_id: OrderId) -> Result<Delivery> {
        let order = self.order(order_id).await?;
        let (pharmacy, customer) = self.parties(&order).await?;
        self.delivery.quote(&order, &pharmacy, &customer).await
    }

    pub async fn cancel_delivery(&self, order_id: OrderId) -> Result<Delivery> {
        self.delivery.cancel(order_id).await
    }

    async fn after_delivery_change(&self, delivery: &Delivery) -> Result<()> {
        let order = self.order(delivery.order_id).await?;
        let (pharmacy, customer) = self.parties(&order).await?;
        match delivery.status {
            DeliveryStatus::CourierAssigned => {
                self.delivery
                    .notify_courier_assigned(delivery, &order, &pharmacy, &customer)
                    .await;
            }
            DeliveryStatus::Delivered => {
                let order = self.complete_delivered(order.id).await?.unwrap_or(order);
                if order.status != OrderStatus::Completed {
                    warn!(
                        order_number = %order.order_number,
                        status = %order.status,
                        "courier delivered an order that already ended"
                    );
                    return Ok(());
                }
                self.delivery
                    .notify_delivered(&order, &pharmacy, &customer)
                    .await;
            }
            _ => {}
        }
        Ok(())
    }

    /// Read-modify-write of non-status fields, retried if a transition slips in between.
    async fn update_details<F>(&self, order_id: OrderId, mut change: F) -> Result<Order>
    where
        F: FnMut(&mut Order) -> Result<()>,
    {
        for _ in 0..DETAIL_UPDATE_ATTEMPTS {
            let mut order = self.order(order_id).await?;
            let status = order.status;
            change(&mut order)?;
            order.updated_at = Utc::now();
            if self.repos.orders.update_if_status(order.clone(), status).await? {
                return Ok(order);
            }
        }
        let order = self.order(order_id).await?;
        Err(RxError::Conflict {
            order_number: order.order_number.to_string(),
            expected: order.status,
            found: order.status,
        })
    }

    async fn write(&self, order: &Order, expected: OrderStatus) -> Result<()> {
        if self
            .repos
            .orders
            .update_if_status(order.clone(), expected)
            .await?
        {
            return Ok(());
        }
        let found = self.order(order.id).await?.status;
        warn!(
            order_number = %order.order_number,
            expected = %expected,
            found = %found,
            "order changed concurrently"
        );
        Err(RxError::Conflict {
            order_number: order.order_number.to_string(),
            expected,
            found,
        })
    }

    async fn parties(&self, order: &Order) -> Result<(Pharmacy, Customer)> {
        let pharmacy = self
            .repos
            .pharmacies
            .get(order.pharmacy_id)
            .await?
            .ok_or_else(|| RxError::not_found("pharmacy", order.pharmacy_id))?;
        let customer = self
            .repos
            .customers
            .get(order.customer_id)
            .await?
            .ok_or_else(|| RxError::not_found("customer", order.customer_id))?;
        Ok((pharmacy, customer))
    }
}
