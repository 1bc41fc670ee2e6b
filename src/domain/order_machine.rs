//! The order status state machine.
//!
//! [`next_status`] is the whole transition table. It never touches storage and
//! never panics: an event that is not legal for the current status comes back
//! as a [`TransitionError`] and the caller decides what to do with it.

use super::order::{Amount, OrderStatus, PaymentMethod};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderEvent {
    RxRequired,
    RxUploaded,
    StartReview,
    ConfirmAvailability {
        total_amount: Amount,
        payment_method: PaymentMethod,
    },
    ItemsUnavailable {
        reason: String,
    },
    PaymentReceived,
    MarkReady,
    MarkCompleted,
    Cancel {
        reason: String,
    },
}

/// Payload-free name of an [`OrderEvent`], used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    RxRequired,
    RxUploaded,
    StartReview,
    ConfirmAvailability,
    ItemsUnavailable,
    PaymentReceived,
    MarkReady,
    MarkCompleted,
    Cancel,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::RxRequired,
        EventKind::RxUploaded,
        EventKind::StartReview,
        EventKind::ConfirmAvailability,
        EventKind::ItemsUnavailable,
        EventKind::PaymentReceived,
        EventKind::MarkReady,
        EventKind::MarkCompleted,
        EventKind::Cancel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::RxRequired => "RX_REQUIRED",
            EventKind::RxUploaded => "RX_UPLOADED",
            EventKind::StartReview => "START_REVIEW",
            EventKind::ConfirmAvailability => "CONFIRM_AVAILABILITY",
            EventKind::ItemsUnavailable => "ITEMS_UNAVAILABLE",
            EventKind::PaymentReceived => "PAYMENT_RECEIVED",
            EventKind::MarkReady => "MARK_READY",
            EventKind::MarkCompleted => "MARK_COMPLETED",
            EventKind::Cancel => "CANCEL",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl OrderEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            OrderEvent::RxRequired => EventKind::RxRequired,
            OrderEvent::RxUploaded => EventKind::RxUploaded,
            OrderEvent::StartReview => EventKind::StartReview,
            OrderEvent::ConfirmAvailability { .. } => EventKind::ConfirmAvailability,
            OrderEvent::ItemsUnavailable { .. } => EventKind::ItemsUnavailable,
            OrderEvent::PaymentReceived => EventKind::PaymentReceived,
            OrderEvent::MarkReady => EventKind::MarkReady,
            OrderEvent::MarkCompleted => EventKind::MarkCompleted,
            OrderEvent::Cancel { .. } => EventKind::Cancel,
        }
    }

    /// Free-text reason carried by the event, recorded in the status history.
    pub fn reason(&self) -> Option<&str> {
        match self {
            OrderEvent::ItemsUnavailable { reason } | OrderEvent::Cancel { reason } => {
                Some(reason.as_str())
            }
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid transition: cannot apply {event} to an order in status {from}")]
pub struct TransitionError {
    pub from: OrderStatus,
    pub event: EventKind,
}

/// Resolves the status an order moves to when `event` is applied in `current`.
///
/// `CONFIRM_AVAILABILITY` is the one event whose destination depends on its
/// payload: UPI orders wait for payment, cash-on-delivery orders are confirmed
/// straight away.
pub fn next_status(current: OrderStatus, event: &OrderEvent) -> Result<OrderStatus, TransitionError> {
    use OrderStatus::*;

    let next = match (current, event) {
        (Pending, OrderEvent::RxRequired) => Some(AwaitingRx),
        (Pending, OrderEvent::StartReview) => Some(UnderReview),

        (AwaitingRx, OrderEvent::RxUploaded) => Some(RxReceived),

        (RxReceived, OrderEvent::StartReview) => Some(UnderReview),

        (UnderReview, OrderEvent::ConfirmAvailability { payment_method, .. }) => {
            Some(match payment_method {
                PaymentMethod::Upi => AwaitingPayment,
                PaymentMethod::Cod => Confirmed,
            })
        }
        (UnderReview, OrderEvent::ItemsUnavailable { .. }) => Some(Cancelled),
        (UnderReview, OrderEvent::RxRequired) => Some(AwaitingRx),

        (Confirmed, OrderEvent::MarkReady) => Some(ReadyForPickup),

        (AwaitingPayment, OrderEvent::PaymentReceived) => Some(PaymentConfirmed),

        (PaymentConfirmed, OrderEvent::MarkReady) => Some(ReadyForPickup),

        (ReadyForPickup, OrderEvent::MarkCompleted) => Some(Completed),

        (Completed | Cancelled, _) => None,
        (_, OrderEvent::Cancel { .. }) => Some(Cancelled),

        _ => None,
    };

    next.ok_or(TransitionError {
        from: current,
        event: event.kind(),
    })
}

/// Event kinds accepted in `status`, in table order.
pub fn allowed_events(status: OrderStatus) -> Vec<EventKind> {
    EventKind::ALL
        .into_iter()
        .filter(|kind| next_status(status, &sample_event(*kind)).is_ok())
        .collect()
}

fn sample_event(kind: EventKind) -> OrderEvent {
    match kind {
        EventKind::RxRequired => OrderEvent::RxRequired,
        EventKind::RxUploaded => OrderEvent::RxUploaded,
        EventKind::StartReview => OrderEvent::StartReview,
        EventKind::ConfirmAvailability => OrderEvent::ConfirmAvailability {
            total_amount: Amount::ONE,
            payment_method: PaymentMethod::Cod,
        },
        EventKind::ItemsUnavailable => OrderEvent::ItemsUnavailable {
            reason: String::new(),
        },
        EventKind::PaymentReceived => OrderEvent::PaymentReceived,
        EventKind::MarkReady => OrderEvent::MarkReady,
        EventKind::MarkCompleted => OrderEvent::MarkCompleted,
        EventKind::Cancel => OrderEvent::Cancel {
            reason: String::new(),
        },
    }
}
