//! Delivery record and the delivery sub-lifecycle.

use super::entity_id;
use super::order::OrderId;
use super::party::{CustomerId, PharmacyId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

entity_id!(DeliveryId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Calculating,
    Quoted,
    Booked,
    CourierAssigned,
    InTransit,
    Delivered,
    Cancelled,
    Failed,
}

/// Sequence the engine walks locally before the courier takes over.
pub const DISPATCH_SEQUENCE: [DeliveryStatus; 4] = [
    DeliveryStatus::Pending,
    DeliveryStatus::Calculating,
    DeliveryStatus::Quoted,
    DeliveryStatus::Booked,
];

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Calculating => "calculating",
            DeliveryStatus::Quoted => "quoted",
            DeliveryStatus::Booked => "booked",
            DeliveryStatus::CourierAssigned => "courier_assigned",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Cancelled => "cancelled",
            DeliveryStatus::Failed => "failed",
        }
    }

    /// Maps the courier provider's status vocabulary onto ours.
    ///
    /// Returns `None` for statuses we do not track; callers log and move on.
    pub fn from_provider(status: &str) -> Option<Self> {
        match status.trim().to_ascii_lowercase().as_str() {
            "new" | "available" | "planned" => Some(DeliveryStatus::Booked),
            "active" | "performer_found" | "courier_assigned" => {
                Some(DeliveryStatus::CourierAssigned)
            }
            "performer_on_the_way" | "delivering" | "courier_picked_up" | "picked_up" => {
                Some(DeliveryStatus::InTransit)
            }
            "completed" | "finished" | "delivered" => Some(DeliveryStatus::Delivered),
            "cancelled" | "canceled" => Some(DeliveryStatus::Cancelled),
            "failed" | "delayed_failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }

    /// No further courier updates are applied once a delivery lands here.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered | DeliveryStatus::Cancelled | DeliveryStatus::Failed
        )
    }

    /// The provider holds a live booking for this delivery.
    pub fn is_booked(self) -> bool {
        matches!(
            self,
            DeliveryStatus::Booked | DeliveryStatus::CourierAssigned | DeliveryStatus::InTransit
        )
    }

    /// A provider-side cancel is attempted only from these statuses.
    pub fn is_provider_cancellable(self) -> bool {
        matches!(self, DeliveryStatus::Booked | DeliveryStatus::CourierAssigned)
    }

    /// Step that follows `self` on the local dispatch path, if any.
    pub fn next_dispatch_step(self) -> Option<Self> {
        DISPATCH_SEQUENCE
            .iter()
            .position(|step| *step == self)
            .and_then(|idx| DISPATCH_SEQUENCE.get(idx + 1).copied())
    }

    /// Whether the engine may move a delivery from `self` to `next` on its own.
    ///
    /// Any step may fail. A failed or quoted delivery can go back to
    /// `calculating` for another attempt.
    pub fn can_dispatch_to(self, next: Self) -> bool {
        next == DeliveryStatus::Failed
            || self.next_dispatch_step() == Some(next)
            || (next == DeliveryStatus::Calculating
                && matches!(self, DeliveryStatus::Failed | DeliveryStatus::Quoted))
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: DeliveryId,
    pub order_id: OrderId,
    pub pharmacy_id: PharmacyId,
    pub customer_id: CustomerId,
    pub provider_order_id: Option<String>,
    pub provider_order_number: Option<String>,
    pub tracking_url: Option<String>,
    pub status: DeliveryStatus,
    pub pickup_address: String,
    pub pickup_phone: String,
    pub pickup_contact: String,
    pub delivery_address: String,
    pub delivery_phone: String,
    pub delivery_contact: Option<String>,
    pub estimated_price: Option<Decimal>,
    /// Set once, when the provider accepts the booking.
    pub final_price: Option<Decimal>,
    pub courier_name: Option<String>,
    pub courier_phone: Option<String>,
    pub booked_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_vocabulary() {
        let cases = [
            ("available", DeliveryStatus::Booked),
            ("active", DeliveryStatus::CourierAssigned),
            ("performer_found", DeliveryStatus::CourierAssigned),
            ("performer_on_the_way", DeliveryStatus::InTransit),
            ("delivering", DeliveryStatus::InTransit),
            ("completed", DeliveryStatus::Delivered),
            ("cancelled", DeliveryStatus::Cancelled),
            ("failed", DeliveryStatus::Failed),
            ("  COMPLETED ", DeliveryStatus::Delivered),
        ];
        for (raw, expected) in cases {
            assert_eq!(DeliveryStatus::from_provider(raw), Some(expected), "{raw}");
        }
    }

    #[test]
    fn test_unknown_provider_status_is_ignored() {
        assert_eq!(DeliveryStatus::from_provider("reactivated"), None);
        assert_eq!(DeliveryStatus::from_provider(""), None);
    }

    #[test]
    fn test_dispatch_sequence_is_linear() {
        assert_eq!(
            DeliveryStatus::Pending.next_dispatch_step(),
            Some(DeliveryStatus::Calculating)
        );
        assert_eq!(
            DeliveryStatus::Quoted.next_dispatch_step(),
            Some(DeliveryStatus::Booked)
        );
        assert_eq!(DeliveryStatus::Booked.next_dispatch_step(), None);
        assert_eq!(DeliveryStatus::InTransit.next_dispatch_step(), None);
    }

    #[test]
    fn test_local_dispatch_moves() {
        use DeliveryStatus::*;
        assert!(Pending.can_dispatch_to(Calculating));
        assert!(Calculating.can_dispatch_to(Quoted));
        assert!(Quoted.can_dispatch_to(Booked));
        assert!(Calculating.can_dispatch_to(Failed));
        assert!(Failed.can_dispatch_to(Calculating));
        assert!(Quoted.can_dispatch_to(Calculating));

        assert!(!Calculating.can_dispatch_to(Booked));
        assert!(!Pending.can_dispatch_to(Booked));
        assert!(!Booked.can_dispatch_to(Calculating));
        assert!(!Pending.can_dispatch_to(Delivered));
    }

    #[test]
    fn test_cancellable_statuses() {
        assert!(DeliveryStatus::Booked.is_provider_cancellable());
        assert!(DeliveryStatus::CourierAssigned.is_provider_cancellable());
        assert!(!DeliveryStatus::InTransit.is_provider_cancellable());
        assert!(!DeliveryStatus::Failed.is_provider_cancellable());
    }
}
