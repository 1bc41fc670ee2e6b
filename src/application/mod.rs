//! Application layer: the orchestrators that drive the domain state machines.
//!
//! [`engine::Engine`] is the entry point. It serializes inbound messages per
//! conversation, hands them to the intent resolver, and exposes the dashboard
//! transition API. All status writes go through [`lifecycle::OrderLifecycle`];
//! all delivery status writes go through [`delivery::DeliveryOrchestrator`].

pub mod conversation;
pub mod delivery;
pub mod engine;
pub mod intent;
pub mod lifecycle;
pub mod notifications;
