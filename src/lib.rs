//! Order lifecycle engine for pharmacies that take orders over chat.
//!
//! Inbound chat messages are classified against the customer's open orders,
//! orders move through a fixed status state machine, and a courier delivery is
//! booked as a side effect of an order becoming ready.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
