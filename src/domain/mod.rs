//! Domain layer: the order and delivery models, their state machines, and the
//! ports the application layer talks to.
//!
//! Nothing in here performs I/O. The state machines and the item extractor are
//! pure functions; persistence and collaborators are reached only through the
//! traits in [`ports`].

pub mod delivery;
pub mod extractor;
pub mod message;
pub mod order;
pub mod order_machine;
pub mod party;
pub mod ports;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

pub(crate) use entity_id;
