use crate::domain::order_machine::TransitionError;
use crate::domain::order::OrderStatus;
use crate::domain::ports::{CourierError, TransportError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RxError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Order {order_number} changed concurrently: expected status {expected}, found {found}")]
    Conflict {
        order_number: String,
        expected: OrderStatus,
        found: OrderStatus,
    },
    #[error("Courier error: {0}")]
    Courier(#[from] CourierError),
    #[error("Chat transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl RxError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Errors caused by the caller's request rather than by the engine or a collaborator.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::InvalidTransition(_)
                | Self::NotFound { .. }
                | Self::Conflict { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RxError>;
