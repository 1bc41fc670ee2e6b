//! Port implementations: storage backends and external collaborators.

pub mod chat_http;
pub mod courier_http;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod simulated;

use crate::config::{ChatConfig, ChatMode, CourierConfig, CourierMode};
use crate::domain::ports::{ChatTransport, CourierClient};
use crate::error::{Result, RxError};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Flat fee the simulated courier quotes for every delivery.
pub const SIMULATED_COURIER_FEE: i64 = 49;

/// Builds the configured courier client; `None` when courier integration is off.
pub fn courier_client(config: &CourierConfig) -> Result<Option<Arc<dyn CourierClient>>> {
    match config.mode {
        CourierMode::Disabled => Ok(None),
        CourierMode::Simulated => Ok(Some(Arc::new(simulated::SimulatedCourier::new(
            Decimal::from(SIMULATED_COURIER_FEE),
        )))),
        CourierMode::Http => {
            let base_url = required(&config.base_url, "courier.base_url")?;
            let api_token = required(&config.api_token, "courier.api_token")?;
            Ok(Some(Arc::new(courier_http::HttpCourierClient::new(
                base_url,
                api_token,
                config.timeout(),
            )?)))
        }
    }
}

pub fn chat_transport(config: &ChatConfig) -> Result<Arc<dyn ChatTransport>> {
    match config.mode {
        ChatMode::Log => Ok(Arc::new(simulated::LogTransport)),
        ChatMode::Http => {
            let base_url = required(&config.base_url, "chat.base_url")?;
            let account_sid = required(&config.account_sid, "chat.account_sid")?;
            let auth_token = required(&config.auth_token, "chat.auth_token")?;
            Ok(Arc::new(chat_http::HttpChatTransport::new(
                base_url,
                account_sid,
                auth_token,
                config.timeout(),
            )?))
        }
    }
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RxError::Validation(format!("{key} must be set in http mode")))
}
