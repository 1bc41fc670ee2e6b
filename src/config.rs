use crate::domain::party::Pharmacy;
use crate::error::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Name of the config file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "rxflow.toml";
pub const ENV_PREFIX: &str = "RXFLOW";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Fallback log filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub courier: CourierConfig,
    pub chat: ChatConfig,
    pub pharmacies: Vec<PharmacyConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            courier: CourierConfig::default(),
            chat: ChatConfig::default(),
            pharmacies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CourierMode {
    #[default]
    Disabled,
    /// In-process courier that books everything. For demos and replays.
    Simulated,
    Http,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CourierConfig {
    pub mode: CourierMode,
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            mode: CourierMode::Disabled,
            base_url: None,
            api_token: None,
            timeout_secs: 10,
        }
    }
}

impl CourierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Outbound messages are only logged.
    #[default]
    Log,
    Http,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChatConfig {
    pub mode: ChatMode,
    pub base_url: Option<String>,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            mode: ChatMode::Log,
            base_url: None,
            account_sid: None,
            auth_token: None,
            timeout_secs: 10,
        }
    }
}

impl ChatConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PharmacyConfig {
    pub name: String,
    pub chat_number: String,
    #[serde(default)]
    pub pickup_address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub upi_id: Option<String>,
    #[serde(default)]
    pub courier_enabled: bool,
}

impl PharmacyConfig {
    pub fn to_pharmacy(&self) -> Pharmacy {
        let mut pharmacy = Pharmacy::new(self.name.trim(), self.chat_number.trim());
        pharmacy.pickup_address = self.pickup_address.clone();
        pharmacy.phone = self.phone.clone();
        pharmacy.upi_id = self.upi_id.clone().filter(|id| !id.trim().is_empty());
        pharmacy.courier_enabled = self.courier_enabled;
        pharmacy
    }
}

impl AppConfig {
    /// Loads configuration, later sources overriding earlier ones:
    /// 1. Built-in defaults
    /// 2. `path`, or `rxflow.toml` in the working directory if present
    /// 3. Environment variables such as `RXFLOW__COURIER__MODE=simulated`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => builder = builder.add_source(File::from(path)),
            None => {
                if Path::new(DEFAULT_CONFIG_FILE).exists() {
                    builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Reads `.env` into the process environment when present.
    pub fn load_env_file() {
        if Path::new(".env").exists() {
            match dotenvy::dotenv() {
                Ok(_) => tracing::debug!("loaded environment from .env"),
                Err(e) => tracing::warn!(error = %e, "could not read .env"),
            }
        }
    }
}
