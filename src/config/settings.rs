//! Application settings loaded from `config.toml` and the environment.
//!
//! The TOML file holds non-secret tuning (listen address, exchange rate provider).
//! Secrets such as `CRON_SECRET` are never stored in the file; they are read from the
//! environment (optionally populated from `.env` by `dotenvy`) right before use.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
const DEFAULT_RATES_URL: &str = "https://api.exchangerate-api.com/v4/latest/{base}";
const DEFAULT_RATE_TTL_SECS: u64 = 60 * 60;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Exchange rate provider settings
    #[serde(default)]
    pub exchange: ExchangeConfig,
}

/// `[server]` table
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// `[exchange]` table
#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    /// Rate endpoint; `{base}` is replaced with the base currency code
    #[serde(default = "default_rates_url")]
    pub api_url: String,
    /// How long fetched rates stay fresh
    #[serde(default = "default_rate_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            api_url: default_rates_url(),
            cache_ttl_secs: default_rate_ttl_secs(),
        }
    }
}

impl ExchangeConfig {
    /// Cache TTL as a [`Duration`]
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

fn default_rates_url() -> String {
    DEFAULT_RATES_URL.to_string()
}

const fn default_rate_ttl_secs() -> u64 {
    DEFAULT_RATE_TTL_SECS
}

/// Loads settings from a TOML file.
///
/// A missing file is not an error: every setting has a default.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or is not valid TOML.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = match std::fs::read_to_string(path_ref) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("{:?} not found, using default settings", path_ref);
            return Ok(AppConfig::default());
        }
        Err(e) => {
            return Err(Error::Config {
                message: format!("Failed to read config file {path_ref:?}: {e}"),
            });
        }
    };

    parse_config(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {path_ref:?}: {e}"),
    })
}

/// Parses settings from TOML text.
pub fn parse_config(contents: &str) -> std::result::Result<AppConfig, toml::de::Error> {
    toml::from_str(contents)
}

/// Loads settings from the default location (`./config.toml`, or `GOLD_FINGER_CONFIG`).
pub fn load_app_configuration() -> Result<AppConfig> {
    let path = std::env::var("GOLD_FINGER_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    load_config(path)
}

/// Reads the shared secret the cron trigger must present.
///
/// Returns `None` when unset or blank; the trigger then rejects every call.
#[must_use]
pub fn cron_secret_from_env() -> Option<String> {
    std::env::var("CRON_SECRET")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
