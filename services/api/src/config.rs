//! services/api/src/config.rs
//!
//! Everything the service reads from the environment, resolved once at
//! startup. Provider endpoints default to the public/sandbox hosts;
//! credentials have no default and fail fast when absent.

use std::net::SocketAddr;
use tracing::Level;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

fn require(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub paystack_secret_key: String,
    pub paystack_base_url: String,
    pub mpesa_base_url: String,
    pub mpesa_consumer_key: String,
    pub mpesa_consumer_secret: String,
    pub mpesa_shortcode: String,
    pub mpesa_passkey: String,
    pub mpesa_callback_url: String,
    pub reconcile_interval_secs: u64,
}

impl Config {
    /// Reads the full configuration, pulling in `.env` first during local
    /// development. Tests build `Config` directly and never come here.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = require("DATABASE_URL")?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Payment Provider Settings ---
        let paystack_secret_key = require("PAYSTACK_SECRET_KEY")?;
        let paystack_base_url = std::env::var("PAYSTACK_BASE_URL")
            .unwrap_or_else(|_| "https://api.paystack.co".to_string());

        let mpesa_base_url = std::env::var("MPESA_BASE_URL")
            .unwrap_or_else(|_| "https://sandbox.safaricom.co.ke".to_string());
        let mpesa_consumer_key = require("MPESA_CONSUMER_KEY")?;
        let mpesa_consumer_secret = require("MPESA_CONSUMER_SECRET")?;
        let mpesa_shortcode = require("MPESA_SHORTCODE")?;
        let mpesa_passkey = require("MPESA_PASSKEY")?;
        let mpesa_callback_url = require("MPESA_CALLBACK_URL")?;

        // --- Load Background Job Settings ---
        let reconcile_str =
            std::env::var("RECONCILE_INTERVAL_SECS").unwrap_or_else(|_| "300".to_string());
        let reconcile_interval_secs = reconcile_str.parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(
                "RECONCILE_INTERVAL_SECS".to_string(),
                format!("'{}' is not a number of seconds", reconcile_str),
            )
        })?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            paystack_secret_key,
            paystack_base_url,
            mpesa_base_url,
            mpesa_consumer_key,
            mpesa_consumer_secret,
            mpesa_shortcode,
            mpesa_passkey,
            mpesa_callback_url,
            reconcile_interval_secs,
        })
    }
}
