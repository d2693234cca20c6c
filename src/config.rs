// src/config.rs
//! Runtime configuration for front ends embedding the keymaster.
//!
//! Values come from built-in defaults, overridden by `KEYMASTER_*`
//! environment variables. A `.env` file in the working directory is loaded
//! first when present.
//!
//! ## Environment Variables
//! - `KEYMASTER_GATEKEEPER_URL`: Base URL of the gatekeeper (default: http://localhost:3000)
//! - `KEYMASTER_WALLET_PATH`: Wallet file location (default: wallet.json)
//! - `KEYMASTER_DEFAULT_REGISTRY`: Registry used when none is given (default: peerbit)
//! - `KEYMASTER_REQUEST_TIMEOUT_SECS`: Per-request ledger timeout (default: 30)

use crate::error::Result;
use config::{Config, Environment};
use dotenv::dotenv;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_GATEKEEPER_URL: &str = "http://localhost:3000";
pub const DEFAULT_WALLET_PATH: &str = "wallet.json";
pub const DEFAULT_REGISTRY: &str = "peerbit";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Keymaster settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub gatekeeper_url: String,
    pub wallet_path: String,
    pub default_registry: String,
    pub request_timeout_secs: u64,
}

impl Settings {
    /// Loads settings from defaults, `.env` and the process environment.
    ///
    /// # Errors
    /// Returns [`crate::Error::Config`] if an override cannot be parsed
    /// (e.g. a non-numeric timeout).
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let settings = Config::builder()
            .set_default("gatekeeper_url", DEFAULT_GATEKEEPER_URL)?
            .set_default("wallet_path", DEFAULT_WALLET_PATH)?
            .set_default("default_registry", DEFAULT_REGISTRY)?
            .set_default("request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS as i64)?
            .add_source(Environment::with_prefix("KEYMASTER"))
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            gatekeeper_url: DEFAULT_GATEKEEPER_URL.to_string(),
            wallet_path: DEFAULT_WALLET_PATH.to_string(),
            default_registry: DEFAULT_REGISTRY.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_overrides_defaults() {
        std::env::remove_var("KEYMASTER_DEFAULT_REGISTRY");
        let settings = Settings::load().unwrap();
        assert_eq!(settings.default_registry, DEFAULT_REGISTRY);

        std::env::set_var("KEYMASTER_DEFAULT_REGISTRY", "hyperswarm");
        let settings = Settings::load().unwrap();
        std::env::remove_var("KEYMASTER_DEFAULT_REGISTRY");

        assert_eq!(settings.default_registry, "hyperswarm");
        assert_eq!(settings.request_timeout(), Duration::from_secs(settings.request_timeout_secs));
    }
}
