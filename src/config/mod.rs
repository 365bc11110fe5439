//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `INBOX_SYNC` prefix and nested values use double underscores as separators.
//! A TOML file can sit underneath the environment via [`AppConfig::load_from_file`].
//!
//! # Example
//!
//! ```no_run
//! use inbox_sync::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Polling every {:?}", config.polling.interval());
//! ```

mod api;
mod error;
mod identity;
mod polling;
mod push;
mod sync;
mod telemetry;

pub use api::ApiConfig;
pub use error::{ConfigError, ValidationError};
pub use identity::IdentityConfig;
pub use polling::PollingConfig;
pub use push::PushConfig;
pub use sync::SyncConfig;
pub use telemetry::TelemetryConfig;

use serde::Deserialize;
use std::path::Path;

const ENV_PREFIX: &str = "INBOX_SYNC";

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Notification REST API
    pub api: ApiConfig,

    /// Socket.IO push channel
    pub push: PushConfig,

    /// Polling fallback
    #[serde(default)]
    pub polling: PollingConfig,

    /// Inbox reconciliation
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Signed-in identity for the runner
    #[serde(default)]
    pub identity: IdentityConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `INBOX_SYNC` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `INBOX_SYNC__API__BASE_URL=https://...` -> `api.base_url = ...`
    /// - `INBOX_SYNC__PUSH__MAX_ATTEMPTS=5` -> `push.max_attempts = 5`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Required environment variables are missing
    /// - Values cannot be parsed into expected types
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load a TOML (or other supported format) file, overridden by the
    /// environment.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(true))
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.api.validate()?;
        self.push.validate()?;
        self.polling.validate()?;
        self.identity.validate()?;
        Ok(())
    }

    fn environment() -> config::Environment {
        config::Environment::default()
            .prefix(ENV_PREFIX)
            .separator("__")
    }
}
