//! Push channel configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Socket.IO push channel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// Server URL (`http(s)://` or `ws(s)://`)
    pub url: String,

    /// Delay before the first reconnect; later retries scale linearly
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Reconnect attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Bound on one connection attempt, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl PushConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Validate push configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("PUSH_URL"));
        }
        let scheme_ok = ["http://", "https://", "ws://", "wss://"]
            .iter()
            .any(|scheme| self.url.starts_with(scheme));
        if !scheme_ok {
            return Err(ValidationError::InvalidPushUrl);
        }
        if self.base_delay_ms == 0 || self.max_attempts == 0 {
            return Err(ValidationError::InvalidRetryPolicy);
        }
        if self.connect_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    20
}
