//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid API base URL")]
    InvalidApiUrl,

    #[error("Invalid push URL")]
    InvalidPushUrl,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Page size must be between 1 and 100")]
    InvalidPageSize,

    #[error("Reconnect base delay and max attempts must be non-zero")]
    InvalidRetryPolicy,

    #[error("Polling interval must be non-zero")]
    InvalidPollInterval,

    #[error("Identity needs both user_id and access_token")]
    IncompleteIdentity,

    #[error("Invalid user id")]
    InvalidUserId,
}
