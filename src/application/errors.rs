//! Errors raised while synchronising the inbox.
//!
//! None of these reach a surface. They are logged and returned to callers
//! that want to observe them (tests, the binary).

use thiserror::Error;

use crate::ports::{ApiError, TransportError};

/// Failure categories of the sync subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Push channel could not be opened or was lost.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A refresh or pagination call failed; last-known state kept.
    #[error("fetch failed: {0}")]
    Fetch(#[source] ApiError),

    /// A mark-read call failed; handled per the read failure policy.
    #[error("mutation failed: {0}")]
    Mutation(#[source] ApiError),

    /// The REST client could not be built for an identity.
    #[error("client setup failed: {0}")]
    Setup(#[source] ApiError),

    /// The session was torn down before the result arrived.
    #[error("session closed")]
    SessionClosed,
}

impl SyncError {
    /// Short label for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            SyncError::Transport(_) => "transport",
            SyncError::Fetch(_) => "fetch",
            SyncError::Mutation(_) => "mutation",
            SyncError::Setup(_) => "setup",
            SyncError::SessionClosed => "session_closed",
        }
    }
}
