//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, error types and the state machine
//! trait that form the vocabulary of the inbox domain.

mod auth;
mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use auth::Identity;
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{NotificationId, SyncSessionId, UserId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
