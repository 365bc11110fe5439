//! Domain layer containing the inbox model and its reconciliation rules.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, state machines)
//! - `notification` - Notifications, connection lifecycle and the inbox store

pub mod foundation;
pub mod notification;
