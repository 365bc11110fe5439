//! Notification domain module.
//!
//! The notification value, the push connection lifecycle and the inbox store
//! that reconciles pushed and fetched notifications.

mod connection;
mod item;
mod store;

pub use connection::{ConnectionState, ReconnectPolicy};
pub use item::{Notification, NotificationData, NotificationType};
pub use store::{
    InboxSnapshot, MutationId, NotificationStore, PushOutcome, ReadFailurePolicy, ReadMutation,
    ReadTarget,
};
