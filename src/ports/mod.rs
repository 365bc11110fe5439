//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the inbox and the outside world. Adapters implement these ports.
//!
//! ## Server Ports
//!
//! - `NotificationApi` - REST calls for listing, counting and marking read
//! - `PushTransport` / `PushChannel` - The persistent push channel
//!
//! ## Delivery Ports
//!
//! - `NotificationHandler` - Consumer of pushed notifications

mod notification_api;
mod notification_handler;
mod push_transport;

pub use notification_api::{ApiError, NotificationApi, NotificationPage, PageRequest};
pub use notification_handler::NotificationHandler;
pub use push_transport::{
    InboundEvent, OutboundEvent, PushChannel, PushTransport, TransportError,
    JOIN_USER_ROOM_EVENT, LEAVE_USER_ROOM_EVENT, NEW_NOTIFICATION_EVENT,
};
