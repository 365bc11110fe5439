//! Push Transport Port - Interface for the persistent push channel.
//!
//! A transport opens one channel per identity. The channel carries named
//! events with JSON payloads in both directions; the connection manager
//! owns the lifecycle and decides when to retry.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::foundation::Identity;

/// Event name the server uses for a new notification.
pub const NEW_NOTIFICATION_EVENT: &str = "new_notification";

/// Event name that scopes pushes to the current user.
pub const JOIN_USER_ROOM_EVENT: &str = "join_user_room";

/// Event name that leaves the user scope.
pub const LEAVE_USER_ROOM_EVENT: &str = "leave_user_room";

/// Port for opening push channels.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open a channel for the given identity.
    ///
    /// Resolves once the channel is ready to carry events.
    async fn open(&self, identity: &Identity) -> Result<Box<dyn PushChannel>, TransportError>;
}

/// An open push channel.
#[async_trait]
pub trait PushChannel: Send {
    /// Send an event to the server.
    async fn emit(&mut self, event: OutboundEvent) -> Result<(), TransportError>;

    /// Wait for the next server event.
    ///
    /// Keep-alive traffic is handled internally. Returns
    /// `TransportError::Closed` when the server or network ends the channel.
    async fn next_event(&mut self) -> Result<InboundEvent, TransportError>;

    /// Close the channel. Safe to call more than once.
    async fn close(&mut self);
}

/// Event received from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub name: String,
    pub payload: Value,
}

impl InboundEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Event sent to the server.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEvent {
    pub name: String,
    pub payload: Value,
}

impl OutboundEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Errors from the push transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Network-level failure while connecting.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Connection attempt exceeded the timeout.
    #[error("connect timed out after {timeout_secs}s")]
    Timeout {
        /// Configured timeout.
        timeout_secs: u64,
    },

    /// Server refused the connection handshake.
    #[error("connection rejected: {0}")]
    Rejected(String),

    /// Unexpected frame or payload on the wire.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The channel ended.
    #[error("connection closed: {0}")]
    Closed(String),

    /// Could not send an event.
    #[error("send failed: {0}")]
    Send(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_transport_object_safe(_: &dyn PushTransport) {}

    #[allow(dead_code)]
    fn assert_channel_object_safe(_: &dyn PushChannel) {}

    #[allow(dead_code)]
    fn assert_send<T: Send>() {}

    #[test]
    fn boxed_channel_is_send() {
        assert_send::<Box<dyn PushChannel>>();
    }

    #[test]
    fn transport_error_messages() {
        assert_eq!(
            TransportError::Timeout { timeout_secs: 20 }.to_string(),
            "connect timed out after 20s"
        );
        assert_eq!(
            TransportError::Closed("transport close".into()).to_string(),
            "connection closed: transport close"
        );
    }
}
