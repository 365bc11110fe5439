//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the inbox to external systems:
//! - `http` - REST client for the notification API
//! - `socketio` - Socket.IO push transport over WebSocket
//! - `memory` - In-memory API and scripted transport for tests

pub mod http;
pub mod memory;
pub mod socketio;

pub use http::{RestApiConfig, RestNotificationApi};
pub use memory::{InMemoryNotificationApi, ScriptedPushTransport};
pub use socketio::{SocketIoConfig, SocketIoTransport};
