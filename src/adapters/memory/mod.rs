//! In-memory adapters for tests and local runs.

mod notification_api;
mod push_transport;

pub use notification_api::{ApiCall, ApiCallKind, InMemoryNotificationApi};
pub use push_transport::ScriptedPushTransport;
