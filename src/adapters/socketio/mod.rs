//! Socket.IO adapter - the production push transport.

pub mod codec;
mod transport;

pub use transport::{SocketIoChannel, SocketIoConfig, SocketIoTransport};
