//! Socket.IO push transport over a plain WebSocket.
//!
//! # Configuration
//!
//! ```ignore
//! let transport = SocketIoTransport::new(SocketIoConfig::new("http://localhost:5000"));
//! let channel = transport.open(&identity).await?;
//! ```
//!
//! The websocket transport is used directly (no long-polling upgrade).
//! `open` is unbounded; the connection manager puts the attempt timeout
//! around it.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::codec::{self, EnginePacket, SocketPacket};
use crate::domain::foundation::Identity;
use crate::ports::{InboundEvent, OutboundEvent, PushChannel, PushTransport, TransportError};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for the Socket.IO transport.
#[derive(Debug, Clone)]
pub struct SocketIoConfig {
    /// Server origin, e.g. `http://localhost:5000`.
    pub url: String,
    /// Engine.IO path.
    pub path: String,
}

impl SocketIoConfig {
    /// Creates a configuration for the given server origin.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            path: "/socket.io/".to_string(),
        }
    }

    /// Sets the Engine.IO path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// WebSocket endpoint for this configuration.
    pub fn websocket_url(&self) -> Result<String, TransportError> {
        let origin = if let Some(rest) = self.url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else if self.url.starts_with("ws://") || self.url.starts_with("wss://") {
            self.url.clone()
        } else {
            return Err(TransportError::Connect(format!(
                "unsupported push url scheme: {}",
                self.url
            )));
        };

        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        Ok(format!("{}{}?EIO=4&transport=websocket", origin, path))
    }
}

/// PushTransport speaking Socket.IO v4 over WebSocket.
pub struct SocketIoTransport {
    config: SocketIoConfig,
}

impl SocketIoTransport {
    pub fn new(config: SocketIoConfig) -> Self {
        Self { config }
    }

    async fn handshake(&self, url: &str) -> Result<SocketIoChannel, TransportError> {
        let (mut socket, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let open = match read_packet(&mut socket).await? {
            EnginePacket::Open(open) => open,
            other => {
                return Err(TransportError::Protocol(format!(
                    "expected open packet, got {:?}",
                    other
                )))
            }
        };
        tracing::debug!(sid = %open.sid, ping_interval = open.ping_interval, "Engine.IO session opened");

        send_text(&mut socket, codec::encode_connect()).await?;

        loop {
            match read_packet(&mut socket).await? {
                EnginePacket::Message(SocketPacket::Connect(_)) => break,
                EnginePacket::Message(SocketPacket::ConnectError(reason)) => {
                    return Err(TransportError::Rejected(reason.to_string()))
                }
                EnginePacket::Ping(probe) => send_text(&mut socket, codec::encode_pong(&probe)).await?,
                EnginePacket::Close => {
                    return Err(TransportError::Closed("server closed during handshake".to_string()))
                }
                _ => {}
            }
        }

        Ok(SocketIoChannel {
            socket,
            liveness: Duration::from_millis(open.ping_interval + open.ping_timeout),
            closed: false,
        })
    }
}

#[async_trait]
impl PushTransport for SocketIoTransport {
    async fn open(&self, identity: &Identity) -> Result<Box<dyn PushChannel>, TransportError> {
        let url = self.config.websocket_url()?;
        tracing::debug!(url = %url, user_id = %identity.user_id, "Opening push channel");

        let channel = self.handshake(&url).await?;
        Ok(Box::new(channel))
    }
}

/// An open Socket.IO session.
pub struct SocketIoChannel {
    socket: Socket,
    /// Silence longer than this means the server is gone.
    liveness: Duration,
    closed: bool,
}

#[async_trait]
impl PushChannel for SocketIoChannel {
    async fn emit(&mut self, event: OutboundEvent) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Send("channel closed".to_string()));
        }
        send_text(&mut self.socket, codec::encode_event(&event.name, &event.payload)).await
    }

    async fn next_event(&mut self) -> Result<InboundEvent, TransportError> {
        if self.closed {
            return Err(TransportError::Closed("channel closed".to_string()));
        }
        loop {
            let packet = match tokio::time::timeout(self.liveness, read_packet(&mut self.socket)).await {
                Err(_) => return Err(TransportError::Closed("ping timeout".to_string())),
                Ok(Err(TransportError::Protocol(reason))) => {
                    tracing::warn!(reason = %reason, "Skipping undecodable push frame");
                    continue;
                }
                Ok(result) => result?,
            };

            match packet {
                EnginePacket::Ping(probe) => {
                    send_text(&mut self.socket, codec::encode_pong(&probe)).await?;
                }
                EnginePacket::Message(SocketPacket::Event { name, payload }) => {
                    return Ok(InboundEvent::new(name, payload));
                }
                EnginePacket::Message(SocketPacket::Disconnect) => {
                    return Err(TransportError::Closed("io server disconnect".to_string()));
                }
                EnginePacket::Message(SocketPacket::ConnectError(reason)) => {
                    return Err(TransportError::Rejected(reason.to_string()));
                }
                EnginePacket::Close => {
                    return Err(TransportError::Closed("transport close".to_string()));
                }
                _ => {}
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = send_text(&mut self.socket, codec::encode_disconnect()).await;
        let _ = self.socket.close(None).await;
    }
}

async fn send_text(socket: &mut Socket, frame: String) -> Result<(), TransportError> {
    socket
        .send(Message::text(frame))
        .await
        .map_err(|e| TransportError::Send(e.to_string()))
}

/// Reads frames until one decodes to an Engine.IO packet.
///
/// Undecodable text frames surface as `TransportError::Protocol`.
async fn read_packet(socket: &mut Socket) -> Result<EnginePacket, TransportError> {
    loop {
        match socket.next().await {
            None => return Err(TransportError::Closed("stream ended".to_string())),
            Some(Err(e)) => return Err(TransportError::Closed(e.to_string())),
            Some(Ok(Message::Text(text))) => {
                return codec::decode(text.as_str())
                    .map_err(|e| TransportError::Protocol(e.to_string()))
            }
            Some(Ok(Message::Close(_))) => {
                return Err(TransportError::Closed("websocket closed".to_string()))
            }
            Some(Ok(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_url_maps_http_schemes() {
        let http = SocketIoConfig::new("http://localhost:5000/");
        assert_eq!(
            http.websocket_url().unwrap(),
            "ws://localhost:5000/socket.io/?EIO=4&transport=websocket"
        );

        let https = SocketIoConfig::new("https://example.com");
        assert_eq!(
            https.websocket_url().unwrap(),
            "wss://example.com/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn websocket_url_accepts_custom_path() {
        let config = SocketIoConfig::new("ws://host").with_path("rt/");
        assert_eq!(
            config.websocket_url().unwrap(),
            "ws://host/rt/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn websocket_url_rejects_unknown_scheme() {
        assert!(SocketIoConfig::new("ftp://host").websocket_url().is_err());
    }

    #[tokio::test]
    async fn open_against_closed_port_fails_without_panicking() {
        let transport = SocketIoTransport::new(SocketIoConfig::new("http://127.0.0.1:9"));
        let identity = Identity::new(crate::domain::foundation::UserId::new("1").unwrap(), "t");
        let opened = tokio::time::timeout(Duration::from_secs(5), transport.open(&identity)).await;
        assert!(matches!(opened, Ok(Err(_))));
    }
}
