//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! Only what a websocket-only client on the default namespace needs: the
//! open handshake, ping/pong, namespace connect/disconnect and events.
//! Binary attachments are not supported.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// A decoded Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// A decoded Socket.IO packet carried inside an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, payload: Value },
    Ack,
    ConnectError(Value),
    Binary,
}

/// Body of the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

/// Framing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("empty frame")]
    Empty,

    #[error("unknown {layer} packet type '{kind}'")]
    UnknownType { layer: &'static str, kind: char },

    #[error("invalid json: {0}")]
    InvalidJson(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),
}

/// Decodes one text frame.
pub fn decode(frame: &str) -> Result<EnginePacket, CodecError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let rest = chars.as_str();

    match kind {
        '0' => serde_json::from_str(rest)
            .map(EnginePacket::Open)
            .map_err(|e| CodecError::InvalidJson(e.to_string())),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping(rest.to_string())),
        '3' => Ok(EnginePacket::Pong(rest.to_string())),
        '4' => decode_socket(rest).map(EnginePacket::Message),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(CodecError::UnknownType {
            layer: "engine",
            kind: other,
        }),
    }
}

fn decode_socket(body: &str) -> Result<SocketPacket, CodecError> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let data = strip_ack_id(strip_namespace(chars.as_str()));

    match kind {
        '0' => {
            if data.is_empty() {
                Ok(SocketPacket::Connect(None))
            } else {
                parse_json(data).map(|v| SocketPacket::Connect(Some(v)))
            }
        }
        '1' => Ok(SocketPacket::Disconnect),
        '2' => decode_event(data),
        '3' => Ok(SocketPacket::Ack),
        '4' => {
            let reason = if data.is_empty() {
                Value::Null
            } else {
                parse_json(data)?
            };
            Ok(SocketPacket::ConnectError(reason))
        }
        '5' | '6' => Ok(SocketPacket::Binary),
        other => Err(CodecError::UnknownType {
            layer: "socket",
            kind: other,
        }),
    }
}

fn decode_event(data: &str) -> Result<SocketPacket, CodecError> {
    let mut args = match parse_json(data)? {
        Value::Array(args) => args.into_iter(),
        other => return Err(CodecError::InvalidEvent(format!("expected array, got {}", other))),
    };
    let name = match args.next() {
        Some(Value::String(name)) => name,
        _ => return Err(CodecError::InvalidEvent("missing event name".to_string())),
    };
    let payload = args.next().unwrap_or(Value::Null);
    Ok(SocketPacket::Event { name, payload })
}

/// Drops a leading `/namespace,` if present.
fn strip_namespace(data: &str) -> &str {
    if data.starts_with('/') {
        match data.find(',') {
            Some(idx) => &data[idx + 1..],
            None => "",
        }
    } else {
        data
    }
}

/// Drops a leading numeric ack id if present.
fn strip_ack_id(data: &str) -> &str {
    data.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn parse_json(data: &str) -> Result<Value, CodecError> {
    serde_json::from_str(data).map_err(|e| CodecError::InvalidJson(e.to_string()))
}

/// Engine.IO pong answering a ping with the same probe data.
pub fn encode_pong(probe: &str) -> String {
    format!("3{}", probe)
}

/// Socket.IO connect to the default namespace.
pub fn encode_connect() -> String {
    "40".to_string()
}

/// Socket.IO disconnect from the default namespace.
pub fn encode_disconnect() -> String {
    "41".to_string()
}

/// Socket.IO event on the default namespace.
pub fn encode_event(name: &str, payload: &Value) -> String {
    let args = Value::Array(vec![Value::String(name.to_string()), payload.clone()]);
    format!("42{}", args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_open_handshake() {
        let packet = decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":5000,"maxPayload":1000000}"#).unwrap();
        match packet {
            EnginePacket::Open(open) => {
                assert_eq!(open.sid, "abc");
                assert_eq!(open.ping_interval, 25_000);
                assert_eq!(open.ping_timeout, 5_000);
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn decodes_ping_and_encodes_pong() {
        assert_eq!(decode("2").unwrap(), EnginePacket::Ping(String::new()));
        assert_eq!(decode("2probe").unwrap(), EnginePacket::Ping("probe".into()));
        assert_eq!(encode_pong("probe"), "3probe");
    }

    #[test]
    fn decodes_namespace_connect_with_sid() {
        assert_eq!(
            decode(r#"40{"sid":"xyz"}"#).unwrap(),
            EnginePacket::Message(SocketPacket::Connect(Some(json!({ "sid": "xyz" }))))
        );
        assert_eq!(decode("40").unwrap(), EnginePacket::Message(SocketPacket::Connect(None)));
    }

    #[test]
    fn decodes_connect_error() {
        assert_eq!(
            decode(r#"44{"message":"Not authorized"}"#).unwrap(),
            EnginePacket::Message(SocketPacket::ConnectError(json!({ "message": "Not authorized" })))
        );
    }

    #[test]
    fn decodes_event_with_payload() {
        let packet = decode(r#"42["new_notification",{"id":1,"type":"MENTION"}]"#).unwrap();
        assert_eq!(
            packet,
            EnginePacket::Message(SocketPacket::Event {
                name: "new_notification".into(),
                payload: json!({ "id": 1, "type": "MENTION" }),
            })
        );
    }

    #[test]
    fn decodes_event_with_namespace_and_ack_id() {
        let packet = decode(r#"42/admin,13["ping"]"#).unwrap();
        assert_eq!(
            packet,
            EnginePacket::Message(SocketPacket::Event {
                name: "ping".into(),
                payload: Value::Null,
            })
        );
    }

    #[test]
    fn rejects_event_without_name() {
        assert!(matches!(decode("42[1,2]"), Err(CodecError::InvalidEvent(_))));
        assert!(matches!(decode(r#"42{"a":1}"#), Err(CodecError::InvalidEvent(_))));
    }

    #[test]
    fn rejects_empty_and_unknown_frames() {
        assert_eq!(decode(""), Err(CodecError::Empty));
        assert!(matches!(decode("9"), Err(CodecError::UnknownType { layer: "engine", .. })));
        assert!(matches!(decode("49"), Err(CodecError::UnknownType { layer: "socket", .. })));
    }

    #[test]
    fn encodes_event_as_json_array() {
        let frame = encode_event("join_user_room", &json!({ "userId": "7" }));
        assert_eq!(frame, r#"42["join_user_room",{"userId":"7"}]"#);
    }

    #[test]
    fn encodes_connect_and_disconnect() {
        assert_eq!(encode_connect(), "40");
        assert_eq!(encode_disconnect(), "41");
    }
}
