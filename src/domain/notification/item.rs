//! The notification value as seen by the client, on both delivery paths.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use crate::domain::foundation::{NotificationId, Timestamp, UserId};

/// Kind of notification.
///
/// Only affects rendering; reconciliation never looks at it. Anything the
/// server sends that is not one of the known kinds becomes `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NotificationType {
    CommentReply,
    PostReaction,
    Mention,
    ExpertResponse,
    #[default]
    Unknown,
}

impl NotificationType {
    /// Every kind, in declaration order.
    pub const ALL: [NotificationType; 5] = [
        NotificationType::CommentReply,
        NotificationType::PostReaction,
        NotificationType::Mention,
        NotificationType::ExpertResponse,
        NotificationType::Unknown,
    ];

    /// Parses the wire name; unrecognised names map to `Unknown`.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "COMMENT_REPLY" => NotificationType::CommentReply,
            "POST_REACTION" => NotificationType::PostReaction,
            "MENTION" => NotificationType::Mention,
            "EXPERT_RESPONSE" => NotificationType::ExpertResponse,
            _ => NotificationType::Unknown,
        }
    }

    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::CommentReply => "COMMENT_REPLY",
            NotificationType::PostReaction => "POST_REACTION",
            NotificationType::Mention => "MENTION",
            NotificationType::ExpertResponse => "EXPERT_RESPONSE",
            NotificationType::Unknown => "UNKNOWN",
        }
    }

    /// Glyph shown next to the notification.
    pub fn icon(&self) -> &'static str {
        match self {
            NotificationType::CommentReply => "💬",
            NotificationType::PostReaction => "👍",
            NotificationType::Mention => "@",
            NotificationType::ExpertResponse => "⭐",
            NotificationType::Unknown => "🔔",
        }
    }

    /// Fallback title when the server sent none.
    pub fn default_title(&self) -> &'static str {
        match self {
            NotificationType::CommentReply => "New reply",
            NotificationType::PostReaction => "New reaction",
            NotificationType::Mention => "You were mentioned",
            NotificationType::ExpertResponse => "Expert response",
            NotificationType::Unknown => "Notification",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for NotificationType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NotificationType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(raw
            .as_str()
            .map(NotificationType::from_wire)
            .unwrap_or(NotificationType::Unknown))
    }
}

/// Type-specific payload attached to a notification.
///
/// `post_id` is the navigation target; every other field is kept verbatim.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NotificationData {
    #[serde(
        default,
        deserialize_with = "lenient_post_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub post_id: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotificationData {
    /// Creates a payload pointing at a post.
    pub fn for_post(post_id: impl Into<String>) -> Self {
        Self {
            post_id: Some(post_id.into()),
            extra: Map::new(),
        }
    }
}

/// A single inbox entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,

    #[serde(
        default,
        deserialize_with = "lenient_user_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<UserId>,

    #[serde(rename = "type", default)]
    pub kind: NotificationType,

    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub data: NotificationData,

    #[serde(default, deserialize_with = "null_as_default")]
    pub is_read: bool,

    #[serde(default = "Timestamp::now", deserialize_with = "lenient_timestamp")]
    pub created_at: Timestamp,
}

impl Notification {
    /// Creates an unread notification created now.
    pub fn new(id: impl Into<NotificationId>, kind: NotificationType, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: None,
            kind,
            title: kind.default_title().to_string(),
            message: message.into(),
            data: NotificationData::default(),
            is_read: false,
            created_at: Timestamp::now(),
        }
    }

    /// Sets the read flag.
    pub fn with_read(mut self, is_read: bool) -> Self {
        self.is_read = is_read;
        self
    }

    /// Sets the payload.
    pub fn with_data(mut self, data: NotificationData) -> Self {
        self.data = data;
        self
    }

    /// Sets the creation time.
    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = created_at;
        self
    }

    /// Title to render, falling back to the kind's default.
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            self.kind.default_title()
        } else {
            &self.title
        }
    }

    /// Where activating this notification should navigate, if anywhere.
    pub fn navigation_target(&self) -> Option<&str> {
        self.data.post_id.as_deref()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(Timestamp::parse)
        .unwrap_or_else(Timestamp::now))
}

fn lenient_user_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<UserId>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| scalar_to_string(&v)).and_then(|s| UserId::new(s).ok()))
}

fn lenient_post_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| scalar_to_string(&v)))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_server_payload() {
        let n: Notification = serde_json::from_value(json!({
            "id": 17,
            "userId": 3,
            "type": "COMMENT_REPLY",
            "title": "New reply",
            "message": "Ana replied to your post",
            "data": { "post_id": 99, "comment_id": 4 },
            "isRead": false,
            "createdAt": "2024-05-01T10:00:00.000000"
        }))
        .unwrap();

        assert_eq!(n.id.as_str(), "17");
        assert_eq!(n.user_id.as_ref().map(UserId::as_str), Some("3"));
        assert_eq!(n.kind, NotificationType::CommentReply);
        assert_eq!(n.navigation_target(), Some("99"));
        assert_eq!(n.data.extra.get("comment_id"), Some(&json!(4)));
        assert!(!n.is_read);
    }

    #[test]
    fn unknown_type_maps_to_unknown() {
        let n: Notification =
            serde_json::from_value(json!({ "id": "a", "type": "SYSTEM_ALERT" })).unwrap();
        assert_eq!(n.kind, NotificationType::Unknown);
    }

    #[test]
    fn missing_and_null_fields_fall_back_to_defaults() {
        let n: Notification = serde_json::from_value(json!({
            "id": "a",
            "type": null,
            "title": null,
            "data": null,
            "isRead": null,
            "createdAt": "not a date"
        }))
        .unwrap();
        assert_eq!(n.kind, NotificationType::Unknown);
        assert_eq!(n.title, "");
        assert_eq!(n.display_title(), "Notification");
        assert_eq!(n.data, NotificationData::default());
        assert!(!n.is_read);
    }

    #[test]
    fn missing_id_is_rejected() {
        let result = serde_json::from_value::<Notification>(json!({ "type": "MENTION" }));
        assert!(result.is_err());
    }

    #[test]
    fn serializes_with_camel_case_and_wire_type() {
        let n = Notification::new("x", NotificationType::Mention, "hi").with_read(true);
        let value = serde_json::to_value(&n).unwrap();
        assert_eq!(value["type"], "MENTION");
        assert_eq!(value["isRead"], true);
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn every_kind_has_an_icon() {
        let icons: Vec<_> = NotificationType::ALL.iter().map(|k| k.icon()).collect();
        assert_eq!(icons, vec!["💬", "👍", "@", "⭐", "🔔"]);
    }

    #[test]
    fn wire_names_round_trip_for_known_kinds() {
        for kind in NotificationType::ALL {
            if kind != NotificationType::Unknown {
                assert_eq!(NotificationType::from_wire(kind.as_str()), kind);
            }
        }
    }
}
