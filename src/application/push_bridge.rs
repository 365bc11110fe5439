//! PushEventBridge - turns raw push events into notifications and fans them out.
//!
//! Subscribers are invoked in subscription order, one notification at a
//! time. A failing subscriber is logged and does not stop delivery to the
//! ones after it.
//!
//! # Normalisation
//!
//! Payloads the client cannot fully parse are still delivered:
//! - an unrecognised or missing `type` becomes `UNKNOWN`
//! - a missing `id` gets a synthetic one derived from a SHA-256 digest of the
//!   payload (so a redelivered payload still deduplicates), and the type is
//!   forced to `UNKNOWN`
//! - other malformed fields fall back to their defaults

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::foundation::{NotificationId, Timestamp};
use crate::domain::notification::{Notification, NotificationData, NotificationType};
use crate::ports::{InboundEvent, NotificationHandler, NEW_NOTIFICATION_EVENT};

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Delivery counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BridgeStats {
    /// Notifications fanned out.
    pub delivered: u64,
    /// Of those, how many needed normalisation.
    pub normalized: u64,
    /// Events with a name the bridge does not handle.
    pub ignored: u64,
    /// Subscriber invocations that returned an error.
    pub handler_errors: u64,
}

/// Result of normalising one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub notification: Notification,
    /// True when the payload was not a well-formed notification.
    pub repaired: bool,
}

/// Ordered fan-out of pushed notifications.
pub struct PushEventBridge {
    subscribers: RwLock<Vec<(SubscriptionId, Arc<dyn NotificationHandler>)>>,
    next_id: AtomicU64,
    delivered: AtomicU64,
    normalized: AtomicU64,
    ignored: AtomicU64,
    handler_errors: AtomicU64,
}

impl PushEventBridge {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            delivered: AtomicU64::new(0),
            normalized: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
            handler_errors: AtomicU64::new(0),
        }
    }

    /// Creates a bridge wrapped in an Arc, ready to share with tasks.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Registers a handler after every existing one.
    pub fn subscribe(&self, handler: Arc<dyn NotificationHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(handler = handler.name(), "Subscribed to pushed notifications");
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        id
    }

    /// Removes a handler. Unknown or already-removed ids are ignored.
    ///
    /// Returns whether a handler was removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Removes every handler.
    pub fn clear(&self) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            normalized: self.normalized.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
        }
    }

    /// Handles one raw event from the connection manager.
    ///
    /// Returns the delivered notification, or `None` when the event is not a
    /// notification.
    pub async fn dispatch(&self, event: InboundEvent) -> Option<Notification> {
        if event.name != NEW_NOTIFICATION_EVENT {
            self.ignored.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(event = %event.name, "Ignoring push event");
            return None;
        }

        let normalized = Self::normalize(&event.payload, Timestamp::now());
        if normalized.repaired {
            self.normalized.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                notification_id = %normalized.notification.id,
                "Delivering malformed push payload as UNKNOWN"
            );
        }

        self.publish(normalized.notification.clone()).await;
        Some(normalized.notification)
    }

    /// Fans a notification out to every subscriber, in order.
    pub async fn publish(&self, notification: Notification) {
        // Clone handlers to release the lock before awaiting
        let handlers: Vec<Arc<dyn NotificationHandler>> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in handlers {
            if let Err(e) = handler.handle(notification.clone()).await {
                self.handler_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    handler = handler.name(),
                    notification_id = %notification.id,
                    error = %e,
                    "Notification handler failed"
                );
            }
        }
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Parses a push payload, repairing whatever is malformed.
    pub fn normalize(payload: &Value, received_at: Timestamp) -> Normalized {
        if let Some(notification) = serde_json::from_value::<Notification>(payload.clone())
            .ok()
            .filter(|n| !n.id.as_str().trim().is_empty())
        {
            let known = payload
                .get("type")
                .and_then(Value::as_str)
                .map(|t| NotificationType::from_wire(t) != NotificationType::Unknown || t == "UNKNOWN")
                .unwrap_or(false);
            return Normalized {
                notification,
                repaired: !known,
            };
        }

        let empty = Map::new();
        let fields = payload.as_object().unwrap_or(&empty);

        let (id, kind) = match fields.get("id").and_then(scalar_id) {
            Some(id) => (
                id,
                fields
                    .get("type")
                    .and_then(Value::as_str)
                    .map(NotificationType::from_wire)
                    .unwrap_or_default(),
            ),
            None => (synthetic_id(payload), NotificationType::Unknown),
        };

        let message = match payload {
            Value::String(s) => s.clone(),
            _ => text_field(fields, "message"),
        };

        let data = fields
            .get("data")
            .cloned()
            .and_then(|d| serde_json::from_value::<NotificationData>(d).ok())
            .unwrap_or_default();

        let created_at = fields
            .get("createdAt")
            .and_then(Value::as_str)
            .and_then(Timestamp::parse)
            .unwrap_or(received_at);

        Normalized {
            notification: Notification {
                id,
                user_id: None,
                kind,
                title: text_field(fields, "title"),
                message,
                data,
                is_read: fields.get("isRead").and_then(Value::as_bool).unwrap_or(false),
                created_at,
            },
            repaired: true,
        }
    }
}

impl Default for PushEventBridge {
    fn default() -> Self {
        Self::new()
    }
}

fn scalar_id(value: &Value) -> Option<NotificationId> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(NotificationId::new(s.clone())),
        Value::Number(n) => Some(NotificationId::new(n.to_string())),
        _ => None,
    }
}

fn text_field(fields: &Map<String, Value>, key: &str) -> String {
    fields
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Same payload, same id. Object keys serialise sorted, so key order on the
/// wire does not matter.
fn synthetic_id(payload: &Value) -> NotificationId {
    let digest = Sha256::digest(payload.to_string().as_bytes());
    let hex: String = digest.iter().take(16).map(|b| format!("{:02x}", b)).collect();
    NotificationId::new(format!("synthetic-{}", hex))
}
