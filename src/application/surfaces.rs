//! The two inbox surfaces: a compact indicator and the full panel.
//!
//! Surfaces read from [`InboxSync`] and send intents back to it. They keep
//! no notification state of their own and never surface sync errors; a
//! failed call leaves the last known view in place.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::domain::foundation::{DomainError, NotificationId, Timestamp};
use crate::domain::notification::{ConnectionState, InboxSnapshot, Notification};
use crate::ports::NotificationHandler;

use super::inbox::InboxSync;
use super::polling::{LeaseKind, PollingFallback, PollingLease};
use super::push_bridge::{PushEventBridge, SubscriptionId};

/// Badge labels cap at this count.
pub const BADGE_CAP: u32 = 99;

/// Badge text for an unread count; `None` hides the badge.
pub fn badge_label(unread: u32) -> Option<String> {
    match unread {
        0 => None,
        n if n > BADGE_CAP => Some(format!("{}+", BADGE_CAP)),
        n => Some(n.to_string()),
    }
}

/// Counts push arrivals for the indicator's animation cue.
#[derive(Default)]
struct ArrivalCounter {
    arrivals: AtomicU64,
}

#[async_trait]
impl NotificationHandler for ArrivalCounter {
    async fn handle(&self, _notification: Notification) -> Result<(), DomainError> {
        self.arrivals.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "IndicatorArrivals"
    }
}

/// What the indicator renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorView {
    pub unread_count: u32,
    pub badge: Option<String>,
    pub online: bool,
    pub arrivals: u64,
}

/// Compact unread badge with an online/offline cue.
///
/// Unmounts on drop.
pub struct Indicator {
    inbox: Arc<InboxSync>,
    bridge: Arc<PushEventBridge>,
    connection: watch::Receiver<ConnectionState>,
    counter: Arc<ArrivalCounter>,
    subscription: SubscriptionId,
    _lease: PollingLease,
}

impl Indicator {
    /// Subscribes to arrivals, takes a polling lease and fetches the count once.
    pub async fn mount(
        inbox: Arc<InboxSync>,
        bridge: Arc<PushEventBridge>,
        polling: &PollingFallback,
        connection: watch::Receiver<ConnectionState>,
    ) -> Self {
        let counter = Arc::new(ArrivalCounter::default());
        let subscription = bridge.subscribe(counter.clone());
        let lease = polling.acquire(LeaseKind::Indicator);

        if let Err(e) = inbox.refresh_unread_count().await {
            tracing::debug!(error = %e, "Indicator mounted with last known count");
        }

        Self {
            inbox,
            bridge,
            connection,
            counter,
            subscription,
            _lease: lease,
        }
    }

    pub fn view(&self) -> IndicatorView {
        let unread_count = self.inbox.unread_count();
        IndicatorView {
            unread_count,
            badge: badge_label(unread_count),
            online: self.connection.borrow().is_connected(),
            arrivals: self.counter.arrivals.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Indicator {
    fn drop(&mut self) {
        self.bridge.unsubscribe(self.subscription);
    }
}

/// One rendered panel row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelItem {
    pub id: NotificationId,
    pub icon: &'static str,
    pub title: String,
    pub message: String,
    pub time_ago: String,
    pub is_read: bool,
    pub target: Option<String>,
}

impl PanelItem {
    fn render(notification: &Notification, now: &Timestamp) -> Self {
        Self {
            id: notification.id.clone(),
            icon: notification.kind.icon(),
            title: notification.display_title().to_string(),
            message: notification.message.clone(),
            time_ago: notification.created_at.time_ago(now),
            is_read: notification.is_read,
            target: notification.navigation_target().map(str::to_string),
        }
    }
}

/// What the panel renders.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PanelView {
    pub items: Vec<PanelItem>,
    pub unread_count: u32,
    pub has_more: bool,
}

impl PanelView {
    pub fn render(snapshot: &InboxSnapshot, now: &Timestamp) -> Self {
        Self {
            items: snapshot
                .items
                .iter()
                .map(|n| PanelItem::render(n, now))
                .collect(),
            unread_count: snapshot.unread_count,
            has_more: snapshot.has_more,
        }
    }
}

/// Full notification list. Closes on drop.
pub struct Panel {
    inbox: Arc<InboxSync>,
    _lease: PollingLease,
}

impl Panel {
    /// Takes a panel lease and refreshes page 1 and the count.
    pub async fn open(inbox: Arc<InboxSync>, polling: &PollingFallback) -> Self {
        let lease = polling.acquire(LeaseKind::Panel);
        if let Err(e) = inbox.refresh().await {
            tracing::debug!(error = %e, "Panel opened with last known inbox");
        }
        Self {
            inbox,
            _lease: lease,
        }
    }

    pub fn view(&self, now: &Timestamp) -> PanelView {
        PanelView::render(&self.inbox.snapshot(), now)
    }

    /// Watch the inbox behind this panel.
    pub fn subscribe(&self) -> watch::Receiver<InboxSnapshot> {
        self.inbox.subscribe()
    }

    /// Loads the next page if there is one.
    pub async fn load_more(&self) {
        if let Err(e) = self.inbox.load_more().await {
            tracing::debug!(error = %e, "Load more failed");
        }
    }

    pub async fn mark_read(&self, id: &NotificationId) {
        if let Err(e) = self.inbox.mark_read(id).await {
            tracing::debug!(notification_id = %id, error = %e, "Mark read not applied");
        }
    }

    pub async fn mark_all_read(&self) {
        if let Err(e) = self.inbox.mark_all_read().await {
            tracing::debug!(error = %e, "Mark all read not applied");
        }
    }

    /// Marks the notification read and returns where it links to.
    pub async fn activate(&self, id: &NotificationId) -> Option<String> {
        let target = self
            .inbox
            .snapshot()
            .items
            .iter()
            .find(|n| &n.id == id)
            .and_then(|n| n.navigation_target().map(str::to_string));
        self.mark_read(id).await;
        target
    }

    /// Releases the panel's lease.
    pub fn close(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{ApiCallKind, InMemoryNotificationApi};
    use crate::application::polling::PollingFallbackConfig;
    use crate::domain::notification::{NotificationData, NotificationType};
    use crate::ports::{InboundEvent, NEW_NOTIFICATION_EVENT};
    use serde_json::json;

    struct Fixture {
        api: InMemoryNotificationApi,
        inbox: Arc<InboxSync>,
        bridge: Arc<PushEventBridge>,
        polling: PollingFallback,
        state: watch::Sender<ConnectionState>,
    }

    fn fixture(api: InMemoryNotificationApi) -> Fixture {
        let inbox = Arc::new(InboxSync::new(Arc::new(api.clone())));
        let bridge = PushEventBridge::new_shared();
        bridge.subscribe(inbox.clone());
        let (state, rx) = watch::channel(ConnectionState::Connected);
        let polling = PollingFallback::new(inbox.clone(), rx, PollingFallbackConfig::default());
        Fixture {
            api,
            inbox,
            bridge,
            polling,
            state,
        }
    }

    #[test]
    fn badge_caps_and_hides() {
        assert_eq!(badge_label(0), None);
        assert_eq!(badge_label(7), Some("7".to_string()));
        assert_eq!(badge_label(99), Some("99".to_string()));
        assert_eq!(badge_label(100), Some("99+".to_string()));
    }

    #[tokio::test]
    async fn indicator_fetches_count_and_counts_arrivals() {
        let api = InMemoryNotificationApi::new()
            .with_notification(Notification::new("1", NotificationType::Mention, "m"));
        let f = fixture(api);
        let indicator = Indicator::mount(
            f.inbox.clone(),
            f.bridge.clone(),
            &f.polling,
            f.state.subscribe(),
        )
        .await;

        assert_eq!(indicator.view().unread_count, 1);
        assert!(indicator.view().online);

        f.bridge
            .dispatch(InboundEvent::new(
                NEW_NOTIFICATION_EVENT,
                json!({ "id": "2", "type": "MENTION", "isRead": false }),
            ))
            .await;

        let view = indicator.view();
        assert_eq!(view.unread_count, 2);
        assert_eq!(view.badge.as_deref(), Some("2"));
        assert_eq!(view.arrivals, 1);

        f.state.send_replace(ConnectionState::Reconnecting);
        assert!(!indicator.view().online);
    }

    #[tokio::test]
    async fn unmount_unsubscribes_and_releases_lease() {
        let f = fixture(InMemoryNotificationApi::new());
        let indicator =
            Indicator::mount(f.inbox.clone(), f.bridge.clone(), &f.polling, f.state.subscribe()).await;
        assert_eq!(f.bridge.subscriber_count(), 2);
        assert_eq!(f.polling.lease_count(), 1);

        drop(indicator);

        assert_eq!(f.bridge.subscriber_count(), 1);
        assert_eq!(f.polling.lease_count(), 0);
        assert!(!f.polling.is_running());
    }

    #[tokio::test]
    async fn panel_open_refreshes_and_renders() {
        let created = Timestamp::now().minus_secs(120);
        let api = InMemoryNotificationApi::new().with_notification(
            Notification::new("1", NotificationType::CommentReply, "replied")
                .with_data(NotificationData::for_post("55"))
                .with_created_at(created),
        );
        let f = fixture(api);

        let panel = Panel::open(f.inbox.clone(), &f.polling).await;
        let view = panel.view(&Timestamp::now());

        assert_eq!(view.unread_count, 1);
        assert_eq!(view.items.len(), 1);
        let row = &view.items[0];
        assert_eq!(row.icon, "💬");
        assert_eq!(row.time_ago, "2m ago");
        assert_eq!(row.target.as_deref(), Some("55"));
        assert_eq!(f.api.call_count(ApiCallKind::ListPage), 1);
        assert_eq!(f.api.call_count(ApiCallKind::UnreadCount), 1);
    }

    #[tokio::test]
    async fn activate_marks_read_and_returns_target() {
        let api = InMemoryNotificationApi::new().with_notification(
            Notification::new("1", NotificationType::Mention, "m")
                .with_data(NotificationData::for_post("7")),
        );
        let f = fixture(api);
        let panel = Panel::open(f.inbox.clone(), &f.polling).await;

        let target = panel.activate(&"1".into()).await;

        assert_eq!(target.as_deref(), Some("7"));
        assert_eq!(panel.view(&Timestamp::now()).unread_count, 0);
        assert!(f.api.server_notification(&"1".into()).unwrap().is_read);
    }

    #[tokio::test]
    async fn closing_and_reopening_shows_store_state() {
        let api = InMemoryNotificationApi::new()
            .with_notification(Notification::new("1", NotificationType::Mention, "m"));
        let f = fixture(api);

        let panel = Panel::open(f.inbox.clone(), &f.polling).await;
        panel.mark_all_read().await;
        panel.close();
        assert_eq!(f.polling.lease_count(), 0);

        f.api.fail_always(ApiCallKind::ListPage, crate::ports::ApiError::Unauthorized);
        f.api.fail_always(ApiCallKind::UnreadCount, crate::ports::ApiError::Unauthorized);
        let reopened = Panel::open(f.inbox.clone(), &f.polling).await;
        let view = reopened.view(&Timestamp::now());
        assert_eq!(view.items.len(), 1);
        assert!(view.items[0].is_read);
        assert_eq!(view.unread_count, 0);
    }
}
