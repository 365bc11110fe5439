//! In-memory notification API for testing.
//!
//! Behaves like the real server (pagination, unread count, mark read) over
//! a list held in memory.
//!
//! # Features
//!
//! - Server-side inbox that tests can add to while a session runs
//! - Simulated latency for in-flight and timer testing
//! - Error injection per call kind
//! - Call tracking for verification
//!
//! # Example
//!
//! ```ignore
//! let api = InMemoryNotificationApi::new()
//!     .with_notification(Notification::new("1", NotificationType::Mention, "hi"));
//! api.fail_next(ApiCallKind::MarkRead, ApiError::Network("reset".into()));
//! ```

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::domain::foundation::NotificationId;
use crate::domain::notification::Notification;
use crate::ports::{ApiError, NotificationApi, NotificationPage, PageRequest};

/// Which endpoint a call hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiCallKind {
    ListPage,
    UnreadCount,
    MarkRead,
    MarkAllRead,
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    ListPage(PageRequest),
    UnreadCount,
    MarkRead(NotificationId),
    MarkAllRead,
}

impl ApiCall {
    pub fn kind(&self) -> ApiCallKind {
        match self {
            ApiCall::ListPage(_) => ApiCallKind::ListPage,
            ApiCall::UnreadCount => ApiCallKind::UnreadCount,
            ApiCall::MarkRead(_) => ApiCallKind::MarkRead,
            ApiCall::MarkAllRead => ApiCallKind::MarkAllRead,
        }
    }
}

#[derive(Debug, Default)]
struct ServerState {
    /// Newest first.
    notifications: Vec<Notification>,
    queued_failures: HashMap<ApiCallKind, VecDeque<ApiError>>,
    persistent_failures: HashMap<ApiCallKind, ApiError>,
    calls: Vec<ApiCall>,
    delay: Duration,
}

/// NotificationApi backed by memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationApi {
    state: Arc<Mutex<ServerState>>,
}

impl InMemoryNotificationApi {
    /// Creates an empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a notification as the newest on the server.
    pub fn with_notification(self, notification: Notification) -> Self {
        self.insert(notification);
        self
    }

    /// Sets simulated latency for every call.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.lock().delay = delay;
        self
    }

    /// Creates a notification server-side, as the newest entry.
    pub fn insert(&self, notification: Notification) {
        self.lock().notifications.insert(0, notification);
    }

    /// Fails the next call of this kind with the given error.
    pub fn fail_next(&self, kind: ApiCallKind, error: ApiError) {
        self.lock()
            .queued_failures
            .entry(kind)
            .or_default()
            .push_back(error);
    }

    /// Fails every call of this kind until cleared.
    pub fn fail_always(&self, kind: ApiCallKind, error: ApiError) {
        self.lock().persistent_failures.insert(kind, error);
    }

    /// Stops failing calls of this kind.
    pub fn recover(&self, kind: ApiCallKind) {
        let mut state = self.lock();
        state.persistent_failures.remove(&kind);
        state.queued_failures.remove(&kind);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    /// Number of calls of one kind.
    pub fn call_count(&self, kind: ApiCallKind) -> usize {
        self.lock().calls.iter().filter(|c| c.kind() == kind).count()
    }

    /// Server-side copy of a notification.
    pub fn server_notification(&self, id: &NotificationId) -> Option<Notification> {
        self.lock().notifications.iter().find(|n| &n.id == id).cloned()
    }

    /// Server-side unread count.
    pub fn server_unread(&self) -> u32 {
        self.lock().notifications.iter().filter(|n| !n.is_read).count() as u32
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the call and returns the configured latency and failure.
    fn begin(&self, call: ApiCall) -> (Duration, Option<ApiError>) {
        let mut state = self.lock();
        let kind = call.kind();
        state.calls.push(call);
        let queued = state.queued_failures.get_mut(&kind).and_then(VecDeque::pop_front);
        let failure = queued.or_else(|| state.persistent_failures.get(&kind).cloned());
        (state.delay, failure)
    }

    async fn simulate(&self, call: ApiCall) -> Result<(), ApiError> {
        let (delay, failure) = self.begin(call);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NotificationApi for InMemoryNotificationApi {
    async fn list_page(&self, request: PageRequest) -> Result<NotificationPage, ApiError> {
        self.simulate(ApiCall::ListPage(request)).await?;

        let state = self.lock();
        let matching: Vec<&Notification> = state
            .notifications
            .iter()
            .filter(|n| !request.unread_only || !n.is_read)
            .collect();
        let total = matching.len() as u32;
        let limit = request.limit.max(1);
        let total_pages = total.div_ceil(limit);
        let start = (request.page.saturating_sub(1) * limit) as usize;

        Ok(NotificationPage {
            items: matching
                .into_iter()
                .skip(start)
                .take(limit as usize)
                .cloned()
                .collect(),
            total,
            total_pages,
            current_page: request.page,
        })
    }

    async fn unread_count(&self) -> Result<u32, ApiError> {
        self.simulate(ApiCall::UnreadCount).await?;
        Ok(self.server_unread())
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<(), ApiError> {
        self.simulate(ApiCall::MarkRead(id.clone())).await?;

        let mut state = self.lock();
        match state.notifications.iter_mut().find(|n| &n.id == id) {
            Some(n) => {
                n.is_read = true;
                Ok(())
            }
            None => Err(ApiError::NotFound(format!("Notification {} not found", id))),
        }
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.simulate(ApiCall::MarkAllRead).await?;

        for n in self.lock().notifications.iter_mut() {
            n.is_read = true;
        }
        Ok(())
    }
}
