//! InboxSync - applies pushes, fetch results and read mutations to the
//! store and publishes snapshots to the surfaces.
//!
//! Every store change happens under one async lock and is followed by a
//! snapshot broadcast, so observers never see a half-applied update. The
//! lock is never held across a network call.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

use crate::domain::foundation::{DomainError, ErrorCode, NotificationId};
use crate::domain::notification::{
    InboxSnapshot, Notification, NotificationStore, PushOutcome, ReadFailurePolicy, ReadMutation,
};
use crate::ports::{ApiError, NotificationApi, NotificationHandler, PageRequest};

use super::errors::SyncError;

/// Default page size for the list endpoint.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Owns the session's notification store.
pub struct InboxSync {
    store: RwLock<NotificationStore>,
    snapshots: watch::Sender<InboxSnapshot>,
    api: Arc<dyn NotificationApi>,
    page_size: u32,
    failure_policy: ReadFailurePolicy,
    alive: AtomicBool,
    loading_more: AtomicBool,
}

impl InboxSync {
    pub fn new(api: Arc<dyn NotificationApi>) -> Self {
        let (snapshots, _) = watch::channel(InboxSnapshot::default());
        Self {
            store: RwLock::new(NotificationStore::new()),
            snapshots,
            api,
            page_size: DEFAULT_PAGE_SIZE,
            failure_policy: ReadFailurePolicy::default(),
            alive: AtomicBool::new(true),
            loading_more: AtomicBool::new(false),
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_failure_policy(mut self, policy: ReadFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Current inbox contents.
    pub fn snapshot(&self) -> InboxSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Watch the inbox; a new value is published after every change.
    pub fn subscribe(&self) -> watch::Receiver<InboxSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn unread_count(&self) -> u32 {
        self.snapshots.borrow().unread_count
    }

    pub fn is_open(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Stops applying results. In-flight calls finish but are discarded.
    pub fn close(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Adds a pushed notification. `None` once the inbox is closed.
    pub async fn apply_push(&self, notification: Notification) -> Option<PushOutcome> {
        if !self.is_open() {
            return None;
        }
        let mut store = self.store.write().await;
        let id = notification.id.clone();
        let outcome = store.apply_push(notification);
        match outcome {
            PushOutcome::Inserted => {
                tracing::debug!(notification_id = %id, "Push applied");
                self.publish(&store);
            }
            PushOutcome::Duplicate => {
                tracing::debug!(notification_id = %id, "Duplicate push ignored");
            }
        }
        Some(outcome)
    }

    /// Fetches page 1 and merges it.
    pub async fn refresh_first_page(&self) -> Result<(), SyncError> {
        let page = self
            .api
            .list_page(PageRequest::first(self.page_size))
            .await
            .map_err(|e| self.fetch_failed("list_page", e))?;

        self.ensure_open()?;
        let mut store = self.store.write().await;
        store.apply_fetched_page(1, page.items, page.total_pages);
        self.publish(&store);
        Ok(())
    }

    /// Fetches the authoritative unread count.
    pub async fn refresh_unread_count(&self) -> Result<(), SyncError> {
        let count = self
            .api
            .unread_count()
            .await
            .map_err(|e| self.fetch_failed("unread_count", e))?;

        self.ensure_open()?;
        let mut store = self.store.write().await;
        store.apply_unread_count(count);
        self.publish(&store);
        Ok(())
    }

    /// Page 1, then the unread count.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        let page = self.refresh_first_page().await;
        let count = self.refresh_unread_count().await;
        page.and(count)
    }

    /// Fetches the next page. Returns `Ok(false)` without a call when there
    /// is nothing more or a load is already running.
    pub async fn load_more(&self) -> Result<bool, SyncError> {
        if self.loading_more.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        let result = self.load_next_page().await;
        self.loading_more.store(false, Ordering::Release);
        result
    }

    async fn load_next_page(&self) -> Result<bool, SyncError> {
        let next = {
            let store = self.store.read().await;
            if !store.has_more() {
                return Ok(false);
            }
            store.page() + 1
        };

        let page = self
            .api
            .list_page(PageRequest::page(next, self.page_size))
            .await
            .map_err(|e| self.fetch_failed("list_page", e))?;
        self.ensure_open()?;
        let mut store = self.store.write().await;
        store.apply_fetched_page(next, page.items, page.total_pages);
        self.publish(&store);
        Ok(true)
    }

    /// Marks one notification read. Already-read or unknown ids are a no-op
    /// with no server call.
    pub async fn mark_read(&self, id: &NotificationId) -> Result<(), SyncError> {
        self.ensure_open()?;
        let mutation = {
            let mut store = self.store.write().await;
            let Some(mutation) = store.mark_read(id) else {
                return Ok(());
            };
            self.publish(&store);
            mutation
        };

        let result = self.api.mark_read(id).await;
        self.settle(mutation, result).await
    }

    /// Marks everything read. The server call is always made.
    pub async fn mark_all_read(&self) -> Result<(), SyncError> {
        self.ensure_open()?;
        let mutation = {
            let mut store = self.store.write().await;
            let mutation = store.mark_all_read();
            self.publish(&store);
            mutation
        };

        let result = self.api.mark_all_read().await;
        self.settle(mutation, result).await
    }

    async fn settle(
        &self,
        mutation: ReadMutation,
        result: Result<(), ApiError>,
    ) -> Result<(), SyncError> {
        if !self.is_open() {
            return Err(SyncError::SessionClosed);
        }
        let mut store = self.store.write().await;
        match result {
            Ok(()) => {
                store.confirm(&mutation);
                Ok(())
            }
            Err(e) => {
                match self.failure_policy {
                    ReadFailurePolicy::Rollback => {
                        let reverted = store.rollback(&mutation);
                        tracing::warn!(
                            target_kind = ?mutation.target(),
                            reverted,
                            error = %e,
                            "Mark read failed; rolled back"
                        );
                    }
                    ReadFailurePolicy::KeepOptimistic => {
                        store.abandon(&mutation);
                        tracing::warn!(
                            target_kind = ?mutation.target(),
                            error = %e,
                            "Mark read failed; keeping local state"
                        );
                    }
                }
                self.publish(&store);
                Err(SyncError::Mutation(e))
            }
        }
    }

    fn fetch_failed(&self, call: &'static str, error: ApiError) -> SyncError {
        tracing::warn!(call, error = %error, transient = error.is_transient(), "Fetch failed; keeping last state");
        SyncError::Fetch(error)
    }

    fn ensure_open(&self) -> Result<(), SyncError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(SyncError::SessionClosed)
        }
    }

    fn publish(&self, store: &NotificationStore) {
        self.snapshots.send_replace(store.snapshot());
    }
}

#[async_trait]
impl NotificationHandler for InboxSync {
    async fn handle(&self, notification: Notification) -> Result<(), DomainError> {
        let id = notification.id.clone();
        match self.apply_push(notification).await {
            Some(_) => Ok(()),
            None => Err(DomainError::new(ErrorCode::SessionClosed, "inbox is closed")
                .with_detail("notification_id", id.as_str())),
        }
    }

    fn name(&self) -> &'static str {
        "InboxSync"
    }
}
