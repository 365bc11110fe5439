//! PollingFallback - periodic REST refresh while the push channel is down.
//!
//! ## Timer lifetime
//!
//! Surfaces hold a [`PollingLease`] while mounted. The timer starts with the
//! first lease and stops when the last one is dropped, so two surfaces never
//! run two timers.
//!
//! ## Tick rules
//!
//! | Condition | Action |
//! |-----------|--------|
//! | connection is `Connected` | skip |
//! | previous fetch still running | skip (never queued) |
//! | otherwise | fetch unread count; page 1 too if a panel lease is held |
//!
//! Fetches run on their own task. Stopping the timer does not abort a fetch
//! already in flight.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::domain::notification::ConnectionState;

use super::inbox::InboxSync;

/// Configuration for the PollingFallback.
#[derive(Debug, Clone)]
pub struct PollingFallbackConfig {
    /// Time between ticks.
    pub interval: Duration,
}

impl Default for PollingFallbackConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

impl PollingFallbackConfig {
    /// Create config with custom interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Which surface holds a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseKind {
    Indicator,
    Panel,
}

/// Tick counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollingStats {
    pub ticks: u64,
    pub skipped_connected: u64,
    pub skipped_in_flight: u64,
    pub polls: u64,
    pub failures: u64,
}

#[derive(Default)]
struct Leases {
    total: usize,
    panels: usize,
    timer: Option<(watch::Sender<bool>, JoinHandle<()>)>,
}

struct PollingInner {
    inbox: Arc<InboxSync>,
    connection: watch::Receiver<ConnectionState>,
    config: PollingFallbackConfig,
    leases: Mutex<Leases>,
    in_flight: AtomicBool,
    stopped: AtomicBool,
    ticks: AtomicU64,
    skipped_connected: AtomicU64,
    skipped_in_flight: AtomicU64,
    polls: AtomicU64,
    failures: AtomicU64,
}

/// Shared polling timer for one session.
#[derive(Clone)]
pub struct PollingFallback {
    inner: Arc<PollingInner>,
}

impl PollingFallback {
    pub fn new(
        inbox: Arc<InboxSync>,
        connection: watch::Receiver<ConnectionState>,
        config: PollingFallbackConfig,
    ) -> Self {
        Self {
            inner: Arc::new(PollingInner {
                inbox,
                connection,
                config,
                leases: Mutex::new(Leases::default()),
                in_flight: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                ticks: AtomicU64::new(0),
                skipped_connected: AtomicU64::new(0),
                skipped_in_flight: AtomicU64::new(0),
                polls: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
        }
    }

    /// Registers a surface. The timer runs while any lease is alive.
    pub fn acquire(&self, kind: LeaseKind) -> PollingLease {
        let mut leases = self.inner.lock_leases();
        leases.total += 1;
        if kind == LeaseKind::Panel {
            leases.panels += 1;
        }
        if leases.timer.is_none() && !self.inner.stopped.load(Ordering::Acquire) {
            leases.timer = Some(PollingInner::start_timer(&self.inner));
        }
        PollingLease {
            inner: Arc::clone(&self.inner),
            kind,
        }
    }

    /// True while the timer task is running.
    pub fn is_running(&self) -> bool {
        self.inner.lock_leases().timer.is_some()
    }

    pub fn lease_count(&self) -> usize {
        self.inner.lock_leases().total
    }

    pub fn stats(&self) -> PollingStats {
        let inner = &self.inner;
        PollingStats {
            ticks: inner.ticks.load(Ordering::Relaxed),
            skipped_connected: inner.skipped_connected.load(Ordering::Relaxed),
            skipped_in_flight: inner.skipped_in_flight.load(Ordering::Relaxed),
            polls: inner.polls.load(Ordering::Relaxed),
            failures: inner.failures.load(Ordering::Relaxed),
        }
    }

    /// Runs one tick inline and waits for its fetch.
    ///
    /// Returns false if the tick was skipped.
    pub async fn poll_once(&self) -> bool {
        match self.inner.begin_tick() {
            Some(include_page) => {
                self.inner.fetch(include_page).await;
                true
            }
            None => false,
        }
    }

    /// Stops the timer for good. Later leases do not restart it.
    pub fn shutdown(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        let timer = self.inner.lock_leases().timer.take();
        if let Some((stop, _task)) = timer {
            let _ = stop.send(true);
        }
    }
}

impl PollingInner {
    fn lock_leases(&self) -> MutexGuard<'_, Leases> {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_timer(inner: &Arc<Self>) -> (watch::Sender<bool>, JoinHandle<()>) {
        let (stop, shutdown) = watch::channel(false);
        let task = tokio::spawn(Self::run(Arc::clone(inner), shutdown));
        tracing::debug!(interval_secs = inner.config.interval.as_secs(), "Polling timer started");
        (stop, task)
    }

    async fn run(inner: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = inner.config.interval;
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!("Polling timer stopped");
                        return;
                    }
                }

                _ = interval.tick() => {
                    if let Some(include_page) = inner.begin_tick() {
                        let worker = Arc::clone(&inner);
                        tokio::spawn(async move { worker.fetch(include_page).await });
                    }
                }
            }
        }
    }

    /// Decides whether this tick polls. Claims the in-flight slot when it
    /// does and returns whether page 1 is included.
    fn begin_tick(&self) -> Option<bool> {
        self.ticks.fetch_add(1, Ordering::Relaxed);

        if self.connection.borrow().is_connected() {
            self.skipped_connected.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        if self.in_flight.swap(true, Ordering::AcqRel) {
            self.skipped_in_flight.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Previous poll still running; skipping tick");
            return None;
        }
        Some(self.lock_leases().panels > 0)
    }

    async fn fetch(&self, include_page: bool) {
        self.polls.fetch_add(1, Ordering::Relaxed);

        let page = if include_page {
            self.inbox.refresh_first_page().await
        } else {
            Ok(())
        };
        let count = self.inbox.refresh_unread_count().await;
        if page.and(count).is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }

        self.in_flight.store(false, Ordering::Release);
    }

    fn release(&self, kind: LeaseKind) {
        let timer = {
            let mut leases = self.lock_leases();
            leases.total = leases.total.saturating_sub(1);
            if kind == LeaseKind::Panel {
                leases.panels = leases.panels.saturating_sub(1);
            }
            if leases.total == 0 {
                leases.timer.take()
            } else {
                None
            }
        };
        if let Some((stop, _task)) = timer {
            let _ = stop.send(true);
        }
    }
}

/// Keeps the polling timer alive for one surface. Released on drop.
pub struct PollingLease {
    inner: Arc<PollingInner>,
    kind: LeaseKind,
}

impl PollingLease {
    pub fn kind(&self) -> LeaseKind {
        self.kind
    }
}

impl Drop for PollingLease {
    fn drop(&mut self) {
        self.inner.release(self.kind);
    }
}

impl std::fmt::Debug for PollingLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingLease").field("kind", &self.kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{ApiCallKind, InMemoryNotificationApi};
    use crate::domain::notification::{Notification, NotificationType};

    fn setup(
        api: &InMemoryNotificationApi,
        state: ConnectionState,
    ) -> (PollingFallback, watch::Sender<ConnectionState>) {
        let inbox = Arc::new(InboxSync::new(Arc::new(api.clone())));
        let (tx, rx) = watch::channel(state);
        (PollingFallback::new(inbox, rx, PollingFallbackConfig::default()), tx)
    }

    #[tokio::test(start_paused = true)]
    async fn polls_every_interval_while_disconnected() {
        let api = InMemoryNotificationApi::new();
        let (polling, _state) = setup(&api, ConnectionState::Reconnecting);
        let _lease = polling.acquire(LeaseKind::Indicator);

        time::sleep(Duration::from_secs(95)).await;

        assert_eq!(api.call_count(ApiCallKind::UnreadCount), 3);
        assert_eq!(api.call_count(ApiCallKind::ListPage), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn no_polls_while_connected() {
        let api = InMemoryNotificationApi::new();
        let (polling, _state) = setup(&api, ConnectionState::Connected);
        let _lease = polling.acquire(LeaseKind::Panel);

        time::sleep(Duration::from_secs(95)).await;

        assert!(api.calls().is_empty());
        assert_eq!(polling.stats().skipped_connected, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn panel_lease_adds_first_page() {
        let api = InMemoryNotificationApi::new()
            .with_notification(Notification::new("1", NotificationType::Mention, "m"));
        let (polling, _state) = setup(&api, ConnectionState::GivenUp);
        let _lease = polling.acquire(LeaseKind::Panel);

        time::sleep(Duration::from_secs(31)).await;

        assert_eq!(api.call_count(ApiCallKind::ListPage), 1);
        assert_eq!(api.call_count(ApiCallKind::UnreadCount), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_skips_overlapping_tick() {
        let api = InMemoryNotificationApi::new().with_delay(Duration::from_secs(45));
        let (polling, _state) = setup(&api, ConnectionState::Disconnected);
        let _lease = polling.acquire(LeaseKind::Indicator);

        // t=30 starts a 45s fetch, t=60 is skipped, t=90 polls again.
        time::sleep(Duration::from_secs(95)).await;

        assert_eq!(api.call_count(ApiCallKind::UnreadCount), 2);
        assert_eq!(polling.stats().skipped_in_flight, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_is_shared_and_stops_with_last_lease() {
        let api = InMemoryNotificationApi::new();
        let (polling, _state) = setup(&api, ConnectionState::Disconnected);

        let indicator = polling.acquire(LeaseKind::Indicator);
        let panel = polling.acquire(LeaseKind::Panel);
        assert!(polling.is_running());
        assert_eq!(polling.lease_count(), 2);

        time::sleep(Duration::from_secs(31)).await;
        assert_eq!(api.call_count(ApiCallKind::UnreadCount), 1);

        drop(panel);
        assert!(polling.is_running());
        drop(indicator);
        assert!(!polling.is_running());

        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(api.call_count(ApiCallKind::UnreadCount), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_timer_does_not_abort_in_flight_fetch() {
        let api = InMemoryNotificationApi::new().with_delay(Duration::from_secs(10));
        let (polling, _state) = setup(&api, ConnectionState::Disconnected);
        let lease = polling.acquire(LeaseKind::Indicator);

        time::sleep(Duration::from_secs(31)).await;
        drop(lease);
        time::sleep(Duration::from_secs(15)).await;

        assert_eq!(polling.stats().polls, 1);
        assert!(!polling.inner.in_flight.load(Ordering::Acquire));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_pauses_polling() {
        let api = InMemoryNotificationApi::new();
        let (polling, state) = setup(&api, ConnectionState::Reconnecting);
        let _lease = polling.acquire(LeaseKind::Indicator);

        time::sleep(Duration::from_secs(31)).await;
        state.send_replace(ConnectionState::Connected);
        time::sleep(Duration::from_secs(60)).await;

        assert_eq!(api.call_count(ApiCallKind::UnreadCount), 1);
    }

    #[tokio::test]
    async fn shutdown_prevents_restart() {
        let api = InMemoryNotificationApi::new();
        let (polling, _state) = setup(&api, ConnectionState::Disconnected);
        let _a = polling.acquire(LeaseKind::Indicator);
        polling.shutdown();
        let _b = polling.acquire(LeaseKind::Panel);

        assert!(!polling.is_running());
        assert!(polling.poll_once().await);
    }
}
