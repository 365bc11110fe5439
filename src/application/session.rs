//! SyncSession - everything that lives for one authenticated identity.
//!
//! A session wires the connection manager, push bridge, inbox and polling
//! fallback together. Nothing is shared between sessions: when the identity
//! changes (or goes away) the [`SessionSupervisor`] shuts the old session
//! down and builds a new one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::domain::foundation::{Identity, SyncSessionId};
use crate::domain::notification::{ConnectionState, ReadFailurePolicy, ReconnectPolicy};
use crate::ports::{ApiError, NotificationApi, PushTransport};

use super::connection_manager::{ConnectionManager, ConnectionManagerConfig};
use super::errors::SyncError;
use super::inbox::{InboxSync, DEFAULT_PAGE_SIZE};
use super::polling::{PollingFallback, PollingFallbackConfig};
use super::push_bridge::{PushEventBridge, SubscriptionId};
use super::surfaces::{Indicator, Panel};

/// Builds a REST client for an identity.
pub type ApiFactory =
    Arc<dyn Fn(&Identity) -> Result<Arc<dyn NotificationApi>, ApiError> + Send + Sync>;

/// Adapters a session is built from.
#[derive(Clone)]
pub struct SessionDeps {
    pub transport: Arc<dyn PushTransport>,
    pub api_factory: ApiFactory,
}

impl SessionDeps {
    pub fn new(transport: Arc<dyn PushTransport>, api_factory: ApiFactory) -> Self {
        Self {
            transport,
            api_factory,
        }
    }

    /// Uses one API client for every identity. Handy for tests.
    pub fn with_shared_api(transport: Arc<dyn PushTransport>, api: Arc<dyn NotificationApi>) -> Self {
        Self::new(transport, Arc::new(move |_: &Identity| Ok(Arc::clone(&api))))
    }
}

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub reconnect: ReconnectPolicy,
    pub connect_timeout: Duration,
    pub poll_interval: Duration,
    pub page_size: u32,
    pub read_failure_policy: ReadFailurePolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            connect_timeout: ConnectionManagerConfig::default().connect_timeout,
            poll_interval: PollingFallbackConfig::default().interval,
            page_size: DEFAULT_PAGE_SIZE,
            read_failure_policy: ReadFailurePolicy::default(),
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            reconnect: ReconnectPolicy::new(config.push.base_delay(), config.push.max_attempts),
            connect_timeout: config.push.connect_timeout(),
            poll_interval: config.polling.interval(),
            page_size: config.api.page_size,
            read_failure_policy: config.sync.read_failure_policy,
        }
    }
}

/// One identity's sync state.
pub struct SyncSession {
    id: SyncSessionId,
    identity: Identity,
    connection: ConnectionManager,
    bridge: Arc<PushEventBridge>,
    inbox: Arc<InboxSync>,
    polling: PollingFallback,
    inbox_subscription: SubscriptionId,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl SyncSession {
    /// Builds the session and starts connecting.
    pub fn start(
        identity: Identity,
        deps: &SessionDeps,
        settings: &SessionSettings,
    ) -> Result<Self, SyncError> {
        let api = (deps.api_factory)(&identity).map_err(SyncError::Setup)?;
        let inbox = Arc::new(
            InboxSync::new(api)
                .with_page_size(settings.page_size)
                .with_failure_policy(settings.read_failure_policy),
        );

        let bridge = PushEventBridge::new_shared();
        let inbox_subscription = bridge.subscribe(inbox.clone());

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let connection = ConnectionManager::spawn(
            Arc::clone(&deps.transport),
            ConnectionManagerConfig::default()
                .with_policy(settings.reconnect)
                .with_connect_timeout(settings.connect_timeout),
            events_tx,
        );

        // Single consumer keeps transport order.
        let dispatcher = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move {
                while let Some(event) = events_rx.recv().await {
                    bridge.dispatch(event).await;
                }
            })
        };

        let polling = PollingFallback::new(
            Arc::clone(&inbox),
            connection.subscribe_state(),
            PollingFallbackConfig::default().with_interval(settings.poll_interval),
        );

        let id = SyncSessionId::new();
        tracing::info!(session_id = %id, user_id = %identity.user_id, "Sync session started");
        connection.connect(identity.clone());

        Ok(Self {
            id,
            identity,
            connection,
            bridge,
            inbox,
            polling,
            inbox_subscription,
            dispatcher: Mutex::new(Some(dispatcher)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> SyncSessionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn inbox(&self) -> &Arc<InboxSync> {
        &self.inbox
    }

    pub fn bridge(&self) -> &Arc<PushEventBridge> {
        &self.bridge
    }

    pub fn polling(&self) -> &PollingFallback {
        &self.polling
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe_state()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mounts an indicator on this session.
    pub async fn indicator(&self) -> Indicator {
        Indicator::mount(
            Arc::clone(&self.inbox),
            Arc::clone(&self.bridge),
            &self.polling,
            self.connection.subscribe_state(),
        )
        .await
    }

    /// Opens the panel on this session.
    pub async fn open_panel(&self) -> Panel {
        Panel::open(Arc::clone(&self.inbox), &self.polling).await
    }

    /// Disconnects, stops polling and discards the inbox. Safe to call twice.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inbox.close();
        self.polling.shutdown();
        self.connection.shutdown().await;

        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = dispatcher {
            task.abort();
        }
        self.bridge.unsubscribe(self.inbox_subscription);
        self.bridge.clear();

        tracing::info!(session_id = %self.id, user_id = %self.identity.user_id, "Sync session closed");
    }
}

/// Keeps exactly one session alive for the current identity.
pub struct SessionSupervisor {
    current: watch::Receiver<Option<Arc<SyncSession>>>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionSupervisor {
    /// Follows `identity`; `None` means signed out.
    pub fn spawn(
        identity: watch::Receiver<Option<Identity>>,
        deps: SessionDeps,
        settings: SessionSettings,
    ) -> Self {
        let (current_tx, current) = watch::channel(None);
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(Self::run(identity, deps, settings, current_tx, stop_rx));
        Self {
            current,
            stop: Mutex::new(Some(stop_tx)),
            task: Mutex::new(Some(task)),
        }
    }

    /// The live session, if signed in.
    pub fn current(&self) -> Option<Arc<SyncSession>> {
        self.current.borrow().clone()
    }

    /// Watch session replacements.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<SyncSession>>> {
        self.current.clone()
    }

    /// Tears down the current session and stops following the identity.
    pub async fn shutdown(&self) {
        let stop = self.stop.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(stop) = stop {
            let _ = stop.send(());
        }
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    async fn run(
        mut identity: watch::Receiver<Option<Identity>>,
        deps: SessionDeps,
        settings: SessionSettings,
        current: watch::Sender<Option<Arc<SyncSession>>>,
        mut stop: oneshot::Receiver<()>,
    ) {
        let mut active: Option<Identity> = None;
        loop {
            let next = identity.borrow_and_update().clone();
            let unchanged = match (&active, &next) {
                (Some(a), Some(b)) => a.same_as(b),
                (None, None) => true,
                _ => false,
            };

            if !unchanged {
                Self::teardown(&current).await;
                if let Some(next) = next.clone() {
                    match SyncSession::start(next, &deps, &settings) {
                        Ok(session) => {
                            current.send_replace(Some(Arc::new(session)));
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Could not start sync session");
                        }
                    }
                }
                active = next;
            }

            tokio::select! {
                changed = identity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = &mut stop => break,
            }
        }
        Self::teardown(&current).await;
    }

    async fn teardown(current: &watch::Sender<Option<Arc<SyncSession>>>) {
        let previous = current.send_replace(None);
        if let Some(session) = previous {
            session.shutdown().await;
        }
    }
}
