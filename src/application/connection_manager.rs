//! ConnectionManager - owns the push channel lifecycle.
//!
//! A single background task holds the channel. Callers send commands
//! (connect, disconnect, shutdown) and observe the connection state through
//! a watch channel; they never see transport errors directly.
//!
//! ## Reconnection
//!
//! An unexpected drop or failed attempt schedules a retry after
//! `base_delay * attempt` (linear). After `max_attempts` consecutive failed
//! retries the state becomes `GivenUp` and nothing happens until an explicit
//! `connect`, which starts counting from zero again. Any successful
//! connection resets the counter.
//!
//! ## Ordering
//!
//! Server events are forwarded to the event sink in the order the transport
//! delivers them.

use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::domain::foundation::{Identity, StateMachine};
use crate::domain::notification::{ConnectionState, ReconnectPolicy};
use crate::ports::{
    InboundEvent, OutboundEvent, PushChannel, PushTransport, TransportError,
    JOIN_USER_ROOM_EVENT, LEAVE_USER_ROOM_EVENT,
};

/// Configuration for the ConnectionManager.
#[derive(Debug, Clone)]
pub struct ConnectionManagerConfig {
    /// Retry schedule.
    pub policy: ReconnectPolicy,

    /// Upper bound for one connection attempt.
    pub connect_timeout: Duration,
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        Self {
            policy: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(20),
        }
    }
}

impl ConnectionManagerConfig {
    /// Create config with a custom retry schedule.
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Create config with a custom connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

enum Command {
    Connect(Identity),
    Disconnect,
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the background connection task.
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Spawns the connection task. Server events go to `events`.
    pub fn spawn(
        transport: Arc<dyn PushTransport>,
        config: ConnectionManagerConfig,
        events: mpsc::UnboundedSender<InboundEvent>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);

        let worker = Worker {
            transport,
            config,
            events,
            commands: command_rx,
            state: state_tx,
        };
        let task = tokio::spawn(worker.run());

        Self {
            commands,
            state,
            task: Mutex::new(Some(task)),
        }
    }

    /// Connects for the given identity.
    ///
    /// No-op when already connected or connecting for the same identity.
    /// A different identity replaces the current channel.
    pub fn connect(&self, identity: Identity) {
        let _ = self.commands.send(Command::Connect(identity));
    }

    /// Leaves the user room, closes the channel and cancels any pending retry.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Watch the connection state.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Disconnects and stops the background task. Safe to call twice.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// Where the worker is in the connection lifecycle.
enum Phase {
    Idle,
    Connecting { identity: Identity, failures: u32 },
    Waiting { identity: Identity, failures: u32, until: Instant },
    Live { identity: Identity, channel: Box<dyn PushChannel> },
    GivenUp,
    Stopped,
}

struct Worker {
    transport: Arc<dyn PushTransport>,
    config: ConnectionManagerConfig,
    events: mpsc::UnboundedSender<InboundEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
}

impl Worker {
    async fn run(mut self) {
        let mut phase = Phase::Idle;
        loop {
            phase = match phase {
                Phase::Idle | Phase::GivenUp => self.idle().await,
                Phase::Connecting { identity, failures } => self.connecting(identity, failures).await,
                Phase::Waiting {
                    identity,
                    failures,
                    until,
                } => self.waiting(identity, failures, until).await,
                Phase::Live { identity, channel } => self.live(identity, channel).await,
                Phase::Stopped => break,
            };
        }
        tracing::debug!("Connection task stopped");
    }

    async fn idle(&mut self) -> Phase {
        match self.commands.recv().await {
            Some(Command::Connect(identity)) => Phase::Connecting {
                identity,
                failures: 0,
            },
            Some(Command::Disconnect) => {
                self.transition(ConnectionState::Disconnected);
                Phase::Idle
            }
            Some(Command::Shutdown(ack)) => {
                self.transition(ConnectionState::Disconnected);
                let _ = ack.send(());
                Phase::Stopped
            }
            None => {
                self.transition(ConnectionState::Disconnected);
                Phase::Stopped
            }
        }
    }

    async fn connecting(&mut self, identity: Identity, failures: u32) -> Phase {
        self.transition(ConnectionState::Connecting);

        let transport = Arc::clone(&self.transport);
        let timeout = self.config.connect_timeout;
        let target = identity.clone();
        let attempt = async move {
            match time::timeout(timeout, transport.open(&target)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout {
                    timeout_secs: timeout.as_secs(),
                }),
            }
        };
        tokio::pin!(attempt);

        let opened = loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Connect(next)) if next.same_as(&identity) => continue,
                    Some(Command::Connect(next)) => {
                        return Phase::Connecting { identity: next, failures: 0 };
                    }
                    Some(Command::Disconnect) => {
                        self.transition(ConnectionState::Disconnected);
                        return Phase::Idle;
                    }
                    Some(Command::Shutdown(ack)) => {
                        self.transition(ConnectionState::Disconnected);
                        let _ = ack.send(());
                        return Phase::Stopped;
                    }
                    None => {
                        self.transition(ConnectionState::Disconnected);
                        return Phase::Stopped;
                    }
                },

                result = &mut attempt => break result,
            }
        };

        let failure = match opened {
            Ok(mut channel) => match channel.emit(room_event(JOIN_USER_ROOM_EVENT, &identity)).await {
                Ok(()) => {
                    tracing::info!(user_id = %identity.user_id, "Push channel connected");
                    self.transition(ConnectionState::Connected);
                    return Phase::Live { identity, channel };
                }
                Err(e) => {
                    channel.close().await;
                    e
                }
            },
            Err(e) => e,
        };

        tracing::warn!(
            user_id = %identity.user_id,
            attempt = failures + 1,
            error = %failure,
            "Push connection attempt failed"
        );
        self.schedule_retry(identity, failures + 1)
    }

    async fn waiting(&mut self, identity: Identity, failures: u32, until: Instant) -> Phase {
        tokio::select! {
            biased;

            command = self.commands.recv() => match command {
                // An explicit connect supersedes the pending timer.
                Some(Command::Connect(next)) => Phase::Connecting { identity: next, failures: 0 },
                Some(Command::Disconnect) => {
                    self.transition(ConnectionState::Disconnected);
                    Phase::Idle
                }
                Some(Command::Shutdown(ack)) => {
                    self.transition(ConnectionState::Disconnected);
                    let _ = ack.send(());
                    Phase::Stopped
                }
                None => {
                    self.transition(ConnectionState::Disconnected);
                    Phase::Stopped
                }
            },

            _ = time::sleep_until(until) => Phase::Connecting { identity, failures },
        }
    }

    async fn live(&mut self, identity: Identity, mut channel: Box<dyn PushChannel>) -> Phase {
        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Connect(next)) if next.same_as(&identity) => continue,
                    Some(Command::Connect(next)) => {
                        Self::leave(&identity, channel.as_mut()).await;
                        self.transition(ConnectionState::Disconnected);
                        return Phase::Connecting { identity: next, failures: 0 };
                    }
                    Some(Command::Disconnect) => {
                        Self::leave(&identity, channel.as_mut()).await;
                        self.transition(ConnectionState::Disconnected);
                        return Phase::Idle;
                    }
                    Some(Command::Shutdown(ack)) => {
                        Self::leave(&identity, channel.as_mut()).await;
                        self.transition(ConnectionState::Disconnected);
                        let _ = ack.send(());
                        return Phase::Stopped;
                    }
                    None => {
                        Self::leave(&identity, channel.as_mut()).await;
                        self.transition(ConnectionState::Disconnected);
                        return Phase::Stopped;
                    }
                },

                event = channel.next_event() => match event {
                    Ok(event) => {
                        if self.events.send(event).is_err() {
                            tracing::debug!("Push event sink closed; dropping event");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(user_id = %identity.user_id, error = %e, "Push channel lost");
                        channel.close().await;
                        return self.schedule_retry(identity, 1);
                    }
                },
            }
        }
    }

    /// Moves to `Reconnecting` with a timer, or to `GivenUp` once the budget
    /// is spent.
    fn schedule_retry(&mut self, identity: Identity, failures: u32) -> Phase {
        self.transition(ConnectionState::Reconnecting);
        match self.config.policy.delay_for(failures) {
            Some(delay) => {
                tracing::info!(
                    attempt = failures,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling push reconnect"
                );
                Phase::Waiting {
                    identity,
                    failures,
                    until: Instant::now() + delay,
                }
            }
            None => {
                tracing::warn!(
                    max_attempts = self.config.policy.max_attempts,
                    "Giving up on push connection; polling only"
                );
                self.transition(ConnectionState::GivenUp);
                Phase::GivenUp
            }
        }
    }

    async fn leave(identity: &Identity, channel: &mut dyn PushChannel) {
        if let Err(e) = channel.emit(room_event(LEAVE_USER_ROOM_EVENT, identity)).await {
            tracing::debug!(error = %e, "Could not leave user room");
        }
        channel.close().await;
    }

    fn transition(&self, target: ConnectionState) {
        let current = *self.state.borrow();
        if current == target {
            return;
        }
        match current.transition_to(target) {
            Ok(next) => {
                tracing::debug!(from = %current, to = %next, "Connection state changed");
                self.state.send_replace(next);
            }
            Err(e) => tracing::warn!(error = %e, "Rejected connection state change"),
        }
    }
}

/// Room join/leave payload. The client historically sent `userId` while the
/// server reads `user_id`; both are sent.
fn room_event(name: &str, identity: &Identity) -> OutboundEvent {
    let user_id = identity.user_id.as_str();
    OutboundEvent::new(name, json!({ "userId": user_id, "user_id": user_id }))
}
