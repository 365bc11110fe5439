//! Scripted push transport for testing.
//!
//! Tests decide whether each connection attempt succeeds, inject server
//! events into the open channel, drop the connection on demand and inspect
//! everything the client emitted.
//!
//! # Example
//!
//! ```ignore
//! let transport = ScriptedPushTransport::new();
//! transport.refuse_next(2);
//! // ... manager connects, fails twice, then succeeds
//! transport.push("new_notification", json!({ "id": 1, "type": "MENTION" }));
//! transport.drop_connection("transport close");
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::domain::foundation::{Identity, UserId};
use crate::ports::{InboundEvent, OutboundEvent, PushChannel, PushTransport, TransportError};

enum Signal {
    Event(InboundEvent),
    Drop(String),
}

#[derive(Default)]
struct ScriptState {
    outcomes: VecDeque<TransportError>,
    refuse_all: Option<TransportError>,
    attempts: Vec<(UserId, Instant)>,
    emitted: Vec<OutboundEvent>,
    current: Option<mpsc::UnboundedSender<Signal>>,
    closes: usize,
}

/// PushTransport driven by the test.
#[derive(Clone, Default)]
pub struct ScriptedPushTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedPushTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses the next `count` connection attempts.
    pub fn refuse_next(&self, count: usize) {
        let mut state = self.lock();
        for _ in 0..count {
            state
                .outcomes
                .push_back(TransportError::Connect("connection refused".to_string()));
        }
    }

    /// Fails the next attempt with a specific error.
    pub fn fail_next_with(&self, error: TransportError) {
        self.lock().outcomes.push_back(error);
    }

    /// Refuses every attempt until `accept_connections` is called.
    pub fn refuse_all(&self) {
        self.lock().refuse_all = Some(TransportError::Connect("server unreachable".to_string()));
    }

    /// Lets attempts succeed again.
    pub fn accept_connections(&self) {
        let mut state = self.lock();
        state.refuse_all = None;
        state.outcomes.clear();
    }

    /// Delivers a server event on the open channel. Returns false if no
    /// channel is open.
    pub fn push(&self, name: &str, payload: Value) -> bool {
        self.send(Signal::Event(InboundEvent::new(name, payload)))
    }

    /// Ends the open channel as if the network dropped it.
    pub fn drop_connection(&self, reason: &str) -> bool {
        let sent = self.send(Signal::Drop(reason.to_string()));
        self.lock().current = None;
        sent
    }

    /// Number of connection attempts so far.
    pub fn attempts(&self) -> usize {
        self.lock().attempts.len()
    }

    /// Users each attempt was made for, in order.
    pub fn attempted_users(&self) -> Vec<UserId> {
        self.lock().attempts.iter().map(|(user, _)| user.clone()).collect()
    }

    /// When each attempt was made, on the tokio clock.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.lock().attempts.iter().map(|(_, at)| *at).collect()
    }

    /// Everything the client emitted, in order.
    pub fn emitted(&self) -> Vec<OutboundEvent> {
        self.lock().emitted.clone()
    }

    /// Emitted events with the given name.
    pub fn emitted_named(&self, name: &str) -> Vec<OutboundEvent> {
        self.lock()
            .emitted
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    /// Number of channels the client closed.
    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// True while a channel is open.
    pub fn is_open(&self) -> bool {
        self.lock()
            .current
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    fn send(&self, signal: Signal) -> bool {
        match self.lock().current.as_ref() {
            Some(tx) => tx.send(signal).is_ok(),
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PushTransport for ScriptedPushTransport {
    async fn open(&self, identity: &Identity) -> Result<Box<dyn PushChannel>, TransportError> {
        let mut state = self.lock();
        state.attempts.push((identity.user_id.clone(), Instant::now()));

        if let Some(err) = state.outcomes.pop_front() {
            return Err(err);
        }
        if let Some(err) = state.refuse_all.clone() {
            return Err(err);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.current = Some(tx);
        Ok(Box::new(ScriptedChannel {
            rx,
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct ScriptedChannel {
    rx: mpsc::UnboundedReceiver<Signal>,
    state: Arc<Mutex<ScriptState>>,
    closed: bool,
}

impl ScriptedChannel {
    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PushChannel for ScriptedChannel {
    async fn emit(&mut self, event: OutboundEvent) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Send("channel closed".to_string()));
        }
        self.lock().emitted.push(event);
        Ok(())
    }

    async fn next_event(&mut self) -> Result<InboundEvent, TransportError> {
        if self.closed {
            return Err(TransportError::Closed("channel closed".to_string()));
        }
        match self.rx.recv().await {
            Some(Signal::Event(event)) => Ok(event),
            Some(Signal::Drop(reason)) => Err(TransportError::Closed(reason)),
            None => Err(TransportError::Closed("transport dropped".to_string())),
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.rx.close();
        self.lock().closes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity() -> Identity {
        Identity::new(UserId::new("1").unwrap(), "t")
    }

    #[tokio::test]
    async fn refused_attempts_then_success() {
        let transport = ScriptedPushTransport::new();
        transport.refuse_next(1);

        assert!(transport.open(&identity()).await.is_err());
        assert!(transport.open(&identity()).await.is_ok());
        assert_eq!(transport.attempts(), 2);
    }

    #[tokio::test]
    async fn pushes_reach_the_open_channel_in_order() {
        let transport = ScriptedPushTransport::new();
        let mut channel = transport.open(&identity()).await.unwrap();

        assert!(transport.push("a", json!(1)));
        assert!(transport.push("b", json!(2)));

        assert_eq!(channel.next_event().await.unwrap().name, "a");
        assert_eq!(channel.next_event().await.unwrap().name, "b");
    }

    #[tokio::test]
    async fn drop_connection_ends_the_channel() {
        let transport = ScriptedPushTransport::new();
        let mut channel = transport.open(&identity()).await.unwrap();

        transport.drop_connection("ping timeout");
        assert_eq!(
            channel.next_event().await,
            Err(TransportError::Closed("ping timeout".into()))
        );
        assert!(!transport.push("late", json!(null)));
    }

    #[tokio::test]
    async fn emits_are_recorded_and_close_is_idempotent() {
        let transport = ScriptedPushTransport::new();
        let mut channel = transport.open(&identity()).await.unwrap();

        channel.emit(OutboundEvent::new("join_user_room", json!({ "userId": "1" }))).await.unwrap();
        channel.close().await;
        channel.close().await;

        assert_eq!(transport.emitted_named("join_user_room").len(), 1);
        assert_eq!(transport.closes(), 1);
        assert!(channel.emit(OutboundEvent::new("x", json!(null))).await.is_err());
    }
}
