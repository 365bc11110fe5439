//! Push connection lifecycle and reconnection schedule.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::domain::foundation::StateMachine;

/// Lifecycle of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No channel and no retry pending.
    Disconnected,

    /// An attempt to open the channel is in progress.
    Connecting,

    /// Channel open and the user room joined.
    Connected,

    /// Waiting for the next reconnect timer to fire.
    Reconnecting,

    /// Retry budget exhausted. Only an explicit connect leaves this state.
    GivenUp,
}

impl ConnectionState {
    /// True only while pushes can arrive.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::GivenUp => "given_up",
        };
        write!(f, "{}", s)
    }
}

impl StateMachine for ConnectionState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ConnectionState::*;
        matches!(
            (self, target),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Reconnecting)
                | (Connected, Reconnecting)
                | (Reconnecting, Connecting)
                | (Reconnecting, GivenUp)
                | (GivenUp, Connecting)
                // explicit disconnect
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
                | (Reconnecting, Disconnected)
                | (GivenUp, Disconnected)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ConnectionState::*;
        match self {
            Disconnected => vec![Connecting],
            Connecting => vec![Connected, Reconnecting, Disconnected],
            Connected => vec![Reconnecting, Disconnected],
            Reconnecting => vec![Connecting, GivenUp, Disconnected],
            GivenUp => vec![Connecting, Disconnected],
        }
    }
}

/// Linear reconnection schedule: attempt `n` waits `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay before retry number `attempt` (1-based), or `None` once the
    /// budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.base_delay * attempt)
    }

    /// The full schedule, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_attempts).filter_map(|n| self.delay_for(n)).collect()
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(1_000), 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_is_linear_and_bounded() {
        let millis: Vec<u128> = ReconnectPolicy::default()
            .schedule()
            .iter()
            .map(Duration::as_millis)
            .collect();
        assert_eq!(millis, vec![1000, 2000, 3000, 4000, 5000]);
    }

    #[test]
    fn delay_for_outside_budget_is_none() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(0), None);
        assert_eq!(policy.delay_for(6), None);
    }

    #[test]
    fn zero_attempt_budget_never_retries() {
        assert!(ReconnectPolicy::new(Duration::from_millis(10), 0).schedule().is_empty());
    }

    #[test]
    fn given_up_only_reachable_from_reconnecting() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ] {
            assert!(state.transition_to(ConnectionState::GivenUp).is_err());
        }
        assert!(ConnectionState::Reconnecting
            .transition_to(ConnectionState::GivenUp)
            .is_ok());
    }

    #[test]
    fn every_state_can_be_disconnected_explicitly() {
        for state in [
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Reconnecting,
            ConnectionState::GivenUp,
        ] {
            assert!(state.can_transition_to(&ConnectionState::Disconnected));
        }
    }

    #[test]
    fn can_transition_to_is_consistent_with_valid_transitions() {
        use ConnectionState::*;
        for state in [Disconnected, Connecting, Connected, Reconnecting, GivenUp] {
            for target in state.valid_transitions() {
                assert!(state.can_transition_to(&target), "{:?} -> {:?}", state, target);
            }
            assert!(!state.is_terminal());
        }
    }

    #[test]
    fn only_connected_is_connected() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Reconnecting.is_connected());
        assert!(!ConnectionState::GivenUp.is_connected());
    }
}
