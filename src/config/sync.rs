//! Inbox reconciliation configuration

use serde::Deserialize;

use crate::domain::notification::ReadFailurePolicy;

/// Inbox sync behaviour
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    /// What happens to an optimistic read when the server rejects it
    #[serde(default)]
    pub read_failure_policy: ReadFailurePolicy,
}
