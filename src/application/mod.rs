//! Application layer - the sync services.
//!
//! Coordinates the ports: the push connection feeds the bridge, the bridge
//! and the polling fallback feed the inbox, and surfaces read from it.

pub mod connection_manager;
pub mod errors;
pub mod inbox;
pub mod polling;
pub mod push_bridge;
pub mod session;
pub mod surfaces;

pub use connection_manager::{ConnectionManager, ConnectionManagerConfig};
pub use errors::SyncError;
pub use inbox::{InboxSync, DEFAULT_PAGE_SIZE};
pub use polling::{LeaseKind, PollingFallback, PollingFallbackConfig, PollingLease, PollingStats};
pub use push_bridge::{BridgeStats, Normalized, PushEventBridge, SubscriptionId};
pub use session::{ApiFactory, SessionDeps, SessionSettings, SessionSupervisor, SyncSession};
pub use surfaces::{badge_label, Indicator, IndicatorView, Panel, PanelItem, PanelView};
