//! Aggregate synchronization state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::outbox::OutboxItem;

/// Where the sync layer stands after the most recent transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Every eligible outbox entry has been confirmed.
    Synced,
    /// A drain pass is in flight.
    Syncing,
    /// Network simulation is disabled; nothing is sent.
    #[default]
    Offline,
    /// The last pass ended with failures still pending.
    Error,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Synced => write!(f, "synced"),
            Self::Syncing => write!(f, "syncing"),
            Self::Offline => write!(f, "offline"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Point-in-time view of the sync layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Current status.
    pub status: SyncStatus,
    /// Pending entries in FIFO order.
    pub outbox: Vec<OutboxItem>,
    /// When the queue was last fully drained.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Aggregate error from the most recent pass, if any.
    pub error: Option<String>,
}

impl SyncState {
    /// Short badge text: the status plus the pending count when non-zero.
    #[must_use]
    pub fn badge(&self) -> String {
        if self.outbox.is_empty() {
            self.status.to_string()
        } else {
            format!("{} ({})", self.status, self.outbox.len())
        }
    }
}
