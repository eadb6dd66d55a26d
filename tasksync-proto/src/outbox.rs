//! Outbox entry types.
//!
//! An [`OutboxItem`] records one local mutation that has not yet been
//! confirmed by the remote side. Items are immutable apart from the retry
//! counter, which is bumped by replacing the item with a modified copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::{TaskId, TaskPatch};

/// Unique identifier for an outbox entry (UUID v7 string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboxId(String);

impl OutboxId {
    /// Creates a new time-ordered entry identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the string form of this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OutboxId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for OutboxId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for OutboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of mutation an outbox entry carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// A new task; the payload holds the full record.
    Create,
    /// A partial edit; the payload holds the changed fields.
    Update,
    /// Removal; no payload.
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One pending local mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxItem {
    /// Unique per queue entry.
    pub id: OutboxId,
    /// Mutation kind.
    pub operation: Operation,
    /// The task this mutation targets (lookup only, not ownership).
    pub task_id: TaskId,
    /// Changed fields; `None` only for deletes.
    pub payload: Option<TaskPatch>,
    /// Enqueue time.
    pub timestamp: DateTime<Utc>,
    /// Number of failed send attempts so far.
    #[serde(default)]
    pub retry_count: u32,
}

impl OutboxItem {
    /// Creates a fresh entry with `retry_count = 0`.
    #[must_use]
    pub fn new(
        operation: Operation,
        task_id: TaskId,
        payload: Option<TaskPatch>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OutboxId::new(),
            operation,
            task_id,
            payload,
            timestamp,
            retry_count: 0,
        }
    }

    /// Returns a copy with the retry counter incremented by one.
    #[must_use]
    pub fn with_retry(&self) -> Self {
        Self {
            retry_count: self.retry_count.saturating_add(1),
            ..self.clone()
        }
    }

    /// Returns `true` if this entry has used up its retry budget.
    #[must_use]
    pub const fn is_exhausted(&self, max_retries: u32) -> bool {
        self.retry_count >= max_retries
    }
}
