//! Durable queue of local mutations awaiting remote confirmation.
//!
//! The [`OutboxQueue`] is the only writer of outbox entries. Items leave the
//! queue in exactly two ways: a confirmed remote application
//! ([`OutboxQueue::remove`]) or a manual purge of exhausted entries
//! ([`OutboxQueue::clear_expired`]). The queue is persisted after every
//! change.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tasksync_proto::outbox::{Operation, OutboxId, OutboxItem};
use tasksync_proto::task::{TaskId, TaskPatch};

use crate::storage::{KvStore, PersistWriter, get_json, keys};

/// FIFO queue of [`OutboxItem`]s.
pub struct OutboxQueue<S: KvStore + 'static> {
    items: RwLock<Vec<OutboxItem>>,
    writer: Arc<PersistWriter<S>>,
}

impl<S: KvStore + 'static> OutboxQueue<S> {
    /// Creates an empty queue that persists through `writer`.
    #[must_use]
    pub fn new(writer: Arc<PersistWriter<S>>) -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            writer,
        }
    }

    /// Replaces the in-memory queue with the stored one.
    pub async fn load(&self) -> usize {
        let stored: Vec<OutboxItem> =
            get_json(self.writer.store().as_ref(), keys::OUTBOX, Vec::new()).await;
        let count = stored.len();
        *self.items.write() = stored;
        tracing::debug!(count, "loaded outbox");
        count
    }

    /// Appends a new entry with `retry_count = 0`.
    ///
    /// No deduplication: several entries for the same task coexist in
    /// order.
    pub fn enqueue(
        &self,
        operation: Operation,
        task_id: TaskId,
        payload: Option<TaskPatch>,
    ) -> OutboxItem {
        let item = OutboxItem::new(operation, task_id, payload, Utc::now());
        let mut items = self.items.write();
        items.push(item.clone());
        self.persist(&items);
        tracing::debug!(
            item_id = %item.id,
            operation = %item.operation,
            task_id = %item.task_id,
            pending = items.len(),
            "enqueued outbox entry"
        );
        item
    }

    /// Removes the entry with `id`. Returns `true` if it existed.
    pub fn remove(&self, id: &OutboxId) -> bool {
        let mut items = self.items.write();
        let Some(index) = items.iter().position(|i| &i.id == id) else {
            return false;
        };
        items.remove(index);
        self.persist(&items);
        true
    }

    /// Replaces the entry with `id` by a copy whose retry count is one
    /// higher.
    ///
    /// Returns the new retry count, or `None` if no entry has that id.
    pub fn increment_retry(&self, id: &OutboxId) -> Option<u32> {
        let mut items = self.items.write();
        let slot = items.iter_mut().find(|i| &i.id == id)?;
        *slot = slot.with_retry();
        let count = slot.retry_count;
        self.persist(&items);
        Some(count)
    }

    /// Removes every entry with `retry_count >= max_retries`.
    ///
    /// Returns the number of entries removed.
    pub fn clear_expired(&self, max_retries: u32) -> usize {
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|i| !i.is_exhausted(max_retries));
        let removed = before - items.len();
        if removed > 0 {
            self.persist(&items);
        }
        removed
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut items = self.items.write();
        items.clear();
        self.persist(&items);
    }

    /// Returns a copy of the queue in FIFO order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<OutboxItem> {
        self.items.read().clone()
    }

    /// Returns a copy of the entry at `index` in FIFO order.
    #[must_use]
    pub fn get_at(&self, index: usize) -> Option<OutboxItem> {
        self.items.read().get(index).cloned()
    }

    /// Returns a copy of the entry with `id`.
    #[must_use]
    pub fn get(&self, id: &OutboxId) -> Option<OutboxItem> {
        self.items.read().iter().find(|i| &i.id == id).cloned()
    }

    /// Number of entries, exhausted ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns `true` if the queue holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Number of entries still below the retry ceiling.
    #[must_use]
    pub fn eligible_count(&self, max_retries: u32) -> usize {
        self.items
            .read()
            .iter()
            .filter(|i| !i.is_exhausted(max_retries))
            .count()
    }

    /// Ids of every task with at least one pending entry.
    #[must_use]
    pub fn pending_task_ids(&self) -> HashSet<TaskId> {
        self.items.read().iter().map(|i| i.task_id.clone()).collect()
    }

    fn persist(&self, items: &[OutboxItem]) {
        self.writer.persist(keys::OUTBOX, items);
    }
}
