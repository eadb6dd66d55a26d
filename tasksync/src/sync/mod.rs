//! Outbox drain and sync status tracking.
//!
//! The [`SyncManager`] sends pending outbox entries to an [`ApiClient`] in
//! FIFO order and derives the aggregate [`SyncStatus`] from the outcome.
//!
//! A drain pass:
//! 1. offline (network simulation off): status `offline`, nothing touched;
//! 2. empty queue: status `synced`, `last_sync_time` stamped, no remote call;
//! 3. otherwise status `syncing`, then each entry below [`MAX_RETRIES`] is
//!    applied remotely. Success removes it, failure bumps its retry count.
//!    The pass never stops early.
//!
//! A pass that starts with a non-empty queue always ends in `synced` or
//! `error`. Only one pass runs at a time; a trigger that arrives while one
//! is in flight is dropped and reported as [`DrainOutcome::AlreadyRunning`].
//! The manager has no timer: every pass is started by an explicit trigger.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tasksync_proto::outbox::OutboxItem;
use tasksync_proto::sync::{SyncState, SyncStatus};

use crate::api::{ApiClient, ApiError};
use crate::app::AppState;
use crate::storage::{KvStore, get_json, keys};

/// Failed attempts after which an entry is no longer sent automatically.
pub const MAX_RETRIES: u32 = 3;

/// Result of asking for a drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The pass ran to completion.
    Completed(DrainReport),
    /// Another pass was already in flight; nothing was done.
    AlreadyRunning,
}

impl DrainOutcome {
    /// The status the pass ended in, if it ran.
    #[must_use]
    pub const fn status(&self) -> Option<SyncStatus> {
        match self {
            Self::Completed(report) => Some(report.status),
            Self::AlreadyRunning => None,
        }
    }
}

/// Counters for one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Status at the end of the pass.
    pub status: SyncStatus,
    /// Entries confirmed and removed.
    pub applied: usize,
    /// Entries whose send failed.
    pub failed: usize,
    /// Entries skipped because they were already at the retry ceiling.
    pub skipped: usize,
    /// Entries that reached the retry ceiling during this pass.
    pub exhausted: usize,
}

impl DrainReport {
    const fn ended(status: SyncStatus) -> Self {
        Self {
            status,
            applied: 0,
            failed: 0,
            skipped: 0,
            exhausted: 0,
        }
    }
}

#[derive(Debug, Default)]
struct SyncMeta {
    status: SyncStatus,
    last_sync_time: Option<DateTime<Utc>>,
    error: Option<String>,
}

/// Drains the outbox against an [`ApiClient`] and owns the sync status.
pub struct SyncManager<S: KvStore + 'static, C: ApiClient> {
    state: Arc<AppState<S>>,
    client: C,
    meta: Mutex<SyncMeta>,
    drain_lock: tokio::sync::Mutex<()>,
}

impl<S: KvStore + 'static, C: ApiClient> SyncManager<S, C> {
    /// Creates a manager over `state` that sends through `client`.
    pub fn new(state: Arc<AppState<S>>, client: C) -> Self {
        Self {
            state,
            client,
            meta: Mutex::new(SyncMeta::default()),
            drain_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The client this manager sends through.
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// Restores `last_sync_time` from storage.
    pub async fn load(&self) {
        let last: Option<DateTime<Utc>> =
            get_json(self.state.store.as_ref(), keys::LAST_SYNC, None).await;
        self.meta.lock().last_sync_time = last;
    }

    /// Snapshot of the aggregate sync state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        let meta = self.meta.lock();
        SyncState {
            status: meta.status,
            outbox: self.state.outbox.snapshot(),
            last_sync_time: meta.last_sync_time,
            error: meta.error.clone(),
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.meta.lock().status
    }

    /// Number of entries in the outbox, exhausted ones included.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.outbox.len()
    }

    /// Marks the sync layer offline after the network was switched off.
    pub fn go_offline(&self) {
        self.meta.lock().status = SyncStatus::Offline;
        tracing::info!("sync offline");
    }

    /// Forgets status, error, and last sync time.
    pub fn reset(&self) {
        *self.meta.lock() = SyncMeta::default();
    }

    /// Purges every entry at the retry ceiling.
    ///
    /// Returns the number of entries removed.
    pub fn clear_failed(&self) -> usize {
        let removed = self.state.outbox.clear_expired(MAX_RETRIES);
        if removed > 0 {
            tracing::info!(removed, "cleared exhausted outbox entries");
        }
        removed
    }

    /// Runs one drain pass unless one is already in flight.
    pub async fn drain(&self) -> DrainOutcome {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            tracing::debug!("drain already in flight, trigger ignored");
            return DrainOutcome::AlreadyRunning;
        };
        DrainOutcome::Completed(self.run_pass().await)
    }

    async fn run_pass(&self) -> DrainReport {
        if !self.state.settings.is_online() {
            self.meta.lock().status = SyncStatus::Offline;
            tracing::info!(pending = self.state.outbox.len(), "offline, drain skipped");
            return DrainReport::ended(SyncStatus::Offline);
        }

        if self.state.outbox.is_empty() {
            self.mark_synced();
            tracing::info!("outbox empty, synced");
            return DrainReport::ended(SyncStatus::Synced);
        }

        {
            let mut meta = self.meta.lock();
            meta.status = SyncStatus::Syncing;
            meta.error = None;
        }

        let mut report = DrainReport::ended(SyncStatus::Syncing);
        // The cursor walks the live queue, so entries enqueued mid-pass are
        // sent in this pass after everything that was ahead of them. A
        // confirmed entry is removed in place, so the cursor only advances
        // past entries that stay.
        let mut cursor = 0;
        while let Some(item) = self.state.outbox.get_at(cursor) {
            if item.is_exhausted(MAX_RETRIES) {
                report.skipped += 1;
                cursor += 1;
                continue;
            }
            match self.client.apply_change(&item).await {
                Ok(_) => {
                    self.state.outbox.remove(&item.id);
                    report.applied += 1;
                    tracing::debug!(
                        item_id = %item.id,
                        operation = %item.operation,
                        task_id = %item.task_id,
                        "outbox entry applied"
                    );
                }
                Err(err) => {
                    cursor += 1;
                    report.failed += 1;
                    if self.record_failure(&item, &err) {
                        report.exhausted += 1;
                    }
                }
            }
        }

        let remaining = self.state.outbox.eligible_count(MAX_RETRIES);
        if remaining == 0 {
            self.mark_synced();
        } else if report.failed > 0 {
            self.meta.lock().status = SyncStatus::Error;
        }
        report.status = self.status();
        tracing::info!(
            status = %report.status,
            applied = report.applied,
            failed = report.failed,
            skipped = report.skipped,
            remaining,
            "drain pass finished"
        );
        report
    }

    /// Bumps the entry's retry count. Returns `true` if this failure took it
    /// to the ceiling, in which case the aggregate error is set.
    fn record_failure(&self, item: &OutboxItem, err: &ApiError) -> bool {
        self.state.outbox.increment_retry(&item.id);
        if item.retry_count + 1 >= MAX_RETRIES {
            let message = format!(
                "Failed to sync: {} {}...",
                item.operation,
                item.task_id.short(8)
            );
            tracing::warn!(
                item_id = %item.id,
                task_id = %item.task_id,
                error = %err,
                "outbox entry reached retry ceiling"
            );
            let mut meta = self.meta.lock();
            meta.error = Some(message);
            meta.status = SyncStatus::Error;
            true
        } else {
            tracing::debug!(
                item_id = %item.id,
                retry = item.retry_count + 1,
                error = %err,
                "outbox entry failed, will retry"
            );
            false
        }
    }

    fn mark_synced(&self) {
        let now = Utc::now();
        {
            let mut meta = self.meta.lock();
            meta.status = SyncStatus::Synced;
            meta.last_sync_time = Some(now);
        }
        self.state.writer.persist(keys::LAST_SYNC, &now);
    }

    /// Overwrites the remote collection with the local one.
    ///
    /// Used for the initial sync. Returns `Ok(false)` without calling the
    /// client while offline.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the push fails.
    pub async fn bootstrap_push(&self) -> Result<bool, ApiError> {
        if !self.state.settings.is_online() {
            return Ok(false);
        }
        let tasks = self.state.tasks.all();
        self.client.push_all_tasks(&tasks).await?;
        tracing::info!(count = tasks.len(), "bootstrap push complete");
        Ok(true)
    }

    /// Fetches the remote collection and folds it into the local one.
    ///
    /// Tasks with unconfirmed local changes keep their local version; tasks
    /// that exist only locally are kept. Returns `Ok(None)` without calling
    /// the client while offline, otherwise the number of local records
    /// inserted or replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the fetch fails.
    pub async fn pull_remote(&self) -> Result<Option<usize>, ApiError> {
        if !self.state.settings.is_online() {
            return Ok(None);
        }
        let remote = self.client.fetch_all_tasks().await?;
        let pinned = self.state.outbox.pending_task_ids();
        let changed = self.state.tasks.merge_remote(&remote, &pinned);
        tracing::info!(fetched = remote.len(), changed, "pulled remote tasks");
        Ok(Some(changed))
    }
}
