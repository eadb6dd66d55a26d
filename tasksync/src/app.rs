//! Application state and user-facing actions.
//!
//! [`AppState`] is the explicit handle to every locally owned resource; it
//! is shared by `Arc` with the sync manager instead of living in a global.
//! [`App`] is the action surface: each task mutation is paired with exactly
//! one outbox entry, and every sync trigger funnels into the same drain.

use std::sync::Arc;

use tasksync_proto::outbox::Operation;
use tasksync_proto::settings::{Settings, SettingsUpdate};
use tasksync_proto::task::{NewTask, Task, TaskId, TaskPatch, TaskStatus};

use crate::api::{ApiClient, ApiError};
use crate::outbox::OutboxQueue;
use crate::settings::SettingsStore;
use crate::storage::{self, KvStore, PersistWriter, StoreError};
use crate::sync::{DrainOutcome, SyncManager};
use crate::tasks::{TaskError, TaskRepository};

/// Every locally owned resource, behind one handle.
///
/// Mutations are synchronous, but their persistence runs on the current
/// Tokio runtime. Writes issued with no runtime available are dropped and
/// counted by the [`PersistWriter`]; in-memory state still changes.
pub struct AppState<S: KvStore + 'static> {
    /// Backing store (reads, bulk clears).
    pub store: Arc<S>,
    /// Ordered write-behind persistence shared by the owners below.
    pub writer: Arc<PersistWriter<S>>,
    /// Local task collection.
    pub tasks: TaskRepository<S>,
    /// Pending mutations.
    pub outbox: OutboxQueue<S>,
    /// User settings.
    pub settings: SettingsStore<S>,
}

impl<S: KvStore + 'static> AppState<S> {
    /// Creates empty state over `store`. Call [`load`](Self::load) to hydrate.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        let writer = Arc::new(PersistWriter::new(Arc::clone(&store)));
        Self {
            tasks: TaskRepository::new(Arc::clone(&writer)),
            outbox: OutboxQueue::new(Arc::clone(&writer)),
            settings: SettingsStore::new(Arc::clone(&writer)),
            store,
            writer,
        }
    }

    /// Hydrates tasks, outbox, and settings from the store.
    pub async fn load(&self) -> Settings {
        let tasks = self.tasks.load().await;
        let pending = self.outbox.load().await;
        let settings = self.settings.load().await;
        tracing::info!(tasks, pending, online = settings.simulate_network, "state loaded");
        settings
    }

    /// Waits for every queued write to land.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }
}

/// Result of a settings change.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsChange {
    /// Settings after the change.
    pub settings: Settings,
    /// The drain triggered by switching the network on, if any.
    pub drain: Option<DrainOutcome>,
}

/// Result of a pull-to-refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    /// Outcome of the drain that ran first.
    pub drain: DrainOutcome,
    /// Local records changed by the pull; `None` while offline.
    pub pulled: Option<usize>,
}

/// User-facing actions over an [`AppState`] and a [`SyncManager`].
///
/// Task actions are synchronous and should be called from inside a Tokio
/// runtime so their writes reach the store; see [`AppState`].
pub struct App<S: KvStore + 'static, C: ApiClient> {
    state: Arc<AppState<S>>,
    sync: SyncManager<S, C>,
}

impl<S: KvStore + 'static, C: ApiClient> App<S, C> {
    /// Creates the action surface over `state`, sending through `client`.
    pub fn new(state: Arc<AppState<S>>, client: C) -> Self {
        let sync = SyncManager::new(Arc::clone(&state), client);
        Self { state, sync }
    }

    /// The shared state handle.
    pub const fn state(&self) -> &Arc<AppState<S>> {
        &self.state
    }

    /// The sync manager.
    pub const fn sync(&self) -> &SyncManager<S, C> {
        &self.sync
    }

    /// Loads persisted state, then [`attach`](Self::attach)es and runs the
    /// startup drain.
    pub async fn start(&self) -> DrainOutcome {
        self.state.load().await;
        self.attach().await;
        self.sync.drain().await
    }

    /// Restores sync metadata and applies the current settings to the
    /// client, for state that was loaded separately.
    pub async fn attach(&self) {
        self.sync.load().await;
        self.sync.client().configure(&self.state.settings.get());
    }

    /// Creates a task and enqueues a `create` carrying the full record.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TitleEmpty`] if the title is blank.
    pub fn create_task(&self, mut new: NewTask) -> Result<Task, TaskError> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(TaskError::TitleEmpty);
        }
        new.title = title.to_string();
        let task = self.state.tasks.create(new);
        self.state
            .outbox
            .enqueue(Operation::Create, task.id.clone(), Some(task.to_patch()));
        Ok(task)
    }

    /// Edits a task and enqueues an `update` carrying the changed fields
    /// stamped with the new `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TitleEmpty`] if the patch blanks the title, or
    /// [`TaskError::TaskNotFound`] if no task has `id`. Nothing is enqueued
    /// on error.
    pub fn edit_task(&self, id: &TaskId, mut patch: TaskPatch) -> Result<Task, TaskError> {
        if let Some(title) = &patch.title {
            let trimmed = title.trim();
            if trimmed.is_empty() {
                return Err(TaskError::TitleEmpty);
            }
            patch.title = Some(trimmed.to_string());
        }
        let updated = self
            .state
            .tasks
            .update(id, &patch)
            .ok_or_else(|| TaskError::TaskNotFound(id.to_string()))?;
        let payload = TaskPatch {
            id: None,
            created_at: None,
            ..patch
        }
        .stamped(updated.updated_at);
        self.state
            .outbox
            .enqueue(Operation::Update, id.clone(), Some(payload));
        Ok(updated)
    }

    /// Sets a task's status.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] if no task has `id`.
    pub fn set_status(&self, id: &TaskId, status: TaskStatus) -> Result<Task, TaskError> {
        self.edit_task(
            id,
            TaskPatch {
                status: Some(status),
                ..TaskPatch::default()
            },
        )
    }

    /// Deletes a task and enqueues a `delete`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] if no task has `id`; nothing is
    /// enqueued then.
    pub fn remove_task(&self, id: &TaskId) -> Result<(), TaskError> {
        if !self.state.tasks.delete(id) {
            return Err(TaskError::TaskNotFound(id.to_string()));
        }
        self.state.outbox.enqueue(Operation::Delete, id.clone(), None);
        Ok(())
    }

    /// Explicit "sync now".
    pub async fn sync_now(&self) -> DrainOutcome {
        self.sync.drain().await
    }

    /// Pull-to-refresh: drain the outbox, then fold in the remote
    /// collection.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the fetch fails.
    pub async fn refresh(&self) -> Result<RefreshReport, ApiError> {
        let drain = self.sync.drain().await;
        let pulled = self.sync.pull_remote().await?;
        Ok(RefreshReport { drain, pulled })
    }

    /// Applies a settings change.
    ///
    /// The client picks up latency and failure-rate changes. Switching the
    /// network from off to on triggers a drain; switching it off marks the
    /// sync layer offline.
    pub async fn update_settings(&self, update: &SettingsUpdate) -> SettingsChange {
        let was_online = self.state.settings.is_online();
        let settings = self.state.settings.update(update);
        self.settings_changed(was_online, settings).await
    }

    /// Switches network simulation on or off.
    pub async fn set_network(&self, online: bool) -> SettingsChange {
        self.update_settings(&SettingsUpdate {
            simulate_network: Some(online),
            ..SettingsUpdate::default()
        })
        .await
    }

    /// Flips network simulation.
    pub async fn toggle_network(&self) -> SettingsChange {
        let settings = self.state.settings.toggle_network();
        self.settings_changed(!settings.simulate_network, settings).await
    }

    async fn settings_changed(&self, was_online: bool, settings: Settings) -> SettingsChange {
        self.sync.client().configure(&settings);
        let drain = match (was_online, settings.simulate_network) {
            (false, true) => Some(self.sync.drain().await),
            (true, false) => {
                self.sync.go_offline();
                None
            }
            _ => None,
        };
        SettingsChange { settings, drain }
    }

    /// Replaces local tasks with sample data. Nothing is enqueued.
    pub fn seed_demo_data(&self) -> usize {
        self.state.tasks.seed_demo_data()
    }

    /// Pushes the whole local collection to the remote side.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the push fails.
    pub async fn bootstrap(&self) -> Result<bool, ApiError> {
        self.sync.bootstrap_push().await
    }

    /// Purges outbox entries that reached the retry ceiling.
    pub fn clear_failed(&self) -> usize {
        self.sync.clear_failed()
    }

    /// Wipes tasks, outbox, settings, sync metadata, and the remote
    /// collection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a stored key cannot be removed.
    pub async fn reset_all_data(&self) -> Result<(), StoreError> {
        self.state.tasks.clear();
        self.state.outbox.clear();
        self.state.settings.reset();
        self.sync.reset();
        self.state.flush().await;
        let local = storage::clear_local_data(self.state.store.as_ref()).await?;
        let remote = storage::clear_remote_data(self.state.store.as_ref()).await?;
        self.sync.client().configure(&self.state.settings.get());
        tracing::info!(local, remote, "all data cleared");
        Ok(())
    }
}
