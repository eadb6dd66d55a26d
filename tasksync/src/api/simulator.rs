//! In-process stand-in for the remote server.
//!
//! The simulator keeps its own task collection under the remote key
//! namespace and is the conflict authority: every incoming change is
//! resolved against it with last-writer-wins on `updated_at`. Each
//! operation passes the [`NetworkLink`] first; a link failure leaves the
//! remote collection untouched.

use std::sync::Arc;

use tasksync_proto::outbox::{Operation, OutboxItem};
use tasksync_proto::settings::Settings;
use tasksync_proto::task::Task;
use tokio::sync::Mutex;

use super::link::{FlakyLink, NetworkConditions, NetworkLink};
use super::{ApiClient, ApiError};
use crate::storage::{self, KvStore, keys};
use crate::tasks::merge::merge_patch;

/// The simulated client used by the app: the simulator behind a
/// [`FlakyLink`].
pub type SimulatedClient<S> = RemoteSimulator<S, FlakyLink>;

/// Remote task collection with conflict resolution.
pub struct RemoteSimulator<S: KvStore, L: NetworkLink> {
    store: Arc<S>,
    link: L,
    /// Serializes read-modify-write cycles on the remote collection.
    lock: Mutex<()>,
}

impl<S: KvStore, L: NetworkLink> RemoteSimulator<S, L> {
    /// Creates a simulator storing its collection in `store`.
    pub fn new(store: Arc<S>, link: L) -> Self {
        Self {
            store,
            link,
            lock: Mutex::new(()),
        }
    }

    /// The link in front of this simulator.
    pub const fn link(&self) -> &L {
        &self.link
    }

    /// Removes the remote collection. Does not pass the link.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Storage`] if the delete fails.
    pub async fn clear(&self) -> Result<(), ApiError> {
        let _guard = self.lock.lock().await;
        self.store.delete(&remote_tasks_key()).await?;
        Ok(())
    }

    async fn read_collection(&self) -> Result<Vec<Task>, ApiError> {
        let tasks = storage::read_json(self.store.as_ref(), &remote_tasks_key()).await?;
        Ok(tasks.unwrap_or_default())
    }

    async fn write_collection(&self, tasks: &[Task]) -> Result<(), ApiError> {
        storage::set_json(self.store.as_ref(), &remote_tasks_key(), tasks).await?;
        Ok(())
    }
}

fn remote_tasks_key() -> String {
    keys::remote(keys::TASKS)
}

/// Applies one change to `tasks` and returns the resulting record.
///
/// A `create` for an id that already exists replaces the stored record
/// wholesale, `created_at` included, when its `updated_at` is strictly
/// newer; otherwise the stored record is kept. An `update` only touches the
/// fields its patch carries.
fn resolve_change(tasks: &mut Vec<Task>, item: &OutboxItem) -> Option<Task> {
    match item.operation {
        Operation::Create => {
            let incoming = item.payload.as_ref()?.to_task(&item.task_id)?;
            if let Some(existing) = tasks.iter_mut().find(|t| t.id == incoming.id) {
                let won = incoming.is_newer_than(existing);
                if won {
                    *existing = incoming.clone();
                }
                tracing::debug!(task_id = %item.task_id, won, "create conflict resolved");
                Some(existing.clone())
            } else {
                tasks.push(incoming.clone());
                Some(incoming)
            }
        }
        Operation::Update => {
            let existing = tasks.iter_mut().find(|t| t.id == item.task_id)?;
            if let Some(patch) = &item.payload {
                let won = merge_patch(existing, patch);
                tracing::debug!(task_id = %item.task_id, won, "update resolved");
            }
            Some(existing.clone())
        }
        Operation::Delete => {
            tasks.retain(|t| t.id != item.task_id);
            None
        }
    }
}

impl<S: KvStore, L: NetworkLink> ApiClient for RemoteSimulator<S, L> {
    async fn fetch_all_tasks(&self) -> Result<Vec<Task>, ApiError> {
        self.link.round_trip().await?;
        self.read_collection().await
    }

    async fn apply_change(&self, item: &OutboxItem) -> Result<Option<Task>, ApiError> {
        self.link.round_trip().await?;
        let _guard = self.lock.lock().await;
        let mut tasks = self.read_collection().await?;
        let result = resolve_change(&mut tasks, item);
        self.write_collection(&tasks).await?;
        Ok(result)
    }

    async fn push_all_tasks(&self, tasks: &[Task]) -> Result<(), ApiError> {
        self.link.round_trip().await?;
        let _guard = self.lock.lock().await;
        self.write_collection(tasks).await?;
        tracing::info!(count = tasks.len(), "remote collection overwritten");
        Ok(())
    }

    fn configure(&self, settings: &Settings) {
        self.link.configure(NetworkConditions::from_settings(settings));
    }
}
