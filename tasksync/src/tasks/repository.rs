//! In-memory task collection with write-behind persistence.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_lot::RwLock;
use tasksync_proto::task::{NewTask, Task, TaskId, TaskPatch, TaskPriority, TaskStatus};

use super::merge::merge_task_list;
use super::query::{TaskFilters, TaskStats, filter_tasks};
use crate::storage::{KvStore, PersistWriter, get_json, keys};

/// Owns the local task list.
///
/// Mutations are synchronous: they update memory, then hand a snapshot of
/// the whole collection to the [`PersistWriter`] while still holding the
/// lock, so persisted snapshots follow mutation order. The repository never
/// touches the outbox; pairing a mutation with an enqueue is the caller's job.
pub struct TaskRepository<S: KvStore + 'static> {
    tasks: RwLock<Vec<Task>>,
    writer: Arc<PersistWriter<S>>,
}

impl<S: KvStore + 'static> TaskRepository<S> {
    /// Creates an empty repository that persists through `writer`.
    #[must_use]
    pub fn new(writer: Arc<PersistWriter<S>>) -> Self {
        Self {
            tasks: RwLock::new(Vec::new()),
            writer,
        }
    }

    /// Replaces the in-memory collection with the stored one.
    ///
    /// A missing or unreadable collection loads as empty.
    pub async fn load(&self) -> usize {
        let stored: Vec<Task> = get_json(self.writer.store().as_ref(), keys::TASKS, Vec::new()).await;
        let count = stored.len();
        *self.tasks.write() = stored;
        tracing::debug!(count, "loaded tasks");
        count
    }

    /// Creates a task from `new` and inserts it at the front of the list.
    pub fn create(&self, new: NewTask) -> Task {
        let task = Task::from_new(new, Utc::now());
        let mut tasks = self.tasks.write();
        tasks.insert(0, task.clone());
        self.persist(&tasks);
        task
    }

    /// Applies `patch` to the task with `id`.
    ///
    /// `updated_at` moves to now, and always strictly past its previous
    /// value, even when that value lies in the future. The patch's own `updated_at`, `id`, and `created_at` are ignored. Returns
    /// the updated task, or `None` if no task has that id.
    pub fn update(&self, id: &TaskId, patch: &TaskPatch) -> Option<Task> {
        let mut tasks = self.tasks.write();
        let task = tasks.iter_mut().find(|t| &t.id == id)?;
        let stamp = Utc::now().max(task.updated_at + Duration::microseconds(1));
        let patch = TaskPatch {
            id: None,
            created_at: None,
            ..patch.clone()
        }
        .stamped(stamp);
        patch.apply_to(task);
        let updated = task.clone();
        self.persist(&tasks);
        Some(updated)
    }

    /// Removes the task with `id`. Returns `true` if it existed.
    pub fn delete(&self, id: &TaskId) -> bool {
        let mut tasks = self.tasks.write();
        let before = tasks.len();
        tasks.retain(|t| &t.id != id);
        let removed = tasks.len() != before;
        if removed {
            self.persist(&tasks);
        }
        removed
    }

    /// Returns a copy of the task with `id`.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.tasks.read().iter().find(|t| &t.id == id).cloned()
    }

    /// Finds a task whose id starts with `prefix`.
    ///
    /// Returns `None` if no task or more than one task matches.
    #[must_use]
    pub fn find_by_prefix(&self, prefix: &str) -> Option<Task> {
        let tasks = self.tasks.read();
        let mut matches = tasks.iter().filter(|t| t.id.as_str().starts_with(prefix));
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first.clone())
    }

    /// Returns a copy of the whole collection in stored order.
    #[must_use]
    pub fn all(&self) -> Vec<Task> {
        self.tasks.read().clone()
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    /// Returns `true` if there are no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// Replaces the whole collection.
    pub fn replace_all(&self, replacement: Vec<Task>) {
        let mut tasks = self.tasks.write();
        *tasks = replacement;
        self.persist(&tasks);
    }

    /// Removes every task.
    pub fn clear(&self) {
        self.replace_all(Vec::new());
    }

    /// Folds a remote snapshot into the local collection.
    ///
    /// Tasks in `pinned` (those with unconfirmed local changes) are left
    /// alone. Returns the number of local records inserted or replaced.
    pub fn merge_remote(&self, remote: &[Task], pinned: &HashSet<TaskId>) -> usize {
        let mut tasks = self.tasks.write();
        let changed = merge_task_list(&mut tasks, remote, pinned);
        if changed > 0 {
            self.persist(&tasks);
        }
        changed
    }

    /// Replaces the collection with five sample tasks.
    pub fn seed_demo_data(&self) -> usize {
        let demo = demo_tasks();
        let count = demo.len();
        self.replace_all(demo);
        count
    }

    /// Returns the tasks matching `filters`, in display order.
    #[must_use]
    pub fn query(&self, filters: &TaskFilters) -> Vec<Task> {
        filter_tasks(&self.tasks.read(), filters)
    }

    /// Counts tasks per status and priority.
    #[must_use]
    pub fn stats(&self) -> TaskStats {
        TaskStats::of(&self.tasks.read())
    }

    fn persist(&self, tasks: &[Task]) {
        self.writer.persist(keys::TASKS, tasks);
    }
}

fn demo_tasks() -> Vec<Task> {
    let now = Utc::now();
    let days = Duration::days;
    let sample = |title: &str,
                  description: &str,
                  status: TaskStatus,
                  priority: TaskPriority,
                  due_in: Option<i64>,
                  created_ago: i64,
                  updated_ago: i64| Task {
        id: TaskId::new(),
        title: title.to_string(),
        description: description.to_string(),
        status,
        priority,
        due_date: due_in.map(|d| now + days(d)),
        created_at: now - days(created_ago),
        updated_at: now - days(updated_ago),
    };
    vec![
        sample(
            "Complete project proposal",
            "Write and submit the Q4 project proposal to stakeholders",
            TaskStatus::InProgress,
            TaskPriority::High,
            Some(2),
            3,
            0,
        ),
        sample(
            "Review code changes",
            "Review pull requests from team members",
            TaskStatus::Pending,
            TaskPriority::Medium,
            Some(1),
            1,
            0,
        ),
        sample(
            "Update documentation",
            "Add API documentation for new endpoints",
            TaskStatus::Pending,
            TaskPriority::Low,
            None,
            5,
            0,
        ),
        sample(
            "Fix login bug",
            "Users report intermittent login failures",
            TaskStatus::Completed,
            TaskPriority::High,
            None,
            7,
            2,
        ),
        sample(
            "Team standup notes",
            "Prepare notes for weekly standup",
            TaskStatus::Completed,
            TaskPriority::Low,
            None,
            4,
            3,
        ),
    ]
}
