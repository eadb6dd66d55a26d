//! Local task collection for `TaskSync`.
//!
//! The [`TaskRepository`] owns the canonical in-memory task list and
//! persists it after every mutation. Remote snapshots are folded in with the
//! last-writer-wins rules in [`merge`]; listings and statistics live in
//! [`query`].

pub mod merge;
pub mod query;
pub mod repository;

pub use merge::{merge_patch, merge_record, merge_task_list};
pub use query::{SortBy, SortOrder, TaskFilters, TaskStats, filter_tasks};
pub use repository::TaskRepository;

use thiserror::Error;

/// Errors surfaced by task actions at the input boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    /// Task title cannot be empty.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Task with the given ID was not found.
    #[error("task not found: {0}")]
    TaskNotFound(String),
}
