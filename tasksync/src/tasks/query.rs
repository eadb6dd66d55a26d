//! Filtering, sorting, and statistics over the task collection.

use std::cmp::Ordering;

use tasksync_proto::task::{Task, TaskPriority, TaskStatus};

/// Sort key for task listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    /// Soonest due first; undated tasks last.
    DueDate,
    /// Newest first.
    #[default]
    CreatedAt,
    /// Most urgent first.
    Priority,
}

impl std::str::FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "due" | "due_date" | "dueDate" => Ok(Self::DueDate),
            "created" | "created_at" | "createdAt" => Ok(Self::CreatedAt),
            "priority" => Ok(Self::Priority),
            other => Err(format!("unknown sort key: {other}")),
        }
    }
}

/// Direction applied on top of the sort key's natural order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Reverse of the natural order.
    Asc,
    /// The natural order of the sort key (see [`SortBy`]).
    #[default]
    Desc,
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

/// Listing filters. `None` for status or priority means "all".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilters {
    /// Case-insensitive substring matched against the title.
    pub search: String,
    /// Only tasks with this status.
    pub status: Option<TaskStatus>,
    /// Only tasks with this priority.
    pub priority: Option<TaskPriority>,
    /// Sort key.
    pub sort_by: SortBy,
    /// Sort direction.
    pub sort_order: SortOrder,
}

impl TaskFilters {
    /// Returns `true` if any narrowing filter is active.
    #[must_use]
    pub fn is_narrowed(&self) -> bool {
        !self.search.is_empty() || self.status.is_some() || self.priority.is_some()
    }

    fn matches(&self, task: &Task, needle: &str) -> bool {
        (needle.is_empty() || task.title.to_lowercase().contains(needle))
            && self.status.is_none_or(|s| task.status == s)
            && self.priority.is_none_or(|p| task.priority == p)
    }
}

/// Applies `filters` to `tasks`, returning matching tasks in display order.
#[must_use]
pub fn filter_tasks(tasks: &[Task], filters: &TaskFilters) -> Vec<Task> {
    let needle = filters.search.to_lowercase();
    let mut out: Vec<Task> = tasks
        .iter()
        .filter(|t| filters.matches(t, &needle))
        .cloned()
        .collect();
    out.sort_by(|a, b| {
        let natural = natural_order(filters.sort_by, a, b);
        match filters.sort_order {
            SortOrder::Desc => natural,
            SortOrder::Asc => natural.reverse(),
        }
    });
    out
}

fn natural_order(sort_by: SortBy, a: &Task, b: &Task) -> Ordering {
    match sort_by {
        SortBy::DueDate => match (a.due_date, b.due_date) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => x.cmp(&y),
        },
        SortBy::CreatedAt => b.created_at.cmp(&a.created_at),
        SortBy::Priority => b.priority.rank().cmp(&a.priority.rank()),
    }
}

/// Counts per status and per priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    /// Total number of tasks.
    pub total: usize,
    /// Tasks in `pending`.
    pub pending: usize,
    /// Tasks in `in_progress`.
    pub in_progress: usize,
    /// Tasks in `completed`.
    pub completed: usize,
    /// Low-priority tasks.
    pub low_priority: usize,
    /// Medium-priority tasks.
    pub medium_priority: usize,
    /// High-priority tasks.
    pub high_priority: usize,
}

impl TaskStats {
    /// Computes statistics for `tasks`.
    #[must_use]
    pub fn of(tasks: &[Task]) -> Self {
        tasks.iter().fold(Self::default(), |mut acc, t| {
            acc.total += 1;
            match t.status {
                TaskStatus::Pending => acc.pending += 1,
                TaskStatus::InProgress => acc.in_progress += 1,
                TaskStatus::Completed => acc.completed += 1,
            }
            match t.priority {
                TaskPriority::Low => acc.low_priority += 1,
                TaskPriority::Medium => acc.medium_priority += 1,
                TaskPriority::High => acc.high_priority += 1,
            }
            acc
        })
    }

    /// Percentage of tasks completed, rounded down; `0` for an empty set.
    #[must_use]
    pub const fn completion_percent(&self) -> usize {
        if self.total == 0 {
            0
        } else {
            self.completed * 100 / self.total
        }
    }
}
