//! Command-line actions.
//!
//! Each invocation performs one [`Command`] against an [`App`] and renders
//! a plain-text result.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use tasksync_proto::settings::{ApiMode, SettingsUpdate};
use tasksync_proto::sync::SyncState;
use tasksync_proto::task::{NewTask, Task, TaskId, TaskPatch, TaskPriority, TaskStatus};

use crate::api::{ApiClient, ApiError};
use crate::app::App;
use crate::storage::{KvStore, StoreError};
use crate::sync::{DrainOutcome, MAX_RETRIES};
use crate::tasks::{SortBy, SortOrder, TaskError, TaskFilters};

/// Errors reported to the user by a command.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// A task action was rejected.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// A remote call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Local storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Network switch position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Switch {
    /// Turn network simulation on (drains the outbox).
    On,
    /// Turn network simulation off.
    Off,
    /// Flip the current setting.
    Toggle,
}

/// One action per invocation.
#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    /// Create a task.
    Add {
        /// Task title.
        title: String,
        /// Longer description.
        #[arg(short, long, default_value = "")]
        description: String,
        /// low, medium, or high.
        #[arg(short, long)]
        priority: Option<TaskPriority>,
        /// pending, in_progress, or completed.
        #[arg(short, long)]
        status: Option<TaskStatus>,
        /// Due date (RFC 3339).
        #[arg(long)]
        due: Option<DateTime<Utc>>,
    },
    /// List tasks.
    List {
        /// Case-insensitive title search.
        #[arg(long)]
        search: Option<String>,
        /// Only this status.
        #[arg(long)]
        status: Option<TaskStatus>,
        /// Only this priority.
        #[arg(long)]
        priority: Option<TaskPriority>,
        /// due, created, or priority.
        #[arg(long, default_value = "created")]
        sort: SortBy,
        /// asc or desc.
        #[arg(long, default_value = "desc")]
        order: SortOrder,
    },
    /// Show one task.
    Show {
        /// Task id or unique id prefix.
        id: String,
    },
    /// Edit a task.
    Edit {
        /// Task id or unique id prefix.
        id: String,
        /// New title.
        #[arg(long)]
        title: Option<String>,
        /// New description.
        #[arg(long)]
        description: Option<String>,
        /// New status.
        #[arg(long)]
        status: Option<TaskStatus>,
        /// New priority.
        #[arg(long)]
        priority: Option<TaskPriority>,
        /// New due date (RFC 3339).
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<DateTime<Utc>>,
        /// Remove the due date.
        #[arg(long)]
        clear_due: bool,
    },
    /// Mark a task completed.
    Done {
        /// Task id or unique id prefix.
        id: String,
    },
    /// Delete a task.
    Delete {
        /// Task id or unique id prefix.
        id: String,
    },
    /// Drain the outbox now.
    Sync,
    /// Drain the outbox, then pull the remote collection.
    Refresh,
    /// Show sync status.
    Status,
    /// List pending outbox entries.
    Outbox,
    /// Switch network simulation.
    Network {
        /// on, off, or toggle.
        #[arg(value_enum)]
        switch: Switch,
    },
    /// Show or change settings.
    Settings {
        /// Simulated latency in milliseconds.
        #[arg(long)]
        latency_ms: Option<u64>,
        /// Simulated failure probability in [0, 1].
        #[arg(long)]
        failure_rate: Option<f64>,
        /// simulated or real.
        #[arg(long)]
        api_mode: Option<ApiMode>,
        /// Restore defaults.
        #[arg(long)]
        reset: bool,
    },
    /// Replace local tasks with sample data.
    Seed,
    /// Overwrite the remote collection with the local one.
    Bootstrap,
    /// Task counts per status and priority.
    Stats,
    /// Drop outbox entries that reached the retry ceiling.
    ClearFailed,
    /// Delete all local and remote data.
    Reset,
}

/// Runs `command` and returns the text to print.
///
/// # Errors
///
/// Returns [`CliError`] if the action fails.
pub async fn run<S, C>(app: &App<S, C>, command: Command) -> Result<String, CliError>
where
    S: KvStore + 'static,
    C: ApiClient,
{
    let out = match command {
        Command::Add {
            title,
            description,
            priority,
            status,
            due,
        } => {
            let task = app.create_task(NewTask {
                title,
                description,
                status: status.unwrap_or_default(),
                priority: priority.unwrap_or_default(),
                due_date: due,
            })?;
            format!("created {}\n{}", task.id, task_line(&task))
        }
        Command::List {
            search,
            status,
            priority,
            sort,
            order,
        } => {
            let filters = TaskFilters {
                search: search.unwrap_or_default(),
                status,
                priority,
                sort_by: sort,
                sort_order: order,
            };
            let tasks = app.state().tasks.query(&filters);
            if tasks.is_empty() {
                if filters.is_narrowed() {
                    "no matching tasks".to_string()
                } else {
                    "no tasks yet (try `tasksync add` or `tasksync seed`)".to_string()
                }
            } else {
                tasks.iter().map(task_line).collect::<Vec<_>>().join("\n")
            }
        }
        Command::Show { id } => task_detail(&find_task(app, &id)?),
        Command::Edit {
            id,
            title,
            description,
            status,
            priority,
            due,
            clear_due,
        } => {
            let task = find_task(app, &id)?;
            let due_date = if clear_due { Some(None) } else { due.map(Some) };
            let patch = TaskPatch {
                title,
                description,
                status,
                priority,
                due_date,
                ..TaskPatch::default()
            };
            if patch.is_empty() {
                return Ok("nothing to change".to_string());
            }
            let updated = app.edit_task(&task.id, patch)?;
            format!("updated\n{}", task_line(&updated))
        }
        Command::Done { id } => {
            let task = find_task(app, &id)?;
            let updated = app.set_status(&task.id, TaskStatus::Completed)?;
            format!("completed\n{}", task_line(&updated))
        }
        Command::Delete { id } => {
            let task = find_task(app, &id)?;
            app.remove_task(&task.id)?;
            format!("deleted {}", task.id)
        }
        Command::Sync => describe_drain(&app.sync_now().await),
        Command::Refresh => {
            let report = app.refresh().await?;
            let pulled = report
                .pulled
                .map_or_else(|| "offline, nothing pulled".to_string(), |n| format!("{n} task(s) updated from remote"));
            format!("{}\n{pulled}", describe_drain(&report.drain))
        }
        Command::Status => status_text(&app.sync().state()),
        Command::Outbox => outbox_text(&app.sync().state()),
        Command::Network { switch } => {
            let change = match switch {
                Switch::On => app.set_network(true).await,
                Switch::Off => app.set_network(false).await,
                Switch::Toggle => app.toggle_network().await,
            };
            let mut out = format!(
                "network {}",
                if change.settings.simulate_network { "on" } else { "off" }
            );
            if let Some(drain) = change.drain {
                let _ = write!(out, "\n{}", describe_drain(&drain));
            }
            out
        }
        Command::Settings {
            latency_ms,
            failure_rate,
            api_mode,
            reset,
        } => {
            if reset {
                app.state().settings.reset();
                app.sync().go_offline();
            }
            let update = SettingsUpdate {
                simulate_network: None,
                simulated_latency_ms: latency_ms,
                simulated_failure_rate: failure_rate,
                api_mode,
            };
            let settings = app.update_settings(&update).await.settings;
            let mut out = format!(
                "network: {}\nlatency: {} ms\nfailure rate: {:.2}\napi mode: {}",
                if settings.simulate_network { "on" } else { "off" },
                settings.simulated_latency_ms,
                settings.simulated_failure_rate,
                settings.api_mode
            );
            if settings.api_mode == ApiMode::Real {
                let _ = write!(out, "\nnote: {}", ApiError::RealBackendUnavailable);
            }
            out
        }
        Command::Seed => format!("seeded {} demo tasks", app.seed_demo_data()),
        Command::Bootstrap => {
            if app.bootstrap().await? {
                format!("pushed {} task(s) to remote", app.state().tasks.len())
            } else {
                "offline, nothing pushed".to_string()
            }
        }
        Command::Stats => {
            let stats = app.state().tasks.stats();
            format!(
                "total: {}\npending: {}\nin progress: {}\ncompleted: {} ({}%)\npriority high/medium/low: {}/{}/{}",
                stats.total,
                stats.pending,
                stats.in_progress,
                stats.completed,
                stats.completion_percent(),
                stats.high_priority,
                stats.medium_priority,
                stats.low_priority
            )
        }
        Command::ClearFailed => format!("removed {} failed entr(ies)", app.clear_failed()),
        Command::Reset => {
            app.reset_all_data().await?;
            "all data cleared".to_string()
        }
    };
    Ok(out)
}

/// Resolves a full id or a unique id prefix to a task.
fn find_task<S: KvStore + 'static, C: ApiClient>(
    app: &App<S, C>,
    raw: &str,
) -> Result<Task, TaskError> {
    let tasks = &app.state().tasks;
    tasks
        .get(&TaskId::from(raw))
        .or_else(|| tasks.find_by_prefix(raw))
        .ok_or_else(|| TaskError::TaskNotFound(raw.to_string()))
}

fn task_line(task: &Task) -> String {
    let due = task
        .due_date
        .map(|d| format!("  due {}", d.format("%Y-%m-%d")))
        .unwrap_or_default();
    format!(
        "{}  {:<11} {:<6} {}{due}",
        task.id.short(8),
        task.status.to_string(),
        task.priority.to_string(),
        task.title
    )
}

fn task_detail(task: &Task) -> String {
    let mut out = format!(
        "id:          {}\ntitle:       {}\nstatus:      {}\npriority:    {}",
        task.id, task.title, task.status, task.priority
    );
    if !task.description.is_empty() {
        let _ = write!(out, "\ndescription: {}", task.description);
    }
    if let Some(due) = task.due_date {
        let _ = write!(out, "\ndue:         {}", due.to_rfc3339());
    }
    let _ = write!(
        out,
        "\ncreated:     {}\nupdated:     {}",
        task.created_at.to_rfc3339(),
        task.updated_at.to_rfc3339()
    );
    out
}

fn describe_drain(outcome: &DrainOutcome) -> String {
    match outcome {
        DrainOutcome::AlreadyRunning => "sync already in progress".to_string(),
        DrainOutcome::Completed(report) => format!(
            "sync {}: {} applied, {} failed, {} skipped",
            report.status, report.applied, report.failed, report.skipped
        ),
    }
}

fn status_text(state: &SyncState) -> String {
    let mut out = format!("status: {}", state.badge());
    let last = state
        .last_sync_time
        .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
    let _ = write!(out, "\nlast sync: {last}");
    if let Some(error) = &state.error {
        let _ = write!(out, "\nerror: {error}");
    }
    out
}

fn outbox_text(state: &SyncState) -> String {
    if state.outbox.is_empty() {
        return "outbox empty".to_string();
    }
    state
        .outbox
        .iter()
        .map(|item| {
            let marker = if item.is_exhausted(MAX_RETRIES) { "  (failed)" } else { "" };
            format!(
                "{}  {:<6} {}  retries {}/{MAX_RETRIES}{marker}",
                item.timestamp.format("%Y-%m-%d %H:%M:%S"),
                item.operation.to_string(),
                item.task_id.short(8),
                item.retry_count
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
