//! `tasksync`: offline-first task list with outbox sync.
//!
//! Every invocation loads the local store, performs one action, waits for
//! pending writes, and exits. Configuration via CLI flags, environment
//! variables, or config file (`~/.config/tasksync/config.toml`).
//!
//! ```bash
//! tasksync add "Write report" --priority high
//! tasksync network on        # drains the outbox
//! TASKSYNC_SEED=7 tasksync sync
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use tasksync::api::configure_client;
use tasksync::app::{App, AppState};
use tasksync::cli::{self, Command};
use tasksync::config::{CliArgs, ClientConfig};
use tasksync::storage::FileStore;
use tasksync_proto::settings::{ApiMode, Settings};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // CLI args > env > config file > defaults.
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!(data_dir = %config.data_dir.display(), "tasksync starting");

    let store = Arc::new(FileStore::new(&config.data_dir));
    let state = Arc::new(AppState::new(Arc::clone(&store)));
    let mut settings = state.load().await;
    if let Some(overrides) = config.settings_overrides() {
        settings = state.settings.update(&overrides);
    }

    let client = match configure_client(&settings, Arc::clone(&store), config.seed) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "falling back to simulated client");
            eprintln!("Warning: {e}");
            let simulated = Settings {
                api_mode: ApiMode::Simulated,
                ..settings
            };
            match configure_client(&simulated, Arc::clone(&store), config.seed) {
                Ok(client) => client,
                Err(e) => {
                    eprintln!("error: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
    };

    let app = App::new(Arc::clone(&state), client);
    app.attach().await;

    let command = cli.command.unwrap_or(Command::Status);
    let result = cli::run(&app, command).await;

    state.flush().await;
    tracing::info!(failed_writes = state.writer.failure_count(), "tasksync exiting");

    match result {
        Ok(out) => {
            println!("{out}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Logs go to a file so command output on stdout stays clean. Returns a
/// [`WorkerGuard`] that must be held until shutdown to ensure all buffered
/// log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("tasksync.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
