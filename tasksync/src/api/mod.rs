//! Remote API boundary for `TaskSync`.
//!
//! Defines the [`ApiClient`] trait the sync manager depends on. Concrete
//! implementations:
//! - [`simulator::RemoteSimulator`]: in-process stand-in server that owns
//!   its own task collection and resolves conflicts
//!
//! Every remote call first passes a [`link::NetworkLink`], which is where
//! latency and failure injection live.

pub mod link;
pub mod simulator;

use std::sync::Arc;

use tasksync_proto::outbox::OutboxItem;
use tasksync_proto::settings::{ApiMode, Settings};
use tasksync_proto::task::Task;

use crate::storage::{KvStore, StoreError};

pub use link::{DirectLink, FlakyLink, NetworkConditions, NetworkLink};
pub use simulator::{RemoteSimulator, SimulatedClient};

/// Errors that can occur during remote operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request did not reach the remote side. Transient; retry later.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The remote side failed to read or write its collection.
    #[error("remote storage error: {0}")]
    Storage(#[from] StoreError),

    /// `apiMode = real` was requested but no real backend is built in.
    #[error("real API backend is not available; set api mode to simulated")]
    RealBackendUnavailable,
}

impl ApiError {
    /// Returns `true` if the same request may succeed when retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkFailure(_))
    }
}

/// Async client for the remote task collection.
///
/// Any call may fail with [`ApiError::NetworkFailure`], which callers treat
/// as transient.
pub trait ApiClient: Send + Sync {
    /// Returns the full remote collection.
    fn fetch_all_tasks(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, ApiError>> + Send;

    /// Applies one outbox entry and returns the resulting remote record.
    ///
    /// Deletes always return `None`.
    fn apply_change(
        &self,
        item: &OutboxItem,
    ) -> impl std::future::Future<Output = Result<Option<Task>, ApiError>> + Send;

    /// Overwrites the remote collection with `tasks`.
    fn push_all_tasks(
        &self,
        tasks: &[Task],
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Reacts to a settings change. The default does nothing.
    fn configure(&self, _settings: &Settings) {}
}

impl<T: ApiClient> ApiClient for Arc<T> {
    fn fetch_all_tasks(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, ApiError>> + Send {
        (**self).fetch_all_tasks()
    }

    fn apply_change(
        &self,
        item: &OutboxItem,
    ) -> impl std::future::Future<Output = Result<Option<Task>, ApiError>> + Send {
        (**self).apply_change(item)
    }

    fn push_all_tasks(
        &self,
        tasks: &[Task],
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send {
        (**self).push_all_tasks(tasks)
    }

    fn configure(&self, settings: &Settings) {
        (**self).configure(settings);
    }
}

/// Builds the API client selected by `settings`.
///
/// In simulated mode this is a [`RemoteSimulator`] over `store` behind a
/// [`FlakyLink`] configured from the latency and failure-rate settings;
/// `seed` makes the failure sequence reproducible.
///
/// # Errors
///
/// Returns [`ApiError::RealBackendUnavailable`] when `api_mode` is `real`.
pub fn configure_client<S: KvStore + 'static>(
    settings: &Settings,
    store: Arc<S>,
    seed: Option<u64>,
) -> Result<SimulatedClient<S>, ApiError> {
    match settings.api_mode {
        ApiMode::Real => Err(ApiError::RealBackendUnavailable),
        ApiMode::Simulated => {
            let conditions = NetworkConditions::from_settings(settings);
            let link = match seed {
                Some(seed) => FlakyLink::with_seed(conditions, seed),
                None => FlakyLink::new(conditions),
            };
            tracing::debug!(
                latency_ms = settings.simulated_latency_ms,
                failure_rate = settings.simulated_failure_rate,
                "configured simulated api client"
            );
            Ok(RemoteSimulator::new(store, link))
        }
    }
}
