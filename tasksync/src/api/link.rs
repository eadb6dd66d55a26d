//! Pluggable network links for the remote simulator.
//!
//! A link is consulted once before every remote operation. [`DirectLink`]
//! always passes; [`FlakyLink`] adds latency and random failures and is
//! meant for demos and tests only.

use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tasksync_proto::settings::{Settings, clamp_rate};

use super::ApiError;

/// Gate in front of every remote call.
pub trait NetworkLink: Send + Sync {
    /// Simulates one request/response exchange.
    ///
    /// An error means the request never reached the remote side, so no
    /// remote state may change.
    fn round_trip(&self) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Applies new latency and failure settings. The default ignores them.
    fn configure(&self, _conditions: NetworkConditions) {}
}

/// Link with no delay that never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectLink;

impl NetworkLink for DirectLink {
    async fn round_trip(&self) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Latency and failure probability of a [`FlakyLink`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkConditions {
    /// Delay before each call completes.
    pub latency: Duration,
    /// Probability in `[0, 1]` that a call fails.
    pub failure_rate: f64,
}

impl NetworkConditions {
    /// Perfect conditions: no delay, no failures.
    pub const IDEAL: Self = Self {
        latency: Duration::ZERO,
        failure_rate: 0.0,
    };

    /// Builds conditions from the simulation settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            latency: Duration::from_millis(settings.simulated_latency_ms),
            failure_rate: clamp_rate(settings.simulated_failure_rate),
        }
    }
}

/// Link that sleeps for the configured latency, then fails with the
/// configured probability.
pub struct FlakyLink {
    conditions: RwLock<NetworkConditions>,
    rng: Mutex<StdRng>,
}

impl FlakyLink {
    /// Creates a link seeded from the operating system.
    #[must_use]
    pub fn new(conditions: NetworkConditions) -> Self {
        Self::with_rng(conditions, StdRng::from_os_rng())
    }

    /// Creates a link whose failure sequence is fixed by `seed`.
    #[must_use]
    pub fn with_seed(conditions: NetworkConditions, seed: u64) -> Self {
        Self::with_rng(conditions, StdRng::seed_from_u64(seed))
    }

    fn with_rng(conditions: NetworkConditions, rng: StdRng) -> Self {
        Self {
            conditions: RwLock::new(NetworkConditions {
                failure_rate: clamp_rate(conditions.failure_rate),
                ..conditions
            }),
            rng: Mutex::new(rng),
        }
    }

    /// Current conditions.
    #[must_use]
    pub fn conditions(&self) -> NetworkConditions {
        *self.conditions.read()
    }
}

impl NetworkLink for FlakyLink {
    async fn round_trip(&self) -> Result<(), ApiError> {
        let conditions = self.conditions();
        if !conditions.latency.is_zero() {
            tokio::time::sleep(conditions.latency).await;
        }
        let roll: f64 = self.rng.lock().random();
        if roll < conditions.failure_rate {
            tracing::debug!(roll, failure_rate = conditions.failure_rate, "injected network failure");
            return Err(ApiError::NetworkFailure("simulated network failure".to_string()));
        }
        Ok(())
    }

    fn configure(&self, conditions: NetworkConditions) {
        *self.conditions.write() = NetworkConditions {
            failure_rate: clamp_rate(conditions.failure_rate),
            ..conditions
        };
    }
}
