//! User-adjustable sync settings.

use serde::{Deserialize, Serialize};

/// Which backend the API client talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiMode {
    /// The in-process remote simulator.
    #[default]
    Simulated,
    /// A real backend (not available in this build).
    Real,
}

impl std::fmt::Display for ApiMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simulated => write!(f, "simulated"),
            Self::Real => write!(f, "real"),
        }
    }
}

impl std::str::FromStr for ApiMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simulated" => Ok(Self::Simulated),
            "real" => Ok(Self::Real),
            other => Err(format!("unknown api mode: {other}")),
        }
    }
}

/// Network simulation and backend settings.
///
/// Missing keys in stored JSON fall back to [`Settings::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// When `false`, the app behaves as offline and never drains.
    pub simulate_network: bool,
    /// Artificial delay before every simulated remote call.
    pub simulated_latency_ms: u64,
    /// Probability in `[0, 1]` that a simulated remote call fails.
    pub simulated_failure_rate: f64,
    /// Backend selection.
    pub api_mode: ApiMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            simulate_network: false,
            simulated_latency_ms: 500,
            simulated_failure_rate: 0.2,
            api_mode: ApiMode::Simulated,
        }
    }
}

impl Settings {
    /// Returns a copy with the present fields of `update` applied.
    ///
    /// The failure rate is clamped into `[0, 1]`; NaN becomes `0`.
    #[must_use]
    pub fn merged(&self, update: &SettingsUpdate) -> Self {
        let mut next = self.clone();
        if let Some(v) = update.simulate_network {
            next.simulate_network = v;
        }
        if let Some(v) = update.simulated_latency_ms {
            next.simulated_latency_ms = v;
        }
        if let Some(v) = update.simulated_failure_rate {
            next.simulated_failure_rate = clamp_rate(v);
        }
        if let Some(v) = update.api_mode {
            next.api_mode = v;
        }
        next
    }
}

/// A partial settings change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    /// New network toggle.
    pub simulate_network: Option<bool>,
    /// New latency.
    pub simulated_latency_ms: Option<u64>,
    /// New failure rate.
    pub simulated_failure_rate: Option<f64>,
    /// New backend.
    pub api_mode: Option<ApiMode>,
}

/// Clamps a probability into `[0, 1]`.
#[must_use]
pub fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) }
}
