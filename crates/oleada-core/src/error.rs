//! Error types for oleada-core.
//!
//! [`RunError`] covers anything that stops a run or a scenario.
//! [`WorkloadError`] is what a single workload iteration can return.

use std::time::Duration;

use crate::metrics::MetricKind;

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, RunError>;

/// Errors raised by the harness itself.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Run configuration error (malformed file, duplicate names, unknown exec).
    #[error("configuration error: {0}")]
    Config(String),

    /// A single scenario is misconfigured. Fatal to that scenario only.
    #[error("scenario '{scenario}' misconfigured: {reason}")]
    ScenarioConfig {
        /// Scenario name.
        scenario: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A metric name was reused with a different kind.
    #[error("metric '{name}' is a {existing}, cannot record it as a {requested}")]
    MetricKindMismatch {
        /// Metric name.
        name: String,
        /// Kind established by the first writer.
        existing: MetricKind,
        /// Kind requested by the conflicting writer.
        requested: MetricKind,
    },

    /// The clock/timer cannot drive the run.
    #[error("clock unavailable: {0}")]
    ClockUnavailable(String),

    /// Timed out waiting for something bounded.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not occur in production).
    #[error("internal error: {0}")]
    Internal(String),
}

impl RunError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a scenario configuration error.
    #[must_use]
    pub fn scenario_config(scenario: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ScenarioConfig {
            scenario: scenario.into(),
            reason: reason.into(),
        }
    }

    /// Creates a clock-unavailable error.
    #[must_use]
    pub fn clock_unavailable(msg: impl Into<String>) -> Self {
        Self::ClockUnavailable(msg.into())
    }

    /// Returns true if this error aborts the entire run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::ClockUnavailable(_) | Self::Internal(_)
        )
    }

    /// Returns true if this error is contained to one scenario.
    #[must_use]
    pub const fn is_scenario_scoped(&self) -> bool {
        matches!(self, Self::ScenarioConfig { .. })
    }
}

/// Outcome of a failed workload iteration.
///
/// `Iteration` is absorbed into metrics and the virtual user keeps going.
/// `Config` marks a programming or configuration mistake and stops the
/// scenario the workload belongs to.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkloadError {
    /// Expected failure of one iteration (bad status, malformed body, timeout).
    #[error("iteration failed: {0}")]
    Iteration(String),

    /// Non-recoverable configuration error.
    #[error("workload misconfigured: {0}")]
    Config(String),
}

impl WorkloadError {
    /// Creates an iteration failure.
    #[must_use]
    pub fn iteration(msg: impl Into<String>) -> Self {
        Self::Iteration(msg.into())
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns true if the virtual user may continue after this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Iteration(_))
    }
}

impl From<RunError> for WorkloadError {
    fn from(err: RunError) -> Self {
        Self::Config(err.to_string())
    }
}
