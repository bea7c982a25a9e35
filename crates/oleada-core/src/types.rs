//! Core identifier and lifecycle types for runs and scenarios.
//!
//! Explicit state machines, no implicit transitions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Unique identifier for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(uuid::Uuid);

impl RunId {
    /// Creates a new random run ID.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Creates a run ID from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a virtual user within one scenario.
///
/// Assigned in spawn order starting at 1, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VuId(pub u64);

impl std::fmt::Display for VuId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vu-{}", self.0)
    }
}

/// Scenario lifecycle state.
///
/// ```text
/// Pending → Waiting → Running → Stopping → Completed
///    ↓         ↓         ↓          ↓
///    └─────────┴──── Errored ───────┘
///              Waiting/Running/Stopping → Aborted
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenarioStatus {
    /// Registered, not yet scheduled.
    Pending,
    /// Waiting for its start offset.
    Waiting,
    /// VUs are live and iterating.
    Running,
    /// Schedule finished; draining in-flight iterations.
    Stopping,
    /// Finished normally.
    Completed,
    /// Stopped by a scenario-level error (bad config, workload panic).
    Errored(String),
    /// Stopped early because the whole run was stopped.
    Aborted,
}

impl ScenarioStatus {
    /// Returns true if the scenario is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Errored(_) | Self::Aborted)
    }

    /// Returns true if the scenario has VUs that may be iterating.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Stopping)
    }

    /// Returns true if the scenario ended with an error.
    #[must_use]
    pub const fn is_errored(&self) -> bool {
        matches!(self, Self::Errored(_))
    }

    /// Returns true if moving to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(&self, next: &Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Waiting)
            | (Self::Waiting, Self::Running)
            | (Self::Running, Self::Stopping)
            | (Self::Stopping, Self::Completed) => true,
            (Self::Pending | Self::Waiting | Self::Running | Self::Stopping, Self::Errored(_)) => {
                true
            }
            (Self::Waiting | Self::Running | Self::Stopping, Self::Aborted) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Waiting => write!(f, "waiting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Completed => write!(f, "completed"),
            Self::Errored(reason) => write!(f, "errored: {reason}"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Why a run was stopped before every scenario finished its schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortCause {
    /// The global run timeout elapsed.
    RunTimeout(#[serde(with = "humantime_serde")] Duration),
    /// An abort-on-fail threshold failed.
    ThresholdFailed {
        /// Metric the threshold is defined on.
        metric: String,
        /// Predicate text, e.g. `rate<0.1`.
        predicate: String,
    },
}

impl std::fmt::Display for AbortCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RunTimeout(d) => {
                write!(f, "run timeout of {} elapsed", humantime::format_duration(*d))
            }
            Self::ThresholdFailed { metric, predicate } => {
                write!(f, "threshold '{metric}: {predicate}' failed")
            }
        }
    }
}
