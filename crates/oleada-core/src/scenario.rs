//! Scenario definition: a named schedule bound to a workload.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, RunError};
use crate::schedule::{RampPolicy, Schedule, Stage};
use crate::workload::Workload;

/// Default time retiring VUs get to finish in-flight iterations.
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// A scenario: one independently scheduled stream of traffic.
#[derive(Clone)]
pub struct ScenarioSpec {
    /// Unique name within the run.
    pub name: String,
    /// Ramp schedule.
    pub schedule: Schedule,
    /// Delay from run start until scenario time zero.
    pub start_offset: Duration,
    /// Work performed by each VU iteration.
    pub workload: Arc<dyn Workload>,
    /// Bound on draining in-flight iterations at scenario end.
    pub graceful_stop: Duration,
    /// Minimum interval between iteration starts within one VU.
    pub pacing: Option<Duration>,
}

impl ScenarioSpec {
    /// Creates a scenario with an empty schedule.
    #[must_use]
    pub fn new(name: impl Into<String>, workload: Arc<dyn Workload>) -> Self {
        Self {
            name: name.into(),
            schedule: Schedule::new(Vec::new()),
            start_offset: Duration::ZERO,
            workload,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            pacing: None,
        }
    }

    /// Sets the stages.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<Stage>) -> Self {
        self.schedule.stages = stages;
        self
    }

    /// Sets the VU count spawned at scenario time zero.
    #[must_use]
    pub fn with_start_vus(mut self, start_vus: u32) -> Self {
        self.schedule.start_vus = start_vus;
        self
    }

    /// Sets the ramp policy.
    #[must_use]
    pub fn with_ramp_policy(mut self, policy: RampPolicy) -> Self {
        self.schedule.policy = policy;
        self
    }

    /// Replaces the whole schedule.
    #[must_use]
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Sets the start offset.
    #[must_use]
    pub const fn with_start_offset(mut self, offset: Duration) -> Self {
        self.start_offset = offset;
        self
    }

    /// Sets the graceful stop bound.
    #[must_use]
    pub const fn with_graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    /// Sets per-VU iteration pacing.
    #[must_use]
    pub const fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = Some(pacing);
        self
    }

    /// Returns offset plus schedule length.
    #[must_use]
    pub fn end_offset(&self) -> Duration {
        self.start_offset + self.schedule.total_duration()
    }

    /// Validates the scenario.
    ///
    /// # Errors
    /// Returns [`RunError::ScenarioConfig`] for an empty name or empty stages.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(RunError::scenario_config(&self.name, "name cannot be empty"));
        }
        self.schedule
            .validate()
            .map_err(|e| match e {
                RunError::Config(reason) => RunError::scenario_config(&self.name, reason),
                other => other,
            })
    }
}

impl std::fmt::Debug for ScenarioSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioSpec")
            .field("name", &self.name)
            .field("schedule", &self.schedule)
            .field("start_offset", &self.start_offset)
            .field("graceful_stop", &self.graceful_stop)
            .field("pacing", &self.pacing)
            .finish_non_exhaustive()
    }
}
