//! Virtual user ramp schedules.
//!
//! A [`Schedule`] maps scenario time to a target number of live virtual
//! users. Stages run back to back; each holds for its duration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RunError};

/// One segment of a ramp schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// How long the stage lasts.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Target live VU count for the stage.
    pub target: u32,
}

impl Stage {
    /// Creates a new stage.
    #[must_use]
    pub const fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

/// How the target moves within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RampPolicy {
    /// Flat target for the whole stage, changing only at stage boundaries.
    #[default]
    Step,
    /// Linear interpolation from the previous stage's target
    /// (or `start_vus` for the first stage) to this stage's target.
    Linear,
}

/// Ordered ramp schedule for a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// VUs spawned at scenario time zero.
    pub start_vus: u32,
    /// Stages, executed in order.
    pub stages: Vec<Stage>,
    /// Target interpolation within a stage.
    #[serde(default)]
    pub policy: RampPolicy,
}

impl Schedule {
    /// Creates a step schedule with no initial VUs.
    #[must_use]
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            start_vus: 0,
            stages,
            policy: RampPolicy::Step,
        }
    }

    /// Sets the initial VU count.
    #[must_use]
    pub fn with_start_vus(mut self, start_vus: u32) -> Self {
        self.start_vus = start_vus;
        self
    }

    /// Sets the ramp policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RampPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Validates the schedule.
    ///
    /// # Errors
    /// Returns an error if there are no stages.
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(RunError::config("stages cannot be empty"));
        }
        Ok(())
    }

    /// Returns the sum of all stage durations.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Returns the highest VU count the schedule can ask for.
    #[must_use]
    pub fn max_target(&self) -> u32 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start_vus, u32::max)
    }

    /// Returns the target VU count at scenario time `t`.
    ///
    /// Past the end of the schedule this is the last stage's target.
    /// An empty schedule holds `start_vus`.
    #[must_use]
    pub fn target_at(&self, t: Duration) -> u32 {
        let mut stage_start = Duration::ZERO;
        let mut previous = self.start_vus;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if t < stage_end {
                return match self.policy {
                    RampPolicy::Step => stage.target,
                    RampPolicy::Linear => {
                        interpolate(previous, stage.target, t - stage_start, stage.duration)
                    }
                };
            }
            stage_start = stage_end;
            previous = stage.target;
        }

        previous
    }

    /// Returns the first stage boundary strictly after `t`, if any.
    #[must_use]
    pub fn next_boundary(&self, t: Duration) -> Option<Duration> {
        let mut boundary = Duration::ZERO;
        for stage in &self.stages {
            boundary += stage.duration;
            if boundary > t {
                return Some(boundary);
            }
        }
        None
    }

    /// Returns the index of the stage containing `t`, if any.
    #[must_use]
    pub fn stage_index_at(&self, t: Duration) -> Option<usize> {
        let mut stage_end = Duration::ZERO;
        for (idx, stage) in self.stages.iter().enumerate() {
            stage_end += stage.duration;
            if t < stage_end {
                return Some(idx);
            }
        }
        None
    }
}

fn interpolate(from: u32, to: u32, offset: Duration, span: Duration) -> u32 {
    if span.is_zero() {
        return to;
    }
    let progress = (offset.as_secs_f64() / span.as_secs_f64()).clamp(0.0, 1.0);
    let from = f64::from(from);
    let to = f64::from(to);
    (from + (to - from) * progress).round() as u32
}
