//! Run result and plain-text summary.

use std::collections::BTreeMap;
use std::time::Duration;

use oleada_core::{AbortCause, Aggregate, Result, RunError, RunId, ScenarioStatus};
use oleada_policy::ThresholdOutcome;
use serde::Serialize;

use crate::executor::ScenarioReport;

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Run identifier.
    pub run_id: RunId,
    /// Wall time from run start until the last scenario finished.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Final aggregate of every metric with samples.
    pub aggregates: BTreeMap<String, Aggregate>,
    /// Every threshold with its verdict.
    pub thresholds: Vec<ThresholdOutcome>,
    /// Per-scenario reports, in plan order.
    pub scenarios: Vec<ScenarioReport>,
    /// AND of all threshold verdicts. `Undefined` counts as not passed.
    pub overall_pass: bool,
    /// Set when the run was stopped early.
    pub aborted: Option<AbortCause>,
}

impl RunResult {
    /// Returns true if every threshold passed, no scenario errored and the
    /// run was not aborted.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.overall_pass && self.aborted.is_none() && self.errored_scenarios().next().is_none()
    }

    /// Scenarios that ended with an error.
    pub fn errored_scenarios(&self) -> impl Iterator<Item = &ScenarioReport> {
        self.scenarios.iter().filter(|s| s.is_errored())
    }

    /// Thresholds whose verdict is `Failed`.
    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdOutcome> {
        self.thresholds.iter().filter(|t| t.verdict.failed())
    }

    /// Thresholds whose verdict is `Undefined`.
    pub fn undefined_thresholds(&self) -> impl Iterator<Item = &ThresholdOutcome> {
        self.thresholds.iter().filter(|t| t.verdict.is_undefined())
    }

    /// Returns the named scenario's report.
    #[must_use]
    pub fn scenario(&self, name: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// Serializes the result as pretty JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| RunError::Serialization(e.to_string()))
    }

    /// Renders the plain-text summary.
    #[must_use]
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for RunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verdict = if self.succeeded() { "PASSED" } else { "FAILED" };
        writeln!(
            f,
            "run {} {verdict} in {}",
            self.run_id,
            humantime::format_duration(round_ms(self.duration))
        )?;
        if let Some(cause) = &self.aborted {
            writeln!(f, "  aborted: {cause}")?;
        }

        writeln!(f, "\nscenarios:")?;
        for s in &self.scenarios {
            writeln!(
                f,
                "  {:<24} {:<12} max_vus={:<4} iterations={:<8} interrupted={}",
                s.name,
                status_label(s),
                s.max_live,
                s.iterations_completed(),
                s.interrupted()
            )?;
            if let ScenarioStatus::Errored(reason) = &s.status {
                writeln!(f, "    error: {reason}")?;
            }
        }

        if !self.aggregates.is_empty() {
            writeln!(f, "\nmetrics:")?;
            for (name, aggregate) in &self.aggregates {
                writeln!(f, "  {name:<32} {aggregate}")?;
            }
        }

        if !self.thresholds.is_empty() {
            writeln!(f, "\nthresholds:")?;
            for t in &self.thresholds {
                let mark = if t.verdict.passed() {
                    "✓"
                } else if t.verdict.failed() {
                    "✗"
                } else {
                    "?"
                };
                writeln!(f, "  {mark} {:<40} {}", t.spec.to_string(), t.verdict)?;
            }
        }
        Ok(())
    }
}

fn status_label(report: &ScenarioReport) -> &'static str {
    match report.status {
        ScenarioStatus::Completed => "completed",
        ScenarioStatus::Aborted => "aborted",
        ScenarioStatus::Errored(_) => "ERRORED",
        _ => "incomplete",
    }
}

fn round_ms(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}
