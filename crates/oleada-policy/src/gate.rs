//! Threshold gate evaluation.
//!
//! A gate reads the metrics registry and turns every [`ThresholdSpec`] into a
//! [`ThresholdVerdict`]. A threshold that cannot be observed (unknown metric,
//! no samples, aggregation not defined for the metric's kind) is
//! `Undefined`: it neither passes nor fails, and it never aborts a run.

use std::collections::BTreeMap;

use oleada_core::{MetricsRegistry, ThresholdEntry};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::threshold::ThresholdSpec;

/// Outcome of one threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum ThresholdVerdict {
    /// The observed value satisfies the predicate.
    Passed {
        /// Observed value.
        observed: f64,
    },
    /// The observed value violates the predicate.
    Failed {
        /// Observed value.
        observed: f64,
    },
    /// No value could be observed.
    Undefined {
        /// Why.
        reason: String,
    },
}

impl ThresholdVerdict {
    /// Returns true only for `Passed`.
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }

    /// Returns true only for `Failed`.
    #[must_use]
    pub const fn failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns true only for `Undefined`.
    #[must_use]
    pub const fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined { .. })
    }
}

impl std::fmt::Display for ThresholdVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed { observed } => write!(f, "passed (observed {observed:.4})"),
            Self::Failed { observed } => write!(f, "FAILED (observed {observed:.4})"),
            Self::Undefined { reason } => write!(f, "undefined ({reason})"),
        }
    }
}

/// A threshold paired with its verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdOutcome {
    /// The threshold.
    pub spec: ThresholdSpec,
    /// Its verdict.
    pub verdict: ThresholdVerdict,
}

impl ThresholdOutcome {
    /// Returns true if the threshold passed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.verdict.passed()
    }
}

/// Evaluates one threshold against the registry.
#[must_use]
pub fn evaluate_one(spec: &ThresholdSpec, registry: &MetricsRegistry) -> ThresholdVerdict {
    match spec.aggregation.observe(registry, &spec.metric) {
        Ok(observed) if spec.holds(observed) => ThresholdVerdict::Passed { observed },
        Ok(observed) => ThresholdVerdict::Failed { observed },
        Err(reason) => ThresholdVerdict::Undefined { reason },
    }
}

/// Evaluates every threshold, in order.
#[must_use]
pub fn evaluate(specs: &[ThresholdSpec], registry: &MetricsRegistry) -> Vec<ThresholdOutcome> {
    specs
        .iter()
        .map(|spec| ThresholdOutcome {
            spec: spec.clone(),
            verdict: evaluate_one(spec, registry),
        })
        .collect()
}

/// Set of thresholds for a run.
#[derive(Debug, Clone, Default)]
pub struct ThresholdGate {
    specs: Vec<ThresholdSpec>,
}

impl ThresholdGate {
    /// Creates a gate from parsed thresholds.
    #[must_use]
    pub const fn new(specs: Vec<ThresholdSpec>) -> Self {
        Self { specs }
    }

    /// Parses configuration threshold entries.
    ///
    /// # Errors
    /// Returns an error for the first malformed expression.
    pub fn from_entries(entries: &BTreeMap<String, Vec<ThresholdEntry>>) -> Result<Self> {
        let mut specs = Vec::new();
        for (metric, list) in entries {
            for entry in list {
                specs.push(
                    ThresholdSpec::parse(metric.as_str(), entry.expression())?
                        .with_abort_on_fail(entry.abort_on_fail()),
                );
            }
        }
        Ok(Self::new(specs))
    }

    /// Returns the thresholds.
    #[must_use]
    pub fn specs(&self) -> &[ThresholdSpec] {
        &self.specs
    }

    /// Returns true if any threshold is abort-on-fail.
    #[must_use]
    pub fn has_abort_on_fail(&self) -> bool {
        self.specs.iter().any(|s| s.abort_on_fail)
    }

    /// Evaluates every threshold.
    #[must_use]
    pub fn evaluate(&self, registry: &MetricsRegistry) -> Vec<ThresholdOutcome> {
        evaluate(&self.specs, registry)
    }

    /// Evaluates abort-on-fail thresholds only and returns the first failure.
    ///
    /// `Undefined` never triggers an abort.
    #[must_use]
    pub fn first_abort(&self, registry: &MetricsRegistry) -> Option<ThresholdOutcome> {
        self.specs
            .iter()
            .filter(|spec| spec.abort_on_fail)
            .find_map(|spec| {
                let verdict = evaluate_one(spec, registry);
                verdict.failed().then(|| {
                    tracing::warn!(threshold = %spec, verdict = %verdict, "abort-on-fail threshold crossed");
                    ThresholdOutcome {
                        spec: spec.clone(),
                        verdict,
                    }
                })
            })
    }
}

/// Returns true if every outcome passed. `Undefined` counts as not passed.
#[must_use]
pub fn all_passed(outcomes: &[ThresholdOutcome]) -> bool {
    outcomes.iter().all(ThresholdOutcome::passed)
}
