//! Run plan: the scenarios, thresholds and options of one run.

use oleada_core::{Result, RunConfig, RunError, RunOptions, ScenarioSpec, WorkloadCatalog};
use oleada_policy::{ThresholdGate, ThresholdSpec};

/// Everything the orchestrator needs to execute a run.
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    /// Scenarios, run concurrently.
    pub scenarios: Vec<ScenarioSpec>,
    /// Thresholds evaluated against the registry.
    pub thresholds: Vec<ThresholdSpec>,
    /// Run-wide options.
    pub options: RunOptions,
}

impl RunPlan {
    /// Creates an empty plan with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scenario.
    #[must_use]
    pub fn with_scenario(mut self, scenario: ScenarioSpec) -> Self {
        self.scenarios.push(scenario);
        self
    }

    /// Adds a threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: ThresholdSpec) -> Self {
        self.thresholds.push(threshold);
        self
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Binds a validated configuration to workloads.
    ///
    /// Each scenario's `exec` (or its name) must be registered in `catalog`.
    ///
    /// # Errors
    /// Returns a configuration error for an unknown workload or a malformed
    /// threshold expression.
    pub fn from_config(config: &RunConfig, catalog: &WorkloadCatalog) -> Result<Self> {
        config.validate()?;

        let mut scenarios = Vec::with_capacity(config.scenarios.len());
        for (name, entry) in &config.scenarios {
            let exec = entry.exec_name(name);
            let workload = catalog.get(exec).ok_or_else(|| {
                RunError::config(format!(
                    "scenario '{name}' references unknown workload '{exec}' (known: {})",
                    catalog.names().join(", ")
                ))
            })?;

            let mut spec = ScenarioSpec::new(name.as_str(), workload)
                .with_schedule(entry.schedule())
                .with_start_offset(entry.start_time)
                .with_graceful_stop(entry.graceful_stop.unwrap_or(config.options.graceful_stop));
            if let Some(pacing) = entry.pacing {
                spec = spec.with_pacing(pacing);
            }
            scenarios.push(spec);
        }

        let gate = ThresholdGate::from_entries(&config.thresholds)?;

        Ok(Self {
            scenarios,
            thresholds: gate.specs().to_vec(),
            options: config.options.clone(),
        })
    }

    /// Returns the first scenario name that appears more than once.
    #[must_use]
    pub fn duplicate_scenario(&self) -> Option<&str> {
        let mut seen = std::collections::HashSet::new();
        self.scenarios
            .iter()
            .map(|s| s.name.as_str())
            .find(|name| !seen.insert(*name))
    }
}
