//! Run orchestrator.
//!
//! Starts every scenario of a [`RunPlan`] against one run-start instant, lets
//! them run concurrently, and collects a [`RunResult`] once the last one has
//! finished. While the run is in flight it watches two stop conditions:
//!
//! - the optional `run_timeout`
//! - abort-on-fail thresholds, evaluated every `threshold_interval`
//!
//! Either one raises a shared stop signal; every executor then retires its
//! VUs and drains them within its `graceful_stop`.

use std::sync::Arc;
use std::time::Duration;

use oleada_core::{AbortCause, Clock, MetricsRegistry, Result, RunError, RunId, TokioClock};
use oleada_policy::{ThresholdGate, all_passed};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::executor::{ScenarioExecutor, ScenarioReport, panic_message};
use crate::plan::RunPlan;
use crate::result::RunResult;

/// Runs plans to completion.
#[derive(Clone)]
pub struct Orchestrator {
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    /// Creates an orchestrator on the tokio clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(TokioClock::new()))
    }

    /// Creates an orchestrator on a custom clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Returns the clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Executes `plan`, recording into `registry`.
    ///
    /// Scenario-level failures are reported inside the result. Only
    /// run-level problems are returned as errors.
    ///
    /// # Errors
    /// Returns an error if the clock is unavailable, the options are invalid,
    /// or two scenarios share a name.
    pub async fn run(&self, plan: RunPlan, registry: MetricsRegistry) -> Result<RunResult> {
        self.clock.ensure_available()?;
        plan.options.validate()?;
        if let Some(name) = plan.duplicate_scenario() {
            return Err(RunError::config(format!("duplicate scenario name '{name}'")));
        }

        let RunPlan {
            scenarios,
            thresholds,
            options,
        } = plan;
        let gate = ThresholdGate::new(thresholds);
        let run_id = RunId::new();
        let (stop_tx, stop_rx) = watch::channel(false);
        let run_start = self.clock.now();

        tracing::info!(
            %run_id,
            scenarios = scenarios.len(),
            thresholds = gate.specs().len(),
            run_timeout = ?options.run_timeout,
            "run started"
        );

        let mut handles = Vec::with_capacity(scenarios.len());
        for spec in scenarios {
            let name = spec.name.clone();
            let executor = ScenarioExecutor::new(spec, registry.clone(), Arc::clone(&self.clock))
                .with_tick(options.tick)
                .with_stop_signal(stop_rx.clone());
            handles.push((name, tokio::spawn(executor.run(run_start))));
        }
        drop(stop_rx);

        let joiner = async move {
            let mut reports = Vec::with_capacity(handles.len());
            for (name, handle) in handles {
                let report = match handle.await {
                    Ok(report) => report,
                    Err(e) if e.is_panic() => {
                        let reason = format!(
                            "scenario task panicked: {}",
                            panic_message(e.into_panic())
                        );
                        tracing::error!(scenario = %name, %reason, "scenario lost");
                        ScenarioReport::errored(name, reason)
                    }
                    Err(_) => ScenarioReport::errored(name, "scenario task cancelled"),
                };
                reports.push(report);
            }
            reports
        };
        tokio::pin!(joiner);

        let watch_thresholds = gate.has_abort_on_fail();
        let deadline = options.run_timeout.map(|timeout| run_start + timeout);
        let mut next_check = run_start + options.threshold_interval;
        let mut aborted: Option<AbortCause> = None;

        let reports = loop {
            tokio::select! {
                reports = &mut joiner => break reports,
                () = self.clock.sleep_until(next_check), if watch_thresholds && aborted.is_none() => {
                    next_check += options.threshold_interval;
                    if let Some(outcome) = gate.first_abort(&registry) {
                        tracing::warn!(%run_id, threshold = %outcome.spec, "stopping run");
                        aborted = Some(AbortCause::ThresholdFailed {
                            metric: outcome.spec.metric.clone(),
                            predicate: outcome.spec.expression.clone(),
                        });
                        stop_tx.send_replace(true);
                    }
                }
                () = sleep_until_deadline(self.clock.as_ref(), deadline), if aborted.is_none() => {
                    let timeout = options.run_timeout.unwrap_or(Duration::ZERO);
                    tracing::warn!(
                        %run_id,
                        run_timeout = %humantime::format_duration(timeout),
                        "run timeout elapsed, stopping run"
                    );
                    aborted = Some(AbortCause::RunTimeout(timeout));
                    stop_tx.send_replace(true);
                }
            }
        };

        let outcomes = gate.evaluate(&registry);
        let result = RunResult {
            run_id,
            duration: self.clock.elapsed_since(run_start),
            aggregates: registry.snapshot_all(),
            overall_pass: all_passed(&outcomes),
            thresholds: outcomes,
            scenarios: reports,
            aborted,
        };

        tracing::info!(
            %run_id,
            passed = result.overall_pass,
            errored = result.errored_scenarios().count(),
            failed_thresholds = result.failed_thresholds().count(),
            undefined_thresholds = result.undefined_thresholds().count(),
            duration = ?result.duration,
            "run finished"
        );
        Ok(result)
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

async fn sleep_until_deadline(clock: &dyn Clock, deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => clock.sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
