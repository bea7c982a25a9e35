//! Run test harness.
//!
//! # Toyota Way: Built-in Quality (品質の作り込み)
//! Quality cannot be inspected in; it must be built in.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use oleada_core::{
    Aggregate, Clock, MetricsRegistry, RunOptions, VuContext, Workload, WorkloadError,
};
use oleada_runner::{Orchestrator, RunPlan, RunResult};

use crate::error::{Result, TestError};

/// Installs a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Test harness for whole runs.
pub struct RunHarness {
    orchestrator: Orchestrator,
    options: Option<RunOptions>,
    timeout: Option<Duration>,
}

impl RunHarness {
    /// Creates a new test harness builder.
    #[must_use]
    pub fn builder() -> RunHarnessBuilder {
        RunHarnessBuilder::default()
    }

    /// Creates a new test harness with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Runs `plan` against a fresh registry.
    ///
    /// # Errors
    /// Returns an error if the orchestrator rejects the run or the harness
    /// timeout elapses first.
    pub async fn run(&self, mut plan: RunPlan) -> Result<HarnessRun> {
        if plan.scenarios.is_empty() {
            return Err(TestError::harness("plan has no scenarios"));
        }
        if let Some(options) = &self.options {
            plan.options = options.clone();
        }

        let registry = MetricsRegistry::with_clock(Arc::clone(self.orchestrator.clock()));
        let run = self.orchestrator.run(plan, registry.clone());
        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, run)
                .await
                .map_err(|_| TestError::Timeout(timeout))??,
            None => run.await?,
        };
        Ok(HarnessRun { result, registry })
    }
}

impl Default for RunHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`RunHarness`].
#[derive(Default)]
pub struct RunHarnessBuilder {
    clock: Option<Arc<dyn Clock>>,
    options: Option<RunOptions>,
    timeout: Option<Duration>,
    tracing: bool,
}

impl RunHarnessBuilder {
    /// Uses a custom clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Overrides the plan's run options.
    #[must_use]
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Fails the run with [`TestError::Timeout`] after `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Installs the test tracing subscriber on build.
    #[must_use]
    pub const fn with_tracing(mut self) -> Self {
        self.tracing = true;
        self
    }

    /// Builds the test harness.
    #[must_use]
    pub fn build(self) -> RunHarness {
        if self.tracing {
            init_tracing();
        }
        let orchestrator = self
            .clock
            .map_or_else(Orchestrator::new, Orchestrator::with_clock);
        RunHarness {
            orchestrator,
            options: self.options,
            timeout: self.timeout,
        }
    }
}

/// A finished run together with the registry it recorded into.
#[derive(Debug)]
pub struct HarnessRun {
    /// Run result.
    pub result: RunResult,
    /// Registry, for per-sample inspection.
    pub registry: MetricsRegistry,
}

impl HarnessRun {
    /// Fails unless the run succeeded.
    ///
    /// # Errors
    /// Returns an assertion error carrying the run summary.
    pub fn assert_succeeded(&self) -> Result<()> {
        if self.result.succeeded() {
            Ok(())
        } else {
            Err(TestError::assertion(self.result.summary()))
        }
    }

    /// Counter sum, if the metric has samples.
    #[must_use]
    pub fn count(&self, metric: &str) -> Option<f64> {
        match self.registry.snapshot(metric)? {
            Aggregate::Counter { sum, .. } => Some(sum),
            _ => None,
        }
    }

    /// Rate value, if the metric is a rate.
    #[must_use]
    pub fn rate(&self, metric: &str) -> Option<f64> {
        self.registry.rate_value(metric)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Probe workload
// ═══════════════════════════════════════════════════════════════════════════

/// Counters shared by every VU running a [`ProbeWorkload`].
#[derive(Debug, Default)]
pub struct ProbeStats {
    in_flight: AtomicU64,
    max_in_flight: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl ProbeStats {
    /// Iterations currently executing.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of concurrently executing iterations.
    #[must_use]
    pub fn max_in_flight(&self) -> u64 {
        self.max_in_flight.load(Ordering::Acquire)
    }

    /// Iterations started.
    #[must_use]
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Acquire)
    }

    /// Iterations finished.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Iterations that returned an error.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }
}

/// Workload that sleeps, records a `checks` sample and tracks concurrency.
#[derive(Debug, Clone)]
pub struct ProbeWorkload {
    think: Duration,
    fail_every: Option<u64>,
    stats: Arc<ProbeStats>,
}

impl ProbeWorkload {
    /// Creates a probe whose iterations take `think`.
    #[must_use]
    pub fn new(think: Duration) -> Self {
        Self {
            think,
            fail_every: None,
            stats: Arc::new(ProbeStats::default()),
        }
    }

    /// Fails every `n`th iteration across all VUs.
    #[must_use]
    pub const fn with_fail_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n);
        self
    }

    /// Shared counters.
    #[must_use]
    pub fn stats(&self) -> Arc<ProbeStats> {
        Arc::clone(&self.stats)
    }

    /// Converts into a shareable workload.
    #[must_use]
    pub fn into_workload(self) -> Arc<dyn Workload> {
        Arc::new(self)
    }
}

#[async_trait]
impl Workload for ProbeWorkload {
    async fn iteration(&self, ctx: VuContext) -> std::result::Result<(), WorkloadError> {
        let n = self.stats.started.fetch_add(1, Ordering::AcqRel) + 1;
        let now = self.stats.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.stats.max_in_flight.fetch_max(now, Ordering::AcqRel);

        ctx.sleep(self.think).await;

        self.stats.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.stats.completed.fetch_add(1, Ordering::AcqRel);

        let failed = self.fail_every.is_some_and(|every| every > 0 && n % every == 0);
        if !ctx.check("probe ok", !failed) {
            self.stats.failed.fetch_add(1, Ordering::AcqRel);
            return Err(WorkloadError::iteration(format!("probe iteration {n} failed")));
        }
        Ok(())
    }
}
