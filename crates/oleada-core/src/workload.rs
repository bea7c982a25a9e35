//! Workload contract: what one virtual user does per iteration.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::clock::Clock;
use crate::error::WorkloadError;
use crate::metrics::{MetricsRegistry, builtin};
use crate::types::VuId;

/// Per-iteration context handed to a [`Workload`].
///
/// Cheap to clone.
#[derive(Clone)]
pub struct VuContext {
    scenario: Arc<str>,
    vu: VuId,
    iteration: u64,
    registry: MetricsRegistry,
    clock: Arc<dyn Clock>,
}

impl VuContext {
    /// Creates a context for `vu` of `scenario`, at its `iteration`th iteration.
    ///
    /// The context keeps time on the registry's clock until
    /// [`with_clock`](Self::with_clock) replaces it.
    #[must_use]
    pub fn new(scenario: Arc<str>, vu: VuId, iteration: u64, registry: MetricsRegistry) -> Self {
        let clock = Arc::clone(registry.clock());
        Self {
            scenario,
            vu,
            iteration,
            registry,
            clock,
        }
    }

    /// Keeps time on `clock`, the one driving the VU's scenario.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the scenario name.
    #[must_use]
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    /// Returns the virtual user ID.
    #[must_use]
    pub const fn vu(&self) -> VuId {
        self.vu
    }

    /// Returns the zero-based iteration number within this VU.
    #[must_use]
    pub const fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Returns the run's metrics registry.
    #[must_use]
    pub const fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    /// Returns the run clock.
    #[must_use]
    pub const fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Returns the current instant on the run clock.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.clock().now()
    }

    /// Suspends the VU for `duration` on the run clock.
    pub async fn sleep(&self, duration: Duration) {
        self.clock().sleep(duration).await;
    }

    /// Records a named check into the `checks` rate and returns `passed`.
    pub fn check(&self, name: &str, passed: bool) -> bool {
        if let Err(e) = self
            .registry
            .record(builtin::CHECKS, crate::MetricKind::Rate, f64::from(u8::from(passed)))
        {
            tracing::warn!(check = name, error = %e, "check not recorded");
        }
        if !passed {
            tracing::trace!(scenario = %self.scenario, vu = %self.vu, check = name, "check failed");
        }
        passed
    }
}

impl std::fmt::Debug for VuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VuContext")
            .field("scenario", &self.scenario)
            .field("vu", &self.vu)
            .field("iteration", &self.iteration)
            .finish_non_exhaustive()
    }
}

/// One unit of user-defined work, executed repeatedly by every VU.
///
/// Expected failures (bad status, malformed body) should be recorded into
/// metrics and returned as [`WorkloadError::Iteration`], or swallowed.
/// [`WorkloadError::Config`] stops the whole scenario.
#[async_trait]
pub trait Workload: Send + Sync + 'static {
    /// Runs one iteration.
    async fn iteration(&self, ctx: VuContext) -> Result<(), WorkloadError>;
}

/// Adapter turning an async closure into a [`Workload`].
pub struct FnWorkload<F> {
    f: F,
}

impl<F> FnWorkload<F> {
    /// Wraps `f`.
    #[must_use]
    pub const fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Workload for FnWorkload<F>
where
    F: Fn(VuContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WorkloadError>> + Send + 'static,
{
    async fn iteration(&self, ctx: VuContext) -> Result<(), WorkloadError> {
        (self.f)(ctx).await
    }
}

/// Builds a shared workload from an async closure.
pub fn workload_fn<F, Fut>(f: F) -> Arc<dyn Workload>
where
    F: Fn(VuContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WorkloadError>> + Send + 'static,
{
    Arc::new(FnWorkload::new(f))
}

/// Workloads addressable by name, for binding configuration `exec` entries.
#[derive(Clone, Default)]
pub struct WorkloadCatalog {
    workloads: BTreeMap<String, Arc<dyn Workload>>,
}

impl WorkloadCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `workload` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, workload: Arc<dyn Workload>) {
        self.workloads.insert(name.into(), workload);
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, workload: Arc<dyn Workload>) -> Self {
        self.register(name, workload);
        self
    }

    /// Returns the workload registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Workload>> {
        self.workloads.get(name).cloned()
    }

    /// Returns registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.workloads.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for WorkloadCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkloadCatalog")
            .field("workloads", &self.names())
            .finish()
    }
}
