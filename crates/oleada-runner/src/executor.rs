//! Scenario executor: the virtual user ramp engine.
//!
//! One executor drives one [`ScenarioSpec`]. It waits for the scenario's
//! start offset, spawns `start_vus` lanes, then wakes every tick (and
//! exactly at each stage boundary) to reconcile the live population with the
//! schedule target:
//!
//! - live < target: spawn the missing VUs, starting immediately
//! - live > target: retire the most recently spawned VUs
//!
//! Retirement is cooperative. A retired VU finishes its in-flight iteration
//! and exits; it is never interrupted. When the target rises again before a
//! retired VU has exited, that VU is reactivated instead of spawning a new
//! one, so busy VUs never exceed the schedule's maximum target. The only exception is the end of the
//! scenario, where VUs still busy after `graceful_stop` are force-stopped and
//! reported as interrupted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use oleada_core::metrics::builtin;
use oleada_core::{
    Clock, Counter, MetricsRegistry, Rate, ScenarioSpec, ScenarioStatus, Trend, VuContext, VuId,
    Workload, WorkloadError,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;

/// Default reconciliation interval.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// One reconciliation of the live VU population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RampEvent {
    /// Scenario time of the reconciliation.
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    /// Schedule target at that time.
    pub target: u32,
    /// Live (non-retired) VUs after reconciling.
    pub live: u32,
}

/// Iteration counts of one virtual user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VuReport {
    /// VU identifier.
    pub id: VuId,
    /// Iterations started.
    pub started: u64,
    /// Iterations that returned (successfully or not).
    pub completed: u64,
    /// Iterations that returned an error.
    pub failed: u64,
    /// Iterations force-stopped at scenario end.
    pub interrupted: u64,
}

/// What happened to one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name.
    pub name: String,
    /// Final status.
    pub status: ScenarioStatus,
    /// Run time at which scenario time zero began, if it started.
    #[serde(with = "humantime_serde")]
    pub started_after: Option<Duration>,
    /// Time from scenario start until the last VU stopped.
    #[serde(with = "humantime_serde")]
    pub running_time: Duration,
    /// Highest live VU count observed.
    pub max_live: u32,
    /// Reconciliation history.
    pub timeline: Vec<RampEvent>,
    /// Per-VU counts, in spawn order.
    pub vus: Vec<VuReport>,
}

impl ScenarioReport {
    /// Report for a scenario that never ran.
    #[must_use]
    pub fn errored(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::empty(name, ScenarioStatus::Errored(reason.into()))
    }

    fn empty(name: impl Into<String>, status: ScenarioStatus) -> Self {
        Self {
            name: name.into(),
            status,
            started_after: None,
            running_time: Duration::ZERO,
            max_live: 0,
            timeline: Vec::new(),
            vus: Vec::new(),
        }
    }

    /// Returns true if the scenario ended with an error.
    #[must_use]
    pub const fn is_errored(&self) -> bool {
        self.status.is_errored()
    }

    /// Total iterations started across VUs.
    #[must_use]
    pub fn iterations_started(&self) -> u64 {
        self.vus.iter().map(|v| v.started).sum()
    }

    /// Total iterations completed across VUs.
    #[must_use]
    pub fn iterations_completed(&self) -> u64 {
        self.vus.iter().map(|v| v.completed).sum()
    }

    /// Total iterations force-stopped.
    #[must_use]
    pub fn interrupted(&self) -> u64 {
        self.vus.iter().map(|v| v.interrupted).sum()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Virtual users
// ═══════════════════════════════════════════════════════════════════════════

const ACTIVE: u8 = 0;
const RETIRED: u8 = 1;
const EXITED: u8 = 2;

#[derive(Debug)]
struct VuControl {
    id: VuId,
    /// ACTIVE -> RETIRED -> EXITED, or RETIRED -> ACTIVE on reactivation.
    state: AtomicU8,
    wake: Notify,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl VuControl {
    fn new(id: VuId) -> Self {
        Self {
            id,
            state: AtomicU8::new(ACTIVE),
            wake: Notify::new(),
            started: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    fn retire(&self) {
        let _ = self
            .state
            .compare_exchange(ACTIVE, RETIRED, Ordering::AcqRel, Ordering::Acquire);
        self.wake.notify_one();
    }

    /// Takes a retired VU back. Fails once the VU has exited.
    fn reactivate(&self) -> bool {
        self.state
            .compare_exchange(RETIRED, ACTIVE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Called by the VU between iterations. Returns false once it has exited.
    fn keep_running(&self) -> bool {
        match self
            .state
            .compare_exchange(RETIRED, EXITED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => false,
            Err(current) => current == ACTIVE,
        }
    }

    fn exit(&self) {
        self.state.store(EXITED, Ordering::Release);
    }

    fn report(&self) -> VuReport {
        let started = self.started.load(Ordering::Acquire);
        let completed = self.completed.load(Ordering::Acquire);
        VuReport {
            id: self.id,
            started,
            completed,
            failed: self.failed.load(Ordering::Acquire),
            interrupted: started.saturating_sub(completed),
        }
    }
}

#[derive(Clone)]
struct IterationMetrics {
    iterations: Counter,
    duration: Trend,
    errors: Rate,
}

impl IterationMetrics {
    fn new(registry: &MetricsRegistry) -> oleada_core::Result<Self> {
        Ok(Self {
            iterations: registry.counter(builtin::ITERATIONS)?,
            duration: registry.trend(builtin::ITERATION_DURATION)?,
            errors: registry.rate(builtin::ITERATION_ERRORS)?,
        })
    }
}

struct VuLane {
    scenario: Arc<str>,
    control: Arc<VuControl>,
    workload: Arc<dyn Workload>,
    registry: MetricsRegistry,
    clock: Arc<dyn Clock>,
    metrics: IterationMetrics,
    pacing: Option<Duration>,
}

impl VuLane {
    /// Loops the workload until retired. `Err` stops the whole scenario.
    async fn run(self) -> Result<(), String> {
        let outcome = self.iterate().await;
        self.control.exit();
        outcome
    }

    async fn iterate(&self) -> Result<(), String> {
        let mut iteration = 0u64;
        while self.control.keep_running() {
            let began = self.clock.now();
            self.control.started.fetch_add(1, Ordering::AcqRel);
            let ctx = VuContext::new(
                Arc::clone(&self.scenario),
                self.control.id,
                iteration,
                self.registry.clone(),
            )
            .with_clock(Arc::clone(&self.clock));
            let outcome = self.workload.iteration(ctx).await;
            self.control.completed.fetch_add(1, Ordering::AcqRel);
            iteration += 1;

            self.metrics.iterations.inc();
            self.metrics
                .duration
                .add_duration(self.clock.elapsed_since(began));
            self.metrics.errors.add(outcome.is_err());

            match outcome {
                Ok(()) => {}
                Err(WorkloadError::Iteration(reason)) => {
                    let failures = self.control.failed.fetch_add(1, Ordering::AcqRel) + 1;
                    if failures == 1 || failures % 100 == 0 {
                        tracing::warn!(
                            scenario = %self.scenario,
                            vu = %self.control.id,
                            failures,
                            %reason,
                            "iteration failed"
                        );
                    }
                }
                Err(WorkloadError::Config(reason)) => {
                    self.control.failed.fetch_add(1, Ordering::AcqRel);
                    return Err(format!("workload configuration error: {reason}"));
                }
            }

            match self.pacing {
                Some(pacing) => {
                    tokio::select! {
                        () = self.clock.sleep_until(began + pacing) => {}
                        () = self.control.wake.notified() => {}
                    }
                }
                // Keeps the executor responsive when the workload never suspends.
                None => tokio::task::yield_now().await,
            }
        }
        Ok(())
    }
}

struct VuPool {
    scenario: Arc<str>,
    workload: Arc<dyn Workload>,
    registry: MetricsRegistry,
    clock: Arc<dyn Clock>,
    metrics: IterationMetrics,
    pacing: Option<Duration>,
    live: Vec<Arc<VuControl>>,
    /// Retired VUs that may still be finishing an iteration. Last retired is reused first.
    retiring: Vec<Arc<VuControl>>,
    all: Vec<Arc<VuControl>>,
    tasks: JoinSet<Result<(), String>>,
    timeline: Vec<RampEvent>,
    max_live: u32,
}

impl VuPool {
    fn live(&self) -> u32 {
        self.live.len() as u32
    }

    fn spawn(&mut self) {
        let control = Arc::new(VuControl::new(VuId(self.all.len() as u64 + 1)));
        let lane = VuLane {
            scenario: Arc::clone(&self.scenario),
            control: Arc::clone(&control),
            workload: Arc::clone(&self.workload),
            registry: self.registry.clone(),
            clock: Arc::clone(&self.clock),
            metrics: self.metrics.clone(),
            pacing: self.pacing,
        };
        self.tasks.spawn(lane.run());
        self.live.push(Arc::clone(&control));
        self.all.push(control);
    }

    fn reconcile(&mut self, elapsed: Duration, target: u32) {
        let before = self.live();
        let wanted = target as usize;
        while self.live.len() < wanted {
            match self.retiring.pop() {
                Some(vu) if vu.reactivate() => self.live.push(vu),
                Some(_) => {}
                None => self.spawn(),
            }
        }
        if self.live.len() > wanted {
            // Newest first.
            for vu in self.live.split_off(wanted).into_iter().rev() {
                vu.retire();
                self.retiring.push(vu);
            }
        }

        let live = self.live();
        self.max_live = self.max_live.max(live);
        self.timeline.push(RampEvent {
            elapsed,
            target,
            live,
        });
        if live != before {
            tracing::debug!(scenario = %self.scenario, ?elapsed, target, from = before, to = live, "reconciled");
        }
    }

    fn retire_all(&mut self) {
        for vu in self.live.drain(..).rev() {
            vu.retire();
        }
    }

    /// Waits up to `bound` for retired VUs to exit, then force-stops the rest.
    async fn drain(&mut self, bound: Duration) -> Option<String> {
        let deadline = self.clock.now() + bound;
        let mut fault = None;
        loop {
            tokio::select! {
                joined = self.tasks.join_next() => match joined {
                    Some(joined) => {
                        if let Some(reason) = fault_of(joined) {
                            fault.get_or_insert(reason);
                        }
                    }
                    None => return fault,
                },
                () = self.clock.sleep_until(deadline) => break,
            }
        }

        tracing::warn!(
            scenario = %self.scenario,
            vus = self.tasks.len(),
            graceful_stop = %humantime::format_duration(bound),
            "graceful stop elapsed, force-stopping virtual users"
        );
        self.tasks.abort_all();
        while let Some(joined) = self.tasks.join_next().await {
            if let Some(reason) = fault_of(joined) {
                fault.get_or_insert(reason);
            }
        }
        fault
    }

    fn reports(&self) -> Vec<VuReport> {
        self.all.iter().map(|vu| vu.report()).collect()
    }
}

fn fault_of(joined: Result<Result<(), String>, JoinError>) -> Option<String> {
    match joined {
        Ok(Ok(())) => None,
        Ok(Err(reason)) => Some(reason),
        Err(e) if e.is_panic() => Some(format!(
            "virtual user panicked: {}",
            panic_message(e.into_panic())
        )),
        Err(_) => None,
    }
}

pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Resolves once the stop signal is raised. Never resolves without a signal.
async fn wait_for_stop(stop: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = stop {
        if rx.wait_for(|stopped| *stopped).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await;
}

// ═══════════════════════════════════════════════════════════════════════════
// Executor
// ═══════════════════════════════════════════════════════════════════════════

enum Ending {
    Completed,
    Aborted,
    Errored(String),
}

/// Drives one scenario from start offset to last VU exit.
pub struct ScenarioExecutor {
    spec: ScenarioSpec,
    registry: MetricsRegistry,
    clock: Arc<dyn Clock>,
    tick: Duration,
    stop: Option<watch::Receiver<bool>>,
}

impl ScenarioExecutor {
    /// Creates an executor that records into `registry` and keeps time on `clock`.
    #[must_use]
    pub fn new(spec: ScenarioSpec, registry: MetricsRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            spec,
            registry,
            clock,
            tick: DEFAULT_TICK,
            stop: None,
        }
    }

    /// Sets the reconciliation interval. Zero is ignored.
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        if !tick.is_zero() {
            self.tick = tick;
        }
        self
    }

    /// Stops the scenario early once `stop` turns true.
    #[must_use]
    pub fn with_stop_signal(mut self, stop: watch::Receiver<bool>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Runs the scenario. `run_start` is the instant its offset counts from.
    pub async fn run(mut self, run_start: Instant) -> ScenarioReport {
        let name = self.spec.name.clone();
        let mut status = ScenarioStatus::Pending;

        if let Err(e) = self.spec.validate() {
            tracing::error!(scenario = %name, error = %e, "scenario not started");
            return ScenarioReport::errored(name, e.to_string());
        }
        let metrics = match IterationMetrics::new(&self.registry) {
            Ok(metrics) => metrics,
            Err(e) => {
                tracing::error!(scenario = %name, error = %e, "scenario not started");
                return ScenarioReport::errored(name, e.to_string());
            }
        };

        advance(&name, &mut status, ScenarioStatus::Waiting);
        let mut stop = self.stop.take();
        tokio::select! {
            () = self.clock.sleep_until(run_start + self.spec.start_offset) => {}
            () = wait_for_stop(&mut stop) => {
                tracing::info!(scenario = %name, "run stopped before scenario start");
                return ScenarioReport::empty(name, ScenarioStatus::Aborted);
            }
        }

        let schedule = self.spec.schedule.clone();
        let total = schedule.total_duration();
        let started = self.clock.now();
        advance(&name, &mut status, ScenarioStatus::Running);
        tracing::info!(
            scenario = %name,
            start_vus = schedule.start_vus,
            max_vus = schedule.max_target(),
            duration = %humantime::format_duration(total),
            "scenario started"
        );

        let mut pool = VuPool {
            scenario: Arc::from(name.as_str()),
            workload: Arc::clone(&self.spec.workload),
            registry: self.registry.clone(),
            clock: Arc::clone(&self.clock),
            metrics,
            pacing: self.spec.pacing,
            live: Vec::new(),
            retiring: Vec::new(),
            all: Vec::new(),
            tasks: JoinSet::new(),
            timeline: Vec::new(),
            max_live: 0,
        };
        pool.reconcile(Duration::ZERO, schedule.start_vus);

        let mut ending = Ending::Completed;
        let mut next_tick = self.tick;
        loop {
            let elapsed = self.clock.elapsed_since(started);
            if elapsed >= total {
                break;
            }
            while next_tick <= elapsed {
                next_tick += self.tick;
            }
            let wake = schedule
                .next_boundary(elapsed)
                .map_or(next_tick, |boundary| boundary.min(next_tick))
                .min(total);

            tokio::select! {
                () = self.clock.sleep_until(started + wake) => {}
                () = wait_for_stop(&mut stop) => {
                    ending = Ending::Aborted;
                    break;
                }
                Some(joined) = pool.tasks.join_next(), if !pool.tasks.is_empty() => {
                    if let Some(reason) = fault_of(joined) {
                        tracing::error!(scenario = %name, %reason, "scenario aborted");
                        ending = Ending::Errored(reason);
                        break;
                    }
                    continue;
                }
            }

            let elapsed = self.clock.elapsed_since(started);
            if elapsed >= total {
                break;
            }
            pool.reconcile(elapsed, schedule.target_at(elapsed));
        }

        advance(&name, &mut status, ScenarioStatus::Stopping);
        pool.retire_all();
        let drain_fault = pool.drain(self.spec.graceful_stop).await;
        let running_time = self.clock.elapsed_since(started);

        let final_status = match (ending, drain_fault) {
            (Ending::Errored(reason), _) | (_, Some(reason)) => ScenarioStatus::Errored(reason),
            (Ending::Aborted, None) => ScenarioStatus::Aborted,
            (Ending::Completed, None) => ScenarioStatus::Completed,
        };
        advance(&name, &mut status, final_status);

        let report = ScenarioReport {
            name,
            status,
            started_after: Some(started.saturating_duration_since(run_start)),
            running_time,
            max_live: pool.max_live,
            timeline: std::mem::take(&mut pool.timeline),
            vus: pool.reports(),
        };
        tracing::info!(
            scenario = %report.name,
            status = %report.status,
            iterations = report.iterations_completed(),
            interrupted = report.interrupted(),
            "scenario finished"
        );
        report
    }
}

fn advance(scenario: &str, status: &mut ScenarioStatus, next: ScenarioStatus) {
    debug_assert!(
        status.can_transition_to(&next),
        "illegal scenario transition {status} -> {next}"
    );
    tracing::debug!(scenario, from = %status, to = %next, "scenario status");
    *status = next;
}
