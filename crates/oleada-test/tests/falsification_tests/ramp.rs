//! Falsification Tests: Category A - VU Ramp Engine (F001-F020)
//!
//! # Toyota Way: Heijunka (平準化)
//! Load is levelled to the schedule, never above it.

use std::sync::Arc;
use std::time::Duration;

use oleada_core::{
    Clock, MetricsRegistry, RampPolicy, Schedule, ScenarioSpec, ScenarioStatus, Stage,
    TokioClock, Workload,
};
use oleada_runner::{DEFAULT_TICK, ScenarioExecutor, ScenarioReport};
use oleada_test::ProbeWorkload;
use proptest::prelude::*;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn bulk_insert_stages() -> Vec<Stage> {
    vec![
        Stage::new(secs(10), 1),
        Stage::new(secs(10), 5),
        Stage::new(secs(20), 5),
        Stage::new(secs(10), 0),
    ]
}

fn probe(think_ms: u64) -> Arc<dyn Workload> {
    ProbeWorkload::new(Duration::from_millis(think_ms)).into_workload()
}

async fn execute(spec: ScenarioSpec) -> ScenarioReport {
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let start = clock.now();
    ScenarioExecutor::new(spec, MetricsRegistry::new(), clock)
        .run(start)
        .await
}

// =============================================================================
// F001-F005: Convergence and bounds
// =============================================================================

/// F001: Live VUs reach each stage's target within one tick
///
/// # Falsification Attempt
/// Run the bulk-insert schedule and look for a stage boundary after which
/// the population is still off target one tick later.
#[tokio::test(start_paused = true)]
async fn f001_converges_within_one_tick() {
    let probe = ProbeWorkload::new(Duration::from_millis(300));
    let spec = ScenarioSpec::new("ramp", probe.into_workload())
        .with_start_vus(1)
        .with_stages(bulk_insert_stages());
    let schedule = spec.schedule.clone();
    let report = execute(spec).await;

    assert_eq!(
        report.status,
        ScenarioStatus::Completed,
        "F001 FALSIFIED: scenario did not complete"
    );

    let mut boundary = Duration::ZERO;
    for stage in &schedule.stages {
        let expected = schedule.target_at(boundary);
        let converged = report.timeline.iter().any(|e| {
            e.elapsed >= boundary && e.elapsed <= boundary + DEFAULT_TICK && e.live == expected
        });
        assert!(
            converged,
            "F001 FALSIFIED: no convergence to {expected} within one tick of {boundary:?}"
        );
        boundary += stage.duration;
    }

    for event in &report.timeline {
        assert_eq!(
            event.target,
            schedule.target_at(event.elapsed),
            "F001 FALSIFIED: reconciled against wrong target at {:?}",
            event.elapsed
        );
        assert_eq!(
            event.live, event.target,
            "F001 FALSIFIED: live count off target after reconcile at {:?}",
            event.elapsed
        );
    }
}

/// F002: Live VUs never exceed the maximum target
///
/// # Falsification Attempt
/// Track concurrently executing iterations across a schedule that ramps up,
/// down and up again.
#[tokio::test(start_paused = true)]
async fn f002_never_exceeds_max_target() {
    let probe = ProbeWorkload::new(Duration::from_millis(200));
    let stats = probe.stats();
    let spec = ScenarioSpec::new("bounded", probe.into_workload())
        .with_start_vus(2)
        .with_stages(vec![
            Stage::new(secs(3), 6),
            Stage::new(secs(3), 2),
            Stage::new(secs(3), 4),
            Stage::new(secs(2), 0),
        ]);
    let max = spec.schedule.max_target();
    let report = execute(spec).await;

    assert!(
        report.max_live <= max,
        "F002 FALSIFIED: {} live VUs, max target {max}",
        report.max_live
    );
    assert!(
        report.timeline.iter().all(|e| e.live <= max),
        "F002 FALSIFIED: timeline exceeded {max}"
    );
    assert!(
        stats.max_in_flight() <= u64::from(max),
        "F002 FALSIFIED: {} iterations in flight, max target {max}",
        stats.max_in_flight()
    );
}

/// F003: startVUs are live at scenario time zero
///
/// # Falsification Attempt
/// Inspect the first reconciliation.
#[tokio::test(start_paused = true)]
async fn f003_start_vus_live_immediately() {
    let spec = ScenarioSpec::new("warm", probe(100))
        .with_start_vus(3)
        .with_stages(vec![Stage::new(secs(2), 3)]);
    let report = execute(spec).await;

    let first = report.timeline.first().copied();
    assert_eq!(
        first.map(|e| (e.elapsed, e.live)),
        Some((Duration::ZERO, 3)),
        "F003 FALSIFIED: start VUs not live at t=0"
    );
}

/// F004: Linear ramp interpolates between stage targets
///
/// # Falsification Attempt
/// Ramp 0 → 10 over 10s and verify each tick lands on the interpolated value.
#[tokio::test(start_paused = true)]
async fn f004_linear_ramp_interpolates() {
    let spec = ScenarioSpec::new("linear", probe(100))
        .with_stages(vec![Stage::new(secs(10), 10), Stage::new(secs(2), 10)])
        .with_ramp_policy(RampPolicy::Linear);
    let report = execute(spec).await;

    for event in &report.timeline {
        if event.elapsed <= secs(10) {
            let expected = event.elapsed.as_secs() as u32;
            assert_eq!(
                event.live, expected,
                "F004 FALSIFIED: linear ramp at {:?}",
                event.elapsed
            );
        }
    }
    assert_eq!(report.max_live, 10, "F004 FALSIFIED: never reached 10");
}

/// F005: Ramp to zero leaves no VUs running before the scenario ends
///
/// # Falsification Attempt
/// Check that the final stage at target 0 has no live VUs.
#[tokio::test(start_paused = true)]
async fn f005_ramp_to_zero_empties_pool() {
    let spec = ScenarioSpec::new("drain", probe(300))
        .with_start_vus(1)
        .with_stages(bulk_insert_stages());
    let report = execute(spec).await;

    let after_last_boundary: Vec<_> = report
        .timeline
        .iter()
        .filter(|e| e.elapsed >= secs(40))
        .collect();
    assert!(
        !after_last_boundary.is_empty(),
        "F005 FALSIFIED: no reconciliation in the last stage"
    );
    assert!(
        after_last_boundary.iter().all(|e| e.live == 0),
        "F005 FALSIFIED: VUs alive in a target-0 stage"
    );
}

// =============================================================================
// F006-F010: Retirement
// =============================================================================

/// F006: Retirement never interrupts an in-flight iteration
///
/// # Falsification Attempt
/// Ramp down repeatedly while iterations take most of a tick; every VU must
/// have completed every iteration it started.
#[tokio::test(start_paused = true)]
async fn f006_retirement_never_interrupts() {
    let probe = ProbeWorkload::new(Duration::from_millis(900));
    let stats = probe.stats();
    let spec = ScenarioSpec::new("churn", probe.into_workload())
        .with_start_vus(8)
        .with_stages(vec![
            Stage::new(secs(2), 8),
            Stage::new(secs(2), 3),
            Stage::new(secs(2), 7),
            Stage::new(secs(2), 1),
            Stage::new(secs(2), 0),
        ]);
    let report = execute(spec).await;

    for vu in &report.vus {
        assert_eq!(
            vu.started, vu.completed,
            "F006 FALSIFIED: {} started {} but completed {}",
            vu.id, vu.started, vu.completed
        );
        assert_eq!(vu.interrupted, 0, "F006 FALSIFIED: {} interrupted", vu.id);
    }
    assert_eq!(
        stats.started(),
        stats.completed(),
        "F006 FALSIFIED: probe saw unfinished iterations"
    );
}

/// F007: Most recently spawned VUs retire first
///
/// # Falsification Attempt
/// Ramp 4 → 1 and check only the first VU keeps iterating.
#[tokio::test(start_paused = true)]
async fn f007_retires_newest_first() {
    let spec = ScenarioSpec::new("lifo", probe(100))
        .with_start_vus(4)
        .with_stages(vec![Stage::new(secs(1), 4), Stage::new(secs(5), 1)]);
    let report = execute(spec).await;

    let first = &report.vus[0];
    for later in &report.vus[1..] {
        assert!(
            first.completed > later.completed,
            "F007 FALSIFIED: {} outlived {}",
            later.id,
            first.id
        );
    }
}

/// F008: A VU retired mid-iteration is reused when the target rises again
///
/// # Falsification Attempt
/// Iterations outlast a stage: ramp 4 → 1 → 4 while the three retirees are
/// still busy. Spawning replacements on top of them would put seven
/// iterations in flight against a maximum target of four.
#[tokio::test(start_paused = true)]
async fn f008_busy_retirees_reactivated() {
    let probe = ProbeWorkload::new(Duration::from_millis(2500));
    let stats = probe.stats();
    let spec = ScenarioSpec::new("rebound", probe.into_workload())
        .with_start_vus(4)
        .with_stages(vec![
            Stage::new(secs(1), 4),
            Stage::new(secs(1), 1),
            Stage::new(secs(3), 4),
        ]);
    let max = spec.schedule.max_target();
    let report = execute(spec).await;

    assert!(
        stats.max_in_flight() <= u64::from(max),
        "F008 FALSIFIED: {} iterations in flight, max target {max}",
        stats.max_in_flight()
    );
    assert_eq!(
        report.vus.len(),
        max as usize,
        "F008 FALSIFIED: spawned replacements for busy retirees"
    );
    assert!(report.timeline.iter().all(|e| e.live == e.target));
}

// =============================================================================
// F011-F015: Schedule properties
// =============================================================================

fn stages_strategy() -> impl Strategy<Value = Vec<Stage>> {
    prop::collection::vec((0u64..30, 0u32..50), 1..8).prop_map(|raw| {
        raw.into_iter()
            .map(|(d, t)| Stage::new(Duration::from_secs(d), t))
            .collect()
    })
}

proptest! {
    /// F011: Schedule target never exceeds max target, under either policy
    #[test]
    fn f011_target_bounded_by_max(
        stages in stages_strategy(),
        start in 0u32..50,
        t in 0u64..300_000,
        linear in any::<bool>(),
    ) {
        let policy = if linear { RampPolicy::Linear } else { RampPolicy::Step };
        let schedule = Schedule::new(stages).with_start_vus(start).with_policy(policy);
        let target = schedule.target_at(Duration::from_millis(t));
        prop_assert!(
            target <= schedule.max_target(),
            "F011 FALSIFIED: target {} above max {}", target, schedule.max_target()
        );
    }

    /// F012: Step targets are flat within a stage
    #[test]
    fn f012_step_target_is_stage_target(stages in stages_strategy(), permille in 0u32..1000) {
        let schedule = Schedule::new(stages.clone());
        let mut begin = Duration::ZERO;
        for stage in &stages {
            if !stage.duration.is_zero() {
                let t = begin + stage.duration * permille / 1000;
                prop_assert_eq!(
                    schedule.target_at(t),
                    stage.target,
                    "F012 FALSIFIED: step target at {:?}", t
                );
            }
            begin += stage.duration;
        }
    }

    /// F013: Next boundary is strictly in the future
    #[test]
    fn f013_next_boundary_strictly_after(stages in stages_strategy(), t in 0u64..300) {
        let schedule = Schedule::new(stages);
        let t = Duration::from_secs(t);
        if let Some(boundary) = schedule.next_boundary(t) {
            prop_assert!(boundary > t, "F013 FALSIFIED: boundary {:?} not after {:?}", boundary, t);
            prop_assert!(boundary <= schedule.total_duration());
        }
    }
}
