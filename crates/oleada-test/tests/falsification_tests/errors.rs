//! Falsification Tests: Category E - Error Containment (F081-F100)
//!
//! # Toyota Way: Andon (行灯)
//! A failure pulls the cord for its own station, not the whole plant.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use oleada_core::metrics::builtin;
use oleada_core::{
    Aggregate, Clock, HttpClient, InstrumentedClient, MetricsRegistry, RequestOptions, RunError,
    ScenarioSpec, ScenarioStatus, Stage, WorkloadError, workload_fn,
};
use oleada_runner::{Orchestrator, RunPlan};
use oleada_test::{ChaosConfig, MockHttpClient, ProbeWorkload, RunHarness, TestError};
use tokio::time::Instant;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn steady(name: &str, probe: ProbeWorkload, seconds: u64) -> ScenarioSpec {
    ScenarioSpec::new(name, probe.into_workload())
        .with_start_vus(1)
        .with_stages(vec![Stage::new(secs(seconds), 1)])
}

fn rate_parts(registry: &MetricsRegistry, metric: &str) -> (u64, u64) {
    match registry.snapshot(metric) {
        Some(Aggregate::Rate { passes, total, .. }) => (passes, total),
        other => panic!("expected a rate for {metric}, got {other:?}"),
    }
}

// =============================================================================
// F081-F085: Iteration and transport failures
// =============================================================================

/// F081: A failed iteration is recorded and the VU keeps going
///
/// # Falsification Attempt
/// Fail every second iteration of a 3s scenario.
#[tokio::test(start_paused = true)]
async fn f081_iteration_failure_not_fatal() {
    let probe = ProbeWorkload::new(Duration::from_millis(100)).with_fail_every(2);
    let stats = probe.stats();
    let plan = RunPlan::new().with_scenario(steady("flaky", probe, 3));

    let run = RunHarness::new().run(plan).await.unwrap();

    assert_eq!(
        run.result.scenarios[0].status,
        ScenarioStatus::Completed,
        "F081 FALSIFIED: iteration failure stopped the scenario"
    );
    assert!(
        stats.completed() >= 20,
        "F081 FALSIFIED: VU stopped after {} iterations",
        stats.completed()
    );
    let (failed, total) = rate_parts(&run.registry, builtin::ITERATION_ERRORS);
    assert_eq!(failed, stats.failed(), "F081 FALSIFIED: failures not recorded");
    assert_eq!(total, stats.completed());
    assert!(run.result.errored_scenarios().next().is_none());
}

/// F082: Transport failures are absorbed into request metrics
///
/// # Falsification Attempt
/// Refuse every fourth connection on an instrumented mock; the run must
/// finish and `http_req_failed` must count exactly the refusals.
#[tokio::test(start_paused = true)]
async fn f082_transport_failures_absorbed() {
    let registry = MetricsRegistry::new();
    let mock = MockHttpClient::new()
        .with_latency(Duration::from_millis(50))
        .with_chaos(ChaosConfig::refusals_every(4));
    let client = Arc::new(InstrumentedClient::new(mock.clone(), &registry).unwrap());

    let workload = workload_fn(move |ctx| {
        let client = client.clone();
        async move {
            let sent = client
                .post("http://target/api", "{}".into(), &RequestOptions::json())
                .await;
            if ctx.check("status is 200", matches!(&sent, Ok(r) if r.status == 200)) {
                Ok(())
            } else {
                Err(WorkloadError::iteration("request failed"))
            }
        }
    });
    let plan = RunPlan::new().with_scenario(
        ScenarioSpec::new("refused", workload)
            .with_start_vus(2)
            .with_stages(vec![Stage::new(secs(2), 2)]),
    );

    let result = Orchestrator::new().run(plan, registry.clone()).await.unwrap();

    assert_eq!(result.scenarios[0].status, ScenarioStatus::Completed);
    let (failed, total) = rate_parts(&registry, builtin::HTTP_REQ_FAILED);
    assert_eq!(total, mock.request_count() as u64, "F082 FALSIFIED: lost requests");
    assert_eq!(failed, total / 4, "F082 FALSIFIED: refusals miscounted");
    let (_, checks) = rate_parts(&registry, builtin::CHECKS);
    assert_eq!(checks, total, "F082 FALSIFIED: a failed request skipped its check");
}

/// F083: Request timeouts surface as failed requests, not hung VUs
///
/// # Falsification Attempt
/// Every third request hangs past a 1s timeout.
#[tokio::test(start_paused = true)]
async fn f083_timeouts_bounded() {
    let registry = MetricsRegistry::new();
    let mock = MockHttpClient::new().with_chaos(ChaosConfig::timeouts_every(3));
    let client = Arc::new(InstrumentedClient::new(mock.clone(), &registry).unwrap());
    let options = RequestOptions::json().with_timeout(secs(1));

    let workload = workload_fn(move |_ctx| {
        let (client, options) = (client.clone(), options.clone());
        async move {
            client
                .post("http://target/slow", String::new(), &options)
                .await
                .map(|_| ())
                .map_err(|e| WorkloadError::iteration(e.to_string()))
        }
    });
    let plan = RunPlan::new().with_scenario(
        ScenarioSpec::new("slow", workload)
            .with_start_vus(1)
            .with_stages(vec![Stage::new(secs(3), 1)]),
    );

    let result = Orchestrator::new().run(plan, registry.clone()).await.unwrap();

    assert_eq!(result.scenarios[0].status, ScenarioStatus::Completed);
    assert_eq!(result.scenarios[0].interrupted(), 0);
    assert_eq!(
        registry.snapshot(builtin::HTTP_REQ_DURATION).and_then(|a| match a {
            Aggregate::Trend(stats) => Some(stats.max),
            _ => None,
        }),
        Some(1000.0),
        "F083 FALSIFIED: a request outlived its timeout"
    );
    let (failed, total) = rate_parts(&registry, builtin::HTTP_REQ_FAILED);
    assert_eq!(failed, total / 3, "F083 FALSIFIED: timeouts miscounted");
}

// =============================================================================
// F086-F090: Scenario-scoped errors
// =============================================================================

/// F086: A scenario with no stages errors alone
///
/// # Falsification Attempt
/// Run it beside a healthy scenario.
#[tokio::test(start_paused = true)]
async fn f086_empty_stages_isolated() {
    let healthy = ProbeWorkload::new(Duration::from_millis(100));
    let stats = healthy.stats();
    let plan = RunPlan::new()
        .with_scenario(steady("healthy", healthy, 2))
        .with_scenario(ScenarioSpec::new(
            "empty",
            ProbeWorkload::new(Duration::from_millis(100)).into_workload(),
        ));

    let run = RunHarness::new().run(plan).await.unwrap();

    let empty = run.result.scenario("empty").unwrap();
    assert!(empty.is_errored(), "F086 FALSIFIED: empty stages accepted");
    assert_eq!(
        run.result.scenario("healthy").unwrap().status,
        ScenarioStatus::Completed,
        "F086 FALSIFIED: sibling affected"
    );
    assert!(stats.completed() > 0);
    assert!(!run.result.succeeded());
}

/// F087: A workload configuration error stops only its own scenario
///
/// # Falsification Attempt
/// The misconfigured scenario fails on its first iteration while its
/// sibling keeps running for the full schedule.
#[tokio::test(start_paused = true)]
async fn f087_workload_config_error_isolated() {
    let broken = workload_fn(|_ctx| async { Err(WorkloadError::config("target url missing")) });
    let healthy = ProbeWorkload::new(Duration::from_millis(100));
    let stats = healthy.stats();
    let plan = RunPlan::new()
        .with_scenario(
            ScenarioSpec::new("broken", broken)
                .with_start_vus(3)
                .with_stages(vec![Stage::new(secs(3), 3)]),
        )
        .with_scenario(steady("healthy", healthy, 3));

    let run = RunHarness::new().run(plan).await.unwrap();

    match &run.result.scenario("broken").unwrap().status {
        ScenarioStatus::Errored(reason) => assert!(
            reason.contains("target url missing"),
            "F087 FALSIFIED: reason lost: {reason}"
        ),
        other => panic!("F087 FALSIFIED: broken scenario ended {other:?}"),
    }
    let healthy = run.result.scenario("healthy").unwrap();
    assert_eq!(healthy.status, ScenarioStatus::Completed);
    assert!(
        stats.completed() >= 25,
        "F087 FALSIFIED: sibling stopped early after {} iterations",
        stats.completed()
    );
}

/// F088: A VU still busy after graceful stop is interrupted, not awaited
///
/// # Falsification Attempt
/// A 1s schedule with a 60s iteration and a 2s graceful stop.
#[tokio::test(start_paused = true)]
async fn f088_graceful_stop_bounds_drain() {
    let plan = RunPlan::new().with_scenario(
        steady("slow", ProbeWorkload::new(secs(60)), 1).with_graceful_stop(secs(2)),
    );

    let run = RunHarness::new().run(plan).await.unwrap();
    let report = &run.result.scenarios[0];

    assert_eq!(report.interrupted(), 1, "F088 FALSIFIED: nothing interrupted");
    assert_eq!(report.status, ScenarioStatus::Completed);
    assert!(
        run.result.duration <= secs(4),
        "F088 FALSIFIED: waited {:?} for a stuck VU",
        run.result.duration
    );
}

// =============================================================================
// F091-F095: Run-level errors
// =============================================================================

struct StoppedClock;

#[async_trait]
impl Clock for StoppedClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, _deadline: Instant) {}

    fn ensure_available(&self) -> oleada_core::Result<()> {
        Err(RunError::clock_unavailable("timer driver shut down"))
    }
}

/// F091: An unusable clock fails the run before any scenario starts
///
/// # Falsification Attempt
/// Inject a clock whose timer is unavailable.
#[tokio::test]
async fn f091_clock_unavailable_is_fatal() {
    let probe = ProbeWorkload::new(Duration::from_millis(10));
    let stats = probe.stats();
    let err = RunHarness::builder()
        .with_clock(Arc::new(StoppedClock))
        .build()
        .run(RunPlan::new().with_scenario(steady("a", probe, 1)))
        .await
        .unwrap_err();

    assert!(
        matches!(err, TestError::Run(RunError::ClockUnavailable(_))),
        "F091 FALSIFIED: got {err}"
    );
    assert_eq!(stats.started(), 0, "F091 FALSIFIED: a VU ran");
}

/// F092: Duplicate scenario names fail the run
///
/// # Falsification Attempt
/// Declare "a" twice.
#[tokio::test(start_paused = true)]
async fn f092_duplicate_names_fatal() {
    let probe = ProbeWorkload::new(Duration::from_millis(10));
    let plan = RunPlan::new()
        .with_scenario(steady("a", probe.clone(), 1))
        .with_scenario(steady("a", probe, 1));

    let err = RunHarness::new().run(plan).await.unwrap_err();

    match err {
        TestError::Run(e) => {
            assert!(e.is_fatal(), "F092 FALSIFIED: {e} not fatal");
            assert!(e.to_string().contains("'a'"));
        }
        other => panic!("F092 FALSIFIED: got {other}"),
    }
}
