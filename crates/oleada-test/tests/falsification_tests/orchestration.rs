//! Falsification Tests: Category D - Orchestration (F061-F080)
//!
//! # Toyota Way: Just-in-Time (ジャストインタイム)
//! Each scenario starts exactly when it is due, and not a tick before.

use std::sync::Arc;
use std::time::Duration;

use oleada_core::metrics::builtin;
use oleada_core::{
    AbortCause, Aggregate, HttpClient, InstrumentedClient, MetricKind, MetricsRegistry,
    RequestOptions, RunOptions, ScenarioSpec, ScenarioStatus, Stage, WorkloadError, workload_fn,
};
use oleada_runner::RunPlan;
use oleada_test::{MockHttpClient, ProbeWorkload, RunHarness};
use serde_json::{Value, json};
use tokio::time::Instant;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

/// Workload counting iterations into `hits_<scenario>`.
fn tagged(think: Duration) -> Arc<dyn oleada_core::Workload> {
    workload_fn(move |ctx| async move {
        let metric = format!("hits_{}", ctx.scenario());
        ctx.registry()
            .record(&metric, MetricKind::Counter, 1.0)
            .map_err(WorkloadError::from)?;
        ctx.sleep(think).await;
        Ok(())
    })
}

// =============================================================================
// F061-F065: End to end
// =============================================================================

/// F061: A 1 VU, 2 second run records every iteration's sample
///
/// # Falsification Attempt
/// Stages [1s → 1, 1s → 0] with a 100ms iteration that records a passing
/// rate sample; about ten samples must arrive and all must pass.
#[tokio::test(start_paused = true)]
async fn f061_end_to_end_samples_recorded() {
    let workload = workload_fn(|ctx| async move {
        ctx.registry()
            .record("ok", MetricKind::Rate, 1.0)
            .map_err(WorkloadError::from)?;
        ctx.sleep(Duration::from_millis(100)).await;
        Ok(())
    });
    let plan = RunPlan::new().with_scenario(
        ScenarioSpec::new("smoke", workload)
            .with_start_vus(1)
            .with_stages(vec![Stage::new(secs(1), 1), Stage::new(secs(1), 0)]),
    );

    let run = RunHarness::new().run(plan).await.unwrap();
    run.assert_succeeded().unwrap();

    match run.registry.snapshot("ok") {
        Some(Aggregate::Rate { passes, total, rate }) => {
            assert!(
                (8..=12).contains(&total),
                "F061 FALSIFIED: {total} samples for a 1s, 100ms workload"
            );
            assert_eq!(passes, total, "F061 FALSIFIED: lost a passing sample");
            assert_eq!(rate, 1.0, "F061 FALSIFIED: rate {rate}");
        }
        other => panic!("F061 FALSIFIED: expected a rate, got {other:?}"),
    }
    assert_eq!(run.result.scenarios[0].status, ScenarioStatus::Completed);
}

/// F062: The run summary carries every recorded metric
///
/// # Falsification Attempt
/// Compare the result's aggregates with the live registry.
#[tokio::test(start_paused = true)]
async fn f062_aggregates_match_registry() {
    let plan = RunPlan::new().with_scenario(
        ScenarioSpec::new("a", tagged(Duration::from_millis(250)))
            .with_start_vus(2)
            .with_stages(vec![Stage::new(secs(2), 2)]),
    );

    let run = RunHarness::new().run(plan).await.unwrap();

    assert_eq!(
        run.result.aggregates,
        run.registry.snapshot_all(),
        "F062 FALSIFIED: summary differs from registry"
    );
    assert!(run.result.aggregates.contains_key("hits_a"));
    assert!(run.result.aggregates.contains_key(builtin::ITERATIONS));
}

// =============================================================================
// F066-F070: Offsets and independence
// =============================================================================

/// F066: A scenario with a 5s offset records nothing before 5s
///
/// # Falsification Attempt
/// Run an immediate and an offset scenario side by side and compare the
/// first sample of each against the run start.
#[tokio::test(start_paused = true)]
async fn f066_offset_scenario_waits() {
    let plan = RunPlan::new()
        .with_scenario(
            ScenarioSpec::new("now", tagged(Duration::from_millis(100)))
                .with_start_vus(1)
                .with_stages(vec![Stage::new(secs(8), 1)]),
        )
        .with_scenario(
            ScenarioSpec::new("later", tagged(Duration::from_millis(100)))
                .with_start_vus(1)
                .with_stages(vec![Stage::new(secs(2), 1)])
                .with_start_offset(secs(5)),
        );

    let start = Instant::now();
    let run = RunHarness::new().run(plan).await.unwrap();

    let first_now = run.registry.first_sample_at("hits_now").unwrap();
    let first_later = run.registry.first_sample_at("hits_later").unwrap();
    assert!(
        first_now < start + secs(1),
        "F066 FALSIFIED: immediate scenario started late"
    );
    assert!(
        first_later >= start + secs(5),
        "F066 FALSIFIED: offset scenario sampled at {:?}",
        first_later - start
    );
    assert_eq!(
        run.result.scenario("later").and_then(|s| s.started_after),
        Some(secs(5)),
        "F066 FALSIFIED: offset not honored"
    );
}

/// F067: Scenarios run concurrently, not back to back
///
/// # Falsification Attempt
/// Two overlapping 4s scenarios must finish in about 4s, not 8s.
#[tokio::test(start_paused = true)]
async fn f067_scenarios_overlap() {
    let mut plan = RunPlan::new();
    for name in ["left", "right"] {
        plan = plan.with_scenario(
            ScenarioSpec::new(name, tagged(Duration::from_millis(200)))
                .with_start_vus(2)
                .with_stages(vec![Stage::new(secs(4), 2)]),
        );
    }

    let run = RunHarness::new().run(plan).await.unwrap();

    assert!(
        run.result.duration < secs(6),
        "F067 FALSIFIED: run took {:?}",
        run.result.duration
    );
    assert!(run.result.scenarios.iter().all(|s| s.max_live == 2));
}

/// F068: A scenario's load does not leak into its sibling's schedule
///
/// # Falsification Attempt
/// Pair a 10 VU scenario with a 1 VU scenario and check each pool's peak.
#[tokio::test(start_paused = true)]
async fn f068_scenarios_independent() {
    let heavy = ProbeWorkload::new(Duration::from_millis(200));
    let light = ProbeWorkload::new(Duration::from_millis(200));
    let (heavy_stats, light_stats) = (heavy.stats(), light.stats());
    let plan = RunPlan::new()
        .with_scenario(
            ScenarioSpec::new("heavy", heavy.into_workload())
                .with_start_vus(10)
                .with_stages(vec![Stage::new(secs(3), 10)]),
        )
        .with_scenario(
            ScenarioSpec::new("light", light.into_workload())
                .with_start_vus(1)
                .with_stages(vec![Stage::new(secs(3), 1)]),
        );

    let run = RunHarness::new().run(plan).await.unwrap();

    assert_eq!(run.result.scenario("heavy").unwrap().max_live, 10);
    assert_eq!(run.result.scenario("light").unwrap().max_live, 1);
    assert!(
        light_stats.max_in_flight() <= 1,
        "F068 FALSIFIED: light scenario ran {} VUs",
        light_stats.max_in_flight()
    );
    assert!(heavy_stats.max_in_flight() <= 10);
}

/// F069: The run timeout stops running and not-yet-started scenarios
///
/// # Falsification Attempt
/// A 10 minute scenario and one due at 60s under a 5s run timeout.
#[tokio::test(start_paused = true)]
async fn f069_run_timeout() {
    let plan = RunPlan::new()
        .with_scenario(
            ScenarioSpec::new("long", tagged(Duration::from_millis(300)))
                .with_start_vus(2)
                .with_stages(vec![Stage::new(secs(600), 2)]),
        )
        .with_scenario(
            ScenarioSpec::new("late", tagged(Duration::from_millis(300)))
                .with_stages(vec![Stage::new(secs(10), 1)])
                .with_start_offset(secs(60)),
        );

    let run = RunHarness::builder()
        .with_options(RunOptions::default().with_run_timeout(secs(5)))
        .build()
        .run(plan)
        .await
        .unwrap();

    assert_eq!(
        run.result.aborted,
        Some(AbortCause::RunTimeout(secs(5))),
        "F069 FALSIFIED: no timeout recorded"
    );
    assert!(run.result.duration < secs(60), "F069 FALSIFIED: waited for 'late'");
    for report in &run.result.scenarios {
        assert_eq!(report.status, ScenarioStatus::Aborted, "{}", report.name);
    }
    assert!(
        !run.registry.contains("hits_late"),
        "F069 FALSIFIED: aborted scenario still ran"
    );
}

// =============================================================================
// F071-F075: Bulk insert flow
// =============================================================================

/// F071: Request metrics and custom metrics agree for a bulk-insert run
///
/// # Falsification Attempt
/// Post `{numberOfOrders: 10, itemsPerOrder: 5}` through an instrumented
/// mock; every request must count once in `http_reqs` and add 60 records.
#[tokio::test(start_paused = true)]
async fn f071_bulk_insert_flow() {
    let registry = MetricsRegistry::new();
    let mock = MockHttpClient::bulk_inserts(Duration::from_millis(150));
    let client = Arc::new(InstrumentedClient::new(mock.clone(), &registry).unwrap());
    let records = registry.counter("records_batch_values").unwrap();
    let errors = registry.rate("errors").unwrap();

    let workload = workload_fn(move |_ctx| {
        let (client, records, errors) = (client.clone(), records.clone(), errors.clone());
        async move {
            let body = json!({ "numberOfOrders": 10, "itemsPerOrder": 5 }).to_string();
            let response = client
                .post(
                    "http://app:8080/api/orders/bulk-inserts/batch-values",
                    body,
                    &RequestOptions::json(),
                )
                .await
                .map_err(|e| WorkloadError::iteration(e.to_string()))?;
            let parsed: Value = response
                .json()
                .map_err(|e| WorkloadError::iteration(e.to_string()))?;
            errors.add(response.status != 200);
            records.add(parsed["totalRecords"].as_f64().unwrap_or_default());
            Ok(())
        }
    });
    let plan = RunPlan::new().with_scenario(
        ScenarioSpec::new("batch_values", workload)
            .with_start_vus(1)
            .with_stages(vec![Stage::new(secs(2), 3), Stage::new(secs(1), 0)]),
    );

    let result = oleada_runner::Orchestrator::new()
        .run(plan, registry.clone())
        .await
        .unwrap();

    let requests = mock.request_count() as f64;
    assert!(requests > 0.0, "F071 FALSIFIED: no requests sent");
    assert_eq!(
        registry.snapshot(builtin::HTTP_REQS).map(|a| a.value()),
        Some(requests),
        "F071 FALSIFIED: http_reqs disagrees with the target"
    );
    assert_eq!(
        registry.snapshot("records_batch_values").map(|a| a.value()),
        Some(requests * 60.0),
        "F071 FALSIFIED: records lost"
    );
    assert_eq!(registry.rate_value("errors"), Some(0.0));
    assert_eq!(registry.rate_value(builtin::HTTP_REQ_FAILED), Some(0.0));
    assert_eq!(
        registry.percentile(builtin::HTTP_REQ_DURATION, 95.0),
        Some(150.0),
        "F071 FALSIFIED: request duration not measured on the run clock"
    );
    assert!(result.succeeded(), "{}", result.summary());
}
