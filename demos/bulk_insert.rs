// Demos are allowed to use expect/unwrap for simplicity
#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Bulk-Insert Strategy Comparison
//!
//! Drives the four bulk-insert endpoints of an order service one after
//! another and compares how many records each strategy inserts and how long
//! the server reports it took.
//!
//! # Usage
//!
//! ```bash
//! # Against the built-in mock target (about four minutes)
//! cargo run --example bulk_insert
//!
//! # Against a live service
//! OLEADA_BASE_URL=http://localhost:8080/api/orders/bulk-inserts \
//!     cargo run --example bulk_insert
//!
//! # With a custom configuration
//! cargo run --example bulk_insert -- path/to/run.toml
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use oleada::prelude::*;
use oleada_test::MockHttpClient;
use serde::Deserialize;
use serde_json::json;

const DEFAULT_CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/bulk_insert.toml");

const STRATEGIES: [&str; 4] = [
    "multiple-transactions",
    "single-transaction",
    "batch-values",
    "batch-unnest",
];

#[derive(Debug, Clone, Copy)]
struct BatchSize {
    orders: u32,
    items_per_order: u32,
}

impl BatchSize {
    const fn new(orders: u32, items_per_order: u32) -> Self {
        Self {
            orders,
            items_per_order,
        }
    }
}

const TEST_SIZES: [BatchSize; 3] = [
    BatchSize::new(10, 5),
    BatchSize::new(50, 5),
    BatchSize::new(100, 5),
];

/// Body returned by every bulk-insert endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertResult {
    strategy: String,
    total_records: u64,
    execution_time_ms: f64,
}

/// Per-strategy metric handles.
struct StrategyMetrics {
    records: Counter,
    execution_time: Trend,
}

impl StrategyMetrics {
    fn register(registry: &MetricsRegistry, strategy: &str) -> oleada::core::Result<Self> {
        let key = strategy.replace('-', "_");
        Ok(Self {
            records: registry.counter(&format!("records_{key}"))?,
            execution_time: registry.trend(&format!("execution_time_{key}"))?,
        })
    }
}

type SharedClient = Arc<InstrumentedClient<Arc<dyn HttpClient>>>;

/// One iteration posts every test size to one strategy's endpoint.
struct BulkInsert {
    strategy: &'static str,
    url: String,
    client: SharedClient,
    options: RequestOptions,
    errors: Rate,
    metrics: StrategyMetrics,
}

impl BulkInsert {
    async fn send(&self, ctx: &VuContext, size: BatchSize) -> bool {
        let payload = json!({
            "numberOfOrders": size.orders,
            "itemsPerOrder": size.items_per_order,
        })
        .to_string();

        let sent = self.client.post(&self.url, payload, &self.options).await;
        let (status_ok, result) = match sent {
            Ok(response) => (
                response.status == 200,
                response
                    .json::<InsertResult>()
                    .ok()
                    .filter(|r| !r.strategy.is_empty()),
            ),
            Err(_) => (false, None),
        };
        let status_ok = ctx.check("is status 200", status_ok);
        let valid = ctx.check("has valid response", result.is_some());
        let success = status_ok && valid;
        self.errors.add(!success);

        if let (true, Some(result)) = (success, result) {
            self.metrics.records.add(result.total_records as f64);
            self.metrics.execution_time.add(result.execution_time_ms);
            tracing::info!(
                strategy = self.strategy,
                batch_size = size.orders,
                records = result.total_records,
                seconds = result.execution_time_ms / 1000.0,
                "bulk insert"
            );
        }
        success
    }
}

#[async_trait]
impl Workload for BulkInsert {
    async fn iteration(&self, ctx: VuContext) -> Result<(), WorkloadError> {
        let mut failed = 0;
        for size in TEST_SIZES {
            if !self.send(&ctx, size).await {
                failed += 1;
            }
        }
        if failed == 0 {
            Ok(())
        } else {
            Err(WorkloadError::iteration(format!(
                "{failed} of {} requests to {} failed",
                TEST_SIZES.len(),
                self.strategy
            )))
        }
    }
}

fn target_client() -> anyhow::Result<(Arc<dyn HttpClient>, Option<String>)> {
    match std::env::var("OLEADA_BASE_URL") {
        Ok(base_url) => {
            let client = ReqwestClient::new(&HttpClientConfig::default())?;
            Ok((Arc::new(client), Some(base_url)))
        }
        Err(_) => {
            tracing::info!("OLEADA_BASE_URL not set, using the in-process mock target");
            let mock = MockHttpClient::bulk_inserts(Duration::from_millis(250));
            Ok((Arc::new(mock), None))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = RunConfig::load(&path).with_context(|| format!("loading {path}"))?;

    let registry = MetricsRegistry::new();
    let errors = registry.rate("errors")?;
    let (inner, base_url) = target_client()?;
    let base_url = base_url.unwrap_or_else(|| {
        config
            .var("base_url", "http://app:8080/api/orders/bulk-inserts")
            .to_string()
    });
    let client: SharedClient = Arc::new(InstrumentedClient::new(inner, &registry)?);
    let options = RequestOptions::json().with_timeout(config.options.request_timeout);

    let mut catalog = WorkloadCatalog::new();
    for strategy in STRATEGIES {
        let workload = BulkInsert {
            strategy,
            url: format!("{}/{strategy}", base_url.trim_end_matches('/')),
            client: Arc::clone(&client),
            options: options.clone(),
            errors: errors.clone(),
            metrics: StrategyMetrics::register(&registry, strategy)?,
        };
        catalog.register(strategy, Arc::new(workload));
    }

    let plan = RunPlan::from_config(&config, &catalog)?;
    let result = Orchestrator::new().run(plan, registry).await?;

    println!("{result}");
    anyhow::ensure!(result.succeeded(), "run did not pass");
    Ok(())
}
