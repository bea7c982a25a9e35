//! Oleada: Load-Testing Harness
//!
//! Ramping virtual users, a shared metrics registry and pass/fail thresholds
//! for HTTP targets.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use oleada::prelude::*;
//! use std::time::Duration;
//!
//! # async fn run() -> oleada::core::Result<()> {
//! let plan = RunPlan::new()
//!     .with_scenario(
//!         ScenarioSpec::new(
//!             "smoke",
//!             workload_fn(|ctx| async move {
//!                 ctx.sleep(Duration::from_millis(100)).await;
//!                 Ok(())
//!             }),
//!         )
//!         .with_stages(vec![Stage::new(Duration::from_secs(10), 5)]),
//!     )
//!     .with_threshold(ThresholdSpec::parse("iteration_errors", "rate<0.1")?);
//!
//! let result = Orchestrator::new().run(plan, MetricsRegistry::new()).await?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```

pub use oleada_core as core;
pub use oleada_http as http;
pub use oleada_policy as policy;
pub use oleada_runner as runner;

/// Prelude module for common imports.
pub mod prelude {
    pub use oleada_core::{
        Clock, Counter, HttpClient, HttpResponse, InstrumentedClient, MetricKind,
        MetricsRegistry, Rate, RequestOptions, RunConfig, RunError, RunOptions, ScenarioSpec,
        ScenarioStatus, Stage, TransportError, Trend, VuContext, Workload, WorkloadCatalog,
        WorkloadError, workload_fn,
    };
    pub use oleada_http::{HttpClientConfig, ReqwestClient};
    pub use oleada_policy::{ThresholdSpec, ThresholdVerdict};
    pub use oleada_runner::{Orchestrator, RunPlan, RunResult};
}
