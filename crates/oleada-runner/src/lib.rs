// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # oleada-runner
//!
//! Execution engine for Oleada load tests.
//!
//! This crate provides:
//! - **Scenario executor**: ramps virtual users along a stage schedule,
//!   reconciling the live population every tick
//! - **Orchestrator**: runs every scenario of a plan concurrently from one
//!   run-start instant, with run timeout and abort-on-fail thresholds
//! - **Run result**: per-scenario reports, final aggregates and threshold
//!   verdicts, renderable as text or JSON
//!
//! ## Example
//!
//! ```rust,ignore
//! use oleada_core::{MetricsRegistry, ScenarioSpec, Stage};
//! use oleada_runner::{Orchestrator, RunPlan};
//!
//! let plan = RunPlan::new().with_scenario(
//!     ScenarioSpec::new("smoke", workload)
//!         .with_start_vus(1)
//!         .with_stages(vec![Stage::new(Duration::from_secs(10), 5)]),
//! );
//!
//! let result = Orchestrator::new().run(plan, MetricsRegistry::new()).await?;
//! println!("{result}");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod executor;
pub mod orchestrator;
pub mod plan;
pub mod result;

pub use executor::{DEFAULT_TICK, RampEvent, ScenarioExecutor, ScenarioReport, VuReport};
pub use orchestrator::Orchestrator;
pub use plan::RunPlan;
pub use result::RunResult;
