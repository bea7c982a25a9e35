// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # oleada-core
//!
//! Core primitives for the Oleada load-testing harness.
//!
//! This crate provides the building blocks the runner composes:
//!
//! - [`Clock`] for monotonic time and sleeping (tokio-backed, pausable in tests)
//! - [`Schedule`] and [`Stage`] for time-varying virtual user targets
//! - [`MetricsRegistry`] with typed [`Counter`], [`Rate`] and [`Trend`] handles
//! - [`Workload`] and [`VuContext`], the per-iteration extensibility seam
//! - [`HttpClient`], the minimal request/response contract for targets
//! - [`ScenarioSpec`] tying a schedule to a workload
//! - [`RunConfig`] for TOML run configuration
//!
//! ## Example
//!
//! ```rust,ignore
//! use oleada_core::{MetricsRegistry, ScenarioSpec, Stage, workload_fn};
//! use std::time::Duration;
//!
//! let registry = MetricsRegistry::new();
//! let errors = registry.rate("errors")?;
//!
//! let scenario = ScenarioSpec::new(
//!     "smoke",
//!     workload_fn(move |ctx| {
//!         let errors = errors.clone();
//!         async move {
//!             errors.add(false);
//!             ctx.sleep(Duration::from_millis(100)).await;
//!             Ok(())
//!         }
//!     }),
//! )
//! .with_stages(vec![Stage::new(Duration::from_secs(10), 5)]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod scenario;
pub mod schedule;
pub mod types;
pub mod workload;

pub use clock::{Clock, TokioClock};
pub use config::{RunConfig, RunOptions, ScenarioConfig, ThresholdEntry};
pub use error::{Result, RunError, WorkloadError};
pub use http::{
    DEFAULT_REQUEST_TIMEOUT, HttpClient, HttpResponse, InstrumentedClient, RequestOptions,
    TransportError,
};
pub use metrics::{
    Aggregate, Counter, MetricKind, MetricSample, MetricsRegistry, Rate, Trend, TrendStats,
};
pub use scenario::{DEFAULT_GRACEFUL_STOP, ScenarioSpec};
pub use schedule::{RampPolicy, Schedule, Stage};
pub use types::{AbortCause, RunId, ScenarioStatus, VuId};
pub use workload::{FnWorkload, VuContext, Workload, WorkloadCatalog, workload_fn};
