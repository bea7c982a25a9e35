// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # oleada-test
//!
//! Testing infrastructure for the Oleada load-testing harness.
//!
//! This crate provides:
//! - **Mock target**: an in-process [`oleada_core::HttpClient`] with a request log
//! - **Chaos injection**: deterministic latency, 5xx, timeout and refusal faults
//! - **Run harness**: run a plan against a fresh registry and inspect both
//! - **Probe workload**: concurrency-tracking workload for ramp assertions
//! - **Falsification tests**: Popperian tests for the harness's claims
//!
//! ## Example
//!
//! ```rust,ignore
//! use oleada_test::{ProbeWorkload, RunHarness};
//!
//! let probe = ProbeWorkload::new(Duration::from_millis(200));
//! let run = RunHarness::builder()
//!     .with_timeout(Duration::from_secs(120))
//!     .build()
//!     .run(plan_with(probe.clone()))
//!     .await?;
//!
//! run.assert_succeeded()?;
//! assert!(probe.stats().max_in_flight() <= 5);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod chaos;
pub mod error;
pub mod harness;
pub mod mock;

pub use chaos::{ChaosConfig, ChaosInjector, Fault};
pub use error::{Result, TestError};
pub use harness::{
    HarnessRun, ProbeStats, ProbeWorkload, RunHarness, RunHarnessBuilder, init_tracing,
};
pub use mock::{MockHttpClient, RecordedRequest, Responder};
