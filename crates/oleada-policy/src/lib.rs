// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # oleada-policy
//!
//! Pass/fail policy for Oleada runs.
//!
//! This crate provides:
//! - **Threshold parsing**: `rate<0.1`, `p(95)<10000`, `count>=100`
//! - **Threshold gates**: batch evaluation at run end, and abort-on-fail
//!   checks while the run is in flight
//!
//! ## Example
//!
//! ```rust,ignore
//! use oleada_policy::{ThresholdGate, ThresholdSpec};
//!
//! let gate = ThresholdGate::new(vec![
//!     ThresholdSpec::parse("errors", "rate<0.1")?,
//!     ThresholdSpec::parse("http_req_duration", "p(95)<10000")?,
//! ]);
//!
//! for outcome in gate.evaluate(&registry) {
//!     println!("{}: {}", outcome.spec, outcome.verdict);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod gate;
pub mod threshold;

pub use error::{PolicyError, Result};
pub use gate::{
    ThresholdGate, ThresholdOutcome, ThresholdVerdict, all_passed, evaluate, evaluate_one,
};
pub use threshold::{Aggregation, Operator, ThresholdSpec};
