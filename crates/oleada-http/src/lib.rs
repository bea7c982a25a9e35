// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # oleada-http
//!
//! Network transport for Oleada workloads: an [`oleada_core::HttpClient`]
//! backed by `reqwest` with rustls.
//!
//! ## Example
//!
//! ```rust,ignore
//! use oleada_core::{InstrumentedClient, MetricsRegistry, RequestOptions};
//! use oleada_http::{HttpClientConfig, ReqwestClient};
//!
//! let registry = MetricsRegistry::new();
//! let client = InstrumentedClient::new(ReqwestClient::new(&HttpClientConfig::default())?, &registry)?;
//! let response = client
//!     .post("http://localhost:8080/api/orders", body, &RequestOptions::json())
//!     .await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;

pub use client::{HttpClientConfig, ReqwestClient};
pub use error::{HttpError, Result};
