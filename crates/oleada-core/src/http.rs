//! HTTP client contract used by workloads.
//!
//! The harness never talks to the network itself. Workloads get an
//! [`HttpClient`], and wrapping it in an [`InstrumentedClient`] records the
//! built-in request metrics (`http_reqs`, `http_req_duration`,
//! `http_req_failed`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::clock::Clock;
use crate::error::Result;
use crate::metrics::{Counter, MetricsRegistry, Rate, Trend, builtin};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Per-request options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    /// Request headers, sent in order.
    pub headers: Vec<(String, String)>,
    /// Upper bound on the whole request.
    pub timeout: Duration,
}

impl RequestOptions {
    /// Creates options with no headers and the default timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Creates options for a JSON body.
    #[must_use]
    pub fn json() -> Self {
        Self::new().with_header("Content-Type", "application/json")
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// A completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

impl HttpResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns true for statuses counted as failed requests (>= 400).
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.status >= 400
    }

    /// Parses the body as JSON.
    ///
    /// # Errors
    /// Returns the parse error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Failure to obtain any response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No response within the request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Other(String),
}

/// Minimal request/response contract for a target system.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Sends a POST request.
    ///
    /// # Errors
    /// Returns [`TransportError`] when no response was received. Any received
    /// response, including 4xx/5xx, is `Ok`.
    async fn post(
        &self,
        url: &str,
        body: String,
        options: &RequestOptions,
    ) -> std::result::Result<HttpResponse, TransportError>;
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    async fn post(
        &self,
        url: &str,
        body: String,
        options: &RequestOptions,
    ) -> std::result::Result<HttpResponse, TransportError> {
        (**self).post(url, body, options).await
    }
}

/// Client wrapper that records built-in request metrics.
pub struct InstrumentedClient<C> {
    inner: C,
    clock: Arc<dyn Clock>,
    reqs: Counter,
    duration: Trend,
    failed: Rate,
}

impl<C: HttpClient> InstrumentedClient<C> {
    /// Wraps `inner`, recording into `registry`.
    ///
    /// # Errors
    /// Returns an error if a built-in request metric name is already taken
    /// by a metric of another kind.
    pub fn new(inner: C, registry: &MetricsRegistry) -> Result<Self> {
        Ok(Self {
            inner,
            clock: Arc::clone(registry.clock()),
            reqs: registry.counter(builtin::HTTP_REQS)?,
            duration: registry.trend(builtin::HTTP_REQ_DURATION)?,
            failed: registry.rate(builtin::HTTP_REQ_FAILED)?,
        })
    }

    /// Returns the wrapped client.
    #[must_use]
    pub const fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for InstrumentedClient<C> {
    async fn post(
        &self,
        url: &str,
        body: String,
        options: &RequestOptions,
    ) -> std::result::Result<HttpResponse, TransportError> {
        let started = self.clock.now();
        let result = self.inner.post(url, body, options).await;
        let elapsed = self.clock.elapsed_since(started);

        self.reqs.inc();
        self.duration.add_duration(elapsed);
        let failed = match &result {
            Ok(response) => response.is_failure(),
            Err(_) => true,
        };
        self.failed.add(failed);

        if let Err(e) = &result {
            tracing::debug!(url, error = %e, "request failed");
        }
        result
    }
}
