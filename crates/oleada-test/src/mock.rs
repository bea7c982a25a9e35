//! In-process mock target.
//!
//! [`MockHttpClient`] implements [`HttpClient`] without a network. Every
//! request is logged, optionally delayed, optionally hit by a fault from a
//! [`ChaosInjector`], and otherwise answered by a responder closure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use oleada_core::{HttpClient, HttpResponse, RequestOptions, TransportError};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::time::Instant;

use crate::chaos::{ChaosConfig, ChaosInjector, Fault};

/// A request seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Target URL.
    pub url: String,
    /// Request body.
    pub body: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// When the request arrived.
    pub at: Instant,
}

impl RecordedRequest {
    /// Last path segment of the URL.
    #[must_use]
    pub fn last_segment(&self) -> &str {
        self.url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    /// Returns the first header with `name`, ignoring case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Builds the response for a request.
pub type Responder = Arc<dyn Fn(&RecordedRequest) -> HttpResponse + Send + Sync>;

/// Mock HTTP target.
#[derive(Clone)]
pub struct MockHttpClient {
    responder: Responder,
    latency: Duration,
    chaos: Option<Arc<ChaosInjector>>,
    log: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockHttpClient {
    /// Creates a mock that answers `200 {}`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_responder(|_req| HttpResponse::new(200, "{}"))
    }

    /// Creates a mock with a custom responder.
    #[must_use]
    pub fn with_responder(
        responder: impl Fn(&RecordedRequest) -> HttpResponse + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Arc::new(responder),
            latency: Duration::ZERO,
            chaos: None,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Mimics the bulk-insert benchmark endpoints.
    ///
    /// The strategy is the last URL segment. A body of
    /// `{numberOfOrders, itemsPerOrder}` yields
    /// `{strategy, totalRecords, executionTimeMs}` where `totalRecords` counts
    /// each order plus its items. A malformed body gets a 400.
    #[must_use]
    pub fn bulk_inserts(latency: Duration) -> Self {
        let execution_ms = latency.as_millis() as u64;
        Self::with_responder(move |req| {
            let Ok(body) = serde_json::from_str::<Value>(&req.body) else {
                return HttpResponse::new(400, r#"{"error":"malformed body"}"#);
            };
            let orders = body["numberOfOrders"].as_u64();
            let items = body["itemsPerOrder"].as_u64();
            match (orders, items) {
                (Some(orders), Some(items)) => HttpResponse::new(
                    200,
                    json!({
                        "strategy": req.last_segment(),
                        "totalRecords": orders * (1 + items),
                        "executionTimeMs": execution_ms,
                    })
                    .to_string(),
                ),
                _ => HttpResponse::new(400, r#"{"error":"missing fields"}"#),
            }
        })
        .with_latency(latency)
    }

    /// Sets the simulated server time of every request.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Enables fault injection.
    #[must_use]
    pub fn with_chaos(mut self, config: ChaosConfig) -> Self {
        self.chaos = Some(Arc::new(ChaosInjector::new(config)));
        self
    }

    /// Returns the fault injector, if enabled.
    #[must_use]
    pub fn chaos(&self) -> Option<&ChaosInjector> {
        self.chaos.as_deref()
    }

    /// Returns every request seen so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().clone()
    }

    /// Number of requests seen so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.log.lock().len()
    }
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHttpClient")
            .field("latency", &self.latency)
            .field("chaos", &self.chaos)
            .field("requests", &self.request_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn post(
        &self,
        url: &str,
        body: String,
        options: &RequestOptions,
    ) -> Result<HttpResponse, TransportError> {
        let request = RecordedRequest {
            url: url.to_string(),
            body,
            headers: options.headers.clone(),
            at: Instant::now(),
        };
        self.log.lock().push(request.clone());

        let fault = self.chaos.as_ref().and_then(|chaos| chaos.next_fault());
        match fault {
            Some(Fault::Refused) => {
                return Err(TransportError::Connect(format!(
                    "{url}: connection refused (injected)"
                )));
            }
            Some(Fault::Timeout) => {
                tokio::time::sleep(options.timeout).await;
                return Err(TransportError::Timeout(options.timeout));
            }
            Some(Fault::ServerError) | None => {}
        }

        let started = Instant::now();
        if let Some(chaos) = &self.chaos {
            chaos.maybe_inject_latency().await;
        }
        let remaining = options.timeout.saturating_sub(started.elapsed());
        if self.latency >= remaining {
            tokio::time::sleep(remaining).await;
            return Err(TransportError::Timeout(options.timeout));
        }
        tokio::time::sleep(self.latency).await;

        if fault == Some(Fault::ServerError) {
            return Ok(HttpResponse::new(503, r#"{"error":"injected"}"#));
        }
        Ok((self.responder)(&request))
    }
}
