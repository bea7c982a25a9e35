//! reqwest-backed [`HttpClient`].

use std::time::Duration;

use async_trait::async_trait;
use oleada_core::{HttpClient, HttpResponse, RequestOptions, TransportError};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{HttpError, Result};

/// Connection-level client settings. Per-request timeouts live in
/// [`RequestOptions`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// Bound on establishing a connection.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// `User-Agent` header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Idle connections kept per host.
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_user_agent() -> String {
    format!("oleada/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_pool_max_idle_per_host() -> usize {
    32
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
        }
    }
}

impl HttpClientConfig {
    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the connect timeout is zero or the user agent is
    /// empty.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(HttpError::config("connect_timeout must be > 0"));
        }
        if self.user_agent.trim().is_empty() {
            return Err(HttpError::config("user_agent cannot be empty"));
        }
        Ok(())
    }
}

/// [`HttpClient`] over a pooled `reqwest::Client`.
///
/// Cloning is cheap and shares the connection pool, so one client can serve
/// every VU of a run.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// Builds a client.
    ///
    /// # Errors
    /// Returns an error for an invalid configuration or when the TLS backend
    /// cannot be initialized.
    pub fn new(config: &HttpClientConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.as_str())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wraps an existing `reqwest::Client`.
    #[must_use]
    pub const fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn post(
        &self,
        url: &str,
        body: String,
        options: &RequestOptions,
    ) -> std::result::Result<HttpResponse, TransportError> {
        let mut request = self.client.post(url).timeout(options.timeout).body(body);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&e, options.timeout))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(&e, options.timeout))?;

        tracing::trace!(url, status, bytes = body.len(), "response received");
        Ok(HttpResponse::new(status, body))
    }
}

fn transport_error(e: &reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(timeout)
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}
