//! Error types for the HTTP transport.

use thiserror::Error;

/// Result alias for client construction.
pub type Result<T> = std::result::Result<T, HttpError>;

/// Failure to build an HTTP client.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The underlying client could not be built (TLS backend, bad options).
    #[error("http client build failed: {0}")]
    Build(String),

    /// Invalid client configuration.
    #[error("http client configuration error: {0}")]
    Config(String),
}

impl HttpError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<HttpError> for oleada_core::RunError {
    fn from(e: HttpError) -> Self {
        Self::config(e.to_string())
    }
}
