//! Test error types.

/// Result type alias for test operations.
pub type Result<T> = std::result::Result<T, TestError>;

/// Testing errors.
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    /// Harness error.
    #[error("harness error: {0}")]
    Harness(String),

    /// Assertion failed.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// Timeout.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Run error.
    #[error("run error: {0}")]
    Run(#[from] oleada_core::RunError),

    /// Threshold policy error.
    #[error("policy error: {0}")]
    Policy(#[from] oleada_policy::PolicyError),
}

impl TestError {
    /// Creates a harness error.
    #[must_use]
    pub fn harness(msg: impl Into<String>) -> Self {
        Self::Harness(msg.into())
    }

    /// Creates an assertion error.
    #[must_use]
    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::Assertion(msg.into())
    }
}
