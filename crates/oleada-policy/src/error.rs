//! Policy error types.

/// Result type alias for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;

/// Threshold policy errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// Threshold expression could not be parsed.
    #[error("invalid threshold '{metric}: {expression}': {reason}")]
    InvalidThreshold {
        /// Metric the threshold was declared on.
        metric: String,
        /// Offending expression.
        expression: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl PolicyError {
    /// Creates an invalid threshold error.
    #[must_use]
    pub fn invalid_threshold(
        metric: impl Into<String>,
        expression: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidThreshold {
            metric: metric.into(),
            expression: expression.into(),
            reason: reason.into(),
        }
    }
}

impl From<PolicyError> for oleada_core::RunError {
    fn from(err: PolicyError) -> Self {
        Self::config(err.to_string())
    }
}
