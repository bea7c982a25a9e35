//! Threshold expressions: `<aggregation> <op> <number>`.
//!
//! | Metric kind | Aggregations |
//! |-------------|--------------|
//! | counter | `count` (sum), `rate` (sum per second) |
//! | rate | `rate` |
//! | trend | `avg`, `min`, `max`, `med`, `count`, `p(N)` |
//!
//! Operators: `<`, `<=`, `>`, `>=`, `==`, `!=`.

use oleada_core::{Aggregate, MetricKind, MetricsRegistry};
use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, Result};

/// Statistic a threshold compares against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Counter sum or trend sample count.
    Count,
    /// Rate fraction or counter sum per second.
    Rate,
    /// Trend mean.
    Avg,
    /// Trend minimum.
    Min,
    /// Trend maximum.
    Max,
    /// Trend median.
    Med,
    /// Trend nearest-rank percentile, `0..=100`.
    Percentile(f64),
}

impl Aggregation {
    fn parse(token: &str) -> std::result::Result<Self, String> {
        match token {
            "count" => Ok(Self::Count),
            "rate" => Ok(Self::Rate),
            "avg" => Ok(Self::Avg),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "med" => Ok(Self::Med),
            _ => {
                let inner = token
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| format!("unknown aggregation '{token}'"))?;
                let p: f64 = inner
                    .parse()
                    .map_err(|_| format!("invalid percentile '{inner}'"))?;
                if !(0.0..=100.0).contains(&p) {
                    return Err(format!("percentile {p} out of range 0..=100"));
                }
                Ok(Self::Percentile(p))
            }
        }
    }

    /// Returns true if this aggregation is defined for `kind`.
    #[must_use]
    pub const fn applies_to(&self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Counter => matches!(self, Self::Count | Self::Rate),
            MetricKind::Rate => matches!(self, Self::Rate),
            MetricKind::Trend => !matches!(self, Self::Rate),
        }
    }

    /// Extracts the observed value from `metric` in `registry`.
    ///
    /// Returns the reason as `Err` when no value can be observed.
    pub fn observe(
        &self,
        registry: &MetricsRegistry,
        metric: &str,
    ) -> std::result::Result<f64, String> {
        let Some(kind) = registry.kind_of(metric) else {
            return Err(format!("unknown metric '{metric}'"));
        };
        if !self.applies_to(kind) {
            return Err(format!("'{self}' is not defined for {kind} metrics"));
        }
        let Some(aggregate) = registry.snapshot(metric) else {
            return Err(format!("metric '{metric}' has no samples"));
        };

        let value = match (self, aggregate) {
            (Self::Count, Aggregate::Counter { sum, .. }) => sum,
            (Self::Rate, Aggregate::Counter { per_second, .. }) => per_second,
            (Self::Rate, Aggregate::Rate { rate, .. }) => rate,
            (Self::Count, Aggregate::Trend(s)) => s.count as f64,
            (Self::Avg, Aggregate::Trend(s)) => s.avg,
            (Self::Min, Aggregate::Trend(s)) => s.min,
            (Self::Max, Aggregate::Trend(s)) => s.max,
            (Self::Med, Aggregate::Trend(s)) => s.med,
            (Self::Percentile(p), Aggregate::Trend(_)) => registry
                .percentile(metric, *p)
                .ok_or_else(|| format!("metric '{metric}' has no samples"))?,
            (_, other) => {
                return Err(format!(
                    "'{self}' is not defined for {} metrics",
                    other.kind()
                ));
            }
        };
        Ok(value)
    }
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count => write!(f, "count"),
            Self::Rate => write!(f, "rate"),
            Self::Avg => write!(f, "avg"),
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
            Self::Med => write!(f, "med"),
            Self::Percentile(p) => write!(f, "p({p})"),
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

impl Operator {
    /// Returns true if `observed <op> bound` holds.
    #[must_use]
    pub fn holds(self, observed: f64, bound: f64) -> bool {
        match self {
            Self::Lt => observed < bound,
            Self::Le => observed <= bound,
            Self::Gt => observed > bound,
            Self::Ge => observed >= bound,
            Self::Eq => observed == bound,
            Self::Ne => observed != bound,
        }
    }

    /// Returns the operator's symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    /// Splits `expr` at the first operator: `(lhs, op, rhs)`.
    fn split(expr: &str) -> Option<(&str, Self, &str)> {
        let pos = expr.find(['<', '>', '=', '!'])?;
        let rest = &expr[pos..];
        let (op, len) = if rest.starts_with("<=") {
            (Self::Le, 2)
        } else if rest.starts_with(">=") {
            (Self::Ge, 2)
        } else if rest.starts_with("==") {
            (Self::Eq, 2)
        } else if rest.starts_with("!=") {
            (Self::Ne, 2)
        } else if rest.starts_with('<') {
            (Self::Lt, 1)
        } else if rest.starts_with('>') {
            (Self::Gt, 1)
        } else {
            return None;
        };
        Some((&expr[..pos], op, &rest[len..]))
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A parsed threshold on one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSpec {
    /// Metric name.
    pub metric: String,
    /// Expression as written.
    pub expression: String,
    /// Statistic compared.
    pub aggregation: Aggregation,
    /// Comparison.
    pub operator: Operator,
    /// Bound.
    pub bound: f64,
    /// Stop the run as soon as this threshold fails.
    pub abort_on_fail: bool,
}

impl ThresholdSpec {
    /// Parses `expression` (e.g. `p(95)<10000`) for `metric`.
    ///
    /// # Errors
    /// Returns [`PolicyError::InvalidThreshold`] for a malformed expression.
    pub fn parse(metric: impl Into<String>, expression: &str) -> Result<Self> {
        let metric = metric.into();
        let invalid = |reason: String| PolicyError::invalid_threshold(&metric, expression, reason);

        if metric.trim().is_empty() {
            return Err(invalid("metric name cannot be empty".to_string()));
        }

        let compact: String = expression.chars().filter(|c| !c.is_whitespace()).collect();
        let (lhs, operator, rhs) = Operator::split(&compact)
            .ok_or_else(|| invalid("expected one of < <= > >= == !=".to_string()))?;

        let aggregation = Aggregation::parse(lhs).map_err(invalid)?;
        let bound: f64 = rhs
            .parse()
            .map_err(|_| invalid(format!("invalid number '{rhs}'")))?;
        if !bound.is_finite() {
            return Err(invalid(format!("bound '{rhs}' is not finite")));
        }

        Ok(Self {
            metric,
            expression: expression.trim().to_string(),
            aggregation,
            operator,
            bound,
            abort_on_fail: false,
        })
    }

    /// Marks the threshold abort-on-fail.
    #[must_use]
    pub const fn with_abort_on_fail(mut self, abort: bool) -> Self {
        self.abort_on_fail = abort;
        self
    }

    /// Returns true if `observed` satisfies the threshold.
    #[must_use]
    pub fn holds(&self, observed: f64) -> bool {
        self.operator.holds(observed, self.bound)
    }
}

impl std::fmt::Display for ThresholdSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}{}{}",
            self.metric, self.aggregation, self.operator, self.bound
        )
    }
}
