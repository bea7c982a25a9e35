//! Run-wide metrics registry.
//!
//! Three metric kinds, keyed by name:
//!
//! - [`MetricKind::Counter`]: cumulative sum (`records_batch_values`)
//! - [`MetricKind::Rate`]: fraction of samples that were true (`errors`)
//! - [`MetricKind::Trend`]: full distribution with percentiles (`http_req_duration`)
//!
//! The first writer of a name fixes its kind. Typed handles ([`Counter`],
//! [`Rate`], [`Trend`]) can be declared up front. A declared counter or
//! trend stays invisible to snapshots until it receives its first sample; a
//! declared rate reports 0 right away.
//!
//! Trend percentiles use the nearest-rank method over every sample.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::clock::{Clock, TokioClock};
use crate::error::{Result, RunError};

/// Names of metrics the harness records on its own.
pub mod builtin {
    /// Counter: completed iterations.
    pub const ITERATIONS: &str = "iterations";
    /// Trend: iteration wall time in milliseconds.
    pub const ITERATION_DURATION: &str = "iteration_duration";
    /// Rate: iterations that returned an error.
    pub const ITERATION_ERRORS: &str = "iteration_errors";
    /// Counter: HTTP requests issued.
    pub const HTTP_REQS: &str = "http_reqs";
    /// Trend: HTTP request latency in milliseconds.
    pub const HTTP_REQ_DURATION: &str = "http_req_duration";
    /// Rate: HTTP requests that failed (transport error or status >= 400).
    pub const HTTP_REQ_FAILED: &str = "http_req_failed";
    /// Rate: outcome of `VuContext::check` calls.
    pub const CHECKS: &str = "checks";
}

/// Kind of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Cumulative sum.
    Counter,
    /// Fraction of true samples.
    Rate,
    /// Distribution of values.
    Trend,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Counter => write!(f, "counter"),
            Self::Rate => write!(f, "rate"),
            Self::Trend => write!(f, "trend"),
        }
    }
}

/// A single observation.
///
/// For a [`MetricKind::Rate`] any non-zero value counts as true.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Metric name.
    pub metric: String,
    /// Metric kind.
    pub kind: MetricKind,
    /// Observed value.
    pub value: f64,
    /// When the observation was made.
    pub timestamp: Instant,
}

impl MetricSample {
    /// Creates a sample.
    #[must_use]
    pub fn new(metric: impl Into<String>, kind: MetricKind, value: f64, timestamp: Instant) -> Self {
        Self {
            metric: metric.into(),
            kind,
            value,
            timestamp,
        }
    }
}

/// Summary statistics of a trend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendStats {
    /// Number of samples.
    pub count: u64,
    /// Smallest sample.
    pub min: f64,
    /// Largest sample.
    pub max: f64,
    /// Arithmetic mean.
    pub avg: f64,
    /// Median (nearest-rank p50).
    pub med: f64,
    /// 90th percentile.
    pub p90: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
}

impl TrendStats {
    /// Computes statistics over already sorted values. Returns `None` if empty.
    #[must_use]
    pub fn from_sorted(sorted: &[f64]) -> Option<Self> {
        let (&min, &max) = (sorted.first()?, sorted.last()?);
        let sum: f64 = sorted.iter().sum();
        Some(Self {
            count: sorted.len() as u64,
            min,
            max,
            avg: sum / sorted.len() as f64,
            med: percentile(sorted, 50.0)?,
            p90: percentile(sorted, 90.0)?,
            p95: percentile(sorted, 95.0)?,
            p99: percentile(sorted, 99.0)?,
        })
    }
}

/// Point-in-time aggregate of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Aggregate {
    /// Counter aggregate.
    Counter {
        /// Sum of all samples.
        sum: f64,
        /// Number of samples.
        samples: u64,
        /// Sum per second of run time so far.
        per_second: f64,
    },
    /// Rate aggregate.
    Rate {
        /// True samples.
        passes: u64,
        /// All samples.
        total: u64,
        /// `passes / total`, 0 with no samples.
        rate: f64,
    },
    /// Trend aggregate.
    Trend(TrendStats),
}

impl Aggregate {
    /// Returns the kind this aggregate was computed for.
    #[must_use]
    pub const fn kind(&self) -> MetricKind {
        match self {
            Self::Counter { .. } => MetricKind::Counter,
            Self::Rate { .. } => MetricKind::Rate,
            Self::Trend(_) => MetricKind::Trend,
        }
    }

    /// Returns the headline value: sum, rate, or average.
    #[must_use]
    pub const fn value(&self) -> f64 {
        match self {
            Self::Counter { sum, .. } => *sum,
            Self::Rate { rate, .. } => *rate,
            Self::Trend(stats) => stats.avg,
        }
    }
}

impl std::fmt::Display for Aggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Counter {
                sum, per_second, ..
            } => write!(f, "{sum} ({per_second:.2}/s)"),
            Self::Rate {
                passes,
                total,
                rate,
            } => write!(f, "{:.2}% ({passes} of {total})", rate * 100.0),
            Self::Trend(s) => write!(
                f,
                "avg={:.2} min={:.2} med={:.2} max={:.2} p(90)={:.2} p(95)={:.2}",
                s.avg, s.min, s.med, s.max, s.p90, s.p95
            ),
        }
    }
}

/// Nearest-rank percentile of sorted values.
///
/// `rank = ceil(p / 100 * n)` clamped to `[1, n]`. Returns `None` if empty.
#[must_use]
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let rank = (p * n as f64 / 100.0).ceil();
    let rank = if rank.is_nan() { 1 } else { (rank as usize).clamp(1, n) };
    Some(sorted[rank - 1])
}

// ═══════════════════════════════════════════════════════════════════════════
// Per-metric storage
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
enum Series {
    Counter { sum: f64, samples: u64 },
    Rate { passes: u64, total: u64 },
    Trend { values: Vec<f64> },
}

impl Series {
    fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter { sum: 0.0, samples: 0 },
            MetricKind::Rate => Self::Rate { passes: 0, total: 0 },
            MetricKind::Trend => Self::Trend { values: Vec::new() },
        }
    }

    fn push(&mut self, value: f64) {
        match self {
            Self::Counter { sum, samples } => {
                *sum += value;
                *samples += 1;
            }
            Self::Rate { passes, total } => {
                if value != 0.0 {
                    *passes += 1;
                }
                *total += 1;
            }
            Self::Trend { values } => values.push(value),
        }
    }

    fn len(&self) -> u64 {
        match self {
            Self::Counter { samples, .. } => *samples,
            Self::Rate { total, .. } => *total,
            Self::Trend { values } => values.len() as u64,
        }
    }
}

#[derive(Debug)]
struct MetricState {
    series: Series,
    first_sample: Option<Instant>,
    last_sample: Option<Instant>,
}

#[derive(Debug)]
struct Metric {
    kind: MetricKind,
    state: Mutex<MetricState>,
}

impl Metric {
    fn new(kind: MetricKind) -> Self {
        Self {
            kind,
            state: Mutex::new(MetricState {
                series: Series::new(kind),
                first_sample: None,
                last_sample: None,
            }),
        }
    }

    fn push(&self, value: f64, at: Instant) {
        let mut state = self.state.lock();
        state.series.push(value);
        state.first_sample.get_or_insert(at);
        state.last_sample = Some(at);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════════

/// Thread-safe registry shared by every VU of a run.
///
/// Cloning is cheap and every clone sees the same metrics.
#[derive(Clone)]
pub struct MetricsRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    metrics: RwLock<HashMap<String, Arc<Metric>>>,
    clock: Arc<dyn Clock>,
    started: Instant,
}

impl MetricsRegistry {
    /// Creates an empty registry on the tokio clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(TokioClock::new()))
    }

    /// Creates an empty registry that timestamps samples with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let started = clock.now();
        Self {
            inner: Arc::new(RegistryInner {
                metrics: RwLock::new(HashMap::new()),
                clock,
                started,
            }),
        }
    }

    /// Returns the clock used for timestamps.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// Returns time elapsed since the registry was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.inner.clock.elapsed_since(self.inner.started)
    }

    fn entry(&self, name: &str, kind: MetricKind) -> Result<Arc<Metric>> {
        if let Some(metric) = self.inner.metrics.read().get(name) {
            return check_kind(name, metric, kind);
        }
        let mut metrics = self.inner.metrics.write();
        let metric = metrics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Metric::new(kind)));
        check_kind(name, metric, kind)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Recording
    // ═══════════════════════════════════════════════════════════════════════

    /// Records `value` into metric `name`, creating it if absent.
    ///
    /// # Errors
    /// Returns [`RunError::MetricKindMismatch`] if `name` exists with another kind.
    pub fn record(&self, name: &str, kind: MetricKind, value: f64) -> Result<()> {
        let now = self.inner.clock.now();
        self.entry(name, kind)?.push(value, now);
        Ok(())
    }

    /// Records a sample with its own timestamp.
    ///
    /// # Errors
    /// Returns [`RunError::MetricKindMismatch`] if the name exists with another kind.
    pub fn push(&self, sample: &MetricSample) -> Result<()> {
        self.entry(&sample.metric, sample.kind)?
            .push(sample.value, sample.timestamp);
        Ok(())
    }

    /// Declares (or fetches) a counter handle.
    ///
    /// # Errors
    /// Returns [`RunError::MetricKindMismatch`] if `name` is not a counter.
    pub fn counter(&self, name: &str) -> Result<Counter> {
        Ok(Counter(self.handle(name, MetricKind::Counter)?))
    }

    /// Declares (or fetches) a rate handle.
    ///
    /// # Errors
    /// Returns [`RunError::MetricKindMismatch`] if `name` is not a rate.
    pub fn rate(&self, name: &str) -> Result<Rate> {
        Ok(Rate(self.handle(name, MetricKind::Rate)?))
    }

    /// Declares (or fetches) a trend handle.
    ///
    /// # Errors
    /// Returns [`RunError::MetricKindMismatch`] if `name` is not a trend.
    pub fn trend(&self, name: &str) -> Result<Trend> {
        Ok(Trend(self.handle(name, MetricKind::Trend)?))
    }

    fn handle(&self, name: &str, kind: MetricKind) -> Result<Handle> {
        Ok(Handle {
            metric: self.entry(name, kind)?,
            clock: Arc::clone(&self.inner.clock),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reading
    // ═══════════════════════════════════════════════════════════════════════

    fn visible(&self, name: &str) -> Option<Arc<Metric>> {
        let metric = self.inner.metrics.read().get(name).cloned()?;
        if metric.state.lock().series.len() == 0 {
            return None;
        }
        Some(metric)
    }

    /// Returns the aggregate of `name`.
    ///
    /// `None` if `name` is unknown, or is a counter or trend with no samples.
    /// A rate with no samples reports 0.
    #[must_use]
    pub fn snapshot(&self, name: &str) -> Option<Aggregate> {
        let metric = self.inner.metrics.read().get(name).cloned()?;
        self.aggregate(&metric)
    }

    /// Returns aggregates of every metric [`snapshot`](Self::snapshot) reports.
    #[must_use]
    pub fn snapshot_all(&self) -> BTreeMap<String, Aggregate> {
        let metrics: Vec<(String, Arc<Metric>)> = self
            .inner
            .metrics
            .read()
            .iter()
            .map(|(name, metric)| (name.clone(), Arc::clone(metric)))
            .collect();

        metrics
            .into_iter()
            .filter_map(|(name, metric)| self.aggregate(&metric).map(|agg| (name, agg)))
            .collect()
    }

    fn aggregate(&self, metric: &Metric) -> Option<Aggregate> {
        // Copy trend values out so sorting happens outside the lock.
        let trend_values = {
            let state = metric.state.lock();
            match &state.series {
                Series::Counter { samples: 0, .. } => return None,
                Series::Rate { total: 0, .. } => {
                    return Some(Aggregate::Rate {
                        passes: 0,
                        total: 0,
                        rate: 0.0,
                    });
                }
                Series::Counter { sum, samples } => {
                    let secs = self.elapsed().as_secs_f64();
                    let per_second = if secs > 0.0 { sum / secs } else { 0.0 };
                    return Some(Aggregate::Counter {
                        sum: *sum,
                        samples: *samples,
                        per_second,
                    });
                }
                Series::Rate { passes, total } => {
                    return Some(Aggregate::Rate {
                        passes: *passes,
                        total: *total,
                        rate: *passes as f64 / *total as f64,
                    });
                }
                Series::Trend { values } => values.clone(),
            }
        };
        let sorted = sorted(trend_values);
        TrendStats::from_sorted(&sorted).map(Aggregate::Trend)
    }

    /// Returns the nearest-rank `p`th percentile of trend `name`.
    ///
    /// `None` if the metric is absent, empty, or not a trend.
    #[must_use]
    pub fn percentile(&self, name: &str, p: f64) -> Option<f64> {
        let metric = self.visible(name)?;
        let values = match &metric.state.lock().series {
            Series::Trend { values } => values.clone(),
            _ => return None,
        };
        percentile(&sorted(values), p)
    }

    /// Returns the rate of `name`: 0 for a rate with no samples.
    ///
    /// `None` if `name` was never declared or is not a rate.
    #[must_use]
    pub fn rate_value(&self, name: &str) -> Option<f64> {
        let metric = self.inner.metrics.read().get(name).cloned()?;
        let state = metric.state.lock();
        match state.series {
            Series::Rate { total: 0, .. } => Some(0.0),
            Series::Rate { passes, total } => Some(passes as f64 / total as f64),
            _ => None,
        }
    }

    /// Returns the kind of `name` if it has been declared or written.
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.inner.metrics.read().get(name).map(|m| m.kind)
    }

    /// Returns true if `name` has at least one sample.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.visible(name).is_some()
    }

    /// Returns the names of every reported metric, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.snapshot_all().into_keys().collect()
    }

    /// Returns when `name` received its first sample.
    #[must_use]
    pub fn first_sample_at(&self, name: &str) -> Option<Instant> {
        let metric = self.inner.metrics.read().get(name).cloned()?;
        metric.state.lock().first_sample
    }

    /// Returns when `name` received its latest sample.
    #[must_use]
    pub fn last_sample_at(&self, name: &str) -> Option<Instant> {
        let metric = self.inner.metrics.read().get(name).cloned()?;
        metric.state.lock().last_sample
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("metrics", &self.inner.metrics.read().len())
            .finish_non_exhaustive()
    }
}

fn check_kind(name: &str, metric: &Arc<Metric>, requested: MetricKind) -> Result<Arc<Metric>> {
    if metric.kind == requested {
        Ok(Arc::clone(metric))
    } else {
        Err(RunError::MetricKindMismatch {
            name: name.to_string(),
            existing: metric.kind,
            requested,
        })
    }
}

fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values
}

// ═══════════════════════════════════════════════════════════════════════════
// Typed handles
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
struct Handle {
    metric: Arc<Metric>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &self.metric.kind)
            .field("samples", &self.metric.state.lock().series.len())
            .finish_non_exhaustive()
    }
}

impl Handle {
    fn push(&self, value: f64) {
        self.metric.push(value, self.clock.now());
    }
}

/// Handle to a counter metric.
#[derive(Debug, Clone)]
pub struct Counter(Handle);

impl Counter {
    /// Adds `value` to the counter.
    pub fn add(&self, value: f64) {
        self.0.push(value);
    }

    /// Adds one.
    pub fn inc(&self) {
        self.add(1.0);
    }
}

/// Handle to a rate metric.
#[derive(Debug, Clone)]
pub struct Rate(Handle);

impl Rate {
    /// Records one boolean outcome.
    pub fn add(&self, value: bool) {
        self.0.push(if value { 1.0 } else { 0.0 });
    }
}

/// Handle to a trend metric.
#[derive(Debug, Clone)]
pub struct Trend(Handle);

impl Trend {
    /// Records one value.
    pub fn add(&self, value: f64) {
        self.0.push(value);
    }

    /// Records a duration in milliseconds.
    pub fn add_duration(&self, duration: Duration) {
        self.add(duration.as_nanos() as f64 / 1_000_000.0);
    }
}
