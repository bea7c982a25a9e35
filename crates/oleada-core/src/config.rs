//! Run configuration.
//!
//! Loaded from TOML and validated at load time, with sensible defaults and
//! clear error messages. Durations are human-readable (`"10s"`, `"2m"`).
//!
//! ```toml
//! [options]
//! tick = "1s"
//! run_timeout = "10m"
//!
//! [scenarios.batch_values]
//! executor = "ramping-vus"
//! start_vus = 1
//! start_time = "60s"
//! stages = [
//!     { duration = "10s", target = 1 },
//!     { duration = "10s", target = 5 },
//! ]
//!
//! [thresholds]
//! errors = ["rate<0.1"]
//! http_req_duration = [{ threshold = "p(95)<10000", abort_on_fail = true }]
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RunError};
use crate::http::DEFAULT_REQUEST_TIMEOUT;
use crate::scenario::DEFAULT_GRACEFUL_STOP;
use crate::schedule::{RampPolicy, Schedule, Stage};

/// The only executor kind the harness implements.
pub const RAMPING_VUS: &str = "ramping-vus";

/// Complete run configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Run-wide options.
    #[serde(default)]
    pub options: RunOptions,

    /// Scenarios by name.
    #[serde(default)]
    pub scenarios: BTreeMap<String, ScenarioConfig>,

    /// Threshold expressions by metric name.
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<ThresholdEntry>>,

    /// Free-form variables for workloads (target URL, payload sizes).
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
}

impl RunConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        self.options.validate()?;

        if self.scenarios.is_empty() {
            return Err(RunError::config("at least one scenario is required"));
        }
        for (name, scenario) in &self.scenarios {
            validate_name(name)?;
            scenario.validate(name)?;
        }

        for (metric, entries) in &self.thresholds {
            if metric.trim().is_empty() {
                return Err(RunError::config("threshold metric name cannot be empty"));
            }
            if entries.iter().any(|e| e.expression().trim().is_empty()) {
                return Err(RunError::config(format!(
                    "threshold on '{metric}' has an empty expression"
                )));
            }
        }

        Ok(())
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    /// Returns an error if the text cannot be parsed or is invalid.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| RunError::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| RunError::config(format!("failed to read config: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| RunError::Serialization(e.to_string()))
    }

    /// Returns a variable, or `default` if unset.
    #[must_use]
    pub fn var<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.vars.get(name).map_or(default, String::as_str)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RunError::config("scenario name cannot be empty"));
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(RunError::config(format!(
            "scenario name '{name}' must contain only alphanumeric characters, hyphens, and underscores"
        )));
    }
    Ok(())
}

/// Run-wide options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Ramp reconciliation interval.
    #[serde(default = "default_tick", with = "humantime_serde")]
    pub tick: Duration,

    /// Interval between abort-on-fail threshold evaluations.
    #[serde(default = "default_threshold_interval", with = "humantime_serde")]
    pub threshold_interval: Duration,

    /// Default graceful stop for scenarios that do not set one.
    #[serde(default = "default_graceful_stop", with = "humantime_serde")]
    pub graceful_stop: Duration,

    /// Default per-request timeout for workloads.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Hard bound on the whole run.
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub run_timeout: Option<Duration>,
}

fn default_tick() -> Duration {
    Duration::from_secs(1)
}

fn default_threshold_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_graceful_stop() -> Duration {
    DEFAULT_GRACEFUL_STOP
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

impl RunOptions {
    /// Validates the options.
    ///
    /// # Errors
    /// Returns an error if an interval is zero.
    pub fn validate(&self) -> Result<()> {
        if self.tick.is_zero() {
            return Err(RunError::config("tick must be > 0"));
        }
        if self.threshold_interval.is_zero() {
            return Err(RunError::config("threshold_interval must be > 0"));
        }
        if self.run_timeout.is_some_and(|t| t.is_zero()) {
            return Err(RunError::config("run_timeout must be > 0"));
        }
        Ok(())
    }

    /// Sets the run timeout.
    #[must_use]
    pub const fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    /// Sets the tick.
    #[must_use]
    pub const fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Sets the threshold interval.
    #[must_use]
    pub const fn with_threshold_interval(mut self, interval: Duration) -> Self {
        self.threshold_interval = interval;
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            tick: default_tick(),
            threshold_interval: default_threshold_interval(),
            graceful_stop: default_graceful_stop(),
            request_timeout: default_request_timeout(),
            run_timeout: None,
        }
    }
}

/// One scenario entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Executor kind; only `ramping-vus` is supported.
    #[serde(default = "default_executor")]
    pub executor: String,

    /// Workload name in the catalog. Defaults to the scenario name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<String>,

    /// VUs spawned at scenario time zero.
    #[serde(default)]
    pub start_vus: u32,

    /// Ramp stages.
    #[serde(default)]
    pub stages: Vec<Stage>,

    /// Delay from run start.
    #[serde(default, with = "humantime_serde")]
    pub start_time: Duration,

    /// Graceful stop override.
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub graceful_stop: Option<Duration>,

    /// Minimum interval between iteration starts per VU.
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub pacing: Option<Duration>,

    /// Target interpolation within stages.
    #[serde(default)]
    pub ramp: RampPolicy,
}

fn default_executor() -> String {
    RAMPING_VUS.to_string()
}

impl ScenarioConfig {
    /// Creates a ramping-vus scenario entry.
    #[must_use]
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            executor: default_executor(),
            exec: None,
            start_vus: 0,
            stages,
            start_time: Duration::ZERO,
            graceful_stop: None,
            pacing: None,
            ramp: RampPolicy::Step,
        }
    }

    /// Validates the entry for scenario `name`.
    ///
    /// # Errors
    /// Returns an error for an unknown executor or empty stages.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.executor != RAMPING_VUS {
            return Err(RunError::config(format!(
                "scenario '{name}': unsupported executor '{}' (expected '{RAMPING_VUS}')",
                self.executor
            )));
        }
        if self.stages.is_empty() {
            return Err(RunError::config(format!(
                "scenario '{name}': stages cannot be empty"
            )));
        }
        Ok(())
    }

    /// Returns the catalog name for scenario `name`.
    #[must_use]
    pub fn exec_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.exec.as_deref().unwrap_or(name)
    }

    /// Builds the ramp schedule.
    #[must_use]
    pub fn schedule(&self) -> Schedule {
        Schedule::new(self.stages.clone())
            .with_start_vus(self.start_vus)
            .with_policy(self.ramp)
    }
}

/// A threshold expression, optionally marked abort-on-fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdEntry {
    /// Bare expression, e.g. `"rate<0.1"`.
    Expression(String),
    /// Expression with options.
    Detailed {
        /// Expression text.
        threshold: String,
        /// Stop the run as soon as this threshold fails.
        #[serde(default)]
        abort_on_fail: bool,
    },
}

impl ThresholdEntry {
    /// Returns the expression text.
    #[must_use]
    pub fn expression(&self) -> &str {
        match self {
            Self::Expression(expr) | Self::Detailed { threshold: expr, .. } => expr,
        }
    }

    /// Returns true if the run stops when this threshold fails.
    #[must_use]
    pub const fn abort_on_fail(&self) -> bool {
        match self {
            Self::Expression(_) => false,
            Self::Detailed { abort_on_fail, .. } => *abort_on_fail,
        }
    }
}
