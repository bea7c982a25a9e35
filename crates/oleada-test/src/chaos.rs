//! Fault injection for the mock target.
//!
//! Faults are counter-driven rather than random: "every 4th request fails"
//! produces exactly 25% failures, so tests can assert exact rates.
//!
//! # Reference
//! Netflix. (2012). Chaos Monkey. GitHub.
//! <https://github.com/Netflix/chaosmonkey>

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Fault injection configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChaosConfig {
    /// Extra latency added to every request.
    pub latency: Option<Duration>,
    /// Every Nth request answers with a 5xx status.
    pub error_every: Option<u64>,
    /// Every Nth request never answers (client-side timeout).
    pub timeout_every: Option<u64>,
    /// Every Nth request is refused before connecting.
    pub refuse_every: Option<u64>,
}

impl ChaosConfig {
    /// Adds `delay` to every request.
    #[must_use]
    pub fn latency(delay: Duration) -> Self {
        Self {
            latency: Some(delay),
            ..Default::default()
        }
    }

    /// Fails every `n`th request with a server error.
    #[must_use]
    pub fn errors_every(n: u64) -> Self {
        Self {
            error_every: Some(n),
            ..Default::default()
        }
    }

    /// Times out every `n`th request.
    #[must_use]
    pub fn timeouts_every(n: u64) -> Self {
        Self {
            timeout_every: Some(n),
            ..Default::default()
        }
    }

    /// Refuses every `n`th connection.
    #[must_use]
    pub fn refusals_every(n: u64) -> Self {
        Self {
            refuse_every: Some(n),
            ..Default::default()
        }
    }

    /// Latency plus every fault kind at co-prime periods.
    #[must_use]
    pub fn comprehensive() -> Self {
        Self {
            latency: Some(Duration::from_millis(50)),
            error_every: Some(5),
            timeout_every: Some(7),
            refuse_every: Some(11),
        }
    }
}

/// A fault to apply to one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Answer with a 5xx status.
    ServerError,
    /// Never answer.
    Timeout,
    /// Refuse the connection.
    Refused,
}

/// Stateful injector shared by every request to one mock target.
#[derive(Debug)]
pub struct ChaosInjector {
    config: ChaosConfig,
    active: AtomicBool,
    requests: AtomicU64,
}

impl ChaosInjector {
    /// Creates an active injector.
    #[must_use]
    pub const fn new(config: ChaosConfig) -> Self {
        Self {
            config,
            active: AtomicBool::new(true),
            requests: AtomicU64::new(0),
        }
    }

    /// Resumes injection.
    pub fn start(&self) {
        tracing::warn!(config = ?self.config, "starting chaos injection");
        self.active.store(true, Ordering::Release);
    }

    /// Pauses injection. Requests keep being counted.
    pub fn stop(&self) {
        tracing::info!("stopping chaos injection");
        self.active.store(false, Ordering::Release);
    }

    /// Returns true if injection is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ChaosConfig {
        &self.config
    }

    /// Requests seen so far.
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Acquire)
    }

    /// Counts one request and returns the fault to apply to it, if any.
    ///
    /// When periods coincide, refusal wins over timeout, and timeout wins
    /// over server error.
    pub fn next_fault(&self) -> Option<Fault> {
        let n = self.requests.fetch_add(1, Ordering::AcqRel) + 1;
        if !self.is_active() {
            return None;
        }
        let hits = |every: Option<u64>| every.is_some_and(|every| every > 0 && n % every == 0);
        let fault = if hits(self.config.refuse_every) {
            Some(Fault::Refused)
        } else if hits(self.config.timeout_every) {
            Some(Fault::Timeout)
        } else if hits(self.config.error_every) {
            Some(Fault::ServerError)
        } else {
            None
        };
        if let Some(fault) = fault {
            tracing::debug!(request = n, ?fault, "injecting fault");
        }
        fault
    }

    /// Sleeps for the configured latency, if active.
    pub async fn maybe_inject_latency(&self) {
        if !self.is_active() {
            return;
        }
        if let Some(delay) = self.config.latency {
            tokio::time::sleep(delay).await;
        }
    }
}
