//! Monotonic clock and timer.
//!
//! Everything time-related in a run (scenario offsets, ramp wake-ups, pacing,
//! sample timestamps) goes through a [`Clock`]. The default [`TokioClock`]
//! uses `tokio::time`, so tests can run whole ramp schedules under
//! `#[tokio::test(start_paused = true)]` without real waiting.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{Result, RunError};

/// Source of monotonic time and suspension for a run.
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    /// Returns the current instant.
    fn now(&self) -> Instant;

    /// Suspends the caller until `deadline`. Returns immediately if it passed.
    async fn sleep_until(&self, deadline: Instant);

    /// Suspends the caller for `duration`.
    async fn sleep(&self, duration: Duration) {
        self.sleep_until(self.now() + duration).await;
    }

    /// Checks that the clock can drive a run from the current context.
    ///
    /// # Errors
    /// Returns [`RunError::ClockUnavailable`] when timers cannot fire.
    fn ensure_available(&self) -> Result<()> {
        Ok(())
    }

    /// Returns the time elapsed since `earlier`, saturating at zero.
    fn elapsed_since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }
}

/// Clock backed by the tokio timer wheel.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl TokioClock {
    /// Creates a new tokio clock.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }

    fn ensure_available(&self) -> Result<()> {
        tokio::runtime::Handle::try_current()
            .map(|_| ())
            .map_err(|e| RunError::clock_unavailable(e.to_string()))
    }
}
