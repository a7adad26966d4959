//! Bounded sleep loop used for existence polling.
//!
//! The predicate usually needs `&mut` access to the thing being polled, so
//! the loop stays with the caller and [`Poller`] only owns the clock:
//!
//! ```ignore
//! let mut poller = Poller::new(WaitConfig::default());
//! loop {
//!     if entity.exists().await? {
//!         break;
//!     }
//!     poller.tick().await?;
//! }
//! ```

use crate::error::{ApiError, Result};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Timeout, interval and failure message for a poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitConfig {
    /// Give up after this long.
    pub timeout: Duration,
    /// Sleep between attempts.
    pub interval: Duration,
    /// Included in the timeout error.
    pub message: Option<String>,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            interval: Duration::from_secs(1),
            message: None,
        }
    }
}

impl WaitConfig {
    /// Override the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the failure message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Clock for one poll loop.
#[derive(Debug)]
pub struct Poller {
    config: WaitConfig,
    started: Instant,
    attempts: u32,
}

impl Poller {
    /// Start the clock.
    pub fn new(config: WaitConfig) -> Self {
        Self {
            config,
            started: Instant::now(),
            attempts: 0,
        }
    }

    /// Time since the poller was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Predicate evaluations recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a failed attempt and sleep one interval, or fail with
    /// [`ApiError::Timeout`] once the timeout has passed.
    pub async fn tick(&mut self) -> Result<()> {
        self.attempts += 1;
        let elapsed = self.elapsed();
        if elapsed >= self.config.timeout {
            let what = self.config.message.as_deref().unwrap_or("condition");
            return Err(ApiError::Timeout(format!(
                "{} not met after {:?} ({} attempts)",
                what, elapsed, self.attempts
            )));
        }
        let remaining = self.config.timeout - elapsed;
        sleep(self.config.interval.min(remaining)).await;
        Ok(())
    }
}
