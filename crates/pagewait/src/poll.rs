//! Generic polling primitive.
//!
//! Repeatedly evaluates an async boolean check on a fixed interval until it
//! reports `true` or the timeout budget is spent.
//!
//! The loop is structured (attempt, check deadline, wait for the next tick)
//! so there is no repeating timer to cancel: the interval lives on the
//! stack of [`poll_for`] and is dropped on every return path.

use crate::result::{PageWaitError, PageWaitResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default polling interval (100ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default timeout for poll operations (5 seconds)
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 5_000;

// =============================================================================
// POLL CONFIGURATION
// =============================================================================

/// Interval, timeout and failure message for one polling attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Time between check invocations
    pub interval: Duration,
    /// Budget measured from the start of polling
    pub timeout: Duration,
    /// Message carried by the timeout error
    pub timeout_message: String,
}

impl PollConfig {
    /// Create a config with default interval and timeout
    #[must_use]
    pub fn new(timeout_message: impl Into<String>) -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            timeout_message: timeout_message.into(),
        }
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval = Duration::from_millis(interval_ms);
        self
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout = Duration::from_millis(timeout_ms);
        self
    }

    /// Timeout in milliseconds
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

// =============================================================================
// POLLER
// =============================================================================

/// Poll `check` until it returns `Ok(true)` or `config.timeout` elapses.
///
/// The first attempt runs immediately, later attempts once per interval.
/// A check that is still running when a tick is due delays that tick;
/// missed ticks are skipped, so two checks never overlap. A check that
/// has not resolved by the deadline is dropped and the poll times out.
///
/// # Errors
///
/// - [`PageWaitError::Timeout`] carrying `config.timeout_message` when the
///   deadline passes without a successful check, including while a check
///   is still in flight.
/// - Any error returned by `check`, unchanged. Check errors end polling.
pub async fn poll_for<F, Fut>(config: &PollConfig, mut check: F) -> PageWaitResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PageWaitResult<bool>>,
{
    let start = Instant::now();
    let deadline = start + config.timeout;
    // tokio rejects a zero period
    let mut ticker = tokio::time::interval(config.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut attempts: u32 = 0;
    loop {
        let _ = ticker.tick().await;

        if start.elapsed() >= config.timeout {
            tracing::debug!(
                attempts,
                timeout_ms = config.timeout_ms(),
                "poll timed out: {}",
                config.timeout_message
            );
            return Err(PageWaitError::timeout(config.timeout_message.clone()));
        }

        attempts += 1;
        tracing::trace!(attempts, "poll attempt");
        let Ok(outcome) = tokio::time::timeout_at(deadline, check()).await else {
            tracing::debug!(
                attempts,
                timeout_ms = config.timeout_ms(),
                "check still running at deadline: {}",
                config.timeout_message
            );
            return Err(PageWaitError::timeout(config.timeout_message.clone()));
        };
        if outcome? {
            tracing::debug!(
                attempts,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "poll satisfied"
            );
            return Ok(());
        }
    }
}
