// Backoff gate for failed metric flushes
// Author: kelexine (https://github.com/kelexine)

use crate::config::{MetricsConfig, MAX_BACKOFF_SECONDS};
use backoff::{backoff::Backoff, ExponentialBackoff};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Create exponential backoff configuration for flush retries.
/// Never gives up: retained metrics are bounded by `max_pending` instead.
/// Intervals are clamped to [`MAX_BACKOFF_SECONDS`].
pub fn create_backoff(config: &MetricsConfig) -> ExponentialBackoff {
    let ceiling = Duration::from_secs(MAX_BACKOFF_SECONDS);
    let initial = Duration::from_millis(config.backoff_initial_ms.max(1)).min(ceiling);
    ExponentialBackoff {
        current_interval: initial,
        initial_interval: initial,
        randomization_factor: 0.3, // Add jitter
        multiplier: 2.0,
        max_interval: Duration::from_secs(config.backoff_max_seconds)
            .min(ceiling)
            .max(initial),
        max_elapsed_time: None,
        ..Default::default()
    }
}

/// Determine if an HTTP status code is retryable
pub fn is_retryable(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Tracks consecutive flush failures and when the next attempt is allowed
#[derive(Debug)]
pub struct FlushBackoff {
    backoff: ExponentialBackoff,
    not_before: Option<Instant>,
    failures: u32,
}

impl FlushBackoff {
    pub fn new(config: &MetricsConfig) -> Self {
        Self {
            backoff: create_backoff(config),
            not_before: None,
            failures: 0,
        }
    }

    /// Whether a flush may be attempted at `now`
    pub fn ready(&self, now: Instant) -> bool {
        self.not_before.map_or(true, |at| now >= at)
    }

    /// Register a failed flush and return the delay until the next attempt
    pub fn on_failure(&mut self, now: Instant) -> Duration {
        self.failures += 1;
        let delay = self
            .backoff
            .next_backoff()
            .unwrap_or(self.backoff.max_interval);
        self.not_before = now
            .checked_add(delay)
            .or_else(|| now.checked_add(Duration::from_secs(MAX_BACKOFF_SECONDS)));
        debug!(
            "Flush failure #{}, next threshold flush allowed in {}ms",
            self.failures,
            delay.as_millis()
        );
        delay
    }

    pub fn on_success(&mut self) {
        if self.failures > 0 {
            debug!("Flush recovered after {} failure(s)", self.failures);
        }
        self.backoff.reset();
        self.not_before = None;
        self.failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }
}
