//! Reconnection policy and bookkeeping.

use std::time::Duration;

use tokio::time::Instant;

/// How often and how patiently to reconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after the first failure; 0 disables retrying.
    pub max_retries: u32,
    /// Wait before the first retry.
    pub interval: Duration,
    /// Upper bound on any single wait.
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            interval: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, interval: Duration) -> Self {
        Self {
            max_retries,
            interval,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Wait before retry number `attempt` (1-based): `interval * 2^(attempt-1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.interval.as_secs_f64();
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let delay = base * self.multiplier.powi(exponent);
        let max = self.max_backoff.as_secs_f64();

        Duration::from_secs_f64(delay.min(max))
    }
}

/// Consecutive failures of the current session.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    attempts: u32,
    next_retry: Option<Instant>,
    cumulative: Duration,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the failure streak; called whenever bytes arrive.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.next_retry = None;
    }

    /// Count a failure and return how long to wait before the next attempt,
    /// or `None` once the policy is exhausted.
    pub fn record_failure(&mut self, policy: &RetryPolicy, now: Instant) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts > policy.max_retries {
            self.next_retry = None;
            return None;
        }
        let delay = policy.backoff_delay(self.attempts);
        self.next_retry = Some(now + delay);
        self.cumulative += delay;
        Some(delay)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn next_retry(&self) -> Option<Instant> {
        self.next_retry
    }

    /// Total time spent waiting across the session, resets included.
    pub fn cumulative_backoff(&self) -> Duration {
        self.cumulative
    }
}
