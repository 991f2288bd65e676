//! Participant retry policy
//!
//! Delay before attempt `n + 1` is `min(initial_backoff * 2^(n-1), max_backoff)`.
//! A participant that hit `max_attempts` without a definitive answer fails.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy; `max_attempts` is at least 1
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    /// Attempt cap per participant
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// First retry delay
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Upper bound on any retry delay
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Delay to wait after `attempts` attempts
    pub fn backoff(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let exponent = (attempts - 1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    /// Earliest time the next attempt may start
    pub fn next_attempt_at(&self, last_attempt: DateTime<Utc>, attempts: u32) -> DateTime<Utc> {
        chrono::Duration::from_std(self.backoff(attempts))
            .ok()
            .and_then(|delay| last_attempt.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether no further attempt is allowed
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(1), Duration::from_secs(60))
    }
}
