//! Retry policy: decides backoff delays.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::domain::timestamp;

/// Default `backoff_base`.
pub const DEFAULT_BACKOFF_BASE: u32 = 2;

/// Retry policy for failed jobs.
///
/// delay = backoff_base ^ attempts (whole seconds), where `attempts` is the
/// count *after* recording the failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff_base: u32,
}

impl RetryPolicy {
    pub fn new(backoff_base: u32) -> Self {
        Self { backoff_base }
    }

    /// Calculate delay before the next retry.
    ///
    /// Example with backoff_base=2:
    /// - attempt 1 (first failure): 2s
    /// - attempt 2: 4s
    /// - attempt 3: 8s
    ///
    /// Saturates at `u64::MAX` seconds instead of overflowing.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let secs = u64::from(self.backoff_base).saturating_pow(attempts);
        Duration::from_secs(secs)
    }

    /// `now + next_delay(attempts)`, clamped to the latest storable time.
    pub fn next_retry_at(&self, now: DateTime<Utc>, attempts: u32) -> DateTime<Utc> {
        let delay = TimeDelta::from_std(self.next_delay(attempts)).unwrap_or(TimeDelta::MAX);
        let at = now
            .checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        timestamp::clamp(at)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_BASE)
    }
}
