//! Retry policy for Repository REST calls.

use std::time::Duration;

/// Statuses worth retrying: request timeout, too-early, throttling, and the
/// transient 5xx family.
const RETRIABLE_STATUSES: [u16; 7] = [408, 425, 429, 500, 502, 503, 504];

/// Whether a call may be replayed after an application-level failure.
///
/// Create calls against the Repository are not idempotent: replaying one
/// after an ambiguous failure could produce duplicate objects. Those calls
/// are retried only on connection-level errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    Idempotent,
    NonIdempotent,
}

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_ms: 500,
            max_ms: 30_000,
            max_retries: 4,
        }
    }
}

impl RetryPolicy {
    /// True when the status belongs to the retriable set.
    pub fn is_retriable_status(&self, status: u16) -> bool {
        RETRIABLE_STATUSES.contains(&status)
    }

    /// Backoff before the given retry attempt (0-based). When the server
    /// sent `Retry-After`, that value raises the floor.
    pub fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exp_ms = self
            .base_ms
            .saturating_mul(1u64 << attempt.min(10))
            .min(self.max_ms);
        let mut delay = Duration::from_millis(exp_ms);
        if let Some(floor) = retry_after {
            if floor > delay {
                delay = floor.min(Duration::from_millis(self.max_ms));
            }
        }
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_statuses() {
        let policy = RetryPolicy::default();
        for status in [408, 425, 429, 500, 502, 503, 504] {
            assert!(policy.is_retriable_status(status), "{status}");
        }
        for status in [200, 201, 400, 403, 404, 409, 501] {
            assert!(!policy.is_retriable_status(status), "{status}");
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0, None), Duration::from_millis(500));
        assert_eq!(policy.backoff(1, None), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2, None), Duration::from_millis(2000));
        assert_eq!(policy.backoff(10, None), Duration::from_millis(30_000));
    }

    #[test]
    fn test_retry_after_raises_floor() {
        let policy = RetryPolicy::default();
        let delay = policy.backoff(0, Some(Duration::from_secs(5)));
        assert_eq!(delay, Duration::from_secs(5));
        // The cap still wins over an absurd Retry-After.
        let delay = policy.backoff(0, Some(Duration::from_secs(600)));
        assert_eq!(delay, Duration::from_millis(30_000));
    }

    #[test]
    fn test_retry_after_below_backoff_is_ignored() {
        let policy = RetryPolicy::default();
        let delay = policy.backoff(3, Some(Duration::from_millis(100)));
        assert_eq!(delay, Duration::from_millis(4000));
    }
}
