//! Retry backoff for the REST executor
//!
//! `delay = 2 + jitter * (1 + attempt^attempt)` seconds, with
//! `jitter = 1 + uniform_int[1, 10] / 100`.
//!
//! Growth is super-exponential on purpose: attempt 1 waits ~4s, attempt 2
//! ~7s, attempt 3 ~30s. Repeated failures are treated as a sustained outage.

use rand::Rng;
use std::time::Duration;

/// Fixed part of every delay, seconds
pub const BASE_DELAY_SECS: f64 = 2.0;

/// Payloads not worth surfacing on the first retry
pub const SUPPRESSED_MESSAGES: [&str; 1] = ["Forbidden"];

/// Upper bound so absurd attempt counts cannot overflow a Duration
const MAX_DELAY_SECS: f64 = 24.0 * 60.0 * 60.0;

/// Retry bound and backoff shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Another attempt is allowed after `attempt` failed
    #[inline]
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Delay before retry number `attempt` (1-based), with random jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter_pct = rand::thread_rng().gen_range(1..=10);
        backoff_delay(attempt, jitter_pct)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 4 }
    }
}

/// Deterministic core of the backoff, `jitter_pct` in `1..=10`
pub fn backoff_delay(attempt: u32, jitter_pct: u32) -> Duration {
    let jitter = 1.0 + f64::from(jitter_pct) / 100.0;
    let n = f64::from(attempt);
    let scale = 1.0 + n.powf(n);
    let secs = (BASE_DELAY_SECS + jitter * scale).min(MAX_DELAY_SECS);
    Duration::from_secs_f64(secs)
}

/// First-retry noise filter: routine payloads (or none at all) stay quiet on
/// retry 1 and are surfaced from retry 2 onward
pub fn is_suppressed(attempt: u32, message: Option<&str>) -> bool {
    if attempt > 1 {
        return false;
    }
    match message {
        None => true,
        Some(msg) => SUPPRESSED_MESSAGES.contains(&msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_secs(delay: Duration, expected: f64) {
        assert!(
            (delay.as_secs_f64() - expected).abs() < 1e-6,
            "{:?} != {}s",
            delay,
            expected
        );
    }

    #[test]
    fn test_known_delays() {
        // jitter 1.01: 2 + 1.01 * (1 + 1)
        assert_secs(backoff_delay(1, 1), 4.02);
        // jitter 1.10: 2 + 1.1 * (1 + 4)
        assert_secs(backoff_delay(2, 10), 7.5);
        // jitter 1.05: 2 + 1.05 * (1 + 27)
        assert_secs(backoff_delay(3, 5), 31.4);
    }

    #[test]
    fn test_third_attempt_exceeds_28_seconds() {
        for pct in 1..=10 {
            assert!(backoff_delay(3, pct) > Duration::from_secs(28));
        }
    }

    #[test]
    fn test_random_delay_within_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let delay = policy.delay(2);
            assert!(delay >= backoff_delay(2, 1));
            assert!(delay <= backoff_delay(2, 10));
        }
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::new(2);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
        assert!(!RetryPolicy::new(0).should_retry(0));
    }

    #[test]
    fn test_huge_attempt_is_capped() {
        assert_secs(backoff_delay(50, 10), MAX_DELAY_SECS);
    }

    #[test]
    fn test_suppression() {
        assert!(is_suppressed(1, Some("Forbidden")));
        assert!(is_suppressed(1, None));
        assert!(!is_suppressed(1, Some("Bad Gateway")));
        assert!(!is_suppressed(2, Some("Forbidden")));
        assert!(!is_suppressed(2, None));
    }

    proptest! {
        #[test]
        fn prop_delay_non_decreasing(attempt in 1u32..12, pct in 1u32..=10) {
            // Worst-case jitter on the earlier attempt still never beats the
            // best-case jitter on the next one.
            prop_assert!(backoff_delay(attempt, 10) <= backoff_delay(attempt + 1, 1));
            prop_assert!(backoff_delay(attempt, pct) <= backoff_delay(attempt + 1, pct));
        }
    }
}
