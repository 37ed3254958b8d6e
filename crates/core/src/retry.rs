//! Linear backoff schedule for transient failures.
//!
//! Attempt `n` (1-based) of a retry waits `n * base_delay`, so the
//! default policy sleeps 2s, 4s, then 6s before giving up.

use std::time::Duration;

/// Tunable retry parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay unit multiplied by the retry number.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based), or `None` once the
    /// budget is spent.
    pub fn delay_for(&self, retry: u32) -> Option<Duration> {
        if retry == 0 || retry > self.max_retries {
            return None;
        }
        Some(self.base_delay.saturating_mul(retry))
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_is_2_4_6() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(1), Some(Duration::from_secs(2)));
        assert_eq!(p.delay_for(2), Some(Duration::from_secs(4)));
        assert_eq!(p.delay_for(3), Some(Duration::from_secs(6)));
        assert_eq!(p.delay_for(4), None);
        assert_eq!(p.max_attempts(), 4);
    }

    #[test]
    fn retry_zero_has_no_delay() {
        assert_eq!(RetryPolicy::default().delay_for(0), None);
    }

    #[test]
    fn none_policy_never_retries() {
        let p = RetryPolicy::none();
        assert_eq!(p.delay_for(1), None);
        assert_eq!(p.max_attempts(), 1);
    }
}
