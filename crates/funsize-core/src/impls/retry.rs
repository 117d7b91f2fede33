//! Retry policy: decides how often and how long to back off.

use std::time::Duration;

use crate::config::RetryConfig;

/// Upper bound for a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Bounded exponential backoff for upstream calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Delay after the first failure.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay before the next attempt, given how many attempts already failed
    /// (1-indexed): `base_delay * multiplier^(attempts - 1)`.
    ///
    /// With base_delay=1s, multiplier=2.0: 1s, 2s, 4s, 8s, ...
    /// Capped at [`MAX_BACKOFF`]; values that are not representable
    /// (negative, NaN, overflow) also fall back to the cap.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = i32::try_from(attempts.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(delay_secs).map_or(MAX_BACKOFF, |d| d.min(MAX_BACKOFF))
    }

    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_follows_config_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.multiplier, 2.0);
    }

    #[test]
    fn exponential_backoff_increases() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
        };

        assert_eq!(policy.next_delay(1), Duration::from_secs(2));
        assert_eq!(policy.next_delay(2), Duration::from_secs(4));
        assert_eq!(policy.next_delay(3), Duration::from_secs(8));
        // attempts=0 is treated like the first failure
        assert_eq!(policy.next_delay(0), Duration::from_secs(2));
    }

    #[test]
    fn long_retry_runs_stop_growing_at_the_cap() {
        let policy = RetryPolicy {
            max_attempts: 80,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.next_delay(9), Duration::from_secs(256));
        assert_eq!(policy.next_delay(10), MAX_BACKOFF);
        assert_eq!(policy.next_delay(70), MAX_BACKOFF);
        assert_eq!(policy.next_delay(u32::MAX), MAX_BACKOFF);
    }

    #[test]
    fn unrepresentable_delays_fall_back_to_the_cap() {
        let negative = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: -2.0,
        };
        assert_eq!(negative.next_delay(2), MAX_BACKOFF);

        let nan = RetryPolicy {
            multiplier: f64::NAN,
            ..negative
        };
        assert_eq!(nan.next_delay(2), MAX_BACKOFF);
    }

    #[test]
    fn attempts_are_bounded() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::no_retry()
        };
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::no_retry().should_retry(1));
    }
}
