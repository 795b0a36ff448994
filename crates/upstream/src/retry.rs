//! Capped exponential back-off with jitter.

use rand::Rng;
use std::time::Duration;

/// Retry schedule for transient upstream failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// The delay before attempt `attempt` (1-based; attempt 1 has no
    /// delay). Doubles per attempt, capped, with up to 25% random jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = attempt.saturating_sub(2).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay);
        let jitter = backoff.mul_f64(rand::thread_rng().gen_range(0.0..0.25));
        backoff + jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
        };
        assert_eq!(policy.delay(1), Duration::ZERO);
        let second = policy.delay(2);
        assert!(second >= Duration::from_millis(100));
        assert!(second < Duration::from_millis(125 + 1));
        let fifth = policy.delay(5);
        // Capped at max_delay plus jitter.
        assert!(fifth <= Duration::from_millis(500));
    }
}
