//! Exponential backoff for transient dispatch failures.

use std::time::Duration;

use rand::Rng;

/// Backoff policy for re-dispatching failed calls.
///
/// Delays grow as `initial × factor^attempt`, capped at the maximum, with
/// optional jitter (0.5×–1.5×) to avoid thundering herds. `max_attempts`
/// includes the first dispatch.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total dispatch attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, milliseconds.
    pub initial_interval_ms: u64,
    /// Multiplier applied per retry.
    pub backoff_factor: f64,
    /// Cap on any single delay, milliseconds.
    pub max_interval_ms: u64,
    /// Randomize delays.
    pub jitter: bool,
}

impl RetryPolicy {
    /// Create a policy with the given attempt cap.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_interval_ms: 500,
            backoff_factor: 2.0,
            max_interval_ms: 30_000,
            jitter: true,
        }
    }

    /// Set the initial retry delay.
    #[must_use]
    pub fn with_initial_interval_ms(mut self, ms: u64) -> Self {
        self.initial_interval_ms = ms;
        self
    }

    /// Set the backoff factor.
    #[must_use]
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Set the delay cap.
    #[must_use]
    pub fn with_max_interval_ms(mut self, ms: u64) -> Self {
        self.max_interval_ms = ms;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether another attempt is allowed after `attempts_made` attempts.
    #[must_use]
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// The delay before retry number `attempt` (0-based retry index).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_interval_ms as f64 * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_interval_ms as f64);
        let final_ms = if self.jitter {
            let factor = rand::thread_rng().gen_range(0.5..=1.5);
            capped * factor
        } else {
            capped
        };
        Duration::from_millis(final_ms as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth() {
        let policy = RetryPolicy::new(5)
            .with_initial_interval_ms(100)
            .with_jitter(false);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn test_cap() {
        let policy = RetryPolicy::new(10)
            .with_initial_interval_ms(10_000)
            .with_max_interval_ms(15_000)
            .with_jitter(false);
        assert_eq!(policy.delay_for(5), Duration::from_millis(15_000));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = RetryPolicy::new(5)
            .with_initial_interval_ms(1000)
            .with_jitter(true);
        for _ in 0..20 {
            let delay = policy.delay_for(1).as_millis() as u64;
            assert!((1000..=3000).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::new(3);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }
}
