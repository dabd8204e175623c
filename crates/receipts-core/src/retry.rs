use std::time::Duration;

/// Closed-form exponential backoff: `base * 2^(n-1)` after the n-th failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: Duration,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt follows a failure of attempt number `attempt` (1-based).
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after attempt number `attempt` (1-based) failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base.checked_mul(1u32 << exp).unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), 3)
    }
}
