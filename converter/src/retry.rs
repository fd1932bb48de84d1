use std::time::Duration;

/// How often and how patiently a chunk is retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per chunk, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: *self,
            attempt: 0,
        }
    }
}

/// Retry state for one chunk.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    attempt: u32,
}

impl Backoff {
    /// Attempts made so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record a failed attempt. Returns how long to wait before the next
    /// one, or `None` once the attempts are used up.
    ///
    /// A service-provided `retry_after` is honoured when it is longer than
    /// the computed delay.
    pub fn next_delay(&mut self, retry_after: Option<Duration>) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt >= self.policy.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(self.attempt - 1);
        let delay = self
            .policy
            .base_delay
            .saturating_mul(factor)
            .min(self.policy.max_delay);
        Some(retry_after.map_or(delay, |after| after.max(delay)))
    }
}
