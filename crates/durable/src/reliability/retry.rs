//! Retry policy for caller-driven retry loops
//!
//! Durable steps never retry on their own. Bootstrap code such as the
//! startup resync owns its loop and asks a [`RetryPolicy`] how long to wait.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// The n-th retry waits `interval * n`
    #[default]
    Linear,

    /// Every retry waits `interval`
    Fixed,
}

/// Bounded, deterministic backoff
///
/// # Example
///
/// ```
/// use soma_durable::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::linear(Duration::from_millis(500), 10);
///
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(500));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(1000));
/// assert!(!policy.has_attempts_remaining(10));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,

    #[serde(with = "duration_millis")]
    pub interval: Duration,

    /// Upper bound for any single delay
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    #[serde(default)]
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(Duration::from_millis(500), 10)
    }
}

impl RetryPolicy {
    /// The n-th retry waits `base * n`, capped at one hour
    pub fn linear(base: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            interval: base,
            max_interval: Duration::from_secs(3600),
            strategy: BackoffStrategy::Linear,
        }
    }

    /// Every retry waits `interval`
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            interval,
            max_interval: interval,
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Delay before `attempt` (1-based); the first attempt starts immediately
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let retry = attempt.saturating_sub(1);
        if retry == 0 {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            BackoffStrategy::Linear => self.interval.saturating_mul(retry),
            BackoffStrategy::Fixed => self.interval,
        };
        delay.min(self.max_interval)
    }

    /// Whether another attempt may follow `current_attempt`
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }
}

/// Durations travel as integer milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
