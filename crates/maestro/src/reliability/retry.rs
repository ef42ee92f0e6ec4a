//! Retry policy implementation

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::serde_util::duration_millis;
use crate::step::StepError;

/// Retry descriptor attached to a step
///
/// A step with a retry policy runs at most `max_attempts` times. The wait
/// before each retry grows by `multiplier`, starting at `initial_interval`
/// and never exceeding `max_interval`.
///
/// # Example
///
/// ```
/// use maestro::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential()
///     .with_max_attempts(5)
///     .with_initial_interval(Duration::from_millis(200))
///     .with_max_interval(Duration::from_secs(5));
///
/// assert_eq!(policy.backoff(0), Duration::from_millis(200));
/// assert_eq!(policy.backoff(1), Duration::from_millis(400));
/// assert_eq!(policy.backoff(2), Duration::from_millis(800));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including initial)
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(with = "duration_millis")]
    pub initial_interval: Duration,

    /// Maximum delay between retries
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Backoff multiplier (e.g., 2.0 for exponential)
    pub multiplier: f64,

    /// Jitter factor (0.0-1.0) to add randomness
    ///
    /// A value of 0.1 means ±10% randomness.
    #[serde(default)]
    pub jitter: f64,

    /// Error types that should NOT be retried
    #[serde(default)]
    pub non_retryable_errors: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    /// Create a policy from the four retry descriptor values
    pub fn new(
        max_attempts: u32,
        initial_interval: Duration,
        max_interval: Duration,
        multiplier: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_interval,
            max_interval,
            multiplier,
            jitter: 0.0,
            non_retryable_errors: vec![],
        }
    }

    /// Create an exponential backoff retry policy
    ///
    /// - 3 max attempts
    /// - 1 second initial interval
    /// - 30 second max interval
    /// - 2x multiplier
    pub fn exponential() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(30), 2.0)
    }

    /// Create a policy that never retries
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, 1.0)
    }

    /// Create a policy with fixed intervals (no backoff)
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self::new(max_attempts, interval, interval, 1.0)
    }

    /// Set the maximum number of attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the initial retry interval
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Set the maximum retry interval
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set the backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter factor (0.0-1.0)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Add a non-retryable error type
    pub fn with_non_retryable_error(mut self, error_type: impl Into<String>) -> Self {
        self.non_retryable_errors.push(error_type.into());
        self
    }

    /// Backoff before retry number `retry_index` (0 for the first retry)
    ///
    /// `initial_interval * multiplier^retry_index`, capped at `max_interval`,
    /// then spread by the jitter factor.
    pub fn backoff(&self, retry_index: u32) -> Duration {
        let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);
        let secs = (self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent))
            .min(self.max_interval.as_secs_f64())
            .max(0.0);

        if self.jitter <= 0.0 || secs <= 0.0 {
            return self.clamp_secs(secs);
        }

        let spread = secs * self.jitter;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        self.clamp_secs((secs + offset).max(0.0))
    }

    // f64 rounding can push a capped value past Duration::MAX
    fn clamp_secs(&self, secs: f64) -> Duration {
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }

    /// Check if a step error should be retried
    pub fn should_retry(&self, error: &StepError) -> bool {
        if !error.retryable {
            return false;
        }
        match error.error_type.as_deref() {
            Some(error_type) => !self.non_retryable_errors.iter().any(|e| e == error_type),
            None => true,
        }
    }

    /// Check if there are remaining attempts
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }
}
