//! Retry policy types and configuration.

use std::time::Duration;

use super::error::ConfigError;
use super::jitter::{self, RandomSource};

/// A retry policy describing how to back off between attempts.
///
/// Policies are pure data - they describe retry behavior but don't execute it.
/// A [`RetryManager`](crate::RetryManager) validates the policy once at
/// construction and keeps its own frozen copy.
///
/// # Examples
///
/// ```rust
/// use breakwater::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential(Duration::from_millis(100))
///     .with_max_retries(5)
///     .with_max_delay(Duration::from_secs(2));
///
/// assert_eq!(policy.max_retries(), 5);
/// assert!(policy.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Option<Duration>,
    multiplier: f64,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Some(Duration::from_secs(30)),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with exponentially increasing delay.
    ///
    /// Delay = base * multiplier^attempt, with a default multiplier of 2.0,
    /// three retries, no delay cap and jitter disabled.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use breakwater::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::exponential(Duration::from_millis(100));
    ///
    /// // Delay doubles: 100ms, 200ms, 400ms, ...
    /// assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
    /// assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
    /// assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    /// ```
    pub fn exponential(base: Duration) -> Self {
        Self {
            max_retries: 3,
            base_delay: base,
            max_delay: None,
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Set the maximum number of retry attempts.
    ///
    /// This does not include the initial attempt. `with_max_retries(3)`
    /// means up to 4 total invocations of the operation.
    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the maximum delay cap.
    ///
    /// A zero duration removes the cap.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use breakwater::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::exponential(Duration::from_millis(100))
    ///     .with_max_delay(Duration::from_millis(500));
    ///
    /// assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    /// assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
    /// assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(500));
    /// ```
    pub fn with_max_delay(mut self, d: Duration) -> Self {
        self.max_delay = if d.is_zero() { None } else { Some(d) };
        self
    }

    /// Set the growth factor applied per attempt. Must be greater than 1.0.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enable or disable ±25% jitter on every computed delay.
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Get the maximum number of retries.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Get the delay before the first retry.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Get the maximum delay cap, if any.
    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// Get the per-attempt growth factor.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Whether jitter is applied to delays.
    pub fn jitter(&self) -> bool {
        self.jitter
    }

    /// Check the policy invariants.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use breakwater::{ConfigError, RetryPolicy};
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::exponential(Duration::from_millis(100)).with_multiplier(1.0);
    /// assert!(matches!(policy.validate(), Err(ConfigError::InvalidMultiplier(_))));
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_delay.is_zero() {
            return Err(ConfigError::ZeroBaseDelay);
        }
        if !self.multiplier.is_finite() || self.multiplier <= 1.0 {
            return Err(ConfigError::InvalidMultiplier(self.multiplier));
        }
        if let Some(max) = self.max_delay {
            if max < self.base_delay {
                return Err(ConfigError::MaxDelayBelowBase {
                    base: self.base_delay,
                    max,
                });
            }
        }
        Ok(())
    }

    /// Calculate the unjittered delay before retry number `attempt` (0-indexed).
    ///
    /// The result is `base * multiplier^attempt`, clamped to the delay cap.
    /// Large attempts saturate at the cap (or at the largest representable
    /// delay when uncapped) instead of overflowing.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let cap = self.max_delay.unwrap_or(Duration::MAX);
        let nanos = self.base_delay.as_nanos() as f64 * self.multiplier.powf(f64::from(attempt));

        if !nanos.is_finite() || nanos >= cap.as_nanos() as f64 {
            return cap;
        }
        if nanos < u64::MAX as f64 {
            return Duration::from_nanos(nanos.round() as u64).min(cap);
        }
        Duration::try_from_secs_f64(nanos / 1e9).map_or(cap, |d| d.min(cap))
    }

    /// Calculate the delay before retry number `attempt`, applying jitter
    /// from `rng` when the policy enables it.
    pub fn delay(&self, attempt: u32, rng: &dyn RandomSource) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if self.jitter {
            jitter::apply(delay, rng)
        } else {
            delay
        }
    }
}

/// Plain, serialisable mirror of [`RetryPolicy`].
///
/// Durations are in milliseconds and `max_delay_ms == 0` means uncapped.
/// Conversion into a policy validates it.
///
/// ```rust
/// use breakwater::{RetryConfig, RetryPolicy};
///
/// let config = RetryConfig { max_retries: 5, base_delay_ms: 50, ..RetryConfig::default() };
/// let policy = RetryPolicy::try_from(config).unwrap();
/// assert_eq!(policy.max_retries(), 5);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Delay cap, 0 for none.
    pub max_delay_ms: u64,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Apply ±25% jitter.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryPolicy::default().into()
    }
}

impl From<RetryPolicy> for RetryConfig {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_retries: policy.max_retries,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.map_or(0, |d| d.as_millis() as u64),
            multiplier: policy.multiplier,
            jitter: policy.jitter,
        }
    }
}

impl TryFrom<RetryConfig> for RetryPolicy {
    type Error = ConfigError;

    fn try_from(config: RetryConfig) -> Result<Self, Self::Error> {
        let policy = RetryPolicy::exponential(Duration::from_millis(config.base_delay_ms))
            .with_max_retries(config.max_retries)
            .with_max_delay(Duration::from_millis(config.max_delay_ms))
            .with_multiplier(config.multiplier)
            .with_jitter(config.jitter);
        policy.validate()?;
        Ok(policy)
    }
}
