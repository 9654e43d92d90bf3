//! Circuit breaker around a retry manager.
//!
//! # States
//! - Closed: calls go through the inner [`RetryManager`]
//! - Open: calls fail fast with [`RetryError::CircuitOpen`]
//!
//! # State Transitions
//! ```text
//! Closed → Open:   failure_count >= threshold
//! Open   → Closed: now - last_failure_at >= reset_timeout
//! ```
//!
//! The reset is purely time based. The failure count is only cleared by a
//! successful call, so the first failure after the reset timeout opens the
//! circuit again straight away.

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::retry::{ConfigError, MessageClassifier, RetryError, RetryManager, RetryPolicy};
use crate::Classifier;

/// Whether the breaker admits calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failure threshold reached; calls fail fast.
    Open,
}

/// Plain, serialisable breaker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CircuitBreakerConfig {
    /// Failures that open the circuit.
    pub threshold: u64,
    /// How long the circuit stays open after the latest failure.
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            reset_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Default)]
struct FailureState {
    failure_count: u64,
    last_failure_at: Option<Instant>,
}

/// Consistent view of the breaker's failure record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    /// Failed calls since the last success.
    pub failure_count: u64,
    /// When the most recent failure was recorded.
    pub last_failure_at: Option<Instant>,
    /// State derived from the two fields above at snapshot time.
    pub state: CircuitState,
}

/// Stops calling a failing dependency once failures pile up.
///
/// # Examples
///
/// ```rust
/// use breakwater::{CircuitBreaker, RetryPolicy};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let breaker = CircuitBreaker::new(
///     RetryPolicy::exponential(Duration::from_millis(1)).with_max_retries(0),
///     2,
///     Duration::from_secs(30),
/// )
/// .unwrap();
///
/// for _ in 0..2 {
///     let _ = breaker.execute(|| async { Err::<(), _>("connection refused") }).await;
/// }
///
/// let result = breaker.execute(|| async { Ok::<_, String>(()) }).await;
/// assert!(result.unwrap_err().is_circuit_open());
/// # });
/// ```
pub struct CircuitBreaker<C = MessageClassifier> {
    manager: RetryManager<C>,
    threshold: u64,
    reset_timeout: Duration,
    state: Mutex<FailureState>,
}

impl<C: fmt::Debug> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("manager", &self.manager)
            .field("threshold", &self.threshold)
            .field("reset_timeout", &self.reset_timeout)
            .field("state", &self.state)
            .finish()
    }
}

impl CircuitBreaker<MessageClassifier> {
    /// Build a breaker around a default [`RetryManager`] for `policy`.
    pub fn new(
        policy: RetryPolicy,
        threshold: u64,
        reset_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        Self::with_manager(RetryManager::new(policy)?, threshold, reset_timeout)
    }
}

impl<C> CircuitBreaker<C> {
    /// Wrap an existing manager. The breaker reads time from the manager's clock.
    pub fn with_manager(
        manager: RetryManager<C>,
        threshold: u64,
        reset_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        if threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if reset_timeout.is_zero() {
            return Err(ConfigError::ZeroResetTimeout);
        }
        Ok(Self {
            manager,
            threshold,
            reset_timeout,
            state: Mutex::new(FailureState::default()),
        })
    }

    /// Wrap an existing manager using plain settings.
    pub fn from_config(
        manager: RetryManager<C>,
        config: CircuitBreakerConfig,
    ) -> Result<Self, ConfigError> {
        Self::with_manager(
            manager,
            config.threshold,
            Duration::from_millis(config.reset_timeout_ms),
        )
    }

    fn failures(&self) -> MutexGuard<'_, FailureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Time left until an open circuit closes, or `None` when closed.
    fn open_for(&self, state: &FailureState, now: Instant) -> Option<Duration> {
        if state.failure_count < self.threshold {
            return None;
        }
        let since = now.saturating_duration_since(state.last_failure_at?);
        self.reset_timeout.checked_sub(since).filter(|d| !d.is_zero())
    }

    /// The wrapped manager, e.g. for its statistics.
    pub fn manager(&self) -> &RetryManager<C> {
        &self.manager
    }

    /// Failures needed to open the circuit.
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// How long the circuit stays open after the latest failure.
    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    /// Read the failure record and the state it implies in one step.
    pub fn snapshot(&self) -> CircuitSnapshot {
        let now = self.manager.clock().now();
        let state = self.failures();
        CircuitSnapshot {
            failure_count: state.failure_count,
            last_failure_at: state.last_failure_at,
            state: if self.open_for(&state, now).is_some() {
                CircuitState::Open
            } else {
                CircuitState::Closed
            },
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.snapshot().state
    }

    /// Returns true while calls are being short-circuited.
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Failed calls since the last success.
    pub fn failure_count(&self) -> u64 {
        self.failures().failure_count
    }

    /// Forget all recorded failures and close the circuit.
    pub fn reset(&self) {
        *self.failures() = FailureState::default();
        tracing::info!("circuit breaker manually reset");
    }

    /// Run `op` through the inner manager unless the circuit is open.
    ///
    /// A success clears the failure count; any error increments it and
    /// stamps the failure time. While open, neither the manager nor `op` is
    /// touched and no statistics are recorded.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, RetryError<E>>
    where
        C: Classifier<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.guard(self.manager.execute(op)).await
    }

    /// [`execute`](Self::execute) with cancellation, see
    /// [`RetryManager::execute_with_cancel`].
    pub async fn execute_with_cancel<T, E, F, Fut>(
        &self,
        token: &CancellationToken,
        op: F,
    ) -> Result<T, RetryError<E>>
    where
        C: Classifier<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.guard(self.manager.execute_with_cancel(token, op)).await
    }

    async fn guard<T, E, Fut>(&self, call: Fut) -> Result<T, RetryError<E>>
    where
        Fut: Future<Output = Result<T, RetryError<E>>>,
    {
        {
            let now = self.manager.clock().now();
            let state = self.failures();
            if let Some(retry_after) = self.open_for(&state, now) {
                tracing::debug!(
                    failures = state.failure_count,
                    ?retry_after,
                    "circuit open, short-circuiting call"
                );
                return Err(RetryError::CircuitOpen {
                    failures: state.failure_count,
                    retry_after,
                });
            }
        }

        let result = call.await;
        self.record(result.is_ok());
        result
    }

    fn record(&self, success: bool) {
        let now = self.manager.clock().now();
        let mut state = self.failures();

        if success {
            if state.failure_count >= self.threshold {
                tracing::info!(
                    previous_failures = state.failure_count,
                    "circuit closed after successful call"
                );
            }
            state.failure_count = 0;
            return;
        }

        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure_at = Some(now);
        if state.failure_count >= self.threshold {
            tracing::warn!(
                failures = state.failure_count,
                threshold = self.threshold,
                reset_timeout = ?self.reset_timeout,
                "circuit opened"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;
    use crate::{assert_circuit_open, StatisticsSnapshot};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn breaker(threshold: u64, reset_timeout: Duration) -> (CircuitBreaker, ManualClock) {
        let clock = ManualClock::new();
        let manager = RetryManager::builder(
            RetryPolicy::exponential(Duration::from_millis(10)).with_max_retries(1),
        )
        .with_clock(clock.clone())
        .build()
        .unwrap();
        (
            CircuitBreaker::with_manager(manager, threshold, reset_timeout).unwrap(),
            clock,
        )
    }

    #[tokio::test]
    async fn test_trips_after_threshold_and_recovers() {
        let (breaker, clock) = breaker(2, Duration::from_secs(5));

        for _ in 0..2 {
            let result = breaker
                .execute(|| async { Err::<(), _>("connection refused") })
                .await;
            assert!(result.unwrap_err().is_exhausted());
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.failure_count(), 2);

        let attempts_before = breaker.manager().statistics();
        let calls = Arc::new(AtomicU32::new(0));
        let result = breaker
            .execute({
                let calls = calls.clone();
                move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, String>(())
                    }
                }
            })
            .await;
        assert_circuit_open!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.manager().statistics(), attempts_before);

        clock.advance(Duration::from_secs(5));
        assert_eq!(breaker.state(), CircuitState::Closed);

        let result = breaker.execute(|| async { Ok::<_, String>(7) }).await;
        assert_eq!(result, Ok(7));
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_retry_after_counts_down() {
        let (breaker, clock) = breaker(1, Duration::from_secs(10));
        let _ = breaker.execute(|| async { Err::<(), _>("forbidden") }).await;

        clock.advance(Duration::from_secs(4));
        match breaker.execute(|| async { Ok::<_, String>(()) }).await {
            Err(RetryError::CircuitOpen {
                failures,
                retry_after,
            }) => {
                assert_eq!(failures, 1);
                assert_eq!(retry_after, Duration::from_secs(6));
            }
            other => panic!("Expected CircuitOpen, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_after_reset_reopens_immediately() {
        let (breaker, clock) = breaker(2, Duration::from_secs(1));
        for _ in 0..2 {
            let _ = breaker.execute(|| async { Err::<(), _>("timeout") }).await;
        }
        clock.advance(Duration::from_secs(2));
        assert!(!breaker.is_open());

        let _ = breaker.execute(|| async { Err::<(), _>("timeout") }).await;
        assert!(breaker.is_open());
        assert_eq!(breaker.failure_count(), 3);
    }

    #[tokio::test]
    async fn test_success_resets_count_below_threshold() {
        let (breaker, _clock) = breaker(3, Duration::from_secs(1));
        let _ = breaker.execute(|| async { Err::<(), _>("invalid parameter") }).await;
        let _ = breaker.execute(|| async { Err::<(), _>("invalid parameter") }).await;
        assert_eq!(breaker.failure_count(), 2);

        let _ = breaker.execute(|| async { Ok::<_, String>(()) }).await;
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_snapshot_is_consistent() {
        let (breaker, clock) = breaker(1, Duration::from_secs(3));
        let start = crate::Clock::now(&clock);
        let _ = breaker.execute(|| async { Err::<(), _>("not found") }).await;

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.failure_count, 1);
        assert_eq!(snapshot.last_failure_at, Some(start));
        assert_eq!(snapshot.state, CircuitState::Open);

        breaker.reset();
        assert_eq!(
            breaker.snapshot(),
            CircuitSnapshot {
                failure_count: 0,
                last_failure_at: None,
                state: CircuitState::Closed,
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_failures_are_all_counted() {
        let (breaker, _clock) = breaker(1_000, Duration::from_secs(1));
        let breaker = Arc::new(breaker);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let breaker = breaker.clone();
                tokio::spawn(async move {
                    breaker
                        .execute(|| async { Err::<(), _>("permission denied") })
                        .await
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().unwrap_err().is_terminal());
        }

        assert_eq!(breaker.failure_count(), 50);
        let stats: StatisticsSnapshot = breaker.manager().statistics();
        assert_eq!(stats.total_failures, 50);
    }

    #[tokio::test]
    async fn test_cancelled_call_counts_as_failure() {
        let (breaker, _clock) = breaker(1, Duration::from_secs(1));
        let token = CancellationToken::new();
        token.cancel();

        let result = breaker
            .execute_with_cancel(&token, || async { Ok::<_, String>(()) })
            .await;
        assert!(result.unwrap_err().is_cancelled());
        assert!(breaker.is_open());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let policy = RetryPolicy::exponential(Duration::from_millis(10));
        assert_eq!(
            CircuitBreaker::new(policy.clone(), 0, Duration::from_secs(1)).unwrap_err(),
            ConfigError::ZeroThreshold
        );
        assert_eq!(
            CircuitBreaker::new(policy.clone(), 1, Duration::ZERO).unwrap_err(),
            ConfigError::ZeroResetTimeout
        );
        assert_eq!(
            CircuitBreaker::new(policy.with_multiplier(1.0), 1, Duration::from_secs(1))
                .unwrap_err(),
            ConfigError::InvalidMultiplier(1.0)
        );
    }

    #[test]
    fn test_from_config() {
        let manager = RetryManager::new(RetryPolicy::default()).unwrap();
        let breaker = CircuitBreaker::from_config(manager, CircuitBreakerConfig::default()).unwrap();
        assert_eq!(breaker.threshold(), 5);
        assert_eq!(breaker.reset_timeout(), Duration::from_secs(30));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_logs_transitions() {
        let (breaker, clock) = breaker(1, Duration::from_secs(1));
        let _ = breaker.execute(|| async { Err::<(), _>("forbidden") }).await;
        assert!(logs_contain("circuit opened"));

        clock.advance(Duration::from_secs(1));
        let _ = breaker.execute(|| async { Ok::<_, String>(()) }).await;
        assert!(logs_contain("circuit closed"));
    }
}
