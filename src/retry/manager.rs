//! The retry loop.

use std::any::Any;
use std::fmt::{self, Display};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use super::classify::{Classifier, MessageClassifier};
use super::error::{ConfigError, RetryError, RetryExhausted};
use super::jitter::{RandomSource, StdRandom};
use super::policy::RetryPolicy;
use super::stats::{RetryStatistics, StatisticsSnapshot};
use crate::clock::{Clock, TokioClock};

type RetryHook = Arc<dyn Fn(&RetryEvent<'_>) + Send + Sync>;

/// Information about a failed attempt, passed to the retry hook.
pub struct RetryEvent<'a> {
    /// Which attempt just failed (1-indexed).
    pub attempt: u32,
    /// The error from the failed attempt.
    pub error: &'a dyn Display,
    /// Delay before the next attempt.
    pub next_delay: Duration,
    /// Total elapsed time since the first attempt.
    pub elapsed: Duration,
}

impl fmt::Debug for RetryEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryEvent")
            .field("attempt", &self.attempt)
            .field("error", &self.error.to_string())
            .field("next_delay", &self.next_delay)
            .field("elapsed", &self.elapsed)
            .finish()
    }
}

/// Runs fallible operations with exponential backoff.
///
/// A manager owns a validated [`RetryPolicy`], an error [`Classifier`], a
/// [`Clock`] for waits, a [`RandomSource`] for jitter and the
/// [`RetryStatistics`] its calls accumulate. It can be shared between tasks;
/// each call runs its own attempt loop.
///
/// # Examples
///
/// ```rust
/// use breakwater::{RetryManager, RetryPolicy};
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let manager = RetryManager::new(
///     RetryPolicy::exponential(Duration::from_millis(1)).with_max_retries(3),
/// )
/// .unwrap();
///
/// let calls = &AtomicU32::new(0);
/// let value = manager
///     .execute(|| async move {
///         if calls.fetch_add(1, Ordering::SeqCst) < 2 {
///             Err("connection refused")
///         } else {
///             Ok(42)
///         }
///     })
///     .await
///     .unwrap();
///
/// assert_eq!(value, 42);
/// assert_eq!(calls.load(Ordering::SeqCst), 3);
/// # });
/// ```
pub struct RetryManager<C = MessageClassifier> {
    policy: RetryPolicy,
    classifier: C,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn RandomSource>,
    on_retry: Option<RetryHook>,
    stats: RetryStatistics,
}

impl<C: fmt::Debug> fmt::Debug for RetryManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryManager")
            .field("policy", &self.policy)
            .field("classifier", &self.classifier)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RetryManager`] collaborators.
pub struct RetryManagerBuilder<C = MessageClassifier> {
    policy: RetryPolicy,
    classifier: C,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn RandomSource>,
    on_retry: Option<RetryHook>,
}

impl<C: fmt::Debug> fmt::Debug for RetryManagerBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryManagerBuilder")
            .field("policy", &self.policy)
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}

impl RetryManagerBuilder<MessageClassifier> {
    fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            classifier: MessageClassifier,
            clock: Arc::new(TokioClock),
            rng: Arc::new(StdRandom::from_entropy()),
            on_retry: None,
        }
    }
}

impl<C> RetryManagerBuilder<C> {
    /// Replace the error classifier.
    pub fn with_classifier<C2>(self, classifier: C2) -> RetryManagerBuilder<C2> {
        RetryManagerBuilder {
            policy: self.policy,
            classifier,
            clock: self.clock,
            rng: self.rng,
            on_retry: self.on_retry,
        }
    }

    /// Replace the clock used for waits and elapsed time.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Replace the randomness used for jitter.
    pub fn with_random(mut self, rng: impl RandomSource + 'static) -> Self {
        self.rng = Arc::new(rng);
        self
    }

    /// Call `hook` before every backoff wait.
    ///
    /// The hook runs on the retrying task and should not block; use it for
    /// logging or metrics.
    pub fn with_on_retry<H>(mut self, hook: H) -> Self
    where
        H: Fn(&RetryEvent<'_>) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Validate the policy and build the manager.
    pub fn build(self) -> Result<RetryManager<C>, ConfigError> {
        self.policy.validate()?;
        Ok(RetryManager {
            policy: self.policy,
            classifier: self.classifier,
            clock: self.clock,
            rng: self.rng,
            on_retry: self.on_retry,
            stats: RetryStatistics::new(),
        })
    }
}

impl RetryManager<MessageClassifier> {
    /// Build a manager with the default collaborators: message-based
    /// classification, tokio timers and entropy-seeded jitter.
    pub fn new(policy: RetryPolicy) -> Result<Self, ConfigError> {
        Self::builder(policy).build()
    }

    /// Start configuring a manager.
    pub fn builder(policy: RetryPolicy) -> RetryManagerBuilder<MessageClassifier> {
        RetryManagerBuilder::new(policy)
    }
}

/// What may stop a call early.
struct Interrupt<'a> {
    token: Option<&'a CancellationToken>,
    deadline: Option<Instant>,
}

impl Interrupt<'_> {
    fn is_signaled(&self, clock: &dyn Clock) -> bool {
        self.token.is_some_and(CancellationToken::is_cancelled)
            || self.deadline.is_some_and(|deadline| clock.now() >= deadline)
    }

    /// Wait out `duration`. Returns false if interrupted first.
    async fn wait(&self, clock: &dyn Clock, duration: Duration) -> bool {
        let (duration, reaches_deadline) = match self.deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(clock.now());
                if remaining <= duration {
                    (remaining, true)
                } else {
                    (duration, false)
                }
            }
            None => (duration, false),
        };

        let sleep = clock.sleep(duration);
        let completed = match self.token {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => false,
                    _ = sleep => true,
                }
            }
            None => {
                sleep.await;
                true
            }
        };

        completed && !reaches_deadline
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run one attempt, turning a panic into its message.
async fn invoke<T, E, F, Fut>(op: &mut F) -> Result<Result<T, E>, String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let future = std::panic::catch_unwind(AssertUnwindSafe(|| op())).map_err(panic_message)?;
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(panic_message)
}

impl<C> RetryManager<C> {
    /// The frozen policy this manager runs with.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Copy of the statistics accumulated so far.
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    /// Clear accumulated statistics.
    pub fn reset_statistics(&self) {
        self.stats.reset();
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Run `op` until it succeeds, fails terminally or exhausts the policy.
    ///
    /// `op` is called once per attempt and must build a fresh future each
    /// time. It is invoked at most `max_retries + 1` times.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, RetryError<E>>
    where
        C: Classifier<E>,
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(
            op,
            Interrupt {
                token: None,
                deadline: None,
            },
        )
        .await
    }

    /// Like [`execute`](Self::execute), but stops as soon as `token` is
    /// cancelled.
    ///
    /// Cancellation is checked before every attempt and interrupts the
    /// backoff wait. An attempt already running is not aborted; operations
    /// that should observe cancellation can capture a clone of the token.
    ///
    /// ```rust
    /// use breakwater::{RetryManager, RetryPolicy};
    /// use std::time::Duration;
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # tokio_test::block_on(async {
    /// let manager = RetryManager::new(RetryPolicy::exponential(Duration::from_millis(1))).unwrap();
    /// let token = CancellationToken::new();
    /// token.cancel();
    ///
    /// let result = manager
    ///     .execute_with_cancel(&token, || async { Ok::<_, String>(1) })
    ///     .await;
    /// assert!(result.unwrap_err().is_cancelled());
    /// # });
    /// ```
    pub async fn execute_with_cancel<T, E, F, Fut>(
        &self,
        token: &CancellationToken,
        op: F,
    ) -> Result<T, RetryError<E>>
    where
        C: Classifier<E>,
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(
            op,
            Interrupt {
                token: Some(token),
                deadline: None,
            },
        )
        .await
    }

    /// Like [`execute`](Self::execute), but treats reaching `deadline` on the
    /// manager's clock as cancellation.
    pub async fn execute_with_deadline<T, E, F, Fut>(
        &self,
        deadline: Instant,
        op: F,
    ) -> Result<T, RetryError<E>>
    where
        C: Classifier<E>,
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(
            op,
            Interrupt {
                token: None,
                deadline: Some(deadline),
            },
        )
        .await
    }

    async fn run<T, E, F, Fut>(&self, mut op: F, interrupt: Interrupt<'_>) -> Result<T, RetryError<E>>
    where
        C: Classifier<E>,
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let clock = self.clock.as_ref();
        let start = clock.now();
        let mut attempt = 0u32;

        loop {
            if interrupt.is_signaled(clock) {
                tracing::debug!(attempts = attempt, "retry cancelled before attempt");
                return Err(self.fail(RetryError::Cancelled { attempts: attempt }, attempt, start));
            }

            self.stats.record_attempt();
            let used = attempt + 1;

            let error = match invoke(&mut op).await {
                Ok(Ok(value)) => {
                    let elapsed = clock.now().saturating_duration_since(start);
                    self.stats.record_terminal(true, used, elapsed, None);
                    if attempt > 0 {
                        tracing::debug!(attempts = used, ?elapsed, "operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Ok(Err(error)) => error,
                Err(message) => {
                    tracing::warn!(attempt = used, panic = %message, "operation panicked");
                    return Err(self.fail(RetryError::Panicked { message }, used, start));
                }
            };

            if !self.classifier.is_retryable(&error) {
                tracing::warn!(attempt = used, error = %error, "terminal error, not retrying");
                return Err(self.fail(RetryError::Operation(error), used, start));
            }

            let elapsed = clock.now().saturating_duration_since(start);
            if attempt >= self.policy.max_retries() {
                tracing::warn!(attempts = used, ?elapsed, error = %error, "retries exhausted");
                return Err(self.fail(
                    RetryError::Exhausted(RetryExhausted::new(error, used, elapsed)),
                    used,
                    start,
                ));
            }

            let delay = self.policy.delay(attempt, self.rng.as_ref());
            tracing::debug!(
                attempt = used,
                ?delay,
                error = %error,
                "attempt failed, backing off"
            );
            if let Some(hook) = &self.on_retry {
                hook(&RetryEvent {
                    attempt: used,
                    error: &error,
                    next_delay: delay,
                    elapsed,
                });
            }

            if !interrupt.wait(clock, delay).await {
                tracing::debug!(attempts = used, "retry cancelled during backoff");
                return Err(self.fail(RetryError::Cancelled { attempts: used }, used, start));
            }

            attempt += 1;
        }
    }

    fn fail<E: Display>(&self, error: RetryError<E>, used: u32, start: Instant) -> RetryError<E> {
        let elapsed = self.clock.now().saturating_duration_since(start);
        let message: &dyn Display = &error;
        self.stats.record_terminal(false, used, elapsed, Some(message));
        error
    }
}
