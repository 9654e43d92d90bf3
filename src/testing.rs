//! Testing utilities and helpers for breakwater
//!
//! This module provides a virtual clock for deterministic backoff tests and
//! assertion macros for the error kinds a retry-managed call can produce.
//!
//! # Examples
//!
//! ## Virtual time
//!
//! ```rust
//! use breakwater::testing::ManualClock;
//! use breakwater::{RetryManager, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let clock = ManualClock::new();
//! let manager = RetryManager::builder(
//!     RetryPolicy::exponential(Duration::from_secs(10)).with_max_retries(2),
//! )
//! .with_clock(clock.clone())
//! .build()
//! .unwrap();
//!
//! let _ = manager.execute(|| async { Err::<(), _>("timeout") }).await;
//!
//! // Thirty virtual seconds, no real waiting.
//! assert_eq!(clock.sleeps(), vec![Duration::from_secs(10), Duration::from_secs(20)]);
//! assert_eq!(clock.elapsed(), Duration::from_secs(30));
//! # });
//! ```
//!
//! ## Assertion Macros
//!
//! ```rust
//! use breakwater::{assert_cancelled, RetryError};
//!
//! let result: Result<(), RetryError<String>> = Err(RetryError::Cancelled { attempts: 0 });
//! assert_cancelled!(result);
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::future::{self, BoxFuture};
use futures::FutureExt;

use crate::clock::Clock;

/// Where `now` pins once virtual time outgrows [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Default)]
struct VirtualTime {
    offset: Duration,
    sleeps: Vec<Duration>,
}

/// A [`Clock`] whose time only moves when told to.
///
/// Sleeps complete immediately and advance virtual time by the requested
/// duration. Clones share the same timeline, so keep one handle for
/// assertions and hand another to the component under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    state: Arc<Mutex<VirtualTime>>,
}

impl ManualClock {
    /// Create a clock at virtual time zero.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Arc::new(Mutex::new(VirtualTime::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, VirtualTime> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move virtual time forward without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state();
        state.offset = state.offset.saturating_add(duration);
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        self.state().offset
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state().sleeps.clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.state().offset;
        self.origin
            .checked_add(offset)
            .or_else(|| self.origin.checked_add(FAR_FUTURE))
            .unwrap_or(self.origin)
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        let mut state = self.state();
        state.offset = state.offset.saturating_add(duration);
        state.sleeps.push(duration);
        future::ready(()).boxed()
    }
}

/// Assert that a retry result is an exhaustion error.
///
/// # Example
///
/// ```rust
/// use breakwater::{assert_exhausted, RetryError, RetryExhausted};
/// use std::time::Duration;
///
/// let result: Result<(), _> = Err(RetryError::Exhausted(RetryExhausted::new(
///     "timeout",
///     4,
///     Duration::from_secs(1),
/// )));
/// assert_exhausted!(result, 4);
/// ```
#[macro_export]
macro_rules! assert_exhausted {
    ($result:expr) => {
        match $result {
            Err($crate::RetryError::Exhausted(_)) => {}
            other => panic!("Expected Exhausted, got {:?}", other),
        }
    };
    ($result:expr, $attempts:expr) => {
        match $result {
            Err($crate::RetryError::Exhausted(exhausted)) => {
                assert_eq!(exhausted.attempts, $attempts, "unexpected attempt count");
            }
            other => panic!("Expected Exhausted, got {:?}", other),
        }
    };
}

/// Assert that a retry result is a cancellation error.
#[macro_export]
macro_rules! assert_cancelled {
    ($result:expr) => {
        match $result {
            Err($crate::RetryError::Cancelled { .. }) => {}
            other => panic!("Expected Cancelled, got {:?}", other),
        }
    };
}

/// Assert that a retry result is a circuit-open error.
#[macro_export]
macro_rules! assert_circuit_open {
    ($result:expr) => {
        match $result {
            Err($crate::RetryError::CircuitOpen { .. }) => {}
            other => panic!("Expected CircuitOpen, got {:?}", other),
        }
    };
}
