//! # Breakwater
//!
//! Retries with exponential backoff and a circuit breaker that stops calling
//! a dependency once it keeps failing.
//!
//! ## Philosophy
//!
//! Breakwater keeps the decision logic pure and the waiting at the edge:
//! - **Policy** = plain data that computes delays ([`RetryPolicy`])
//! - **Classification** = a predicate deciding which errors are worth retrying
//!   ([`Classifier`])
//! - **Execution** = the async loop that sleeps on an injected [`Clock`]
//!   ([`RetryManager`], [`CircuitBreaker`])
//!
//! ## Quick Example
//!
//! ```rust
//! use breakwater::{CircuitBreaker, RetryPolicy};
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let policy = RetryPolicy::exponential(Duration::from_millis(1))
//!     .with_max_retries(3)
//!     .with_max_delay(Duration::from_millis(10))
//!     .with_jitter(true);
//!
//! let breaker = CircuitBreaker::new(policy, 5, Duration::from_secs(30)).unwrap();
//!
//! let calls = &AtomicU32::new(0);
//! let result = breaker
//!     .execute(|| async move {
//!         match calls.fetch_add(1, Ordering::SeqCst) {
//!             0 => Err("503 service unavailable".to_string()),
//!             _ => Ok("payload"),
//!         }
//!     })
//!     .await;
//!
//! assert_eq!(result, Ok("payload"));
//! assert_eq!(breaker.failure_count(), 0);
//! assert_eq!(breaker.manager().statistics().total_attempts, 2);
//! # });
//! ```
//!
//! Errors that look permanent ("not found", "forbidden", "invalid ...") are
//! returned on the first attempt; see [`MessageClassifier`] for the rules and
//! [`RetryManagerBuilder::with_classifier`] to supply your own.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod circuit;
pub mod clock;
pub mod retry;
pub mod testing;

// Re-exports
pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
pub use clock::{Clock, TokioClock};
pub use retry::{
    Classifier, ConfigError, MessageClassifier, RandomSource, RetryConfig, RetryError, RetryEvent,
    RetryExhausted, RetryManager, RetryManagerBuilder, RetryPolicy, RetryStatistics,
    StatisticsSnapshot, StdRandom, StorageClassifier, JITTER_HIGH, JITTER_LOW,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::circuit::{CircuitBreaker, CircuitState};
    pub use crate::clock::Clock;
    pub use crate::retry::{
        Classifier, ConfigError, MessageClassifier, RetryError, RetryManager, RetryPolicy,
    };
}
