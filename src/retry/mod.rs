//! Retry with exponential backoff.
//!
//! This module keeps the pure parts of retrying apart from the loop that
//! performs them:
//!
//! - **Pure Core**: [`RetryPolicy`] is just data and computes delays without
//!   side effects; classifiers are plain predicates
//! - **Imperative Shell**: [`RetryManager`] runs the attempt loop, waits on an
//!   injected [`Clock`](crate::Clock) and records [`RetryStatistics`]
//!
//! # Quick Start
//!
//! ```rust
//! use breakwater::{RetryManager, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let policy = RetryPolicy::exponential(Duration::from_millis(100))
//!     .with_max_retries(3)
//!     .with_jitter(true);
//!
//! let manager = RetryManager::new(policy).unwrap();
//! let value = manager.execute(|| async { Ok::<_, String>(42) }).await.unwrap();
//!
//! assert_eq!(value, 42);
//! assert_eq!(manager.statistics().total_attempts, 1);
//! # });
//! ```
//!
//! # Delays
//!
//! The wait before retry `n` (0-indexed) is `base * multiplier^n`, clamped to
//! the optional cap. With jitter enabled the delay is replaced by a value
//! drawn uniformly from 75% to 125% of it.
//!
//! # Error Types
//!
//! - [`RetryError`]: returned by every failed call; distinguishes terminal
//!   operation errors, panics, exhaustion, cancellation and an open circuit
//! - [`RetryExhausted`]: the final error plus attempt metadata
//! - [`ConfigError`]: invalid policy, reported at construction

mod classify;
mod error;
mod jitter;
mod manager;
mod policy;
mod stats;

pub use classify::{Classifier, MessageClassifier, StorageClassifier};
pub use error::{ConfigError, RetryError, RetryExhausted};
pub use jitter::{RandomSource, StdRandom, JITTER_HIGH, JITTER_LOW};
pub use manager::{RetryEvent, RetryManager, RetryManagerBuilder};
pub use policy::{RetryConfig, RetryPolicy};
pub use stats::{RetryStatistics, StatisticsSnapshot};
