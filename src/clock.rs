//! Time source used for backoff waits and circuit decay.
//!
//! Every wait the engine performs goes through a [`Clock`], so tests can
//! substitute [`ManualClock`](crate::testing::ManualClock) and run
//! multi-second backoff sequences instantly.

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;

/// Source of the current time and of cancellable sleeps.
///
/// The future returned by [`sleep`](Clock::sleep) must release any timer it
/// holds when dropped; the retry loop drops it on cancellation.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;

    /// A future that completes once `duration` has passed on this clock.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Wall-clock time with tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}
