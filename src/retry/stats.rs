//! Retry statistics shared by concurrent callers of one manager.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Counters {
    total_attempts: u64,
    total_successes: u64,
    total_failures: u64,
    completed_attempts: u64,
    total_wall_time: Duration,
    last_error: Option<String>,
}

/// Thread-safe accumulator of retry outcomes.
///
/// All counters live behind one lock so a [`snapshot`](Self::snapshot)
/// never observes a half-applied update.
#[derive(Debug, Default)]
pub struct RetryStatistics {
    inner: Mutex<Counters>,
}

impl RetryStatistics {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one invocation of the wrapped operation.
    pub fn record_attempt(&self) {
        self.counters().total_attempts += 1;
    }

    /// Record the final outcome of one call.
    ///
    /// `attempts_used` is the number of invocations that call made; it feeds
    /// the per-operation average.
    pub fn record_terminal(
        &self,
        success: bool,
        attempts_used: u32,
        wall_time: Duration,
        error: Option<&dyn std::fmt::Display>,
    ) {
        let mut counters = self.counters();
        if success {
            counters.total_successes += 1;
        } else {
            counters.total_failures += 1;
        }
        counters.completed_attempts += u64::from(attempts_used);
        counters.total_wall_time = counters.total_wall_time.saturating_add(wall_time);
        if let Some(error) = error {
            counters.last_error = Some(error.to_string());
        }
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let counters = self.counters();
        let operations = counters.total_successes + counters.total_failures;
        let average_attempts_per_operation = if operations == 0 {
            0.0
        } else {
            counters.completed_attempts as f64 / operations as f64
        };

        StatisticsSnapshot {
            total_attempts: counters.total_attempts,
            total_successes: counters.total_successes,
            total_failures: counters.total_failures,
            average_attempts_per_operation,
            total_wall_time: counters.total_wall_time,
            last_error: counters.last_error.clone(),
        }
    }

    /// Clear every counter.
    pub fn reset(&self) {
        *self.counters() = Counters::default();
    }
}

/// Point-in-time copy of [`RetryStatistics`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatisticsSnapshot {
    /// Invocations of the wrapped operation.
    pub total_attempts: u64,
    /// Calls that ended in success.
    pub total_successes: u64,
    /// Calls that ended in any error.
    pub total_failures: u64,
    /// Mean invocations per completed call.
    pub average_attempts_per_operation: f64,
    /// Summed duration of completed calls.
    pub total_wall_time: Duration,
    /// Message of the most recent failing call.
    pub last_error: Option<String>,
}

impl StatisticsSnapshot {
    /// Completed calls, successful or not.
    pub fn total_operations(&self) -> u64 {
        self.total_successes + self.total_failures
    }
}
