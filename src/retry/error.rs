//! Error types for retry operations.

use std::time::Duration;

/// Invalid retry policy or circuit breaker configuration.
///
/// Surfaced synchronously at construction, never in the middle of a retry loop.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The base delay must be positive.
    #[error("base delay must be greater than zero")]
    ZeroBaseDelay,

    /// The multiplier must be finite and greater than 1.0.
    #[error("multiplier must be greater than 1.0, got {0}")]
    InvalidMultiplier(f64),

    /// A delay cap below the base delay would clamp every wait.
    #[error("max delay {max:?} is below base delay {base:?}")]
    MaxDelayBelowBase {
        /// Configured base delay.
        base: Duration,
        /// Configured delay cap.
        max: Duration,
    },

    /// A circuit breaker needs at least one failure to trip.
    #[error("circuit breaker threshold must be at least 1")]
    ZeroThreshold,

    /// A circuit breaker needs a positive reset timeout.
    #[error("circuit breaker reset timeout must be greater than zero")]
    ZeroResetTimeout,
}

/// Error returned when all retry attempts are exhausted.
///
/// Contains the final error along with metadata about the retry sequence.
///
/// # Examples
///
/// ```rust
/// use breakwater::{RetryError, RetryManager, RetryPolicy};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let manager = RetryManager::new(
///     RetryPolicy::exponential(Duration::from_millis(1)).with_max_retries(2),
/// )
/// .unwrap();
///
/// let result = manager
///     .execute(|| async { Err::<(), _>("connection reset") })
///     .await;
///
/// match result {
///     Err(RetryError::Exhausted(exhausted)) => {
///         assert_eq!(exhausted.final_error, "connection reset");
///         assert_eq!(exhausted.attempts, 3); // 1 initial + 2 retries
///     }
///     other => panic!("Expected exhaustion, got {:?}", other),
/// }
/// # });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    /// The error from the final attempt.
    pub final_error: E,
    /// Total number of attempts made (initial + retries).
    pub attempts: u32,
    /// Total time spent retrying.
    pub total_duration: Duration,
}

impl<E> RetryExhausted<E> {
    /// Create a new RetryExhausted error.
    pub fn new(final_error: E, attempts: u32, total_duration: Duration) -> Self {
        Self {
            final_error,
            attempts,
            total_duration,
        }
    }

    /// Extract the final error, discarding metadata.
    pub fn into_error(self) -> E {
        self.final_error
    }

    /// Get a reference to the final error.
    pub fn error(&self) -> &E {
        &self.final_error
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "retry exhausted after {} attempts ({:?}): {}",
            self.attempts, self.total_duration, self.final_error
        )
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryExhausted<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.final_error)
    }
}

/// Outcome of a failed retry-managed call.
///
/// Only retryable operation errors are handled inside the engine; every
/// variant here reaches the caller. Match on the variant (or use the `is_*`
/// predicates) to tell the sentinel kinds apart.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// The operation failed with an error classified as terminal.
    /// The error is passed through unchanged.
    Operation(E),

    /// The operation panicked; treated as a terminal failure.
    Panicked {
        /// Panic payload, when it was a string.
        message: String,
    },

    /// Every allowed attempt failed with a retryable error.
    Exhausted(RetryExhausted<E>),

    /// Cancellation or the deadline stopped the call early.
    Cancelled {
        /// Attempts started before cancellation was observed.
        attempts: u32,
    },

    /// The circuit breaker is open; the operation was not invoked.
    CircuitOpen {
        /// Consecutive failures recorded by the breaker.
        failures: u64,
        /// Time left until the breaker closes again.
        retry_after: Duration,
    },
}

impl<E> RetryError<E> {
    /// Returns true if all attempts were used up.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }

    /// Returns true if cancellation or a deadline ended the call.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns true if the circuit breaker short-circuited the call.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Returns true for terminal operation failures, including panics.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Operation(_) | Self::Panicked { .. })
    }

    /// Get the underlying operation error, if the operation produced one.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Exhausted(exhausted) => Some(&exhausted.final_error),
            _ => None,
        }
    }

    /// Extract the underlying operation error, if the operation produced one.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Exhausted(exhausted) => Some(exhausted.final_error),
            _ => None,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Operation(e) => write!(f, "{}", e),
            Self::Panicked { message } => write!(f, "operation panicked: {}", message),
            Self::Exhausted(exhausted) => write!(f, "{}", exhausted),
            Self::Cancelled { attempts } => {
                write!(f, "retry cancelled after {} attempts", attempts)
            }
            Self::CircuitOpen {
                failures,
                retry_after,
            } => write!(
                f,
                "circuit breaker open after {} failures, retry in {:?}",
                failures, retry_after
            ),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Operation(e) => e.source(),
            Self::Exhausted(exhausted) => Some(&exhausted.final_error),
            Self::Panicked { .. } | Self::Cancelled { .. } | Self::CircuitOpen { .. } => None,
        }
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_retry_exhausted_display() {
        let err = RetryExhausted::new("connection failed", 3, Duration::from_millis(500));
        let display = format!("{}", err);
        assert!(display.contains("retry exhausted"));
        assert!(display.contains("3 attempts"));
        assert!(display.contains("connection failed"));
    }

    #[test]
    fn test_retry_exhausted_into_error() {
        let err = RetryExhausted::new("test error", 5, Duration::from_secs(1));
        assert_eq!(err.into_error(), "test error");
    }

    #[test]
    fn test_exhausted_source_is_final_error() {
        use std::error::Error;

        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out");
        let err: RetryError<std::io::Error> =
            RetryError::Exhausted(RetryExhausted::new(io, 4, Duration::from_secs(1)));

        let source = err.source().expect("exhaustion wraps the last error");
        assert_eq!(source.to_string(), "read timed out");
    }

    #[test]
    fn test_operation_error_is_transparent() {
        let err: RetryError<&str> = RetryError::Operation("permission denied");
        assert_eq!(err.to_string(), "permission denied");
        assert!(err.is_terminal());
        assert_eq!(err.into_operation_error(), Some("permission denied"));
    }

    #[test]
    fn test_sentinel_predicates() {
        let cancelled: RetryError<&str> = RetryError::Cancelled { attempts: 2 };
        assert!(cancelled.is_cancelled());
        assert!(!cancelled.is_exhausted());
        assert_eq!(cancelled.operation_error(), None);

        let open: RetryError<&str> = RetryError::CircuitOpen {
            failures: 5,
            retry_after: Duration::from_secs(3),
        };
        assert!(open.is_circuit_open());
        assert!(!open.is_terminal());
        assert!(open.to_string().contains("circuit breaker open"));

        let panicked: RetryError<&str> = RetryError::Panicked {
            message: "boom".into(),
        };
        assert!(panicked.is_terminal());
        assert!(panicked.to_string().contains("boom"));
    }

    #[test]
    fn test_config_error_display() {
        assert!(ConfigError::InvalidMultiplier(0.5)
            .to_string()
            .contains("0.5"));
        assert!(ConfigError::ZeroThreshold.to_string().contains("threshold"));
    }
}
