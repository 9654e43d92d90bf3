//! Retryable vs terminal error classification.
//!
//! The retry loop never decides on its own whether an error is worth another
//! attempt; it asks a [`Classifier`]. Any `Fn(&E) -> bool` closure is a
//! classifier, so protocol-specific rules can be supplied inline:
//!
//! ```rust
//! use breakwater::Classifier;
//!
//! #[derive(Debug)]
//! enum ApiError { Throttled, BadRequest }
//!
//! let classifier = |err: &ApiError| matches!(err, ApiError::Throttled);
//! assert!(classifier.is_retryable(&ApiError::Throttled));
//! assert!(!classifier.is_retryable(&ApiError::BadRequest));
//! ```
//!
//! [`MessageClassifier`] and [`StorageClassifier`] work on the rendered error
//! message and suit errors that only carry text.

use std::fmt::Display;

/// Decides whether a failed attempt should be retried.
pub trait Classifier<E: ?Sized>: Send + Sync {
    /// Returns true if the error is transient and worth another attempt.
    fn is_retryable(&self, error: &E) -> bool;
}

impl<E: ?Sized, F> Classifier<E> for F
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn is_retryable(&self, error: &E) -> bool {
        self(error)
    }
}

const TRANSIENT_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection aborted",
    "broken pipe",
    "timeout",
    "timed out",
    "temporary failure",
    "temporarily unavailable",
    "service unavailable",
    "rate limit",
    "too many requests",
    "network unreachable",
    "network is unreachable",
    "host unreachable",
];

const TERMINAL_MARKERS: &[&str] = &[
    "authentication failed",
    "unauthenticated",
    "unauthorized",
    "authorization failed",
    "permission denied",
    "access denied",
    "invalid parameter",
    "invalid argument",
    "not found",
    "forbidden",
    "malformed",
    "bad request",
];

const STORAGE_TRANSIENT_MARKERS: &[&str] = &[
    "deadlock",
    "lock wait timeout",
    "database is locked",
    "too many connections",
    "lost connection",
    "connection refused",
    "connection reset",
    "connection timed out",
    "server closed the connection",
    "serialization failure",
    "could not serialize",
];

const STORAGE_TERMINAL_MARKERS: &[&str] = &[
    "syntax error",
    "malformed query",
    "constraint",
    "duplicate key",
    "duplicate entry",
    "unique violation",
    "foreign key",
    "type mismatch",
    "datatype mismatch",
    "invalid input syntax",
];

fn matches_any(message: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| message.contains(marker))
}

/// Classifies errors by their message.
///
/// Transient markers (connection refused/reset, timeouts, temporary failure,
/// service unavailable, rate limiting, unreachable network) are retried.
/// Terminal markers (authentication and authorization failures, permission
/// denied, invalid parameters, not found, forbidden, malformed requests) are
/// not. Anything else is retried.
///
/// ```rust
/// use breakwater::{Classifier, MessageClassifier};
///
/// assert!(MessageClassifier.is_retryable("connection reset by peer"));
/// assert!(!MessageClassifier.is_retryable("403 Forbidden"));
/// assert!(MessageClassifier.is_retryable("something odd happened"));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageClassifier;

impl MessageClassifier {
    /// Classify an already-rendered message.
    pub fn classify_message(message: &str) -> bool {
        let message = message.to_lowercase();
        if matches_any(&message, TRANSIENT_MARKERS) {
            return true;
        }
        if matches_any(&message, TERMINAL_MARKERS) {
            return false;
        }
        true
    }
}

impl<E: Display + ?Sized> Classifier<E> for MessageClassifier {
    fn is_retryable(&self, error: &E) -> bool {
        Self::classify_message(&error.to_string())
    }
}

/// Classifies storage backend errors by their message.
///
/// Deadlocks, lock-wait timeouts, connection trouble and serialization
/// failures are retried; malformed queries, constraint violations and type
/// errors are not. The terminal set is checked first, so a constraint whose
/// name mentions a connection still stops. Messages matching neither set
/// fall back to [`MessageClassifier`].
///
/// ```rust
/// use breakwater::{Classifier, StorageClassifier};
///
/// assert!(StorageClassifier.is_retryable("Deadlock found when trying to get lock"));
/// assert!(!StorageClassifier.is_retryable("UNIQUE constraint failed: users.email"));
/// assert!(!StorageClassifier.is_retryable("permission denied for table users"));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageClassifier;

impl StorageClassifier {
    /// Classify an already-rendered message.
    pub fn classify_message(message: &str) -> bool {
        let lowered = message.to_lowercase();
        if matches_any(&lowered, STORAGE_TERMINAL_MARKERS) {
            return false;
        }
        if matches_any(&lowered, STORAGE_TRANSIENT_MARKERS) {
            return true;
        }
        MessageClassifier::classify_message(&lowered)
    }
}

impl<E: Display + ?Sized> Classifier<E> for StorageClassifier {
    fn is_retryable(&self, error: &E) -> bool {
        Self::classify_message(&error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_messages_retry() {
        for msg in [
            "dial tcp: Connection refused",
            "read: connection reset by peer",
            "request timeout",
            "operation timed out",
            "temporary failure in name resolution",
            "503 Service Unavailable",
            "rate limit exceeded",
            "network is unreachable",
        ] {
            assert!(MessageClassifier.is_retryable(msg), "{msg}");
        }
    }

    #[test]
    fn terminal_messages_stop() {
        for msg in [
            "authentication failed for user",
            "401 Unauthorized",
            "permission denied",
            "invalid parameter: page_size",
            "object not found",
            "403 Forbidden",
            "malformed request body",
        ] {
            assert!(!MessageClassifier.is_retryable(msg), "{msg}");
        }
    }

    #[test]
    fn unknown_messages_default_to_retry() {
        assert!(MessageClassifier.is_retryable("kaboom"));
        assert!(MessageClassifier.is_retryable(""));
    }

    #[test]
    fn transient_marker_wins_over_terminal() {
        assert!(MessageClassifier.is_retryable("upstream not found: connection refused"));
    }

    #[test]
    fn storage_transient_messages_retry() {
        for msg in [
            "Deadlock found when trying to get lock; try restarting transaction",
            "Lock wait timeout exceeded",
            "FATAL: too many connections for role",
            "could not serialize access due to concurrent update",
            "ERROR: serialization failure",
            "lost connection to server during query",
        ] {
            assert!(StorageClassifier.is_retryable(msg), "{msg}");
        }
    }

    #[test]
    fn storage_terminal_messages_stop() {
        for msg in [
            "syntax error at or near \"SELEC\"",
            "duplicate key value violates unique constraint \"users_pkey\"",
            "insert violates foreign key constraint",
            "datatype mismatch",
            "invalid input syntax for type integer",
        ] {
            assert!(!StorageClassifier.is_retryable(msg), "{msg}");
        }
    }

    #[test]
    fn storage_violation_naming_a_connection_stops() {
        for msg in [
            "duplicate key value violates unique constraint \"connections_pkey\"",
            "insert or update on table \"orders\" violates foreign key constraint \"orders_connection_id_fkey\"",
            "syntax error at or near \"connection\"",
        ] {
            assert!(!StorageClassifier.is_retryable(msg), "{msg}");
        }
        assert!(StorageClassifier.is_retryable("server closed the connection unexpectedly"));
    }

    #[test]
    fn storage_falls_back_to_generic() {
        assert!(!StorageClassifier.is_retryable("permission denied for relation"));
        assert!(StorageClassifier.is_retryable("503 service unavailable"));
        assert!(StorageClassifier.is_retryable("unexpected state"));
    }

    #[test]
    fn closures_are_classifiers() {
        let only_odd = |n: &u32| n % 2 == 1;
        assert!(only_odd.is_retryable(&3));
        assert!(!only_odd.is_retryable(&4));
    }

    #[test]
    fn classifies_error_types_through_display() {
        let err = std::io::Error::other("connection reset");
        assert!(MessageClassifier.is_retryable(&err));

        let err = std::io::Error::other("permission denied");
        assert!(!MessageClassifier.is_retryable(&err));
    }
}
