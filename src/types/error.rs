//! Error types for the ledger engine
//!
//! This module defines the error taxonomy used across the command pipeline:
//!
//! - **Business rejections** are not errors at all; they travel as status
//!   codes inside [`super::outcome::SubmitOutcome`].
//! - **Transient storage conflicts** (optimistic-version mismatch,
//!   lock/deadlock/timeout) carry a [`ConflictKind`] and are eligible for
//!   bounded retry.
//! - **Everything else** is fatal for the operation that raised it: logged
//!   with context and converted into a generic failure response, never
//!   propagated raw to a caller.
//!
//! Classification is typed at the storage boundary. The only place raw
//! backend text is inspected is [`StorageError::classify_backend`], which
//! adapts foreign error messages into the typed taxonomy.

use thiserror::Error;

/// How a transient storage failure relates to the retry discipline
///
/// Both kinds are retried identically; they differ only in the terminal
/// status code surfaced after the attempts are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Optimistic version token mismatch (status 98 after exhaustion)
    Version,

    /// Lock, deadlock or lock-timeout signaled by the backend
    /// (status 97 after exhaustion)
    Lock,
}

/// Errors raised by the storage layer
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    /// Optimistic concurrency token mismatch on an account row
    ///
    /// Transient: the caller re-reads and retries under the shared retry
    /// discipline.
    #[error("version conflict on account {number}: snapshot version {snapshot} is stale")]
    VersionConflict {
        /// External account number of the contended row
        number: i64,
        /// Version the snapshot was taken at
        snapshot: u64,
    },

    /// Lock, deadlock or lock-timeout reported by the backend
    ///
    /// Transient: retried with backoff like a version conflict.
    #[error("storage lock conflict: {message}")]
    Lock {
        /// Backend description of the lock condition
        message: String,
    },

    /// Any other backend failure
    ///
    /// Fatal: never retried.
    #[error("storage backend error: {message}")]
    Backend {
        /// Backend description of the failure
        message: String,
    },
}

impl StorageError {
    /// Classify a raw backend message into the typed taxonomy
    ///
    /// Backends that only expose failure text get adapted here, at the
    /// storage boundary: deadlock/timeout/lock signatures become
    /// [`StorageError::Lock`], everything else [`StorageError::Backend`].
    pub fn classify_backend(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        if lowered.contains("deadlock") || lowered.contains("timeout") || lowered.contains("lock")
        {
            StorageError::Lock { message }
        } else {
            StorageError::Backend { message }
        }
    }

    /// The retry classification of this error, if any
    pub fn conflict_kind(&self) -> Option<ConflictKind> {
        match self {
            StorageError::VersionConflict { .. } => Some(ConflictKind::Version),
            StorageError::Lock { .. } => Some(ConflictKind::Lock),
            StorageError::Backend { .. } => None,
        }
    }
}

/// Errors raised by the message broker
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BrokerError {
    /// The target queue has no live consumer side left
    #[error("queue '{queue}' is closed")]
    Closed {
        /// Queue name the publish targeted
        queue: String,
    },

    /// Transport-level publish failure
    #[error("broker publish failed: {message}")]
    Publish {
        /// Transport description of the failure
        message: String,
    },
}

/// Errors raised by the authoritative external ledger
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// The ledger operation ran and reported a failure
    #[error("external ledger rejected the movement: {message}")]
    Execution {
        /// Ledger description of the rejection
        message: String,
    },

    /// The ledger could not be reached
    #[error("external ledger connection failed: {message}")]
    Connection {
        /// Transport description of the failure
        message: String,
    },
}

/// Main error type for the ledger engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Storage layer failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Message broker failure
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// External ledger failure
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Movement type outside the recognized set reached balance arithmetic
    ///
    /// Never reached when validation runs first; kept as a hard error so the
    /// calculator cannot silently misapply an unknown movement.
    #[error("unrecognized movement type '{movement}'")]
    UnknownMovementType {
        /// The raw wire value
        movement: String,
    },

    /// A settlement envelope could not be decoded
    #[error("could not decode settlement message: {message}")]
    Decode {
        /// Decoder description of the failure
        message: String,
    },

    /// I/O error while reading or writing files
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O error
        message: String,
    },

    /// CSV parsing error in the input files
    #[error("CSV parse error: {message}")]
    Parse {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },
}

impl EngineError {
    /// The retry classification of this error, if any
    ///
    /// Only storage conflicts are retryable; broker, ledger and decode
    /// failures abort immediately.
    pub fn conflict_kind(&self) -> Option<ConflictKind> {
        match self {
            EngineError::Storage(e) => e.conflict_kind(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        EngineError::Io {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for EngineError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        EngineError::Parse {
            line,
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::deadlock("Transaction deadlock detected", Some(ConflictKind::Lock))]
    #[case::timeout("Lock request timeout period exceeded", Some(ConflictKind::Lock))]
    #[case::lock("could not obtain lock on row", Some(ConflictKind::Lock))]
    #[case::mixed_case("DEADLOCK victim", Some(ConflictKind::Lock))]
    #[case::other("syntax error near SELECT", None)]
    fn test_classify_backend(#[case] message: &str, #[case] expected: Option<ConflictKind>) {
        let error = StorageError::classify_backend(message);
        assert_eq!(error.conflict_kind(), expected);
    }

    #[test]
    fn test_version_conflict_is_retryable() {
        let error = EngineError::Storage(StorageError::VersionConflict {
            number: 1000000001,
            snapshot: 3,
        });

        assert_eq!(error.conflict_kind(), Some(ConflictKind::Version));
    }

    #[rstest]
    #[case::broker(EngineError::Broker(BrokerError::Closed { queue: "queue_1".to_string() }))]
    #[case::ledger(EngineError::Ledger(LedgerError::Connection { message: "refused".to_string() }))]
    #[case::decode(EngineError::Decode { message: "bad json".to_string() })]
    #[case::backend(EngineError::Storage(StorageError::Backend { message: "oops".to_string() }))]
    fn test_non_conflicts_are_fatal(#[case] error: EngineError) {
        assert_eq!(error.conflict_kind(), None);
    }

    #[rstest]
    #[case::version_conflict(
        StorageError::VersionConflict { number: 42, snapshot: 7 },
        "version conflict on account 42: snapshot version 7 is stale"
    )]
    #[case::lock(
        StorageError::Lock { message: "deadlock victim".to_string() },
        "storage lock conflict: deadlock victim"
    )]
    fn test_storage_error_display(#[case] error: StorageError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let error: EngineError = io_error.into();
        assert!(matches!(error, EngineError::Io { .. }));
        assert_eq!(error.to_string(), "I/O error: Permission denied");
    }
}
