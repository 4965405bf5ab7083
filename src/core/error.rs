use std::fmt;

use thiserror::Error;

use crate::core::measurement::SeriesId;

/// Classification of a failure reported by a [`MeasurementStore`].
///
/// [`MeasurementStore`]: crate::core::store::MeasurementStore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// No connection could be obtained from the backend.
    ConnectionUnavailable,
    /// A resource was temporarily unavailable (pool exhausted, lock timeout).
    TransientResource,
    /// The backend reported a recoverable data-access condition.
    Recoverable,
    /// Deadlock or serialization failure.
    ConcurrencyConflict,
    /// Constraint violation; retrying cannot succeed.
    Constraint,
    /// Malformed statement or missing table.
    Schema,
    /// Anything else.
    Other,
}

/// Failure kinds that are retried by the write paths.
pub const TRANSIENT_KINDS: &[StoreErrorKind] = &[
    StoreErrorKind::ConnectionUnavailable,
    StoreErrorKind::TransientResource,
    StoreErrorKind::Recoverable,
    StoreErrorKind::ConcurrencyConflict,
];

impl StoreErrorKind {
    pub fn is_transient(self) -> bool {
        TRANSIENT_KINDS.contains(&self)
    }
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreErrorKind::ConnectionUnavailable => "connection unavailable",
            StoreErrorKind::TransientResource => "transient resource failure",
            StoreErrorKind::Recoverable => "recoverable data access failure",
            StoreErrorKind::ConcurrencyConflict => "concurrency conflict",
            StoreErrorKind::Constraint => "constraint violation",
            StoreErrorKind::Schema => "schema error",
            StoreErrorKind::Other => "store error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::TransientResource, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Other, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// The executor refused to accept a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task rejected: {reason}")]
pub struct Rejected {
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Rejected(#[from] Rejected),
    #[error("series not found: {0}")]
    SeriesNotFound(SeriesId),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether a retry of the failed operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Store(err) if err.is_transient())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_whitelist() {
        assert!(StoreErrorKind::ConnectionUnavailable.is_transient());
        assert!(StoreErrorKind::ConcurrencyConflict.is_transient());
        assert!(!StoreErrorKind::Constraint.is_transient());
        assert!(!StoreErrorKind::Other.is_transient());
    }

    #[test]
    fn test_error_transient_passthrough() {
        let err = Error::from(StoreError::transient("pool exhausted"));
        assert!(err.is_transient());

        let err = Error::from(StoreError::permanent("bad row"));
        assert!(!err.is_transient());

        let err = Error::SeriesNotFound(7);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_display() {
        let err = StoreError::new(StoreErrorKind::Schema, "no such table");
        assert_eq!(err.to_string(), "schema error: no such table");
    }
}
