use thiserror::Error;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
}

/// Errors returned by every [`Repository`](crate::Repository) backend.
///
/// `Conflict`, `NotFound` and `Gone` are sentinel outcomes callers are
/// expected to branch on. The remaining variants are storage failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("short code already exists: {0}")]
    Conflict(String),
    #[error("short code not found: {0}")]
    NotFound(String),
    #[error("short code deleted: {0}")]
    Gone(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage i/o failed: {0}")]
    Io(String),
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Returns `true` for backend failures, `false` for the sentinel outcomes.
    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            StorageError::Conflict(_) | StorageError::NotFound(_) | StorageError::Gone(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_not_failures() {
        assert!(!StorageError::Conflict("A".into()).is_failure());
        assert!(!StorageError::NotFound("A".into()).is_failure());
        assert!(!StorageError::Gone("A".into()).is_failure());
    }

    #[test]
    fn backend_errors_are_failures() {
        assert!(StorageError::Closed.is_failure());
        assert!(StorageError::Io("disk full".into()).is_failure());
        assert!(StorageError::Query("syntax".into()).is_failure());
    }
}
