use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    /// A uniqueness or compare-and-set check failed; the caller lost a race
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether retrying against fresh state could succeed
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::Conflict(_) | StorageError::InvariantViolation(_)
        )
    }
}
