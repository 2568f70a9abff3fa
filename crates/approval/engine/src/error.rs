//! Error types for the approval engine

use approval_storage::StorageError;
use approval_types::{StepId, ValidationError};
use serde::{Deserialize, Serialize};

/// Errors returned by engine operations
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("invalid workflow definition: {0}")]
    Validation(#[from] ValidationError),

    /// The operation lost a race or the target already left `pending`
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no applicable workflow for {0}")]
    NoApplicableWorkflow(String),

    #[error("step {step}: approver cannot be resolved ({reason})")]
    Unresolvable { step: StepId, reason: String },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Directory lookup failed; the operation can be retried
    #[error("directory error: {0}")]
    Directory(String),

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ApprovalError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(msg) | StorageError::InvariantViolation(msg) => {
                ApprovalError::Conflict(msg)
            }
            StorageError::NotFound(msg) => ApprovalError::NotFound(msg),
            other => ApprovalError::Storage(other),
        }
    }
}

/// Stable, machine-readable error codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    NoApplicableWorkflow,
    Unresolvable,
    Unsupported,
    Forbidden,
    Directory,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NoApplicableWorkflow => "no_applicable_workflow",
            ErrorKind::Unresolvable => "unresolvable",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Directory => "directory",
            ErrorKind::Storage => "storage",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ApprovalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApprovalError::Validation(_) => ErrorKind::Validation,
            ApprovalError::Conflict(_) => ErrorKind::Conflict,
            ApprovalError::NotFound(_) => ErrorKind::NotFound,
            ApprovalError::NoApplicableWorkflow(_) => ErrorKind::NoApplicableWorkflow,
            ApprovalError::Unresolvable { .. } => ErrorKind::Unresolvable,
            ApprovalError::Unsupported(_) => ErrorKind::Unsupported,
            ApprovalError::Forbidden(_) => ErrorKind::Forbidden,
            ApprovalError::Directory(_) => ErrorKind::Directory,
            ApprovalError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Whether the same call may succeed later without any change by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApprovalError::Directory(_) | ApprovalError::Storage(StorageError::Backend(_))
        )
    }
}

/// Result type for engine operations
pub type ApprovalResult<T> = Result<T, ApprovalError>;
