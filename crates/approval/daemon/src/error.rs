//! Error types for approvald

use approval_engine::ApprovalError;
use approval_storage::StorageError;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workflow definition file could not be read or is malformed
    #[error("Workflow file error: {0}")]
    Workflows(String),

    /// Engine error
    #[error("Engine error: {0}")]
    Engine(#[from] ApprovalError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Scheduler error
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
