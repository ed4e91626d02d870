//! Error types for the Datakube CLI
//!
//! Messages are user-facing and say what to check next.

use datakube_orchestrator::{index::IndexError, queue::QueueError, storage::StorageError};
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Error type for CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    /// Queue service call failed
    #[error("Queue error: {0}. Check the queue name, region and credentials.")]
    Queue(#[from] QueueError),

    /// Object storage call failed
    #[error("Storage error: {0}. Check the bucket name and your read permissions.")]
    Storage(#[from] StorageError),

    /// Index service call failed
    #[error("Index error: {0}. Ensure the index service is running and reachable.")]
    Index(#[from] IndexError),

    /// File system operation failed
    #[error("File operation failed: {0}. Check the file path and permissions.")]
    Io(#[from] std::io::Error),

    /// Required file is missing
    #[error("File not found: '{0}'. Verify the file path exists.")]
    FileNotFound(String),

    /// Generic anyhow error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
