//! Orchestrator error types

use thiserror::Error;

use crate::{index::IndexError, queue::QueueError, storage::StorageError};

/// Result type alias for orchestrator operations
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;

/// Errors that stop the orchestrator.
///
/// Per-message and per-policy failures are logged where they happen and never reach
/// this type; only an unreachable queue service or broken setup does.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Datakube error: {0}")]
    Common(#[from] datakube_common::DatakubeError),
}
