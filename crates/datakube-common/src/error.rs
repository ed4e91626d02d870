//! Error types for Datakube

use thiserror::Error;

/// Result type alias for Datakube operations
pub type Result<T> = std::result::Result<T, DatakubeError>;

/// Main error type shared by the Datakube crates
#[derive(Error, Debug)]
pub enum DatakubeError {
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Invalid sources policy: {0} (expected verify, ensure or skip)")]
    InvalidSourcesPolicy(String),

    #[error("Invalid archive policy: {0}")]
    InvalidArchivePolicy(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
