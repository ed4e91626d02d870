//! Datakube Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the Datakube orchestration tools.
//!
//! # Overview
//!
//! This crate provides common functionality used across all workspace members:
//!
//! - **Error Handling**: Common error type and result alias
//! - **Checksums**: MD5 helpers matching the queue service's `MD5OfBody`
//! - **Logging**: Centralised `tracing` subscriber configuration
//! - **Types**: Products, dataset references, and source-handling policies
//!
//! # Example
//!
//! ```no_run
//! use datakube_common::checksum::ensure_md5;
//!
//! let body = r#"{"Message": "{}"}"#;
//! let claimed = "0c8b5e06a1f4e0e3e0c0f1a1b9d4b3c2";
//! if let Err(e) = ensure_md5(body.as_bytes(), claimed) {
//!     tracing::warn!(error = %e, "checksum mismatch");
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{DatakubeError, Result};
pub use types::{DatasetRef, ProductRef, SourcesPolicy};
