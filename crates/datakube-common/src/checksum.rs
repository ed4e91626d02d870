//! MD5 checksum utilities for message verification
//!
//! SQS reports `MD5OfBody` as the lowercase hex MD5 digest of the UTF-8 body.

use crate::error::{DatakubeError, Result};

/// Compute the hex MD5 checksum of bytes
pub fn compute_md5(data: &[u8]) -> String {
    let digest = md5::compute(data);
    format!("{:x}", digest)
}

/// Check that `data` hashes to `expected_md5` (case-insensitive), reporting both
/// digests on a mismatch
pub fn ensure_md5(data: &[u8], expected_md5: &str) -> Result<()> {
    let actual = compute_md5(data);
    if actual.eq_ignore_ascii_case(expected_md5) {
        Ok(())
    } else {
        Err(DatakubeError::ChecksumMismatch {
            expected: expected_md5.to_string(),
            actual,
        })
    }
}
