//! Message integrity check

use datakube_common::checksum::ensure_md5;
use tracing::warn;

use crate::queue::QueueMessage;

/// True when the body hashes to the checksum the queue service reported.
///
/// A mismatch is logged here; the caller deletes the message without processing it.
pub fn validate(message: &QueueMessage) -> bool {
    match ensure_md5(message.body.as_bytes(), &message.claimed_checksum) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                message_id = %message.id,
                body = %message.body,
                error = %e,
                "MD5 hashes did not match, discarding message"
            );
            false
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use datakube_common::checksum::compute_md5;

    fn message(body: &str, checksum: &str) -> QueueMessage {
        QueueMessage {
            id: "m-1".to_string(),
            body: body.to_string(),
            receipt_handle: "r-1".to_string(),
            claimed_checksum: checksum.to_string(),
        }
    }

    #[test]
    fn test_matching_checksum_is_valid() {
        let body = r#"{"Message": "{}"}"#;
        assert!(validate(&message(body, &compute_md5(body.as_bytes()))));
    }

    #[test]
    fn test_uppercase_checksum_is_valid() {
        let body = "payload";
        let checksum = compute_md5(body.as_bytes()).to_uppercase();
        assert!(validate(&message(body, &checksum)));
    }

    #[test]
    fn test_mismatch_and_missing_checksum_are_invalid() {
        assert!(!validate(&message("payload", "0123456789abcdef0123456789abcdef")));
        assert!(!validate(&message("payload", "")));
    }
}
