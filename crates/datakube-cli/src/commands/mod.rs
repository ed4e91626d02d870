//! CLI command implementations
//!
//! Commands take their queues and index as trait objects; `main` resolves the real
//! clients and hands them in.

pub mod archive;
pub mod deadletter;
pub mod enqueue;

use std::time::Duration;

/// Sleep between messages; a zero pacing never yields to the timer
pub(crate) async fn pace(pacing: Duration) {
    if !pacing.is_zero() {
        tokio::time::sleep(pacing).await;
    }
}
