//! `datakube enqueue-keys` command implementation
//!
//! Sends bare object keys, one per message, for consumers that read raw-key bodies.

use datakube_orchestrator::{queue::QueueClient, storage::S3Store};
use tracing::info;

use crate::{error::Result, ENQUEUE_PROGRESS_INTERVAL};

/// Send each key as its own message body
pub async fn send_keys<I>(queue: &dyn QueueClient, keys: I) -> Result<usize>
where
    I: IntoIterator<Item = String>,
{
    let mut sent = 0;

    for key in keys {
        queue.send(&key).await?;
        sent += 1;

        if sent % ENQUEUE_PROGRESS_INTERVAL == 0 {
            info!(sent, "Enqueued keys");
        }
    }

    info!(sent, queue = %queue.url(), "Finished enqueueing keys");
    Ok(sent)
}

/// List keys under `bucket/prefix` ending in `suffix` and enqueue up to `limit` of them
pub async fn run(
    store: &S3Store,
    queue: &dyn QueueClient,
    bucket: &str,
    prefix: &str,
    suffix: &str,
    limit: usize,
) -> Result<usize> {
    let keys = store.list_keys(bucket, prefix, suffix, Some(limit)).await?;
    send_keys(queue, keys).await
}
