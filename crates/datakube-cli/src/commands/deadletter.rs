//! `datakube deadletter` command implementations
//!
//! Drains receive one message at a time with a short visibility timeout and stop once
//! the queue reports no visible messages or a receive comes back empty. The
//! approximate count can lag, so an empty receive is the final word.

use datakube_orchestrator::queue::{QueueClient, QueueMessage, ReceiveOptions};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::pace;
use crate::error::{CliError, Result};

/// Receive settings shared by the drain commands
#[derive(Debug, Clone, Copy)]
pub struct DrainOptions {
    pub visibility_timeout_secs: i32,
    pub pacing: Duration,
}

impl DrainOptions {
    pub fn new(visibility_timeout_secs: i32, pacing_ms: u64) -> Self {
        Self {
            visibility_timeout_secs,
            pacing: Duration::from_millis(pacing_ms),
        }
    }
}

/// What a drain did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub moved: u64,
    pub deleted: u64,
}

/// Take the next dead letter, or `None` once the queue is drained
async fn next_dead_letter(
    dlq: &dyn QueueClient,
    options: &DrainOptions,
) -> Result<Option<QueueMessage>> {
    let remaining = dlq.approximate_count().await?;
    if remaining == 0 {
        info!(queue = %dlq.url(), "Dead-letter queue is empty");
        return Ok(None);
    }
    debug!(remaining, "Dead letters remaining");

    let message = dlq
        .receive(&ReceiveOptions::single(options.visibility_timeout_secs))
        .await?
        .into_iter()
        .next();

    if message.is_none() {
        info!(queue = %dlq.url(), "Receive returned nothing, stopping");
    }

    Ok(message)
}

/// Move every dead letter to `live`, deleting each one only after it was sent
pub async fn drain_to_live(
    dlq: &dyn QueueClient,
    live: &dyn QueueClient,
    options: &DrainOptions,
) -> Result<DrainReport> {
    let mut report = DrainReport::default();

    while let Some(message) = next_dead_letter(dlq, options).await? {
        live.send(&message.body).await?;
        report.moved += 1;

        dlq.delete(&message.receipt_handle).await?;
        report.deleted += 1;

        debug!(message_id = %message.id, "Moved dead letter to live queue");
        pace(options.pacing).await;
    }

    info!(moved = report.moved, from = %dlq.url(), to = %live.url(), "Drained dead letters to live queue");
    Ok(report)
}

/// Append every dead-letter body to `path`, one per line
///
/// Messages stay on the dead-letter queue unless `delete` is set; they become visible
/// again once the visibility timeout lapses.
pub async fn drain_to_file(
    dlq: &dyn QueueClient,
    path: &Path,
    delete: bool,
    options: &DrainOptions,
) -> Result<DrainReport> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;

    let mut report = DrainReport::default();

    while let Some(message) = next_dead_letter(dlq, options).await? {
        if message.body.contains('\n') {
            warn!(message_id = %message.id, "Body spans several lines and will not reload as one message");
        }

        file.write_all(message.body.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        report.moved += 1;

        if delete {
            dlq.delete(&message.receipt_handle).await?;
            report.deleted += 1;
        }

        pace(options.pacing).await;
    }

    info!(
        written = report.moved,
        deleted = report.deleted,
        file = %path.display(),
        "Drained dead letters to file"
    );
    Ok(report)
}

/// Send a single message, typically a poison message for testing redrive
pub async fn inject(queue: &dyn QueueClient, body: &str) -> Result<()> {
    queue.send(body).await?;
    info!(queue = %queue.url(), bytes = body.len(), "Injected message");
    Ok(())
}

/// Send each non-empty line of a drain file to `queue`
///
/// Lines are split on `\n` only and sent verbatim, so whitespace-only bodies and a
/// trailing `\r` survive the round trip.
pub async fn reload_from_file(queue: &dyn QueueClient, path: &Path, pacing: Duration) -> Result<usize> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CliError::FileNotFound(path.display().to_string()));
        },
        Err(e) => return Err(e.into()),
    };

    let mut sent = 0;
    for line in contents.split('\n').filter(|line| !line.is_empty()) {
        queue.send(line).await?;
        sent += 1;
        pace(pacing).await;
    }

    info!(sent, file = %path.display(), queue = %queue.url(), "Reloaded drain file");
    Ok(sent)
}
