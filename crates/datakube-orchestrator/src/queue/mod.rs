//! Queue client abstraction
//!
//! The consumer and the dead-letter tools only ever see [`QueueClient`]; the SQS
//! implementation lives in [`sqs`] and an in-process queue with visibility leases in
//! [`memory`].
//!
//! Receiving hides a message from other consumers for the visibility timeout. A
//! message that is not deleted within that window becomes visible again; redelivery
//! is the queue service's job, never the application's.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod sqs;

pub use memory::InMemoryQueue;
pub use sqs::SqsQueue;

/// SQS rejects batches larger than this.
pub const MAX_RECEIVE_BATCH: i32 = 10;

/// SQS rejects long-poll waits longer than this.
pub const MAX_WAIT_TIME_SECS: i32 = 20;

/// Errors raised by queue operations
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to resolve queue '{name}': {message}")]
    Resolve { name: String, message: String },

    #[error("Failed to receive messages: {0}")]
    Receive(String),

    #[error("Failed to delete message: {0}")]
    Delete(String),

    #[error("Failed to send message: {0}")]
    Send(String),

    #[error("Failed to read queue attributes: {0}")]
    Attributes(String),
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// A message as handed out by a receive call. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: String,
    pub body: String,
    /// Opaque lease token; only valid for the receive that produced it
    pub receipt_handle: String,
    /// Checksum reported by the queue service (`MD5OfBody`)
    pub claimed_checksum: String,
}

/// Parameters for one receive call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Batch size, 1..=10
    pub max_messages: i32,
    /// Long-poll duration in seconds, 0..=20
    pub wait_time_secs: i32,
    /// Lease duration in seconds
    pub visibility_timeout_secs: i32,
}

impl ReceiveOptions {
    pub fn new(max_messages: i32, wait_time_secs: i32, visibility_timeout_secs: i32) -> Self {
        Self {
            max_messages: max_messages.clamp(1, MAX_RECEIVE_BATCH),
            wait_time_secs: wait_time_secs.clamp(0, MAX_WAIT_TIME_SECS),
            visibility_timeout_secs: visibility_timeout_secs.max(0),
        }
    }

    /// Single message, no long poll. Used by the dead-letter tools.
    pub fn single(visibility_timeout_secs: i32) -> Self {
        Self::new(1, 0, visibility_timeout_secs)
    }
}

/// Capability over a managed message queue.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Receive up to `max_messages`; an empty vec means nothing is available right now
    async fn receive(&self, options: &ReceiveOptions) -> QueueResult<Vec<QueueMessage>>;

    /// Delete a message by the receipt handle of its current lease
    async fn delete(&self, receipt_handle: &str) -> QueueResult<()>;

    /// Enqueue a body verbatim
    async fn send(&self, body: &str) -> QueueResult<()>;

    /// Approximate number of visible messages; may lag behind reality
    async fn approximate_count(&self) -> QueueResult<u64>;

    /// Resolved queue URL (or name for in-process queues)
    fn url(&self) -> &str;
}
