//! In-process queue with visibility leases
//!
//! Mirrors the parts of SQS behaviour the consumer relies on: a received message is
//! invisible until its lease expires, each receive issues a fresh receipt handle, and a
//! stale handle cannot delete a message that has since been re-received.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use datakube_common::checksum::compute_md5;
use tokio::time::Instant;
use uuid::Uuid;

use super::{QueueClient, QueueError, QueueMessage, QueueResult, ReceiveOptions};

#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    body: String,
    claimed_checksum: String,
    lease: Option<Lease>,
}

#[derive(Debug, Clone)]
struct Lease {
    receipt_handle: String,
    visible_at: Instant,
}

impl StoredMessage {
    fn is_visible(&self, now: Instant) -> bool {
        self.lease.as_ref().map_or(true, |lease| lease.visible_at <= now)
    }
}

#[derive(Debug, Default)]
struct State {
    messages: VecDeque<StoredMessage>,
    deleted: u64,
    receives: u64,
}

/// Queue held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    name: String,
    state: Mutex<State>,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not wedge every other assertion.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue a body with the checksum the real service would report
    pub fn push(&self, body: impl Into<String>) {
        let body = body.into();
        let checksum = compute_md5(body.as_bytes());
        self.push_with_checksum(body, checksum);
    }

    /// Enqueue a body with an arbitrary claimed checksum (simulates corruption)
    pub fn push_with_checksum(&self, body: impl Into<String>, claimed_checksum: impl Into<String>) {
        self.lock().messages.push_back(StoredMessage {
            id: Uuid::new_v4().to_string(),
            body: body.into(),
            claimed_checksum: claimed_checksum.into(),
            lease: None,
        });
    }

    /// Bodies of every message still in the queue, leased or not
    pub fn bodies(&self) -> Vec<String> {
        self.lock().messages.iter().map(|m| m.body.clone()).collect()
    }

    /// Messages still in the queue, leased or not
    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful deletes
    pub fn deleted_count(&self) -> u64 {
        self.lock().deleted
    }

    /// Number of receive calls made, including empty ones
    pub fn receive_count(&self) -> u64 {
        self.lock().receives
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn receive(&self, options: &ReceiveOptions) -> QueueResult<Vec<QueueMessage>> {
        let now = Instant::now();
        let visibility = Duration::from_secs(u64::try_from(options.visibility_timeout_secs).unwrap_or(0));
        let limit = usize::try_from(options.max_messages).unwrap_or(1);

        let mut state = self.lock();
        state.receives += 1;

        let mut received = Vec::new();
        for stored in state.messages.iter_mut() {
            if received.len() >= limit {
                break;
            }
            if !stored.is_visible(now) {
                continue;
            }

            let receipt_handle = Uuid::new_v4().to_string();
            stored.lease = Some(Lease {
                receipt_handle: receipt_handle.clone(),
                visible_at: now + visibility,
            });

            received.push(QueueMessage {
                id: stored.id.clone(),
                body: stored.body.clone(),
                receipt_handle,
                claimed_checksum: stored.claimed_checksum.clone(),
            });
        }

        Ok(received)
    }

    async fn delete(&self, receipt_handle: &str) -> QueueResult<()> {
        let mut state = self.lock();
        let position = state.messages.iter().position(|m| {
            m.lease
                .as_ref()
                .is_some_and(|lease| lease.receipt_handle == receipt_handle)
        });

        match position {
            Some(index) => {
                state.messages.remove(index);
                state.deleted += 1;
                Ok(())
            },
            None => Err(QueueError::Delete(format!("unknown receipt handle: {receipt_handle}"))),
        }
    }

    async fn send(&self, body: &str) -> QueueResult<()> {
        self.push(body);
        Ok(())
    }

    async fn approximate_count(&self) -> QueueResult<u64> {
        let now = Instant::now();
        let visible = self.lock().messages.iter().filter(|m| m.is_visible(now)).count();
        Ok(visible as u64)
    }

    fn url(&self) -> &str {
        &self.name
    }
}
