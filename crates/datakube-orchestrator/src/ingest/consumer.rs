//! Queue consumer
//!
//! A drain receives batches until the queue reports nothing available. Each message
//! goes through validate, decode, register and is deleted only when every selected
//! key registered. Retained messages reappear after their visibility timeout and are
//! retried by whichever consumer receives them next.

use datakube_common::ProductRef;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{
    decoder::EventDecoder,
    outcome::{BatchOutcome, ProductTracker, RegistrationOutcome},
    registrar::Registrar,
    validator::validate,
};
use crate::{
    index::DatasetIndex,
    queue::{QueueClient, QueueMessage, QueueResult, ReceiveOptions},
};

/// Counters for one drain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub received: u64,
    pub deleted: u64,
    pub retained: u64,
    /// Discarded on checksum mismatch
    pub rejected: u64,
    pub registered: u64,
    pub skipped: u64,
    /// Messages whose handling outlasted the visibility timeout
    pub overruns: u64,
    pub products_refreshed: Vec<ProductRef>,
}

/// What happened to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Deleted,
    Retained,
    Rejected,
}

pub struct Consumer {
    queue: Arc<dyn QueueClient>,
    decoder: EventDecoder,
    registrar: Arc<dyn Registrar>,
    index: Arc<dyn DatasetIndex>,
    receive_options: ReceiveOptions,
    refresh_dashboard: bool,
    products: ProductTracker,
}

impl Consumer {
    pub fn new(
        queue: Arc<dyn QueueClient>,
        decoder: EventDecoder,
        registrar: Arc<dyn Registrar>,
        index: Arc<dyn DatasetIndex>,
        receive_options: ReceiveOptions,
    ) -> Self {
        Self {
            queue,
            decoder,
            registrar,
            index,
            receive_options,
            refresh_dashboard: false,
            products: ProductTracker::default(),
        }
    }

    pub fn with_dashboard_refresh(mut self, enabled: bool) -> Self {
        self.refresh_dashboard = enabled;
        self
    }

    /// Receive and handle messages until a receive comes back empty.
    ///
    /// Per-message failures never abort the drain. Receive failures do: the queue
    /// service is unreachable and the caller decides what to do.
    pub async fn drain(&mut self) -> QueueResult<PassSummary> {
        let mut summary = PassSummary::default();

        loop {
            // Leases start when the receive is issued, not when a message is handled.
            let received_at = Instant::now();
            let messages = self.queue.receive(&self.receive_options).await?;

            if messages.is_empty() {
                debug!(queue = %self.queue.url(), "No messages available");
                self.recompute_ranges(&mut summary).await;
                break;
            }

            for message in messages {
                summary.received += 1;
                match self.handle(&message, received_at, &mut summary).await {
                    Disposition::Deleted => summary.deleted += 1,
                    Disposition::Retained => summary.retained += 1,
                    Disposition::Rejected => summary.rejected += 1,
                }
            }
        }

        if summary.received > 0 {
            info!(
                received = summary.received,
                deleted = summary.deleted,
                retained = summary.retained,
                rejected = summary.rejected,
                registered = summary.registered,
                skipped = summary.skipped,
                "Processed: {} messages",
                summary.received
            );
        }

        Ok(summary)
    }

    /// Handle one message and decide its fate. `received_at` is when the receive that
    /// produced the message was issued.
    pub async fn handle(
        &mut self,
        message: &QueueMessage,
        received_at: Instant,
        summary: &mut PassSummary,
    ) -> Disposition {
        if !validate(message) {
            self.delete(message).await;
            return Disposition::Rejected;
        }

        info!(message_id = %message.id, "Processing message");
        let outcome = self.process(&message.body).await;

        summary.skipped += outcome.skipped_count() as u64;
        for dataset in outcome.registered() {
            summary.registered += 1;
            self.products.record(&dataset.product);
        }

        let elapsed = received_at.elapsed();
        let visibility = Duration::from_secs(
            u64::try_from(self.receive_options.visibility_timeout_secs).unwrap_or(0),
        );
        if elapsed > visibility {
            summary.overruns += 1;
            error!(
                message_id = %message.id,
                elapsed_ms = elapsed.as_millis() as u64,
                visibility_timeout_secs = visibility.as_secs(),
                "Exceeded max job time, message may be processed multiple times"
            );
        }

        if outcome.all_ok() {
            info!(
                message_id = %message.id,
                "Successfully processed {} datasets, {} datasets were skipped",
                outcome.registered().count(),
                outcome.skipped_count()
            );
            if self.delete(message).await {
                Disposition::Deleted
            } else {
                Disposition::Retained
            }
        } else {
            for (key, failure) in outcome.failures() {
                error!(message_id = %message.id, key = %key, "{} had error: {}", key, failure);
            }
            Disposition::Retained
        }
    }

    /// Decode a body and register every selected record
    async fn process(&self, body: &str) -> BatchOutcome {
        let decoded = match self.decoder.decode(body) {
            Ok(decoded) => decoded,
            Err(e) => return BatchOutcome::from_decode_error(e),
        };

        let mut outcome = BatchOutcome::new();
        for record in decoded.skipped {
            outcome.push(RegistrationOutcome::skipped(record.key));
        }

        for record in decoded.selected {
            let result = self.registrar.register(&record).await;
            outcome.push(match result {
                Ok(dataset) => RegistrationOutcome::registered(record.key, dataset),
                Err(e) => RegistrationOutcome::failed(record.key, e),
            });
        }

        outcome
    }

    async fn delete(&self, message: &QueueMessage) -> bool {
        match self.queue.delete(&message.receipt_handle).await {
            Ok(()) => {
                debug!(message_id = %message.id, "Deleted message");
                true
            },
            Err(e) => {
                // The lease may have lapsed; the message will come back and be retried.
                warn!(message_id = %message.id, error = %e, "Failed to delete message");
                false
            },
        }
    }

    /// Recompute ranges for every product touched since the last recomputation
    async fn recompute_ranges(&mut self, summary: &mut PassSummary) {
        if self.products.is_empty() {
            return;
        }

        let products = self.products.take();
        for product in &products {
            match self.index.update_product_range(product).await {
                Ok(()) => info!(product = %product, "Updated product range"),
                Err(e) => error!(product = %product, error = %e, "Failed to update product range"),
            }
        }

        if self.refresh_dashboard {
            if let Err(e) = self.index.refresh_dashboard(&products).await {
                error!(error = %e, "Failed to refresh dashboard");
            }
        }

        summary.products_refreshed = products;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::{
        index::InMemoryIndex,
        ingest::{
            decoder::{BodyFormat, ObjectRecord},
            filter::KeyFilter,
            registrar::RegistrationError,
        },
        queue::InMemoryQueue,
        storage::StorageError,
    };
    use async_trait::async_trait;
    use datakube_common::DatasetRef;
    use serde_json::json;
    use std::{collections::HashSet, sync::Mutex};
    use uuid::Uuid;

    /// Registers every key except the ones listed as failing; records every call
    #[derive(Default)]
    struct FakeRegistrar {
        failing: HashSet<String>,
        calls: Mutex<Vec<String>>,
        delay: Duration,
    }

    impl FakeRegistrar {
        fn failing(keys: &[&str]) -> Self {
            Self {
                failing: keys.iter().map(|k| k.to_string()).collect(),
                ..Self::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Registrar for FakeRegistrar {
        async fn register(&self, record: &ObjectRecord) -> Result<DatasetRef, RegistrationError> {
            self.calls.lock().unwrap().push(record.key.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.failing.contains(&record.key) {
                return Err(RegistrationError::Storage(StorageError::NotFound {
                    bucket: record.bucket.clone(),
                    key: record.key.clone(),
                }));
            }
            let product = record.key.split('/').next().unwrap_or_default();
            Ok(DatasetRef::new(Uuid::new_v4(), ProductRef::new(product)))
        }
    }

    fn body(keys: &[&str]) -> String {
        let records: Vec<_> = keys
            .iter()
            .map(|key| json!({"s3": {"bucket": {"name": "bucket"}, "object": {"key": key}}}))
            .collect();
        json!({"Message": json!({"Records": records}).to_string()}).to_string()
    }

    struct Harness {
        queue: Arc<InMemoryQueue>,
        registrar: Arc<FakeRegistrar>,
        index: Arc<InMemoryIndex>,
        consumer: Consumer,
    }

    fn harness(registrar: FakeRegistrar, patterns: &[&str]) -> Harness {
        harness_with_options(registrar, patterns, ReceiveOptions::new(10, 0, 300))
    }

    fn harness_with_options(
        registrar: FakeRegistrar,
        patterns: &[&str],
        options: ReceiveOptions,
    ) -> Harness {
        let queue = Arc::new(InMemoryQueue::new("live"));
        let registrar = Arc::new(registrar);
        let index = Arc::new(InMemoryIndex::new());
        for product in ["x", "y"] {
            index.insert(DatasetRef::new(Uuid::new_v4(), ProductRef::new(product)), None, &[]);
        }
        let consumer = Consumer::new(
            queue.clone(),
            EventDecoder::new(BodyFormat::Notification, KeyFilter::new(patterns).unwrap()),
            registrar.clone(),
            index.clone(),
            options,
        );
        Harness {
            queue,
            registrar,
            index,
            consumer,
        }
    }

    #[tokio::test]
    async fn test_all_keys_ok_deletes_once() {
        let mut h = harness(FakeRegistrar::default(), &[]);
        h.queue.push(body(&["x/a.yaml", "y/b.yaml"]));

        let summary = h.consumer.drain().await.unwrap();

        assert_eq!(summary.received, 1);
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.registered, 2);
        assert_eq!(h.queue.deleted_count(), 1);
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn test_checksum_mismatch_deletes_without_registering() {
        let mut h = harness(FakeRegistrar::default(), &[]);
        h.queue.push_with_checksum(body(&["x/a.yaml"]), "0123456789abcdef0123456789abcdef");

        let summary = h.consumer.drain().await.unwrap();

        assert_eq!(summary.rejected, 1);
        assert!(h.registrar.calls().is_empty());
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_retains_message() {
        let mut h = harness(FakeRegistrar::failing(&["y/b.yaml"]), &[]);
        h.queue.push(body(&["x/a.yaml", "y/b.yaml", "x/c.yaml"]));

        let summary = h.consumer.drain().await.unwrap();

        assert_eq!(summary.retained, 1);
        assert_eq!(h.queue.deleted_count(), 0);
        assert_eq!(h.queue.len(), 1);
        // Later keys are still attempted after a failure
        assert_eq!(h.registrar.calls(), vec!["x/a.yaml", "y/b.yaml", "x/c.yaml"]);
        // Successful keys still count towards range recomputation
        assert_eq!(summary.products_refreshed, vec![ProductRef::new("x")]);
    }

    #[tokio::test]
    async fn test_matching_filter_selects_key() {
        let mut h = harness(FakeRegistrar::default(), &["x/*"]);
        h.queue.push(body(&["x/y.yaml"]));

        let summary = h.consumer.drain().await.unwrap();

        assert_eq!(h.registrar.calls(), vec!["x/y.yaml"]);
        assert_eq!(summary.deleted, 1);
    }

    #[tokio::test]
    async fn test_filtered_out_message_is_still_deleted() {
        let mut h = harness(FakeRegistrar::default(), &["z/*"]);
        h.queue.push(body(&["x/y.yaml"]));

        let summary = h.consumer.drain().await.unwrap();

        assert!(h.registrar.calls().is_empty());
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.deleted, 1);
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn test_no_record_is_retained() {
        let mut h = harness(FakeRegistrar::default(), &[]);
        h.queue.push(r#"{"Message": "{}"}"#);

        let summary = h.consumer.drain().await.unwrap();

        assert_eq!(summary.retained, 1);
        assert_eq!(h.queue.len(), 1);
        assert!(h.registrar.calls().is_empty());
    }

    #[tokio::test]
    async fn test_ranges_recomputed_once_per_product_when_queue_empties() {
        let mut h = harness(FakeRegistrar::default(), &[]);
        h.queue.push(body(&["x/a.yaml", "x/b.yaml"]));
        h.queue.push(body(&["y/c.yaml", "x/d.yaml"]));
        let mut consumer = h.consumer.with_dashboard_refresh(true);

        let summary = consumer.drain().await.unwrap();

        assert_eq!(
            h.index.range_updates(),
            vec![ProductRef::new("x"), ProductRef::new("y")]
        );
        assert_eq!(
            h.index.dashboard_refreshes(),
            vec![vec![ProductRef::new("x"), ProductRef::new("y")]]
        );
        assert_eq!(summary.products_refreshed.len(), 2);

        // Nothing new processed, nothing recomputed
        consumer.drain().await.unwrap();
        assert_eq!(h.index.range_updates().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_queue_drains_immediately() {
        let mut h = harness(FakeRegistrar::default(), &[]);
        let summary = h.consumer.drain().await.unwrap();

        assert_eq!(summary, PassSummary::default());
        assert_eq!(h.queue.receive_count(), 1);
        assert!(h.index.range_updates().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fractional_overrun_is_reported() {
        let mut h = harness_with_options(
            FakeRegistrar::slow(Duration::from_millis(1600)),
            &[],
            ReceiveOptions::new(1, 0, 1),
        );
        h.queue.push(body(&["x/a.yaml"]));

        let summary = h.consumer.drain().await.unwrap();

        assert_eq!(summary.overruns, 1);
        // The overrun is logged only; the message is still finalised
        assert_eq!(summary.deleted, 1);
        assert!(h.queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_within_lease_is_not_an_overrun() {
        let mut h = harness_with_options(
            FakeRegistrar::slow(Duration::from_millis(900)),
            &[],
            ReceiveOptions::new(1, 0, 1),
        );
        h.queue.push(body(&["x/a.yaml"]));

        let summary = h.consumer.drain().await.unwrap();

        assert_eq!(summary.overruns, 0);
        assert_eq!(summary.deleted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_overrun_counts_from_receive() {
        let mut h = harness_with_options(
            FakeRegistrar::slow(Duration::from_millis(800)),
            &[],
            ReceiveOptions::new(10, 0, 1),
        );
        for key in ["x/a.yaml", "x/b.yaml", "x/c.yaml"] {
            h.queue.push(body(&[key]));
        }

        let summary = h.consumer.drain().await.unwrap();

        // Handled at 0.8 s, 1.6 s and 2.4 s after a receive leasing them for 1 s
        assert_eq!(summary.received, 3);
        assert_eq!(summary.overruns, 2);
        assert_eq!(summary.deleted, 3);
    }
}
