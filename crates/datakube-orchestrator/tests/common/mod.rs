//! Common test utilities for Datakube orchestrator integration tests
//!
//! Wires a consumer over the in-memory queue, metadata source and index so tests can
//! drive whole drains without AWS or an index service.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use datakube_common::{DatasetRef, SourcesPolicy};
use datakube_orchestrator::{
    index::{DatasetIndex, InMemoryIndex},
    ingest::{BodyFormat, Consumer, DatasetRegistrar, EventDecoder, KeyFilter},
    queue::{InMemoryQueue, ReceiveOptions},
    storage::InMemoryMetadataSource,
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub const BUCKET: &str = "dea-public-data";

/// Notification body naming `keys` in [`BUCKET`]
pub fn notification(keys: &[&str]) -> String {
    let records: Vec<Value> = keys
        .iter()
        .map(|key| json!({"s3": {"bucket": {"name": BUCKET}, "object": {"key": key}}}))
        .collect();
    json!({"Message": json!({"Records": records}).to_string()}).to_string()
}

/// Minimal metadata document for a dataset of `product`
pub fn document(id: Uuid, product: &str) -> Value {
    json!({
        "id": id.to_string(),
        "product": {"name": product},
        "extent": {"center_dt": "2019-03-20T02:47:43Z"},
        "lineage": {"source_datasets": {}}
    })
}

pub struct TestEnvironment {
    pub queue: Arc<InMemoryQueue>,
    pub source: Arc<InMemoryMetadataSource>,
    pub index: Arc<InMemoryIndex>,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(InMemoryQueue::new("landsat-to-wofs")),
            source: Arc::new(InMemoryMetadataSource::new()),
            index: Arc::new(InMemoryIndex::new()),
        }
    }

    /// Store a document for `key` and return its dataset id
    pub fn publish(&self, key: &str, product: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.source.insert(BUCKET, key, document(id, product));
        id
    }

    pub fn consumer(&self, patterns: &[&str]) -> Consumer {
        self.consumer_with_index(self.index.clone(), patterns)
    }

    pub fn consumer_with_index(&self, index: Arc<dyn DatasetIndex>, patterns: &[&str]) -> Consumer {
        let registrar = DatasetRegistrar::new(self.source.clone(), index.clone(), SourcesPolicy::Verify);
        Consumer::new(
            self.queue.clone(),
            EventDecoder::new(BodyFormat::Notification, KeyFilter::new(patterns).unwrap()),
            Arc::new(registrar),
            index,
            ReceiveOptions::new(10, 0, 300),
        )
    }

    pub async fn registered_at(&self, key: &str) -> Vec<DatasetRef> {
        self.index
            .datasets_for_location(&format!("s3://{}/{}", BUCKET, key))
            .await
            .unwrap()
    }
}
