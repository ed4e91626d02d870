//! Integration tests for the queue drain
//!
//! Exercise the real decoder, registrar and consumer against in-memory
//! collaborators, covering the delete-or-retain contract end to end.

mod common;

use common::{notification, TestEnvironment};
use datakube_common::ProductRef;
use std::time::Duration;

#[tokio::test]
async fn test_registered_message_is_deleted_and_indexed() {
    let env = TestEnvironment::new();
    let id = env.publish("L2/S2A/ARD-METADATA.yaml", "s2a_ard_granule");
    env.queue.push(notification(&["L2/S2A/ARD-METADATA.yaml"]));

    let summary = env.consumer(&[]).drain().await.unwrap();

    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.registered, 1);
    assert!(env.queue.is_empty());

    let registered = env.registered_at("L2/S2A/ARD-METADATA.yaml").await;
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].id, id);
    // creation_dt filled from extent.center_dt
    assert!(registered[0].creation_time.is_some());
    assert_eq!(env.index.range_updates(), vec![ProductRef::new("s2a_ard_granule")]);
}

#[tokio::test]
async fn test_missing_document_retains_message() {
    let env = TestEnvironment::new();
    env.publish("x/a.yaml", "wofs_albers");
    env.queue.push(notification(&["x/a.yaml", "x/missing.yaml"]));

    let summary = env.consumer(&[]).drain().await.unwrap();

    assert_eq!(summary.retained, 1);
    assert_eq!(env.queue.deleted_count(), 0);
    assert_eq!(env.queue.len(), 1);
    // The key that worked is indexed anyway; redelivery re-registers it idempotently.
    assert_eq!(env.registered_at("x/a.yaml").await.len(), 1);
}

#[tokio::test]
async fn test_retained_message_succeeds_on_redelivery() {
    tokio::time::pause();
    let env = TestEnvironment::new();
    env.queue.push(notification(&["x/late.yaml"]));
    let mut consumer = env.consumer(&[]);

    let first = consumer.drain().await.unwrap();
    assert_eq!(first.retained, 1);

    // The document shows up, then the lease runs out and the message comes back.
    env.publish("x/late.yaml", "wofs_albers");
    tokio::time::advance(Duration::from_secs(301)).await;

    let second = consumer.drain().await.unwrap();
    assert_eq!(second.deleted, 1);
    assert!(env.queue.is_empty());
}

#[tokio::test]
async fn test_index_rejection_retains_message() {
    let env = TestEnvironment::new();
    env.publish("x/a.yaml", "wofs_albers");
    env.index.fail_location(&format!("s3://{}/x/a.yaml", common::BUCKET));
    env.queue.push(notification(&["x/a.yaml"]));

    let summary = env.consumer(&[]).drain().await.unwrap();

    assert_eq!(summary.retained, 1);
    assert_eq!(env.index.add_calls(), 1);
}

#[tokio::test]
async fn test_prefix_filters_select_and_skip() {
    let env = TestEnvironment::new();
    env.publish("x/y.yaml", "wofs_albers");
    env.queue.push(notification(&["x/y.yaml"]));

    let selected = env.consumer(&["x/*"]).drain().await.unwrap();
    assert_eq!(selected.registered, 1);

    let env = TestEnvironment::new();
    env.publish("x/y.yaml", "wofs_albers");
    env.queue.push(notification(&["x/y.yaml"]));

    let skipped = env.consumer(&["z/*"]).drain().await.unwrap();
    assert_eq!(skipped.skipped, 1);
    assert_eq!(skipped.deleted, 1);
    assert_eq!(env.index.add_calls(), 0);
}

#[tokio::test]
async fn test_mixed_queue() {
    let env = TestEnvironment::new();
    env.publish("x/ok.yaml", "wofs_albers");
    env.queue.push(notification(&["x/ok.yaml"]));
    env.queue.push(r#"{"Message": "{}"}"#);
    env.queue.push_with_checksum(notification(&["x/ok.yaml"]), "ffffffffffffffffffffffffffffffff");
    env.queue.push("not json at all");

    let summary = env.consumer(&[]).drain().await.unwrap();

    assert_eq!(summary.received, 4);
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.retained, 2);
    assert_eq!(
        env.queue.bodies(),
        vec![r#"{"Message": "{}"}"#.to_string(), "not json at all".to_string()]
    );
}
