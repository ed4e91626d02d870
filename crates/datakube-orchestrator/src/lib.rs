//! Datakube Orchestrator Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Queue-driven ingestion and reconciliation for a spatial data index.
//!
//! # Overview
//!
//! Storage change notifications arrive on an SQS queue. Each one names objects whose
//! metadata documents are registered with the index; the message is deleted only when
//! every object registered. Separately, archive policies retire datasets older than a
//! retention window, together with their immediate lineage sources.
//!
//! - **Queue**: [`queue::QueueClient`] over SQS, plus an in-memory queue with leases
//! - **Ingest**: validation, decoding, key filtering, registration, delete-or-retain
//! - **Archive**: retention policies and location-based archival
//! - **Index**: [`index::DatasetIndex`] over HTTP, plus an in-memory index
//! - **Storage**: metadata documents and key listings from S3
//! - **Scheduler / Orchestrator**: triggers and the single event loop running them
//!
//! # Delivery guarantees
//!
//! At-least-once. A retained message is redelivered after its visibility timeout, and
//! a message processed for longer than that timeout may be processed twice. Index
//! registration is expected to be idempotent.
//!
//! # Example
//!
//! ```no_run
//! use datakube_orchestrator::{
//!     archive::Archiver,
//!     index::InMemoryIndex,
//!     ingest::{Consumer, DatasetRegistrar, EventDecoder},
//!     queue::{InMemoryQueue, ReceiveOptions},
//!     storage::InMemoryMetadataSource,
//!     Orchestrator,
//! };
//! use datakube_common::SourcesPolicy;
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let index = Arc::new(InMemoryIndex::new());
//! let registrar = DatasetRegistrar::new(
//!     Arc::new(InMemoryMetadataSource::new()),
//!     index.clone(),
//!     SourcesPolicy::Verify,
//! );
//! let consumer = Consumer::new(
//!     Arc::new(InMemoryQueue::new("live")),
//!     EventDecoder::default(),
//!     Arc::new(registrar),
//!     index.clone(),
//!     ReceiveOptions::new(10, 20, 300),
//! );
//!
//! let orchestrator = Orchestrator::new(
//!     Some(consumer),
//!     Archiver::new(index),
//!     Vec::new(),
//!     Duration::from_secs(60),
//! );
//! orchestrator.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod aws;
pub mod cli;
pub mod config;
pub mod error;
pub mod index;
pub mod ingest;
pub mod orchestrator;
pub mod queue;
pub mod scheduler;
pub mod storage;

// Re-export commonly used types
pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::Orchestrator;
