//! Spatial data index capability
//!
//! The index owns datasets, products and lineage. Ingestion and archival only reach it
//! through [`DatasetIndex`]: [`HttpIndex`] talks to the index service, [`InMemoryIndex`]
//! backs the tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use datakube_common::{DatasetRef, ProductRef, SourcesPolicy};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub mod http;
pub mod memory;

pub use http::HttpIndex;
pub use memory::InMemoryIndex;

/// Errors raised by the index
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Index rejected request: {0}")]
    Rejected(String),

    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    #[error("Dataset not found: {0}")]
    NotFound(Uuid),

    #[error("Missing lineage source {source_id} for dataset {dataset_id}")]
    MissingSource { dataset_id: Uuid, source_id: Uuid },

    #[error("Invalid dataset document: {0}")]
    InvalidDocument(String),
}

pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Operations the engine needs from the index
#[async_trait]
pub trait DatasetIndex: Send + Sync {
    /// Register a metadata document found at `uri`. Must be idempotent per dataset id.
    async fn add_dataset(
        &self,
        document: &Value,
        uri: &str,
        sources_policy: SourcesPolicy,
    ) -> IndexResult<DatasetRef>;

    /// Active datasets of `product` created within `[from, to]`
    async fn search_datasets(
        &self,
        product: &ProductRef,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> IndexResult<Vec<DatasetRef>>;

    /// Immediate lineage sources of a dataset (one level)
    async fn dataset_sources(&self, id: Uuid) -> IndexResult<Vec<DatasetRef>>;

    async fn archive_datasets(&self, ids: &[Uuid]) -> IndexResult<()>;

    /// Active datasets registered at a location URI
    async fn datasets_for_location(&self, uri: &str) -> IndexResult<Vec<DatasetRef>>;

    /// Recompute the spatial/temporal extent summary of a product
    async fn update_product_range(&self, product: &ProductRef) -> IndexResult<()>;

    /// Regenerate the display layer for the given products
    async fn refresh_dashboard(&self, products: &[ProductRef]) -> IndexResult<()>;
}
