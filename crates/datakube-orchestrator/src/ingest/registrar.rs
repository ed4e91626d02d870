//! Dataset registration
//!
//! One object key in, one dataset out. The default registrar reads the metadata
//! document from object storage, patches a missing `creation_dt` and hands it to the
//! index together with the object's location URI.

use async_trait::async_trait;
use datakube_common::{DatasetRef, SourcesPolicy};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

use super::decoder::ObjectRecord;
use crate::{
    index::{DatasetIndex, IndexError},
    storage::{MetadataSource, StorageError},
};

/// Why a single key could not be registered
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Registers one object with the index
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register(&self, record: &ObjectRecord) -> Result<DatasetRef, RegistrationError>;
}

/// Near-real-time documents may lack `creation_dt`; fall back to `extent.center_dt`.
///
/// Returns true when the document was changed.
pub fn fill_creation_dt(document: &mut Value) -> bool {
    let Some(fields) = document.as_object() else {
        return false;
    };
    if fields.contains_key("creation_dt") {
        return false;
    }

    let Some(center_dt) = document.pointer("/extent/center_dt").cloned() else {
        return false;
    };

    match document.as_object_mut() {
        Some(fields) => {
            fields.insert("creation_dt".to_string(), center_dt);
            true
        },
        None => false,
    }
}

/// Storage-backed registrar
#[derive(Clone)]
pub struct DatasetRegistrar {
    source: Arc<dyn MetadataSource>,
    index: Arc<dyn DatasetIndex>,
    sources_policy: SourcesPolicy,
}

impl DatasetRegistrar {
    pub fn new(
        source: Arc<dyn MetadataSource>,
        index: Arc<dyn DatasetIndex>,
        sources_policy: SourcesPolicy,
    ) -> Self {
        Self {
            source,
            index,
            sources_policy,
        }
    }
}

#[async_trait]
impl Registrar for DatasetRegistrar {
    #[instrument(skip(self), fields(bucket = %record.bucket, key = %record.key))]
    async fn register(&self, record: &ObjectRecord) -> Result<DatasetRef, RegistrationError> {
        let mut document = self.source.fetch(&record.bucket, &record.key).await?;

        if fill_creation_dt(&mut document) {
            debug!("Filled missing creation_dt from extent.center_dt");
        }

        let uri = record.uri();
        let dataset = self
            .index
            .add_dataset(&document, &uri, self.sources_policy)
            .await?;

        debug!(dataset_id = %dataset.id, product = %dataset.product, uri = %uri, "Indexed dataset");
        Ok(dataset)
    }
}
