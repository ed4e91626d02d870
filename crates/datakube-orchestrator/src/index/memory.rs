//! In-process index used by tests and dry runs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use datakube_common::{DatasetRef, ProductRef, SourcesPolicy};
use serde_json::Value;
use std::{
    collections::{BTreeMap, HashSet},
    sync::{Mutex, MutexGuard},
};
use uuid::Uuid;

use super::{DatasetIndex, IndexError, IndexResult};

#[derive(Debug, Clone)]
struct Entry {
    dataset: DatasetRef,
    locations: Vec<String>,
    sources: Vec<Uuid>,
    archived: bool,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<Uuid, Entry>,
    failing_locations: HashSet<String>,
    add_calls: u64,
    archive_calls: Vec<Vec<Uuid>>,
    range_updates: Vec<ProductRef>,
    dashboard_refreshes: Vec<Vec<ProductRef>>,
}

/// Index kept in memory. Records every mutating call so tests can assert on them.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    state: Mutex<State>,
}

fn document_id(document: &Value) -> IndexResult<Uuid> {
    let raw = document
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| IndexError::InvalidDocument("missing id".to_string()))?;
    Uuid::parse_str(raw).map_err(|e| IndexError::InvalidDocument(format!("bad id '{raw}': {e}")))
}

fn document_product(document: &Value) -> IndexResult<ProductRef> {
    document
        .pointer("/product/name")
        .or_else(|| document.get("product_type"))
        .and_then(Value::as_str)
        .map(ProductRef::new)
        .ok_or_else(|| IndexError::InvalidDocument("missing product name".to_string()))
}

fn document_creation_time(document: &Value) -> Option<DateTime<Utc>> {
    document
        .get("creation_dt")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Source documents embedded under `lineage.source_datasets`
fn document_sources(document: &Value) -> Vec<&Value> {
    document
        .pointer("/lineage/source_datasets")
        .and_then(Value::as_object)
        .map(|sources| sources.values().collect())
        .unwrap_or_default()
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed a dataset with its immediate sources
    pub fn insert(&self, dataset: DatasetRef, location: Option<&str>, sources: &[Uuid]) {
        self.lock().entries.insert(
            dataset.id,
            Entry {
                dataset,
                locations: location.map(str::to_string).into_iter().collect(),
                sources: sources.to_vec(),
                archived: false,
            },
        );
    }

    /// Make every registration and lookup at `uri` fail
    pub fn fail_location(&self, uri: &str) {
        self.lock().failing_locations.insert(uri.to_string());
    }

    pub fn is_archived(&self, id: Uuid) -> bool {
        self.lock().entries.get(&id).is_some_and(|entry| entry.archived)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.lock().entries.contains_key(&id)
    }

    pub fn add_calls(&self) -> u64 {
        self.lock().add_calls
    }

    pub fn archive_calls(&self) -> Vec<Vec<Uuid>> {
        self.lock().archive_calls.clone()
    }

    pub fn range_updates(&self) -> Vec<ProductRef> {
        self.lock().range_updates.clone()
    }

    pub fn dashboard_refreshes(&self) -> Vec<Vec<ProductRef>> {
        self.lock().dashboard_refreshes.clone()
    }
}

#[async_trait]
impl DatasetIndex for InMemoryIndex {
    async fn add_dataset(
        &self,
        document: &Value,
        uri: &str,
        sources_policy: SourcesPolicy,
    ) -> IndexResult<DatasetRef> {
        let mut state = self.lock();
        state.add_calls += 1;

        if state.failing_locations.contains(uri) {
            return Err(IndexError::Rejected(format!("registration refused for {uri}")));
        }

        let id = document_id(document)?;
        let product = document_product(document)?;

        let mut source_ids = Vec::new();
        if sources_policy != SourcesPolicy::Skip {
            for source in document_sources(document) {
                let source_id = document_id(source)?;
                if !state.entries.contains_key(&source_id) {
                    match sources_policy {
                        SourcesPolicy::Verify => {
                            return Err(IndexError::MissingSource {
                                dataset_id: id,
                                source_id,
                            });
                        },
                        _ => {
                            let mut source_ref = DatasetRef::new(source_id, document_product(source)?);
                            source_ref.creation_time = document_creation_time(source);
                            state.entries.insert(
                                source_id,
                                Entry {
                                    dataset: source_ref,
                                    locations: Vec::new(),
                                    sources: Vec::new(),
                                    archived: false,
                                },
                            );
                        },
                    }
                }
                source_ids.push(source_id);
            }
        }

        let entry = state.entries.entry(id).or_insert_with(|| Entry {
            dataset: DatasetRef::new(id, product.clone()),
            locations: Vec::new(),
            sources: Vec::new(),
            archived: false,
        });

        entry.dataset.product = product;
        entry.dataset.creation_time = document_creation_time(document);
        entry.archived = false;
        if !entry.locations.iter().any(|location| location == uri) {
            entry.locations.push(uri.to_string());
        }
        if !source_ids.is_empty() {
            entry.sources = source_ids;
        }

        Ok(entry.dataset.clone())
    }

    async fn search_datasets(
        &self,
        product: &ProductRef,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> IndexResult<Vec<DatasetRef>> {
        Ok(self
            .lock()
            .entries
            .values()
            .filter(|entry| !entry.archived && &entry.dataset.product == product)
            .filter(|entry| {
                entry
                    .dataset
                    .creation_time
                    .is_some_and(|created| created >= from && created <= to)
            })
            .map(|entry| entry.dataset.clone())
            .collect())
    }

    async fn dataset_sources(&self, id: Uuid) -> IndexResult<Vec<DatasetRef>> {
        let state = self.lock();
        let entry = state.entries.get(&id).ok_or(IndexError::NotFound(id))?;

        Ok(entry
            .sources
            .iter()
            .filter_map(|source_id| state.entries.get(source_id))
            .map(|source| source.dataset.clone())
            .collect())
    }

    async fn archive_datasets(&self, ids: &[Uuid]) -> IndexResult<()> {
        let mut state = self.lock();

        if let Some(missing) = ids.iter().find(|id| !state.entries.contains_key(id)) {
            return Err(IndexError::NotFound(*missing));
        }

        for id in ids {
            if let Some(entry) = state.entries.get_mut(id) {
                entry.archived = true;
            }
        }
        state.archive_calls.push(ids.to_vec());
        Ok(())
    }

    async fn datasets_for_location(&self, uri: &str) -> IndexResult<Vec<DatasetRef>> {
        let state = self.lock();
        if state.failing_locations.contains(uri) {
            return Err(IndexError::Rejected(format!("lookup refused for {uri}")));
        }

        Ok(state
            .entries
            .values()
            .filter(|entry| !entry.archived && entry.locations.iter().any(|location| location == uri))
            .map(|entry| entry.dataset.clone())
            .collect())
    }

    async fn update_product_range(&self, product: &ProductRef) -> IndexResult<()> {
        let mut state = self.lock();
        if !state.entries.values().any(|entry| &entry.dataset.product == product) {
            return Err(IndexError::UnknownProduct(product.name().to_string()));
        }
        state.range_updates.push(product.clone());
        Ok(())
    }

    async fn refresh_dashboard(&self, products: &[ProductRef]) -> IndexResult<()> {
        self.lock().dashboard_refreshes.push(products.to_vec());
        Ok(())
    }
}
