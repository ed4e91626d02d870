//! Common types used across Datakube

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatakubeError;

/// Handle identifying a product (dataset type) in the index.
///
/// Products compare by name only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductRef(String);

impl ProductRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A dataset as known by the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef {
    /// Dataset identifier assigned by the index
    pub id: Uuid,

    /// Product the dataset belongs to
    pub product: ProductRef,

    /// Creation time recorded in the dataset's metadata, if any
    #[serde(default)]
    pub creation_time: Option<DateTime<Utc>>,
}

impl DatasetRef {
    pub fn new(id: Uuid, product: ProductRef) -> Self {
        Self {
            id,
            product,
            creation_time: None,
        }
    }

    pub fn with_creation_time(mut self, creation_time: DateTime<Utc>) -> Self {
        self.creation_time = Some(creation_time);
        self
    }
}

/// How lineage sources referenced by a metadata document are resolved
/// when the document is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourcesPolicy {
    /// Sources must already exist in the index
    #[default]
    Verify,
    /// Missing sources are created
    Ensure,
    /// Sources are ignored
    Skip,
}

impl SourcesPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourcesPolicy::Verify => "verify",
            SourcesPolicy::Ensure => "ensure",
            SourcesPolicy::Skip => "skip",
        }
    }
}

impl std::str::FromStr for SourcesPolicy {
    type Err = DatakubeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "verify" => Ok(SourcesPolicy::Verify),
            "ensure" => Ok(SourcesPolicy::Ensure),
            "skip" => Ok(SourcesPolicy::Skip),
            _ => Err(DatakubeError::InvalidSourcesPolicy(s.to_string())),
        }
    }
}

impl std::fmt::Display for SourcesPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
