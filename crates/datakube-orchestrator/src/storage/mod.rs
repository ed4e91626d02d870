//! Object storage access
//!
//! Metadata documents are read straight from S3 on every registration; nothing is
//! cached, so a re-delivered message always sees the current document.

use async_trait::async_trait;
use aws_sdk_s3::{error::DisplayErrorContext, Client};
use serde_json::Value;
use std::{collections::HashMap, sync::Mutex};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors raised while reading object storage
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to fetch s3://{bucket}/{key}: {message}")]
    Fetch {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Failed to list s3://{bucket}/{prefix}: {message}")]
    List {
        bucket: String,
        prefix: String,
        message: String,
    },

    #[error("Metadata document s3://{bucket}/{key} is not valid YAML or JSON: {message}")]
    Parse {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Source of dataset metadata documents
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch and parse the document stored at `(bucket, key)`
    async fn fetch(&self, bucket: &str, key: &str) -> StorageResult<Value>;
}

/// Parse a metadata document. YAML is a superset of JSON, so one parser covers both.
pub fn parse_document(bucket: &str, key: &str, bytes: &[u8]) -> StorageResult<Value> {
    let parse_error = |message: String| StorageError::Parse {
        bucket: bucket.to_string(),
        key: key.to_string(),
        message,
    };

    let text = std::str::from_utf8(bytes).map_err(|e| parse_error(e.to_string()))?;
    let document: Value = serde_yaml::from_str(text).map_err(|e| parse_error(e.to_string()))?;

    if !document.is_object() {
        return Err(parse_error("document is not a mapping".to_string()));
    }

    Ok(document)
}

/// `Cache-Control` override sent with every document fetch
pub const NO_CACHE: &str = "no-cache";

/// S3 reader used for metadata documents and key listings
#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    #[instrument(skip(self))]
    pub async fn download(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        debug!("Downloading from s3://{}/{}", bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .response_cache_control(NO_CACHE)
            .send()
            .await
            .map_err(|e| {
                let not_found = e
                    .as_service_error()
                    .is_some_and(|service| service.is_no_such_key());
                if not_found {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StorageError::Fetch {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                        message: DisplayErrorContext(&e).to_string(),
                    }
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Fetch {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: e.to_string(),
            })?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), bucket, key);

        Ok(data)
    }

    /// List keys under `prefix` ending in `suffix`, stopping after `limit` matches.
    #[instrument(skip(self))]
    pub async fn list_keys(
        &self,
        bucket: &str,
        prefix: &str,
        suffix: &str,
        limit: Option<usize>,
    ) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| StorageError::List {
                    bucket: bucket.to_string(),
                    prefix: prefix.to_string(),
                    message: DisplayErrorContext(&e).to_string(),
                })?;

            for key in response.contents().iter().filter_map(|obj| obj.key()) {
                if !key.ends_with(suffix) {
                    continue;
                }
                keys.push(key.to_string());
                if limit.is_some_and(|limit| keys.len() >= limit) {
                    info!(count = keys.len(), "Reached key limit");
                    return Ok(keys);
                }
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                },
                _ => break,
            }
        }

        info!(count = keys.len(), "Listed s3://{}/{}", bucket, prefix);
        Ok(keys)
    }
}

#[async_trait]
impl MetadataSource for S3Store {
    async fn fetch(&self, bucket: &str, key: &str) -> StorageResult<Value> {
        let bytes = self.download(bucket, key).await?;
        parse_document(bucket, key, &bytes)
    }
}

/// Metadata documents held in memory, keyed by `(bucket, key)`
#[derive(Debug, Default)]
pub struct InMemoryMetadataSource {
    documents: Mutex<HashMap<(String, String), Value>>,
}

impl InMemoryMetadataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, key: &str, document: Value) {
        self.documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert((bucket.to_string(), key.to_string()), document);
    }
}

#[async_trait]
impl MetadataSource for InMemoryMetadataSource {
    async fn fetch(&self, bucket: &str, key: &str) -> StorageResult<Value> {
        self.documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}
