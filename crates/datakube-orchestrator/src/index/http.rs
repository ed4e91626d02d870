//! HTTP/JSON client for the index service

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use datakube_common::{DatasetRef, ProductRef, SourcesPolicy};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{DatasetIndex, IndexError, IndexResult};

/// Default timeout for index requests in seconds.
pub const DEFAULT_INDEX_TIMEOUT_SECS: u64 = 60;

/// Default index service URL when not configured.
pub const DEFAULT_INDEX_URL: &str = "http://localhost:8080";

/// Standard response wrapper returned by the index service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct AddDatasetRequest<'a> {
    document: &'a Value,
    uri: &'a str,
    sources_policy: SourcesPolicy,
}

#[derive(Debug, Serialize)]
struct ArchiveRequest<'a> {
    ids: &'a [Uuid],
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    products: &'a [ProductRef],
}

/// URL builders for the index API
pub mod endpoints {
    use uuid::Uuid;

    pub fn datasets_url(base_url: &str) -> String {
        format!("{}/api/v1/datasets", base_url)
    }

    pub fn dataset_sources_url(base_url: &str, id: Uuid) -> String {
        format!("{}/api/v1/datasets/{}/sources", base_url, id)
    }

    pub fn archive_url(base_url: &str) -> String {
        format!("{}/api/v1/datasets/archive", base_url)
    }

    pub fn product_datasets_url(base_url: &str, product: &str) -> String {
        format!("{}/api/v1/products/{}/datasets", base_url, product)
    }

    pub fn product_range_url(base_url: &str, product: &str) -> String {
        format!("{}/api/v1/products/{}/range", base_url, product)
    }

    pub fn dashboard_refresh_url(base_url: &str) -> String {
        format!("{}/api/v1/dashboard/refresh", base_url)
    }
}

/// Index reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpIndex {
    client: Client,
    base_url: String,
}

impl HttpIndex {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> IndexResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn unwrap_response<T: DeserializeOwned>(response: Response) -> IndexResult<T> {
        let response = response.error_for_status()?;
        let api_response: ApiResponse<T> = response.json().await?;

        if !api_response.success {
            return Err(IndexError::Rejected(
                api_response
                    .error
                    .unwrap_or_else(|| "index reported failure without a message".to_string()),
            ));
        }

        api_response
            .data
            .ok_or_else(|| IndexError::Rejected("index response carried no data".to_string()))
    }

    async fn expect_success(response: Response) -> IndexResult<()> {
        let response = response.error_for_status()?;
        let api_response: ApiResponse<Value> = response.json().await?;

        if api_response.success {
            Ok(())
        } else {
            Err(IndexError::Rejected(
                api_response
                    .error
                    .unwrap_or_else(|| "index reported failure without a message".to_string()),
            ))
        }
    }
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl DatasetIndex for HttpIndex {
    #[instrument(skip(self, document))]
    async fn add_dataset(
        &self,
        document: &Value,
        uri: &str,
        sources_policy: SourcesPolicy,
    ) -> IndexResult<DatasetRef> {
        let request = AddDatasetRequest {
            document,
            uri,
            sources_policy,
        };

        let response = self
            .client
            .post(endpoints::datasets_url(&self.base_url))
            .json(&request)
            .send()
            .await?;

        Self::unwrap_response(response).await
    }

    #[instrument(skip(self))]
    async fn search_datasets(
        &self,
        product: &ProductRef,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> IndexResult<Vec<DatasetRef>> {
        let response = self
            .client
            .get(endpoints::product_datasets_url(&self.base_url, product.name()))
            .query(&[("from", timestamp(from)), ("to", timestamp(to))])
            .send()
            .await?;

        let datasets: Vec<DatasetRef> = Self::unwrap_response(response).await?;
        debug!(product = %product, count = datasets.len(), "Search returned datasets");
        Ok(datasets)
    }

    async fn dataset_sources(&self, id: Uuid) -> IndexResult<Vec<DatasetRef>> {
        let response = self
            .client
            .get(endpoints::dataset_sources_url(&self.base_url, id))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(IndexError::NotFound(id));
        }

        Self::unwrap_response(response).await
    }

    async fn archive_datasets(&self, ids: &[Uuid]) -> IndexResult<()> {
        let response = self
            .client
            .post(endpoints::archive_url(&self.base_url))
            .json(&ArchiveRequest { ids })
            .send()
            .await?;

        Self::expect_success(response).await
    }

    async fn datasets_for_location(&self, uri: &str) -> IndexResult<Vec<DatasetRef>> {
        let response = self
            .client
            .get(endpoints::datasets_url(&self.base_url))
            .query(&[("location", uri)])
            .send()
            .await?;

        Self::unwrap_response(response).await
    }

    async fn update_product_range(&self, product: &ProductRef) -> IndexResult<()> {
        let response = self
            .client
            .post(endpoints::product_range_url(&self.base_url, product.name()))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(IndexError::UnknownProduct(product.name().to_string()));
        }

        Self::expect_success(response).await
    }

    async fn refresh_dashboard(&self, products: &[ProductRef]) -> IndexResult<()> {
        let response = self
            .client
            .post(endpoints::dashboard_refresh_url(&self.base_url))
            .json(&RefreshRequest { products })
            .send()
            .await?;

        Self::expect_success(response).await
    }
}
