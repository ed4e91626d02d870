//! AWS SDK client construction
//!
//! Region, credentials and endpoint come from the default provider chain unless
//! overridden. An endpoint override points both SQS and S3 at LocalStack, ElasticMQ
//! or MinIO.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::debug;

/// Connection settings shared by the SQS and S3 clients
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
    /// Path-style S3 addressing, required by most S3-compatible servers
    pub path_style: bool,
}

impl AwsConfig {
    pub fn from_env() -> Self {
        Self {
            region: env::var("DATAKUBE_AWS_REGION").ok(),
            endpoint: env::var("DATAKUBE_AWS_ENDPOINT").ok(),
            access_key: env::var("DATAKUBE_AWS_ACCESS_KEY").ok(),
            secret_key: env::var("DATAKUBE_AWS_SECRET_KEY").ok(),
            path_style: env::var("DATAKUBE_S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }

    fn static_credentials(&self) -> Option<Credentials> {
        match (&self.access_key, &self.secret_key) {
            (Some(access_key), Some(secret_key)) => Some(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "datakube-static",
            )),
            _ => None,
        }
    }
}

/// Load the shared SDK configuration
pub async fn load_sdk_config(config: &AwsConfig) -> SdkConfig {
    debug!(
        region = ?config.region,
        endpoint = ?config.endpoint,
        static_credentials = config.access_key.is_some(),
        "Loading AWS configuration"
    );

    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }

    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    if let Some(credentials) = config.static_credentials() {
        loader = loader.credentials_provider(credentials);
    }

    loader.load().await
}

pub fn sqs_client(sdk_config: &SdkConfig) -> aws_sdk_sqs::Client {
    aws_sdk_sqs::Client::new(sdk_config)
}

pub fn s3_client(sdk_config: &SdkConfig, config: &AwsConfig) -> aws_sdk_s3::Client {
    let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
        .force_path_style(config.path_style)
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_static_credentials_need_both_keys() {
        let mut config = AwsConfig {
            access_key: Some("key".to_string()),
            ..Default::default()
        };
        assert!(config.static_credentials().is_none());

        config.secret_key = Some("secret".to_string());
        assert!(config.static_credentials().is_some());
    }

    #[tokio::test]
    async fn test_endpoint_override_is_applied() {
        let config = AwsConfig {
            region: Some("ap-southeast-2".to_string()),
            endpoint: Some("http://localhost:4566".to_string()),
            access_key: Some("test".to_string()),
            secret_key: Some("test".to_string()),
            path_style: true,
        };

        let sdk_config = load_sdk_config(&config).await;
        assert_eq!(sdk_config.region().map(|r| r.as_ref()), Some("ap-southeast-2"));
        assert_eq!(sdk_config.endpoint_url(), Some("http://localhost:4566"));
    }
}
