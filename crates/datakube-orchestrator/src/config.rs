//! Configuration management

use chrono::NaiveTime;
use datakube_common::SourcesPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    archive::{parse_check_time, ArchivePolicy},
    aws::AwsConfig,
    cli::{BodyFormatArg, Cli},
    index::http::DEFAULT_INDEX_TIMEOUT_SECS,
    ingest::BodyFormat,
    queue::{ReceiveOptions, MAX_RECEIVE_BATCH, MAX_WAIT_TIME_SECS},
};

// ============================================================================
// Queue Configuration Constants
// ============================================================================

/// Default seconds between queue drains.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Default long-poll wait per receive (the SQS maximum).
pub const DEFAULT_WAIT_TIME_SECS: i32 = 20;

/// Default visibility timeout (the SQS queue default).
pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: i32 = 30;

/// Default messages per receive.
pub const DEFAULT_MAX_MESSAGES: i32 = 1;

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub queue: QueueConfig,
    pub ingest: IngestConfig,
    pub archive: ArchiveConfig,
    pub index: IndexConfig,
    pub aws: AwsConfig,
    /// Refresh the dashboard whenever product ranges are recomputed
    pub refresh_dashboard: bool,
    /// Drain once and exit
    pub drain_and_exit: bool,
}

/// Live queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: Option<String>,
    pub poll_interval_secs: u64,
    pub wait_time_secs: i32,
    pub visibility_timeout_secs: i32,
    pub max_messages: i32,
}

/// How messages turn into registrations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub sources_policy: SourcesPolicy,
    pub prefix_filters: Vec<String>,
    pub body_format: BodyFormat,
}

/// Archive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub policies: Vec<ArchivePolicy>,
    pub daily_check_time: NaiveTime,
}

/// Index service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl OrchestratorConfig {
    /// Build configuration from parsed arguments. `.env` is loaded before parsing.
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let daily_check_time = parse_check_time(&cli.archive_check_time)?;

        let policies = cli
            .archive
            .iter()
            .map(|raw| ArchivePolicy::parse(raw, daily_check_time))
            .collect::<Result<Vec<_>, _>>()?;

        let body_format = match cli.body_format {
            BodyFormatArg::Notification => BodyFormat::Notification,
            BodyFormatArg::ObjectKey => BodyFormat::ObjectKey {
                bucket: cli.object_bucket.clone().ok_or_else(|| {
                    anyhow::anyhow!("--object-bucket is required with --body-format object-key")
                })?,
            },
        };

        let mut aws = AwsConfig::from_env();
        aws.region = cli.region.clone().or(aws.region);
        aws.endpoint = cli.endpoint.clone().or(aws.endpoint);
        aws.path_style = cli.path_style || aws.path_style;

        let config = Self {
            queue: QueueConfig {
                name: cli.queue.clone(),
                poll_interval_secs: cli.poll_time,
                wait_time_secs: cli.wait_time,
                visibility_timeout_secs: cli.visibility_timeout,
                max_messages: cli.max_messages,
            },
            ingest: IngestConfig {
                sources_policy: cli.sources_policy.parse()?,
                prefix_filters: cli.prefix.clone(),
                body_format,
            },
            archive: ArchiveConfig {
                policies,
                daily_check_time,
            },
            index: IndexConfig {
                url: cli.index_url.clone(),
                timeout_secs: cli.index_timeout.unwrap_or(DEFAULT_INDEX_TIMEOUT_SECS),
            },
            aws,
            refresh_dashboard: cli.cubedash,
            drain_and_exit: cli.drain_and_exit,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(name) = &self.queue.name {
            if name.trim().is_empty() {
                anyhow::bail!("Queue name cannot be empty");
            }
        }

        if self.queue.name.is_none() && self.drain_and_exit {
            anyhow::bail!("Drain-and-exit mode needs a queue");
        }

        if self.queue.name.is_none() && self.archive.policies.is_empty() {
            anyhow::bail!("Nothing to do: configure a queue, an archive policy, or both");
        }

        if !(1..=MAX_RECEIVE_BATCH).contains(&self.queue.max_messages) {
            anyhow::bail!(
                "Max messages per receive must be between 1 and {} (got {})",
                MAX_RECEIVE_BATCH,
                self.queue.max_messages
            );
        }

        if !(0..=MAX_WAIT_TIME_SECS).contains(&self.queue.wait_time_secs) {
            anyhow::bail!(
                "Wait time must be between 0 and {} seconds (got {})",
                MAX_WAIT_TIME_SECS,
                self.queue.wait_time_secs
            );
        }

        if self.queue.visibility_timeout_secs < 0 {
            anyhow::bail!("Visibility timeout cannot be negative");
        }

        if self.queue.poll_interval_secs == 0 {
            anyhow::bail!("Poll interval must be greater than 0");
        }

        if self.index.url.is_empty() {
            anyhow::bail!("Index URL cannot be empty");
        }

        if self.index.timeout_secs == 0 {
            anyhow::bail!("Index timeout must be greater than 0");
        }

        if self.refresh_dashboard && self.queue.name.is_none() && self.archive.policies.is_empty() {
            tracing::warn!("Dashboard refresh enabled but nothing will trigger it");
        }

        Ok(())
    }

    pub fn receive_options(&self) -> ReceiveOptions {
        ReceiveOptions::new(
            self.queue.max_messages,
            self.queue.wait_time_secs,
            self.queue.visibility_timeout_secs,
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.queue.poll_interval_secs)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index.timeout_secs)
    }
}
