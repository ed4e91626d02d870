//! Command-line arguments for the orchestrator binary
//!
//! Every option can also be set through a `DATAKUBE_*` environment variable.

use clap::{Parser, ValueEnum};

use crate::config::{
    DEFAULT_MAX_MESSAGES, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_VISIBILITY_TIMEOUT_SECS,
    DEFAULT_WAIT_TIME_SECS,
};
use crate::{archive::DEFAULT_ARCHIVE_CHECK_TIME, index::http::DEFAULT_INDEX_URL};

/// Layout of message bodies on the live queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BodyFormatArg {
    /// Storage event notifications wrapped in an envelope
    Notification,
    /// Bare object keys, one per message
    ObjectKey,
}

/// Datakube orchestrator - index datasets from queue notifications and archive old ones
#[derive(Parser, Debug, Clone)]
#[command(name = "datakube-orchestrator")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Live queue to consume; without it only archival runs
    #[arg(short, long, env = "DATAKUBE_QUEUE")]
    pub queue: Option<String>,

    /// Seconds between queue drains
    #[arg(long, env = "DATAKUBE_POLL_TIME", default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_time: u64,

    /// Long-poll wait per receive, 0-20 seconds
    #[arg(long, env = "DATAKUBE_WAIT_TIME", default_value_t = DEFAULT_WAIT_TIME_SECS)]
    pub wait_time: i32,

    /// Seconds a received message stays hidden from other consumers
    #[arg(long, env = "DATAKUBE_VISIBILITY_TIMEOUT", default_value_t = DEFAULT_VISIBILITY_TIMEOUT_SECS)]
    pub visibility_timeout: i32,

    /// Messages per receive, 1-10
    #[arg(long, env = "DATAKUBE_MAX_MESSAGES", default_value_t = DEFAULT_MAX_MESSAGES)]
    pub max_messages: i32,

    /// Lineage handling: verify, ensure or skip
    #[arg(long = "sources-policy", env = "DATAKUBE_SOURCES_POLICY", default_value = "verify")]
    pub sources_policy: String,

    /// Only index keys matching one of these path globs (repeatable)
    #[arg(long, env = "DATAKUBE_PREFIX", value_delimiter = ',')]
    pub prefix: Vec<String>,

    /// Archive datasets of PRODUCT older than DAYS, as product:days (repeatable)
    #[arg(long, env = "DATAKUBE_ARCHIVE", value_delimiter = ',')]
    pub archive: Vec<String>,

    /// Local time of the daily archive check, HH:MM
    #[arg(long, env = "DATAKUBE_ARCHIVE_CHECK_TIME", default_value = DEFAULT_ARCHIVE_CHECK_TIME)]
    pub archive_check_time: String,

    /// Refresh the dashboard after ranges change
    #[arg(long, env = "DATAKUBE_CUBEDASH")]
    pub cubedash: bool,

    /// Drain the queue once and exit instead of polling forever
    #[arg(long, env = "DATAKUBE_DRAIN_AND_EXIT")]
    pub drain_and_exit: bool,

    /// Message body layout
    #[arg(long, env = "DATAKUBE_BODY_FORMAT", value_enum, default_value = "notification")]
    pub body_format: BodyFormatArg,

    /// Bucket holding the keys when the body format is object-key
    #[arg(long, env = "DATAKUBE_OBJECT_BUCKET")]
    pub object_bucket: Option<String>,

    /// Index service base URL
    #[arg(long, env = "DATAKUBE_INDEX_URL", default_value = DEFAULT_INDEX_URL)]
    pub index_url: String,

    /// Index request timeout in seconds
    #[arg(long, env = "DATAKUBE_INDEX_TIMEOUT")]
    pub index_timeout: Option<u64>,

    /// AWS region override
    #[arg(long, env = "DATAKUBE_AWS_REGION")]
    pub region: Option<String>,

    /// Endpoint override for SQS and S3 (LocalStack, ElasticMQ, MinIO)
    #[arg(long, env = "DATAKUBE_AWS_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Use path-style S3 addressing
    #[arg(long, env = "DATAKUBE_S3_PATH_STYLE")]
    pub path_style: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_repeatable_options() {
        let cli = Cli::try_parse_from([
            "datakube-orchestrator",
            "--queue",
            "landsat-to-wofs",
            "--prefix",
            "x/*",
            "--prefix",
            "L2/*/*.yaml",
            "--archive",
            "s2_nrt_wofs:30",
            "--archive",
            "s2_nrt_fc:90",
            "--cubedash",
        ])
        .unwrap();

        assert_eq!(cli.queue.as_deref(), Some("landsat-to-wofs"));
        assert_eq!(cli.prefix, vec!["x/*", "L2/*/*.yaml"]);
        assert_eq!(cli.archive, vec!["s2_nrt_wofs:30", "s2_nrt_fc:90"]);
        assert!(cli.cubedash);
        assert_eq!(cli.poll_time, DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(cli.archive_check_time, "01:00");
        assert_eq!(cli.body_format, BodyFormatArg::Notification);
    }
}
