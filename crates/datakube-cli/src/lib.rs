//! Datakube CLI Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Operator tools for the queues and index the orchestrator works against.
//!
//! # Overview
//!
//! - **Dead-letter recovery**: move poison messages back to the live queue
//!   (`datakube deadletter to-live`), dump them to a file (`to-file`), replay a file
//!   (`reload`) or send a test message (`inject`)
//! - **Bulk enqueue**: list storage keys and send them as raw-key messages
//!   (`datakube enqueue-keys`)
//! - **Archive from file**: archive every dataset indexed at the keys listed in a file
//!   (`datakube archive-from-file`)
//!
//! Every command works against [`QueueClient`](datakube_orchestrator::queue::QueueClient)
//! and [`DatasetIndex`](datakube_orchestrator::index::DatasetIndex), so they run the same
//! against SQS and the in-memory fakes.

pub mod commands;
pub mod error;

// Re-export commonly used types
pub use error::{CliError, Result};

use clap::{Parser, Subcommand};
use datakube_orchestrator::index::http::{DEFAULT_INDEX_TIMEOUT_SECS, DEFAULT_INDEX_URL};

/// Visibility timeout while moving dead letters back to the live queue
pub const DEFAULT_TO_LIVE_VISIBILITY_SECS: i32 = 10;

/// Visibility timeout while dumping dead letters to a file
pub const DEFAULT_TO_FILE_VISIBILITY_SECS: i32 = 60;

/// Pause between moves when draining to the live queue
pub const DEFAULT_TO_LIVE_PACING_MS: u64 = 300;

/// Pause between moves when draining to a file
pub const DEFAULT_TO_FILE_PACING_MS: u64 = 100;

/// Body sent by `deadletter inject` when none is given
pub const DEFAULT_POISON_BODY: &str = "poison";

/// Progress is logged after this many keys have been enqueued
pub const ENQUEUE_PROGRESS_INTERVAL: usize = 100;

/// Datakube - queue and index operator tools
#[derive(Parser, Debug)]
#[command(name = "datakube")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// AWS region override
    #[arg(long, env = "DATAKUBE_AWS_REGION", global = true)]
    pub region: Option<String>,

    /// Endpoint override for SQS and S3 (LocalStack, ElasticMQ, MinIO)
    #[arg(long, env = "DATAKUBE_AWS_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Use path-style S3 addressing
    #[arg(long, env = "DATAKUBE_S3_PATH_STYLE", global = true)]
    pub path_style: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dead-letter queue recovery
    Deadletter {
        #[command(subcommand)]
        command: DeadLetterCommand,
    },

    /// List storage keys and send each one as a message
    EnqueueKeys {
        /// Bucket to list
        #[arg(short, long)]
        bucket: String,

        /// Key prefix to list under
        #[arg(short, long, default_value = "")]
        prefix: String,

        /// Only keys ending with this suffix
        #[arg(short, long, default_value = ".xml")]
        suffix: String,

        /// Stop after this many keys
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Queue to send the keys to
        #[arg(short, long, env = "DATAKUBE_QUEUE")]
        queue: String,
    },

    /// Archive the datasets indexed at each key listed in a file
    ArchiveFromFile {
        /// File with one object key per line
        #[arg(short, long)]
        file: String,

        /// Prefix joined to each key to form the location URI
        #[arg(short, long, default_value = "s3://deafrica-data/")]
        location_prefix: String,

        /// Index service base URL
        #[arg(long, env = "DATAKUBE_INDEX_URL", default_value = DEFAULT_INDEX_URL)]
        index_url: String,

        /// Index request timeout in seconds
        #[arg(long, env = "DATAKUBE_INDEX_TIMEOUT", default_value_t = DEFAULT_INDEX_TIMEOUT_SECS)]
        index_timeout: u64,
    },
}

/// Dead-letter subcommands
#[derive(Subcommand, Debug)]
pub enum DeadLetterCommand {
    /// Move every dead letter back to the live queue
    ToLive {
        /// Dead-letter queue name
        #[arg(short, long, env = "DATAKUBE_DEAD_LETTER_QUEUE")]
        dlq: String,

        /// Live queue name
        #[arg(short, long, env = "DATAKUBE_QUEUE")]
        queue: String,

        /// Visibility timeout for each receive, in seconds
        #[arg(long, default_value_t = DEFAULT_TO_LIVE_VISIBILITY_SECS)]
        visibility_timeout: i32,

        /// Pause between moves, in milliseconds
        #[arg(long, default_value_t = DEFAULT_TO_LIVE_PACING_MS)]
        pacing_ms: u64,
    },

    /// Append every dead-letter body to a file, one per line
    ToFile {
        /// Dead-letter queue name
        #[arg(short, long, env = "DATAKUBE_DEAD_LETTER_QUEUE")]
        dlq: String,

        /// Drain file to append to
        #[arg(short, long, env = "DATAKUBE_DRAIN_FILE")]
        file: String,

        /// Delete each message once it is written
        #[arg(long)]
        delete: bool,

        /// Visibility timeout for each receive, in seconds
        #[arg(long, default_value_t = DEFAULT_TO_FILE_VISIBILITY_SECS)]
        visibility_timeout: i32,

        /// Pause between moves, in milliseconds
        #[arg(long, default_value_t = DEFAULT_TO_FILE_PACING_MS)]
        pacing_ms: u64,
    },

    /// Send one message, possibly empty or malformed
    Inject {
        /// Queue to send to
        #[arg(short, long, env = "DATAKUBE_QUEUE")]
        queue: String,

        /// Message body; SQS rejects empty bodies, so the default is a non-JSON token
        #[arg(short, long, default_value = DEFAULT_POISON_BODY)]
        body: String,
    },

    /// Send every non-empty line of a drain file to a queue
    Reload {
        /// Drain file to read
        #[arg(short, long, env = "DATAKUBE_DRAIN_FILE")]
        file: String,

        /// Queue to send to
        #[arg(short, long, env = "DATAKUBE_QUEUE")]
        queue: String,

        /// Pause between sends, in milliseconds
        #[arg(long, default_value_t = 0)]
        pacing_ms: u64,
    },
}
