//! Datakube CLI - Main entry point

use anyhow::Context;
use clap::Parser;
use datakube_cli::{
    commands::{
        archive, deadletter,
        deadletter::DrainOptions,
        enqueue,
    },
    Cli, Commands, DeadLetterCommand,
};
use datakube_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use datakube_orchestrator::{
    archive::Archiver,
    aws::{self, AwsConfig},
    index::HttpIndex,
    queue::SqsQueue,
    storage::S3Store,
};
use std::{path::Path, process, sync::Arc, time::Duration};
use tracing::error;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .output(LogOutput::Console)
        .log_file_prefix("datakube-cli")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The tools work without logging
    let _ = init_logging(&log_config);

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn aws_config(cli: &Cli) -> AwsConfig {
    let mut config = AwsConfig::from_env();
    config.region = cli.region.clone().or(config.region);
    config.endpoint = cli.endpoint.clone().or(config.endpoint);
    config.path_style = cli.path_style || config.path_style;
    config
}

/// Execute the CLI command
async fn execute_command(cli: &Cli) -> datakube_cli::Result<()> {
    let aws = aws_config(cli);

    match &cli.command {
        Commands::Deadletter { command } => {
            let sdk_config = aws::load_sdk_config(&aws).await;
            let sqs = aws::sqs_client(&sdk_config);

            match command {
                DeadLetterCommand::ToLive {
                    dlq,
                    queue,
                    visibility_timeout,
                    pacing_ms,
                } => {
                    let dlq = SqsQueue::resolve(sqs.clone(), dlq).await?;
                    let live = SqsQueue::resolve(sqs.clone(), queue).await?;
                    let options = DrainOptions::new(*visibility_timeout, *pacing_ms);

                    let report = deadletter::drain_to_live(&dlq, &live, &options).await?;
                    println!("Moved {} message(s) to {}", report.moved, live.name());
                },

                DeadLetterCommand::ToFile {
                    dlq,
                    file,
                    delete,
                    visibility_timeout,
                    pacing_ms,
                } => {
                    let dlq = SqsQueue::resolve(sqs.clone(), dlq).await?;
                    let options = DrainOptions::new(*visibility_timeout, *pacing_ms);

                    let report =
                        deadletter::drain_to_file(&dlq, Path::new(file), *delete, &options).await?;
                    println!(
                        "Wrote {} message(s) to {} ({} deleted)",
                        report.moved, file, report.deleted
                    );
                },

                DeadLetterCommand::Inject { queue, body } => {
                    let queue = SqsQueue::resolve(sqs.clone(), queue).await?;
                    deadletter::inject(&queue, body).await?;
                    println!("Sent 1 message to {}", queue.name());
                },

                DeadLetterCommand::Reload {
                    file,
                    queue,
                    pacing_ms,
                } => {
                    let queue = SqsQueue::resolve(sqs.clone(), queue).await?;
                    let sent = deadletter::reload_from_file(
                        &queue,
                        Path::new(file),
                        Duration::from_millis(*pacing_ms),
                    )
                    .await?;
                    println!("Sent {} message(s) to {}", sent, queue.name());
                },
            }
        },

        Commands::EnqueueKeys {
            bucket,
            prefix,
            suffix,
            limit,
            queue,
        } => {
            let sdk_config = aws::load_sdk_config(&aws).await;
            let queue = SqsQueue::resolve(aws::sqs_client(&sdk_config), queue).await?;
            let store = S3Store::new(aws::s3_client(&sdk_config, &aws));

            let sent = enqueue::run(&store, &queue, bucket, prefix, suffix, *limit).await?;
            println!("Enqueued {} key(s) to {}", sent, queue.name());
        },

        Commands::ArchiveFromFile {
            file,
            location_prefix,
            index_url,
            index_timeout,
        } => {
            let index = HttpIndex::new(index_url, Duration::from_secs(*index_timeout))
                .context("Failed to create index client")?;
            let archiver = Archiver::new(Arc::new(index));

            let report = archive::run(&archiver, Path::new(file), location_prefix).await?;
            println!(
                "Archived {} dataset(s) across {} location(s), {} failure(s)",
                report.archived, report.locations, report.failed
            );
        },
    }

    Ok(())
}
