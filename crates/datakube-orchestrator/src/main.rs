//! Datakube Orchestrator - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use datakube_common::logging::{init_logging, LogConfig, LogLevel};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

use datakube_orchestrator::{
    archive::Archiver,
    aws,
    cli::Cli,
    index::{DatasetIndex, HttpIndex},
    ingest::{Consumer, DatasetRegistrar, EventDecoder, KeyFilter},
    queue::{QueueClient, SqsQueue},
    storage::S3Store,
    Orchestrator, OrchestratorConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .log_file_prefix("datakube-orchestrator")
        .build()
        .merge_env()?;

    init_logging(&log_config)?;

    info!("Starting Datakube orchestrator");

    let config = OrchestratorConfig::from_cli(&cli)?;
    info!(
        queue = ?config.queue.name,
        sources_policy = %config.ingest.sources_policy,
        prefixes = ?config.ingest.prefix_filters,
        archive_policies = config.archive.policies.len(),
        "Configuration loaded"
    );

    let http_index = HttpIndex::new(&config.index.url, config.index_timeout())
        .context("Failed to create index client")?;
    info!(url = %http_index.base_url(), "Using index service");
    let index: Arc<dyn DatasetIndex> = Arc::new(http_index);

    let sdk_config = aws::load_sdk_config(&config.aws).await;

    let consumer = match &config.queue.name {
        Some(name) => {
            let queue = SqsQueue::resolve(aws::sqs_client(&sdk_config), name)
                .await
                .with_context(|| format!("Failed to resolve queue '{}'", name))?;
            info!(url = %queue.url(), "Consuming queue");

            let store = S3Store::new(aws::s3_client(&sdk_config, &config.aws));
            let registrar =
                DatasetRegistrar::new(Arc::new(store), index.clone(), config.ingest.sources_policy);
            let decoder = EventDecoder::new(
                config.ingest.body_format.clone(),
                KeyFilter::new(config.ingest.prefix_filters.as_slice())?,
            );

            Some(
                Consumer::new(
                    Arc::new(queue),
                    decoder,
                    Arc::new(registrar),
                    index.clone(),
                    config.receive_options(),
                )
                .with_dashboard_refresh(config.refresh_dashboard),
            )
        },
        None => None,
    };

    let archiver = Archiver::new(index).with_dashboard_refresh(config.refresh_dashboard);
    let mut orchestrator = Orchestrator::new(
        consumer,
        archiver,
        config.archive.policies.clone(),
        config.poll_interval(),
    );

    if config.drain_and_exit {
        orchestrator.drain_once().await?;
        return Ok(());
    }

    orchestrator.run(shutdown_signal()).await?;

    info!("Orchestrator shut down");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
