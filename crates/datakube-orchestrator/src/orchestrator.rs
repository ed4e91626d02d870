//! The event loop
//!
//! One task owns every trigger: the queue drain on its poll interval and each archive
//! policy at its daily check time. Archive policies also run once at startup. Tasks
//! never overlap; a long drain simply delays whatever falls due meanwhile.

use chrono::Local;
use std::{future::Future, time::Duration};
use tracing::{debug, error, info};

use crate::{
    archive::{ArchivePolicy, Archiver},
    error::{OrchestratorError, OrchestratorResult},
    ingest::{Consumer, PassSummary},
    scheduler::{Scheduler, Task, Trigger},
};

pub struct Orchestrator {
    consumer: Option<Consumer>,
    archiver: Archiver,
    policies: Vec<ArchivePolicy>,
    poll_interval: Duration,
}

impl Orchestrator {
    pub fn new(
        consumer: Option<Consumer>,
        archiver: Archiver,
        policies: Vec<ArchivePolicy>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            consumer,
            archiver,
            policies,
            poll_interval,
        }
    }

    /// Drain the queue once. Used by drain-and-exit mode.
    pub async fn drain_once(&mut self) -> OrchestratorResult<PassSummary> {
        let consumer = self
            .consumer
            .as_mut()
            .ok_or_else(|| OrchestratorError::Config("no queue configured".to_string()))?;

        let summary = consumer.drain().await?;
        info!("No new messages, exiting successfully");
        Ok(summary)
    }

    fn schedule(&self) -> Scheduler<Local> {
        let mut scheduler = Scheduler::new();
        let now = Local::now();

        for (i, policy) in self.policies.iter().enumerate() {
            scheduler.add(Task::Archive(i), Trigger::DailyAt(policy.daily_check_time), now);
        }

        if self.consumer.is_some() {
            scheduler.add(Task::Drain, Trigger::Every(self.poll_interval), now);
        }

        scheduler
    }

    /// Run until `shutdown` resolves or the queue service becomes unreachable
    pub async fn run<F>(mut self, shutdown: F) -> OrchestratorResult<()>
    where
        F: Future<Output = ()>,
    {
        let mut scheduler = self.schedule();
        tokio::pin!(shutdown);

        info!(
            drain = self.consumer.is_some(),
            poll_interval_secs = self.poll_interval.as_secs(),
            archive_policies = self.policies.len(),
            "Orchestrator started"
        );

        loop {
            let Some(next_run) = scheduler.next_run() else {
                info!("Nothing scheduled, stopping");
                return Ok(());
            };

            let wait = (next_run - Local::now()).to_std().unwrap_or(Duration::ZERO);
            debug!(wait_secs = wait.as_secs(), "Waiting for next trigger");

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping");
                    return Ok(());
                },
                _ = tokio::time::sleep(wait) => {},
            }

            let now = Local::now();
            for task in scheduler.due(&now) {
                self.run_task(task).await?;
                scheduler.completed(task, &Local::now());
            }
        }
    }

    async fn run_task(&mut self, task: Task) -> OrchestratorResult<()> {
        match task {
            Task::Drain => {
                if let Some(consumer) = self.consumer.as_mut() {
                    consumer.drain().await?;
                }
            },
            Task::Archive(i) => {
                if let Some(policy) = self.policies.get(i) {
                    match self.archiver.run_policy(policy, chrono::Utc::now()).await {
                        Ok(report) => debug!(product = %policy.product, archived = report.archived.len(), "Archive run finished"),
                        Err(e) => error!(product = %policy.product, error = %e, "Archive run failed"),
                    }
                }
            },
        }

        Ok(())
    }
}
