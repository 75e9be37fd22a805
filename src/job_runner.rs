//! Drives the claim/process/finalize loop against the job catalog, and the
//! host-level supervisor that keeps up to `CONCURRENCY` such loops running
//! at once.
//!
//! Grounded on `orchestrator.rs`'s top-level `transcode_media` loop (claim a
//! unit of work, drive it, persist the outcome) generalized onto §4.6's
//! explicit state machine: QUEUED -> PROCESS -> {DONE, ERROR,
//! QUEUED(on shutdown)}. Retry classification comes from
//! [`crate::error::WorkerError::retry_class`]; graceful shutdown comes from
//! [`crate::signal::ShutdownBroadcast`]. The semaphore-gated supervisor loop
//! mirrors the `concurrent_jobs`-gated job loop already present in this
//! codebase (§5 supplemental).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::db::{Job, JobCatalog, JobStatus};
use crate::error::{RetryClass, Result, WorkerError};
use crate::metadata::{min_duration, public_metadata};
use crate::orchestrator::Orchestrator;
use crate::profile::Preset;
use crate::signal::ShutdownBroadcast;
use crate::workspace::open_workspace;

const MAX_BOUNDED_RETRIES: u32 = 5;
const REQUEUE_COUNTDOWN_SECS: u64 = 15;
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// One job's claim -> process -> finalize cycle, independent of how many
/// other jobs are running concurrently on this host.
pub struct JobRunner {
    catalog: Arc<JobCatalog>,
    config: WorkerConfig,
    preset: Preset,
    shutdown: ShutdownBroadcast,
}

impl JobRunner {
    pub fn new(
        catalog: Arc<JobCatalog>,
        config: WorkerConfig,
        preset: Preset,
        shutdown: ShutdownBroadcast,
    ) -> Self {
        Self {
            catalog,
            config,
            preset,
            shutdown,
        }
    }

    /// Attempts to claim and fully process `job_id` under `task_token`,
    /// retrying per §4.6's bounded/unbounded rules. Returns once the job
    /// reaches a terminal state or a shutdown re-queues it -- never loops
    /// forever on a `Fatal` error.
    pub async fn run_job(&self, job_id: i64, task_token: Uuid, source_uri: &str) -> Result<()> {
        let mut attempts = 0u32;
        loop {
            match self.catalog.claim(job_id, task_token).await {
                Ok(Some(job)) => return self.process_claimed(job_id, task_token, source_uri, job).await,
                Ok(None) => {
                    tracing::debug!(job_id, "job not claimable (locked, wrong state, or missing)");
                    return Ok(());
                }
                Err(e) if e.retry_class() == RetryClass::RetryUnbounded => {
                    tracing::warn!(job_id, error = %e, "transient infra error claiming job, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
                Err(e) if e.retry_class() == RetryClass::RetryBounded && attempts < MAX_BOUNDED_RETRIES => {
                    attempts += 1;
                    tracing::warn!(job_id, error = %e, attempts, "bounded-retryable error claiming job");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn process_claimed(
        &self,
        job_id: i64,
        task_token: Uuid,
        source_uri: &str,
        job: Job,
    ) -> Result<()> {
        let basename = job
            .basename
            .ok_or_else(|| WorkerError::Validation("claimed job has no basename".into()))?;

        let connect_timeout = Duration::from_secs_f64(self.config.connect_timeout);
        let request_timeout = Duration::from_secs_f64(self.config.request_timeout);
        let temp = open_workspace(&self.config.temp_uri, connect_timeout, request_timeout)?;
        let store = open_workspace(&self.config.results_uri, connect_timeout, request_timeout)?;
        let orchestrator = Orchestrator::new(
            temp,
            store,
            basename.to_string(),
            self.preset.clone(),
            Duration::from_secs(self.config.soft_stop_grace),
            self.config.chunk_duration,
            self.config.segment_duration,
            Duration::from_secs(self.config.encode_timeout),
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let outcome = tokio::select! {
            result = orchestrator.run(source_uri) => result,
            _ = shutdown_rx.recv() => {
                tracing::info!(job_id, "cooperative shutdown mid-transcode, requeuing");
                return self.requeue_on_shutdown(job_id, task_token).await;
            }
        };

        match outcome {
            Ok(metadata) => {
                let metadata_json = public_metadata(&metadata);
                let duration = min_duration(&metadata);
                for url in self.config.playback_urls(&basename.to_string()) {
                    tracing::info!(job_id, %url, "published playback url");
                }
                self.catalog
                    .finalize(
                        job_id,
                        task_token,
                        JobStatus::Done,
                        None,
                        Some(metadata_json),
                        duration,
                    )
                    .await
            }
            Err(e) if e.is_cancellation() => self.requeue_on_shutdown(job_id, task_token).await,
            Err(e) => {
                let _ = orchestrator.cleanup_on_error().await;
                self.catalog
                    .finalize(
                        job_id,
                        task_token,
                        JobStatus::Error,
                        Some(e.to_string()),
                        None,
                        None,
                    )
                    .await
            }
        }
    }

    async fn requeue_on_shutdown(&self, job_id: i64, task_token: Uuid) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(REQUEUE_COUNTDOWN_SECS)).await;
        self.catalog
            .finalize(
                job_id,
                task_token,
                JobStatus::Queued,
                Some("cooperative shutdown requested mid-transcode".into()),
                None,
                None,
            )
            .await
    }
}

/// Polls the catalog for queued work and keeps up to `config.concurrency`
/// [`JobRunner::run_job`] calls in flight at once, gated by a counting
/// semaphore -- one permit per job's full lock -> process -> unlock
/// lifecycle.
pub struct Supervisor {
    catalog: Arc<JobCatalog>,
    runner: Arc<JobRunner>,
    permits: Arc<Semaphore>,
    concurrency: usize,
    shutdown: ShutdownBroadcast,
}

impl Supervisor {
    pub fn new(catalog: Arc<JobCatalog>, config: WorkerConfig, preset: Preset, shutdown: ShutdownBroadcast) -> Self {
        let concurrency = config.concurrency;
        let runner = Arc::new(JobRunner::new(catalog.clone(), config, preset, shutdown.clone()));
        Self {
            catalog,
            runner,
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            shutdown,
        }
    }

    /// Runs until a cooperative shutdown is observed, then stops polling for
    /// new work and waits for in-flight jobs to drain (each observes the
    /// same shutdown signal and re-queues itself independently).
    pub async fn run(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("supervisor observed shutdown, draining in-flight jobs");
                    break;
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {
                    self.dispatch_available_work().await?;
                }
            }
        }
        let _ = self.permits.acquire_many(self.concurrency as u32).await;
        Ok(())
    }

    async fn dispatch_available_work(&self) -> Result<()> {
        let free = self.permits.available_permits();
        if free == 0 {
            return Ok(());
        }
        let candidates = self.catalog.poll_queued(free as i64).await?;
        for (job_id, task_token, source) in candidates {
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                break;
            };
            let runner = self.runner.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = runner.run_job(job_id, task_token, &source).await {
                    tracing::error!(job_id, error = %e, "job runner returned a fatal error");
                }
            });
        }
        Ok(())
    }
}
