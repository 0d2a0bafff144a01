//! Public entry point for submitting and inspecting jobs.
//!
//! [`JobRunner`] validates requests, persists new jobs and hands them to the
//! worker pool. It owns nothing the API layer needs to coordinate by hand:
//! the store, the bus and the pool are all reachable from here.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::broadcast::{ProgressBus, ProgressEvent};
use crate::config::RunnerConfig;
use crate::error::{HarvestError, Result, WorkerError};
use crate::extractor::Extractor;
use crate::job::{Job, JobDetails, JobId, JobStatus};
use crate::pipeline::JobPipeline;
use crate::store::{self, JobStore};
use crate::worker::{WorkerPool, WorkerStats};

/// Reason recorded for jobs found Running at startup.
pub const INTERRUPTED_REASON: &str = "interrupted before completion";
pub const SHUTDOWN_REASON: &str = "runner is shutting down";

/// Body of a submit call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub query: String,
    /// Falls back to the configured default when absent.
    #[serde(default, alias = "max_results")]
    pub max_results: Option<i64>,
}

impl SubmitRequest {
    pub fn new(query: impl Into<String>, max_results: Option<i64>) -> Self {
        Self {
            query: query.into(),
            max_results,
        }
    }
}

/// Result of [`JobRunner::recover`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub failed: Vec<JobId>,
    pub requeued: Vec<JobId>,
}

pub struct JobRunner {
    store: Arc<dyn JobStore>,
    bus: ProgressBus,
    pool: WorkerPool,
    default_max_results: u32,
    max_results_limit: u32,
}

impl JobRunner {
    /// Builds the runner and starts its workers on the current runtime.
    pub fn new(
        store: Arc<dyn JobStore>,
        extractor: Arc<dyn Extractor>,
        bus: ProgressBus,
        config: &RunnerConfig,
    ) -> Self {
        let pipeline = Arc::new(JobPipeline::new(Arc::clone(&store), extractor));
        let pool = WorkerPool::new(pipeline, bus.clone(), config.worker_count);

        Self {
            store,
            bus,
            pool,
            default_max_results: config.default_max_results,
            max_results_limit: config.max_results_limit,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn bus(&self) -> &ProgressBus {
        &self.bus
    }

    fn validate(&self, request: &SubmitRequest) -> Result<(String, u32)> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(HarvestError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }

        let requested = request
            .max_results
            .unwrap_or(i64::from(self.default_max_results));
        if requested <= 0 {
            return Err(HarvestError::InvalidRequest(format!(
                "maxResults must be greater than 0, got {}",
                requested
            )));
        }
        if requested > i64::from(self.max_results_limit) {
            return Err(HarvestError::InvalidRequest(format!(
                "maxResults must be at most {}, got {}",
                self.max_results_limit, requested
            )));
        }

        Ok((query.to_string(), requested as u32))
    }

    /// Persists a Pending job and queues it. Returns without waiting for
    /// execution.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Job> {
        let (query, max_results) = self.validate(&request)?;
        if self.pool.is_shutdown() {
            return Err(WorkerError::ChannelClosed.into());
        }

        let job = store::blocking(&self.store, move |s| s.create_job(&query, max_results)).await?;

        if let Err(e) = self.pool.submit(job.id) {
            log::warn!("Job {} created while shutting down, failing it", job.id);
            self.abandon(job.id).await?;
            return Err(e.into());
        }

        log::info!(
            "Submitted job {} (max_results={})",
            job.id,
            job.max_results
        );
        Ok(job)
    }

    /// Fails a job the pool refused to queue.
    async fn abandon(&self, id: JobId) -> Result<()> {
        store::blocking(&self.store, move |s| s.fail_job(id, SHUTDOWN_REASON)).await?;
        self.bus.publish(&ProgressEvent::failed(id, SHUTDOWN_REASON));
        Ok(())
    }

    pub async fn get(&self, id: JobId) -> Result<JobDetails> {
        store::blocking(&self.store, move |s| s.get_details(id)).await
    }

    /// All jobs, newest first.
    pub async fn list(&self) -> Result<Vec<JobDetails>> {
        store::blocking(&self.store, |s| s.list_details()).await
    }

    /// Deletes a finished job and its items. Running or pending jobs are a
    /// conflict.
    pub async fn delete(&self, id: JobId) -> Result<()> {
        store::blocking(&self.store, move |s| s.delete_job(id)).await
    }

    /// Reconciles jobs left over by a previous process.
    ///
    /// Running jobs cannot be resumed and are failed; pending jobs never
    /// started and are queued again.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        let running =
            store::blocking(&self.store, |s| s.list_by_status(JobStatus::Running)).await?;
        for job in running {
            let id = job.id;
            store::blocking(&self.store, move |s| s.fail_job(id, INTERRUPTED_REASON)).await?;
            self.bus.publish(&ProgressEvent::failed(id, INTERRUPTED_REASON));
            report.failed.push(id);
        }

        let pending =
            store::blocking(&self.store, |s| s.list_by_status(JobStatus::Pending)).await?;
        for job in pending {
            self.pool.submit(job.id)?;
            report.requeued.push(job.id);
        }

        if !report.failed.is_empty() || !report.requeued.is_empty() {
            log::info!(
                "Recovered jobs: {} failed, {} requeued",
                report.failed.len(),
                report.requeued.len()
            );
        }
        Ok(report)
    }

    pub fn stats(&self) -> WorkerStats {
        self.pool.stats()
    }

    /// Stops accepting submissions. Queued jobs still run.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// Waits until every queued job has finished.
    pub async fn wait(&self) {
        self.pool.wait().await;
    }
}
