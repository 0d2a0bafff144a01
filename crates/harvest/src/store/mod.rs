//! Durable record of jobs and their items.
//!
//! [`JobStore`] is the seam the runner and the HTTP layer talk to. All
//! lifecycle writes go through guarded transitions so a job can only move
//! forward, and a terminal state is written at most once.

use std::sync::Arc;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::error::{HarvestError, WorkerError};
use crate::job::{ExtractedRecord, Job, JobDetails, JobId, JobStatus};

mod sqlite;

pub use sqlite::SqliteJobStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Job {0} does not exist")]
    NotFound(JobId),

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job {id} is still {status}")]
    NotTerminal { id: JobId, status: JobStatus },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Persistence operations for jobs.
///
/// Implementations are synchronous; async callers run them on the blocking
/// pool. Every method is safe to call from many threads at once.
pub trait JobStore: Send + Sync {
    /// Inserts a new Pending job.
    fn create_job(&self, query: &str, max_results: u32) -> Result<Job, StoreError>;

    fn get_job(&self, id: JobId) -> Result<Job, StoreError>;

    /// A job with its items inlined.
    fn get_details(&self, id: JobId) -> Result<JobDetails, StoreError>;

    /// Every job with its items, newest first.
    fn list_details(&self) -> Result<Vec<JobDetails>, StoreError>;

    /// Jobs in `status`, oldest first.
    fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError>;

    /// Pending -> Running.
    fn mark_running(&self, id: JobId) -> Result<Job, StoreError>;

    /// Running -> Completed, inserting `records` in the same transaction.
    fn complete_job(&self, id: JobId, records: &[ExtractedRecord]) -> Result<Job, StoreError>;

    /// Pending or Running -> Failed with `reason` as the error message.
    fn fail_job(&self, id: JobId, reason: &str) -> Result<Job, StoreError>;

    /// Removes a terminal job and its items.
    fn delete_job(&self, id: JobId) -> Result<(), StoreError>;
}

/// Runs a store call on tokio's blocking pool.
pub async fn blocking<T, F>(store: &Arc<dyn JobStore>, f: F) -> Result<T, HarvestError>
where
    F: FnOnce(&dyn JobStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| WorkerError::Blocking(e.to_string()))?
        .map_err(HarvestError::from)
}
