//! Progress events pushed to observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{JobId, JobStatus};

/// One step in a job's lifecycle as seen by observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Percentage in `0..=100`.
    pub progress: u8,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(job_id: JobId, status: JobStatus, progress: u8, message: impl Into<String>) -> Self {
        Self {
            job_id,
            status,
            progress: progress.min(100),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn running(job_id: JobId, progress: u8, message: impl Into<String>) -> Self {
        Self::new(job_id, JobStatus::Running, progress, message)
    }

    pub fn completed(job_id: JobId, items: usize) -> Self {
        Self::new(
            job_id,
            JobStatus::Completed,
            100,
            format!("{} items extracted", items),
        )
    }

    pub fn failed(job_id: JobId, reason: &str) -> Self {
        Self::new(job_id, JobStatus::Failed, 0, format!("Error: {}", reason))
    }

    /// True for the last event a job ever emits.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
