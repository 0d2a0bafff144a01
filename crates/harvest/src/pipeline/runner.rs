use std::sync::Arc;

use tracing::{info_span, Instrument};

use crate::error::HarvestError;
use crate::extractor::Extractor;
use crate::job::{Job, JobId};
use crate::sanitize;
use crate::store::{self, JobStore, StoreError};

use super::progress::{ProgressReporter, Stage};

/// Reason stored when the extractor returns nothing.
pub const NO_DATA_REASON: &str = "no data extracted";

/// How a single execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { items: u32 },
    Failed { reason: String },
    /// The job was not Pending when a worker picked it up.
    Skipped { reason: String },
}

/// Drives one job from Pending to a terminal state.
pub struct JobPipeline {
    store: Arc<dyn JobStore>,
    extractor: Arc<dyn Extractor>,
}

impl JobPipeline {
    pub fn new(store: Arc<dyn JobStore>, extractor: Arc<dyn Extractor>) -> Self {
        Self { store, extractor }
    }

    /// Executes `job_id`. Never returns an error: every failure after the
    /// job starts is recorded on the job itself.
    pub async fn run(&self, job_id: JobId, progress: &dyn ProgressReporter) -> JobOutcome {
        let job = match store::blocking(&self.store, move |s| s.mark_running(job_id)).await {
            Ok(job) => job,
            Err(HarvestError::NotFound(_))
            | Err(HarvestError::Store(StoreError::InvalidTransition { .. })) => {
                log::warn!("Job {} is no longer pending, skipping", job_id);
                return JobOutcome::Skipped {
                    reason: "job is no longer pending".to_string(),
                };
            }
            Err(e) => {
                log::error!("Job {} could not be started: {}", job_id, e);
                return self
                    .abort(job_id, format!("failed to start: {}", e), progress)
                    .await;
            }
        };

        let span = info_span!("job",
            job_id = job.id,
            query = %sanitize::redact_query(&job.query),
            max_results = job.max_results,
            extractor = self.extractor.name(),
        );
        self.execute(job, progress).instrument(span).await
    }

    async fn execute(&self, job: Job, progress: &dyn ProgressReporter) -> JobOutcome {
        progress.report(Stage::Started);

        progress.report(Stage::Extracting);
        let extracted = self
            .extractor
            .extract(&job.query, job.max_results)
            .instrument(info_span!("extract"))
            .await;

        let mut records = match extracted {
            Ok(records) if !records.is_empty() => records,
            Ok(_) => return self.abort(job.id, NO_DATA_REASON.to_string(), progress).await,
            Err(e) => {
                log::warn!("Extraction failed for job {}: {}", job.id, e);
                return self.abort(job.id, e.to_string(), progress).await;
            }
        };
        records.truncate(job.max_results as usize);

        progress.report(Stage::Processing);
        let job_id = job.id;
        let count = records.len();
        let persisted = store::blocking(&self.store, move |s| s.complete_job(job_id, &records))
            .instrument(info_span!("persist", items = count))
            .await;

        match persisted {
            Ok(done) => {
                log::info!(
                    "Job {} completed with {} item(s)",
                    done.id,
                    done.results_count
                );
                progress.report(Stage::Completed {
                    items: done.results_count,
                });
                JobOutcome::Completed {
                    items: done.results_count,
                }
            }
            Err(e) => {
                log::error!("Failed to persist results for job {}: {}", job_id, e);
                self.abort(job_id, format!("failed to persist results: {}", e), progress)
                    .await
            }
        }
    }

    /// Moves the job to Failed and reports it.
    ///
    /// Used for extraction failures, persistence failures and by the worker
    /// pool when a job task panics. Does nothing visible if the job already
    /// reached a terminal state.
    pub async fn abort(
        &self,
        job_id: JobId,
        reason: String,
        progress: &dyn ProgressReporter,
    ) -> JobOutcome {
        let stored_reason = reason.clone();
        match store::blocking(&self.store, move |s| s.fail_job(job_id, &stored_reason)).await {
            Ok(_) => {
                log::info!("Job {} failed: {}", job_id, reason);
                progress.report(Stage::Failed {
                    reason: reason.clone(),
                });
                JobOutcome::Failed { reason }
            }
            Err(HarvestError::Store(StoreError::InvalidTransition { from, .. })) => {
                log::warn!(
                    "Job {} already {}, not recording failure: {}",
                    job_id,
                    from,
                    reason
                );
                JobOutcome::Skipped { reason }
            }
            Err(e) => {
                // The store is unreachable; observers still need an end event.
                log::error!("Could not record failure of job {}: {}", job_id, e);
                progress.report(Stage::Failed {
                    reason: reason.clone(),
                });
                JobOutcome::Failed { reason }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::NoopProgress;
    use crate::db::Database;
    use crate::extractor::{ExtractionError, SampleExtractor};
    use crate::job::{ExtractedRecord, JobStatus};
    use crate::store::SqliteJobStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<Stage>>,
    }

    impl ProgressReporter for Recorder {
        fn report(&self, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }
    }

    impl Recorder {
        fn progress(&self) -> Vec<u8> {
            self.stages.lock().unwrap().iter().map(Stage::progress).collect()
        }
    }

    struct Fixed(Result<Vec<ExtractedRecord>, String>);

    #[async_trait]
    impl Extractor for Fixed {
        async fn extract(
            &self,
            _query: &str,
            _max_results: u32,
        ) -> Result<Vec<ExtractedRecord>, ExtractionError> {
            self.0.clone().map_err(ExtractionError::Failed)
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn setup(extractor: Arc<dyn Extractor>) -> (Arc<dyn JobStore>, JobPipeline) {
        let store: Arc<dyn JobStore> =
            Arc::new(SqliteJobStore::new(Database::open_in_memory().unwrap()));
        let pipeline = JobPipeline::new(store.clone(), extractor);
        (store, pipeline)
    }

    #[tokio::test]
    async fn test_successful_run() {
        let (store, pipeline) = setup(Arc::new(SampleExtractor::new()));
        let job = store.create_job("iphone", 3).unwrap();
        let recorder = Recorder::default();

        let outcome = pipeline.run(job.id, &recorder).await;
        assert_eq!(outcome, JobOutcome::Completed { items: 3 });
        assert_eq!(recorder.progress(), vec![10, 30, 70, 100]);

        let details = store.get_details(job.id).unwrap();
        assert_eq!(details.job.status, JobStatus::Completed);
        assert_eq!(details.job.results_count, 3);
        assert_eq!(details.scraped_items.len(), 3);
    }

    #[tokio::test]
    async fn test_oversized_result_is_truncated() {
        let records = (0..10)
            .map(|i| ExtractedRecord::titled(format!("r{}", i)))
            .collect();
        let (store, pipeline) = setup(Arc::new(Fixed(Ok(records))));
        let job = store.create_job("q", 4).unwrap();

        let outcome = pipeline.run(job.id, &NoopProgress).await;
        assert_eq!(outcome, JobOutcome::Completed { items: 4 });
        assert_eq!(store.get_details(job.id).unwrap().scraped_items.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_result_fails_job() {
        let (store, pipeline) = setup(Arc::new(Fixed(Ok(vec![]))));
        let job = store.create_job("q", 4).unwrap();
        let recorder = Recorder::default();

        let outcome = pipeline.run(job.id, &recorder).await;
        assert_eq!(
            outcome,
            JobOutcome::Failed {
                reason: NO_DATA_REASON.to_string()
            }
        );
        assert_eq!(recorder.progress(), vec![10, 30, 0]);

        let job = store.get_job(job.id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some(NO_DATA_REASON));
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_extractor_error_fails_job() {
        let (store, pipeline) = setup(Arc::new(Fixed(Err("upstream timed out".to_string()))));
        let job = store.create_job("q", 4).unwrap();

        pipeline.run(job.id, &NoopProgress).await;
        let job = store.get_job(job.id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("upstream timed out"));
        assert_eq!(job.results_count, 0);
    }

    #[tokio::test]
    async fn test_non_pending_job_is_skipped() {
        let (store, pipeline) = setup(Arc::new(SampleExtractor::new()));
        let job = store.create_job("q", 1).unwrap();
        store.fail_job(job.id, "cancelled").unwrap();
        let recorder = Recorder::default();

        let outcome = pipeline.run(job.id, &recorder).await;
        assert!(matches!(outcome, JobOutcome::Skipped { .. }));
        assert!(recorder.progress().is_empty());
        assert!(matches!(
            pipeline.run(12345, &recorder).await,
            JobOutcome::Skipped { .. }
        ));
    }

    #[tokio::test]
    async fn test_abort_after_completion_is_ignored() {
        let (store, pipeline) = setup(Arc::new(SampleExtractor::new()));
        let job = store.create_job("iphone", 1).unwrap();
        pipeline.run(job.id, &NoopProgress).await;

        let recorder = Recorder::default();
        let outcome = pipeline
            .abort(job.id, "late panic".to_string(), &recorder)
            .await;
        assert!(matches!(outcome, JobOutcome::Skipped { .. }));
        assert!(recorder.progress().is_empty());
        assert_eq!(store.get_job(job.id).unwrap().status, JobStatus::Completed);
    }
}
