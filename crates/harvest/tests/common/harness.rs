//! Test harness for isolated runner execution.
//!
//! The `TestHarness` struct provides a complete isolated environment:
//! - A temporary directory holding a file-backed SQLite database
//! - A `ProgressBus` and a `JobRunner` wired to the given extractor
//! - Helpers to wait for jobs to reach a terminal state

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use harvest::config::RunnerConfig;
use harvest::extractor::Extractor;
use harvest::{Database, Job, JobId, JobRunner, JobStore, ProgressBus, SqliteJobStore};

/// Upper bound for any single wait in tests.
pub const WAIT_LIMIT: Duration = Duration::from_secs(10);

pub struct TestHarness {
    /// Keeps the database directory alive for the harness lifetime.
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub store: Arc<dyn JobStore>,
    pub bus: ProgressBus,
    pub runner: JobRunner,
}

impl TestHarness {
    /// Four workers, defaults otherwise.
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self::with_workers(extractor, 4)
    }

    pub fn with_workers(extractor: Arc<dyn Extractor>, workers: usize) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("harvest.db");
        let db = Database::open(&db_path).expect("Failed to open database");
        Self::with_database(temp_dir, db_path, db, extractor, workers)
    }

    /// Builds a harness on an existing database file, as a restarted
    /// process would.
    pub fn reopen(temp_dir: TempDir, extractor: Arc<dyn Extractor>) -> Self {
        let db_path = temp_dir.path().join("harvest.db");
        let db = Database::open(&db_path).expect("Failed to reopen database");
        Self::with_database(temp_dir, db_path, db, extractor, 2)
    }

    fn with_database(
        temp_dir: TempDir,
        db_path: PathBuf,
        db: Database,
        extractor: Arc<dyn Extractor>,
        workers: usize,
    ) -> Self {
        let store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(db));
        let bus = ProgressBus::new();
        let config = RunnerConfig {
            worker_count: workers,
            ..RunnerConfig::default()
        };
        let runner = JobRunner::new(Arc::clone(&store), extractor, bus.clone(), &config);

        Self {
            temp_dir,
            db_path,
            store,
            bus,
            runner,
        }
    }

    /// Polls the store until the job is Completed or Failed.
    pub async fn wait_for_terminal(&self, id: JobId) -> Job {
        tokio::time::timeout(WAIT_LIMIT, async {
            loop {
                let job = self.store.get_job(id).expect("job should exist");
                if job.is_finished() {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("job did not finish in time")
    }

    /// Polls until `cond` holds.
    pub async fn wait_until<F>(&self, mut cond: F)
    where
        F: FnMut() -> bool,
    {
        tokio::time::timeout(WAIT_LIMIT, async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time")
    }

    /// Drains the queue, stops the workers and hands back the directory.
    pub async fn shutdown(self) -> TempDir {
        self.runner.shutdown();
        self.runner.wait().await;
        self.temp_dir
    }
}
