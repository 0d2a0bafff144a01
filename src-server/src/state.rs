//! Shared state handed to every route.

use std::sync::Arc;
use std::time::Instant;

use log::info;
use tokio::sync::watch;

use harvest::config::Config;
use harvest::store::SqliteJobStore;
use harvest::{extractor, Database, HarvestError, JobRunner, JobStore, ProgressBus};

pub struct AppState {
    pub runner: JobRunner,
    /// Per-connection event buffer for WebSocket observers.
    pub observer_buffer: usize,
    started_at: Instant,
    shutdown: watch::Sender<bool>,
}

impl AppState {
    pub fn new(runner: JobRunner, observer_buffer: usize) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            runner,
            observer_buffer: observer_buffer.max(1),
            started_at: Instant::now(),
            shutdown,
        }
    }

    /// Opens the database, builds the configured extractor and starts the
    /// runner's workers. Must be called inside a tokio runtime.
    pub fn from_config(config: &Config) -> Result<Self, HarvestError> {
        let db_path = config.database.resolved_path()?;
        let db = Database::open(&db_path)?;
        let store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(db));
        let extractor = extractor::from_config(&config.extractor)?;
        info!(
            "Using {} extractor with {} workers",
            extractor.name(),
            config.runner.worker_count
        );

        let runner = JobRunner::new(store, extractor, ProgressBus::new(), &config.runner);
        Ok(Self::new(runner, config.runner.observer_buffer))
    }

    pub fn bus(&self) -> &ProgressBus {
        self.runner.bus()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Tells long-lived connections to close.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}
