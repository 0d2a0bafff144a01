pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod extractor;
pub mod job;
pub mod pipeline;
pub mod runner;
pub mod sanitize;
pub mod store;
pub mod worker;

pub use broadcast::{Observer, ObserverHandle, ProgressBus, ProgressEvent, Subscription};
pub use config::{load_config, load_from_env, Config};
pub use db::Database;
pub use error::{ConfigError, ExportError, HarvestError, Result, WorkerError};
pub use export::ExportTable;
pub use extractor::{ExtractionError, Extractor, HttpExtractor, SampleExtractor};
pub use job::{ExtractedRecord, Job, JobDetails, JobId, JobStatus, ScrapedItem};
pub use runner::{JobRunner, RecoveryReport, SubmitRequest};
pub use store::{JobStore, SqliteJobStore, StoreError};
pub use worker::WorkerStats;
