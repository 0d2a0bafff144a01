use std::path::PathBuf;
use thiserror::Error;

use crate::job::JobId;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(crate::store::StoreError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid value for environment variable '{name}': {reason}")]
    InvalidEnv { name: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("No data found for this job")]
    NoData,

    #[error("Failed to build spreadsheet: {0}")]
    Spreadsheet(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker queue closed")]
    ChannelClosed,

    #[error("Blocking task failed: {0}")]
    Blocking(String),
}

impl From<crate::store::StoreError> for HarvestError {
    fn from(err: crate::store::StoreError) -> Self {
        use crate::store::StoreError;
        match err {
            StoreError::NotFound(id) => HarvestError::NotFound(id),
            StoreError::NotTerminal { id, status } => {
                HarvestError::Conflict(format!("job {} is still {}", id, status))
            }
            other => HarvestError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
