use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use harvest::{ConfigError, ExportError, HarvestError, JobId, WorkerError};

use crate::logging::LoggingError;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("No data found for this job")]
    NoData,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<HarvestError> for ApiError {
    fn from(err: HarvestError) -> Self {
        match err {
            HarvestError::InvalidRequest(message) => ApiError::BadRequest(message),
            HarvestError::NotFound(id) => ApiError::JobNotFound(id),
            HarvestError::Conflict(message) => ApiError::Conflict(message),
            HarvestError::Export(ExportError::NoData) => ApiError::NoData,
            HarvestError::Worker(WorkerError::ChannelClosed) => {
                ApiError::Unavailable("server is shutting down".to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        HarvestError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::BadRequest(message) => {
                tracing::warn!(message = %message, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", message.clone()),
                )
            }
            ApiError::JobNotFound(id) => {
                tracing::warn!(job_id = id, "Job not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Job not found", format!("Job ID: {}", id)),
                )
            }
            ApiError::NoData => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new("No data found for this job"),
            ),
            ApiError::Conflict(message) => {
                tracing::warn!(message = %message, "Conflict");
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::with_details("Conflict", message.clone()),
                )
            }
            ApiError::Unavailable(message) => {
                tracing::warn!(message = %message, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorResponse::with_details("Service unavailable", message.clone()),
                )
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("Internal server error", message.clone()),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Failures that stop the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Harvest(#[from] HarvestError),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
