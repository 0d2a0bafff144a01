//! Job submission and inspection endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use harvest::{JobDetails, JobId, SubmitRequest};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// POST /api/scraping/start
///
/// Persists a Pending job and returns it immediately; progress arrives over
/// `/ws`.
pub async fn start_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<Json<JobDetails>> {
    let job = state.runner.submit(request).await?;
    Ok(Json(JobDetails {
        job,
        scraped_items: Vec::new(),
    }))
}

/// GET /api/scraping/jobs - newest first, items inlined.
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<JobDetails>>> {
    Ok(Json(state.runner.list().await?))
}

/// GET /api/scraping/jobs/{id}
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<JobDetails>> {
    Ok(Json(state.runner.get(id).await?))
}

/// DELETE /api/scraping/jobs/{id} - only finished jobs can be removed.
pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> Result<StatusCode, ApiError> {
    state.runner.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/start", post(start_job))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job).delete(delete_job))
}
