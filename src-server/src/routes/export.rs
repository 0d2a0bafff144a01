//! CSV and spreadsheet downloads of a job's items.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use harvest::export::{self, csv, xlsx, ExportTable};
use harvest::{JobDetails, JobId};

use crate::error::ApiResult;
use crate::state::AppState;

fn attachment(content_type: &'static str, filename: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

async fn load(state: &AppState, id: JobId) -> ApiResult<(JobDetails, ExportTable)> {
    let details = state.runner.get(id).await?;
    let table = ExportTable::from_job(&details)?;
    Ok((details, table))
}

/// GET /api/scraping/jobs/{id}/export/csv
pub async fn export_csv(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> ApiResult<Response> {
    let (details, table) = load(&state, id).await?;
    let body = csv::render(&table);
    tracing::info!(job_id = id, rows = table.rows.len(), "Exported CSV");
    Ok(attachment(
        csv::CONTENT_TYPE,
        &export::export_filename(&details.job, "csv"),
        body.into_bytes(),
    ))
}

/// GET /api/scraping/jobs/{id}/export/excel
pub async fn export_excel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> ApiResult<Response> {
    let (details, table) = load(&state, id).await?;
    let body = xlsx::render(&table, &details.job)?;
    tracing::info!(job_id = id, rows = table.rows.len(), "Exported workbook");
    Ok(attachment(
        xlsx::CONTENT_TYPE,
        &export::export_filename(&details.job, "xlsx"),
        body,
    ))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs/{id}/export/csv", get(export_csv))
        .route("/jobs/{id}/export/excel", get(export_excel))
}
