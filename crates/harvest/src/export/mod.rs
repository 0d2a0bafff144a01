//! Flattening a job's items into tabular downloads.

use serde_json::Value;

use crate::error::ExportError;
use crate::job::{Job, JobDetails};
use crate::sanitize;

pub mod csv;
pub mod xlsx;

pub const FIXED_COLUMNS: [&str; 6] = ["Title", "Description", "URL", "Price", "Rating", "Date"];

/// Items as rows of text cells.
///
/// Columns are the fixed item fields followed by every distinct
/// `additional_data` key, in the order keys are first seen.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExportTable {
    pub fn from_job(details: &JobDetails) -> Result<Self, ExportError> {
        if details.scraped_items.is_empty() {
            return Err(ExportError::NoData);
        }

        let mut extra_keys: Vec<&str> = Vec::new();
        for item in &details.scraped_items {
            for key in item.additional_data.keys() {
                if !extra_keys.contains(&key.as_str()) {
                    extra_keys.push(key);
                }
            }
        }

        let mut headers: Vec<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
        headers.extend(extra_keys.iter().map(|k| k.to_string()));

        let rows = details
            .scraped_items
            .iter()
            .map(|item| {
                let mut row: Vec<String> = [
                    &item.title,
                    &item.description,
                    &item.url,
                    &item.price,
                    &item.rating,
                    &item.date,
                ]
                .iter()
                .map(|field| field.as_deref().unwrap_or_default().to_string())
                .collect();
                row.extend(
                    extra_keys
                        .iter()
                        .map(|key| item.additional_data.get(*key).map(cell_text).unwrap_or_default()),
                );
                row
            })
            .collect();

        Ok(Self { headers, rows })
    }
}

/// Strings as-is, null as empty, everything else as JSON text.
fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `scraping_job_<id>_<query>.<ext>` with the query made file-name safe.
pub fn export_filename(job: &Job, extension: &str) -> String {
    format!(
        "scraping_job_{}_{}.{}",
        job.id,
        sanitize::filename_component(&job.query),
        extension
    )
}
