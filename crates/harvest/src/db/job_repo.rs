//! Job repository: CRUD operations for the `scraping_jobs` table.
//!
//! Functions take a `&Connection` so they can run either through
//! [`Database::with_conn`](super::Database::with_conn) or inside a
//! transaction opened with [`Database::with_tx`](super::Database::with_tx).

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{parse_timestamp, DatabaseError};
use crate::job::{Job, JobId, JobStatus};

const TABLE: &str = "scraping_jobs";

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: i64,
    pub query: String,
    pub status: String,
    pub max_results: i64,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
    pub results_count: i64,
    pub error_message: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            query: row.get("query")?,
            status: row.get("status")?,
            max_results: row.get("max_results")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
            results_count: row.get("results_count")?,
            error_message: row.get("error_message")?,
        })
    }

    /// Decodes the row into the domain type.
    pub fn into_job(self) -> Result<Job, DatabaseError> {
        let status = JobStatus::parse(&self.status).ok_or_else(|| DatabaseError::CorruptRow {
            table: TABLE,
            reason: format!("unknown status '{}' for job {}", self.status, self.id),
        })?;
        let completed_at = match self.completed_at.as_deref() {
            Some(s) => Some(parse_timestamp(TABLE, s)?),
            None => None,
        };

        Ok(Job {
            id: self.id,
            query: self.query,
            status,
            max_results: to_u32(self.max_results, "max_results")?,
            created_at: parse_timestamp(TABLE, &self.created_at)?,
            completed_at,
            results_count: to_u32(self.results_count, "results_count")?,
            error_message: self.error_message,
        })
    }
}

fn to_u32(value: i64, column: &str) -> Result<u32, DatabaseError> {
    u32::try_from(value).map_err(|_| DatabaseError::CorruptRow {
        table: TABLE,
        reason: format!("{} out of range: {}", column, value),
    })
}

/// Column updates applied together with a status change.
#[derive(Debug, Default, Clone)]
pub struct TransitionFields<'a> {
    pub completed_at: Option<&'a str>,
    pub results_count: Option<i64>,
    pub error_message: Option<&'a str>,
}

/// Inserts a new pending job and returns its id.
pub fn insert(
    conn: &Connection,
    query: &str,
    max_results: u32,
    created_at: &str,
) -> Result<JobId, DatabaseError> {
    conn.execute(
        "INSERT INTO scraping_jobs (query, status, max_results, created_at, updated_at)
         VALUES (?1, 'pending', ?2, ?3, ?3)",
        params![query, max_results, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Finds a job by its ID.
pub fn find_by_id(conn: &Connection, id: JobId) -> Result<Option<JobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM scraping_jobs WHERE id = ?1",
            params![id],
            JobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Returns every job, newest first.
pub fn list(conn: &Connection) -> Result<Vec<JobRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM scraping_jobs ORDER BY created_at DESC, id DESC")?;
    let rows = stmt
        .query_map([], JobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Returns jobs with the given status, oldest first.
pub fn list_by_status(conn: &Connection, status: &str) -> Result<Vec<JobRow>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM scraping_jobs WHERE status = ?1 ORDER BY created_at, id")?;
    let rows = stmt
        .query_map(params![status], JobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Moves a job from `from` to `to` only if it is currently in `from`.
///
/// Returns `false` when no row matched (unknown id or different status).
/// Optional fields are left untouched when `None`.
pub fn transition(
    conn: &Connection,
    id: JobId,
    from: &str,
    to: &str,
    updated_at: &str,
    fields: &TransitionFields<'_>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE scraping_jobs SET status = ?3, updated_at = ?4,
             completed_at = COALESCE(?5, completed_at),
             results_count = COALESCE(?6, results_count),
             error_message = COALESCE(?7, error_message)
         WHERE id = ?1 AND status = ?2",
        params![
            id,
            from,
            to,
            updated_at,
            fields.completed_at,
            fields.results_count,
            fields.error_message,
        ],
    )?;
    Ok(changed == 1)
}

/// Deletes a job; its items go with it through `ON DELETE CASCADE`.
pub fn delete(conn: &Connection, id: JobId) -> Result<bool, DatabaseError> {
    let changed = conn.execute("DELETE FROM scraping_jobs WHERE id = ?1", params![id])?;
    Ok(changed == 1)
}
