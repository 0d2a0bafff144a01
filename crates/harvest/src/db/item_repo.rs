//! Item repository: rows of the `scraped_items` table.

use rusqlite::{params, Connection, Row};
use serde_json::{Map, Value};

use super::DatabaseError;
use crate::job::{ExtractedRecord, JobId, ScrapedItem};

const TABLE: &str = "scraped_items";

/// A raw item row from the database.
#[derive(Debug, Clone)]
pub struct ItemRow {
    pub id: i64,
    pub job_id: i64,
    pub position: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub price: Option<String>,
    pub rating: Option<String>,
    pub date: Option<String>,
    pub additional_data: String,
}

impl ItemRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            position: row.get("position")?,
            title: row.get("title")?,
            description: row.get("description")?,
            url: row.get("url")?,
            price: row.get("price")?,
            rating: row.get("rating")?,
            date: row.get("date")?,
            additional_data: row.get("additional_data")?,
        })
    }

    pub fn into_item(self) -> Result<ScrapedItem, DatabaseError> {
        let additional_data: Map<String, Value> = if self.additional_data.trim().is_empty() {
            Map::new()
        } else {
            serde_json::from_str(&self.additional_data).map_err(|e| DatabaseError::CorruptRow {
                table: TABLE,
                reason: format!("item {} additional_data: {}", self.id, e),
            })?
        };

        Ok(ScrapedItem {
            id: self.id,
            job_id: self.job_id,
            title: self.title,
            description: self.description,
            url: self.url,
            price: self.price,
            rating: self.rating,
            date: self.date,
            additional_data,
        })
    }
}

/// Inserts one record for `job_id` at `position`.
pub fn insert(
    conn: &Connection,
    job_id: JobId,
    position: usize,
    record: &ExtractedRecord,
) -> Result<i64, DatabaseError> {
    let additional_data = serde_json::to_string(&record.additional_data).map_err(|e| {
        DatabaseError::CorruptRow {
            table: TABLE,
            reason: format!("cannot encode additional_data: {}", e),
        }
    })?;

    conn.execute(
        "INSERT INTO scraped_items (job_id, position, title, description, url, price,
             rating, date, additional_data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            job_id,
            position as i64,
            record.title,
            record.description,
            record.url,
            record.price,
            record.rating,
            record.date,
            additional_data,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Returns the items of one job in extraction order.
pub fn find_by_job(conn: &Connection, job_id: JobId) -> Result<Vec<ItemRow>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM scraped_items WHERE job_id = ?1 ORDER BY position, id")?;
    let rows = stmt
        .query_map(params![job_id], ItemRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Counts the items owned by a job.
pub fn count_by_job(conn: &Connection, job_id: JobId) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row(
        "SELECT COUNT(*) FROM scraped_items WHERE job_id = ?1",
        params![job_id],
        |r| r.get(0),
    )?;
    Ok(count)
}
