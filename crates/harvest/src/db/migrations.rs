//! Schema migrations for the job database.
//!
//! Applied versions are recorded in `_migrations`. Every step runs in its own
//! transaction together with its bookkeeping row, so a crash mid-upgrade
//! leaves the file at the previous version.

use chrono::Utc;
use rusqlite::{params, Connection};

use super::error::DatabaseError;
use super::format_timestamp;

const BOOKKEEPING: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at TEXT NOT NULL
);";

struct Step {
    version: u32,
    name: &'static str,
    sql: &'static str,
    guard: Guard,
}

enum Guard {
    Always,
    /// Only when `table.column` is missing. Files created by hand or by an
    /// older build may already have it.
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Guard {
    fn should_apply(&self, conn: &Connection) -> Result<bool, DatabaseError> {
        match self {
            Guard::Always => Ok(true),
            Guard::MissingColumn { table, column } => Ok(!column_exists(conn, table, column)?),
        }
    }
}

const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "create_scraping_jobs_table",
        sql: include_str!("sql/001_create_scraping_jobs.sql"),
        guard: Guard::Always,
    },
    Step {
        version: 2,
        name: "create_scraped_items_table",
        sql: include_str!("sql/002_create_scraped_items.sql"),
        guard: Guard::Always,
    },
    Step {
        version: 3,
        name: "add_position_to_scraped_items",
        sql: include_str!("sql/003_add_position_to_scraped_items.sql"),
        guard: Guard::MissingColumn {
            table: "scraped_items",
            column: "position",
        },
    },
];

/// Highest applied version, 0 for a fresh file.
pub fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    conn.execute_batch(BOOKKEEPING)?;
    let version = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |r| {
        r.get(0)
    })?;
    Ok(version)
}

/// Brings the schema up to date and returns the resulting version.
pub fn run_all(conn: &Connection) -> Result<u32, DatabaseError> {
    let mut version = schema_version(conn)?;
    for step in STEPS.iter().filter(move |s| s.version > version) {
        apply(conn, step)?;
        version = step.version;
    }
    Ok(version)
}

fn apply(conn: &Connection, step: &Step) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;

    if step.guard.should_apply(&tx)? {
        log::info!("Applying migration v{} ({})", step.version, step.name);
        tx.execute_batch(step.sql)
            .map_err(|e| DatabaseError::Migration {
                version: step.version,
                reason: e.to_string(),
            })?;
    } else {
        log::debug!(
            "Migration v{} already reflected in the schema, recording it",
            step.version
        );
    }

    tx.execute(
        "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        params![step.version, step.name, format_timestamp(Utc::now())],
    )?;
    tx.commit()?;
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    let found: u32 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |r| r.get(0),
    )?;
    Ok(found > 0)
}
