//! SQLite-backed [`JobStore`].

use chrono::Utc;
use rusqlite::Connection;

use super::{JobStore, StoreError};
use crate::db::item_repo::{self, ItemRow};
use crate::db::job_repo::{self, TransitionFields};
use crate::db::{format_timestamp, Database, DatabaseError};
use crate::job::{ExtractedRecord, Job, JobDetails, JobId, JobStatus, ScrapedItem};

/// Job store on top of the shared [`Database`] handle.
///
/// The handle serializes every call on one connection, so a status read
/// followed by a guarded update inside one closure cannot interleave with
/// another writer.
#[derive(Clone)]
pub struct SqliteJobStore {
    db: Database,
}

impl SqliteJobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

fn load_job(conn: &Connection, id: JobId) -> Result<Option<Job>, DatabaseError> {
    job_repo::find_by_id(conn, id)?
        .map(|row| row.into_job())
        .transpose()
}

fn load_items(conn: &Connection, id: JobId) -> Result<Vec<ScrapedItem>, DatabaseError> {
    item_repo::find_by_job(conn, id)?
        .into_iter()
        .map(ItemRow::into_item)
        .collect()
}

/// Checks that `id` exists and may move to `to`, then applies the guarded
/// update. Runs inside the caller's lock, so nothing is written on error.
fn guarded_transition(
    conn: &Connection,
    id: JobId,
    to: JobStatus,
    fields: &TransitionFields<'_>,
) -> Result<Result<(), StoreError>, DatabaseError> {
    let current = match load_job(conn, id)? {
        Some(job) => job.status,
        None => return Ok(Err(StoreError::NotFound(id))),
    };
    if !current.can_transition_to(to) {
        return Ok(Err(StoreError::InvalidTransition {
            id,
            from: current,
            to,
        }));
    }

    let now = format_timestamp(Utc::now());
    if !job_repo::transition(conn, id, current.as_str(), to.as_str(), &now, fields)? {
        return Ok(Err(StoreError::InvalidTransition {
            id,
            from: current,
            to,
        }));
    }
    Ok(Ok(()))
}

fn reload(conn: &Connection, id: JobId) -> Result<Result<Job, StoreError>, DatabaseError> {
    Ok(load_job(conn, id)?.ok_or(StoreError::NotFound(id)))
}

impl JobStore for SqliteJobStore {
    fn create_job(&self, query: &str, max_results: u32) -> Result<Job, StoreError> {
        let created_at = format_timestamp(Utc::now());
        self.db
            .with_conn(|conn| {
                let id = job_repo::insert(conn, query, max_results, &created_at)?;
                log::debug!("Created job {}", id);
                reload(conn, id)
            })?
    }

    fn get_job(&self, id: JobId) -> Result<Job, StoreError> {
        self.db.with_conn(|conn| reload(conn, id))?
    }

    fn get_details(&self, id: JobId) -> Result<JobDetails, StoreError> {
        self.db.with_conn(|conn| {
            let Some(job) = load_job(conn, id)? else {
                return Ok(Err(StoreError::NotFound(id)));
            };
            let scraped_items = load_items(conn, id)?;
            Ok(Ok(JobDetails { job, scraped_items }))
        })?
    }

    fn list_details(&self) -> Result<Vec<JobDetails>, StoreError> {
        let details = self.db.with_conn(|conn| {
            job_repo::list(conn)?
                .into_iter()
                .map(|row| -> Result<JobDetails, DatabaseError> {
                    let job = row.into_job()?;
                    let scraped_items = load_items(conn, job.id)?;
                    Ok(JobDetails { job, scraped_items })
                })
                .collect::<Result<Vec<_>, DatabaseError>>()
        })?;
        Ok(details)
    }

    fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        let jobs = self.db.with_conn(|conn| {
            job_repo::list_by_status(conn, status.as_str())?
                .into_iter()
                .map(|row| row.into_job())
                .collect::<Result<Vec<_>, _>>()
        })?;
        Ok(jobs)
    }

    fn mark_running(&self, id: JobId) -> Result<Job, StoreError> {
        self.db.with_conn(|conn| {
            if let Err(e) =
                guarded_transition(conn, id, JobStatus::Running, &TransitionFields::default())?
            {
                return Ok(Err(e));
            }
            reload(conn, id)
        })?
    }

    fn complete_job(&self, id: JobId, records: &[ExtractedRecord]) -> Result<Job, StoreError> {
        let completed_at = format_timestamp(Utc::now());
        let fields = TransitionFields {
            completed_at: Some(&completed_at),
            results_count: Some(records.len() as i64),
            error_message: None,
        };

        self.db.with_tx(|tx| {
            if let Err(e) = guarded_transition(tx, id, JobStatus::Completed, &fields)? {
                return Ok(Err(e));
            }
            for (position, record) in records.iter().enumerate() {
                item_repo::insert(tx, id, position, record)?;
            }
            reload(tx, id)
        })?
    }

    fn fail_job(&self, id: JobId, reason: &str) -> Result<Job, StoreError> {
        let reason = if reason.trim().is_empty() {
            "unknown error"
        } else {
            reason
        };
        let completed_at = format_timestamp(Utc::now());
        let fields = TransitionFields {
            completed_at: Some(&completed_at),
            results_count: None,
            error_message: Some(reason),
        };

        self.db.with_conn(|conn| {
            if let Err(e) = guarded_transition(conn, id, JobStatus::Failed, &fields)? {
                return Ok(Err(e));
            }
            reload(conn, id)
        })?
    }

    fn delete_job(&self, id: JobId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let Some(job) = load_job(conn, id)? else {
                return Ok(Err(StoreError::NotFound(id)));
            };
            if !job.status.is_terminal() {
                return Ok(Err(StoreError::NotTerminal {
                    id,
                    status: job.status,
                }));
            }
            job_repo::delete(conn, id)?;
            log::info!("Deleted job {}", id);
            Ok(Ok(()))
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteJobStore {
        SqliteJobStore::new(Database::open_in_memory().unwrap())
    }

    fn records(n: usize) -> Vec<ExtractedRecord> {
        (0..n)
            .map(|i| ExtractedRecord::titled(format!("item {}", i)))
            .collect()
    }

    #[test]
    fn test_create_job_is_pending() {
        let store = store();
        let job = store.create_job("iphone", 3).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.results_count, 0);
        assert!(job.completed_at.is_none());
        assert!(job.error_message.is_none());
        assert_eq!(store.get_job(job.id).unwrap(), job);
    }

    #[test]
    fn test_get_unknown_job() {
        let store = store();
        assert!(matches!(store.get_job(99), Err(StoreError::NotFound(99))));
        assert!(matches!(
            store.get_details(99),
            Err(StoreError::NotFound(99))
        ));
    }

    #[test]
    fn test_complete_writes_items_and_count_together() {
        let store = store();
        let job = store.create_job("q", 5).unwrap();
        store.mark_running(job.id).unwrap();
        let done = store.complete_job(job.id, &records(3)).unwrap();

        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.results_count, 3);
        assert!(done.completed_at.is_some());
        assert!(done.error_message.is_none());

        let details = store.get_details(job.id).unwrap();
        assert_eq!(details.scraped_items.len(), 3);
        assert_eq!(details.scraped_items[0].title.as_deref(), Some("item 0"));
        assert_eq!(details.scraped_items[2].title.as_deref(), Some("item 2"));
    }

    #[test]
    fn test_complete_requires_running() {
        let store = store();
        let job = store.create_job("q", 5).unwrap();
        let err = store.complete_job(job.id, &records(2)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: JobStatus::Pending,
                to: JobStatus::Completed,
                ..
            }
        ));
        // Nothing was inserted by the rejected completion.
        assert!(store.get_details(job.id).unwrap().scraped_items.is_empty());
    }

    #[test]
    fn test_terminal_states_are_immutable() {
        let store = store();
        let job = store.create_job("q", 1).unwrap();
        store.mark_running(job.id).unwrap();
        store.fail_job(job.id, "boom").unwrap();

        assert!(store.mark_running(job.id).is_err());
        assert!(store.complete_job(job.id, &records(1)).is_err());
        assert!(store.fail_job(job.id, "again").is_err());

        let job = store.get_job(job.id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("boom"));
        assert!(store.get_details(job.id).unwrap().scraped_items.is_empty());
    }

    #[test]
    fn test_pending_can_fail_directly() {
        let store = store();
        let job = store.create_job("q", 1).unwrap();
        let failed = store.fail_job(job.id, "").unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("unknown error"));
        assert!(failed.completed_at.is_some());
    }

    #[test]
    fn test_list_details_newest_first() {
        let store = store();
        let first = store.create_job("first", 1).unwrap();
        let second = store.create_job("second", 1).unwrap();
        let ids: Vec<_> = store
            .list_details()
            .unwrap()
            .into_iter()
            .map(|d| d.job.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn test_list_by_status() {
        let store = store();
        let a = store.create_job("a", 1).unwrap();
        store.create_job("b", 1).unwrap();
        store.mark_running(a.id).unwrap();

        let running = store.list_by_status(JobStatus::Running).unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, a.id);
        assert_eq!(store.list_by_status(JobStatus::Pending).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_only_terminal_jobs() {
        let store = store();
        let job = store.create_job("q", 2).unwrap();
        assert!(matches!(
            store.delete_job(job.id),
            Err(StoreError::NotTerminal {
                status: JobStatus::Pending,
                ..
            })
        ));

        store.mark_running(job.id).unwrap();
        store.complete_job(job.id, &records(2)).unwrap();
        store.delete_job(job.id).unwrap();

        assert!(matches!(
            store.get_job(job.id),
            Err(StoreError::NotFound(_))
        ));
        let orphans = store
            .database()
            .with_conn(|conn| item_repo::count_by_job(conn, job.id))
            .unwrap();
        assert_eq!(orphans, 0);
        assert!(matches!(
            store.delete_job(job.id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_additional_keys_keep_extraction_order() {
        use crate::export::ExportTable;

        let store = store();
        let job = store.create_job("iphone", 2).unwrap();
        store.mark_running(job.id).unwrap();

        let mut record = ExtractedRecord::titled("iPhone 15");
        for (key, value) in [("color", "Black"), ("storage", "128GB"), ("availability", "In stock")] {
            record.additional_data.insert(key.to_string(), value.into());
        }
        let mut second = ExtractedRecord::titled("iPhone 15 Pro");
        second.additional_data.insert("warranty".to_string(), "1 year".into());
        second.additional_data.insert("color".to_string(), "Natural".into());
        store.complete_job(job.id, &[record, second]).unwrap();

        let details = store.get_details(job.id).unwrap();
        let keys: Vec<&str> = details.scraped_items[0]
            .additional_data
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["color", "storage", "availability"]);

        let table = ExportTable::from_job(&details).unwrap();
        assert_eq!(
            table.headers[6..],
            ["color", "storage", "availability", "warranty"]
        );
        assert_eq!(table.rows[1][6], "Natural");
        assert_eq!(table.rows[1][9], "1 year");
    }
}
