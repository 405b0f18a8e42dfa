//! Upload job lifecycle operations
//!
//! Jobs move Processing -> Completed | Failed and never leave a terminal
//! state. Progress updates are guarded in SQL so records_processed can only
//! grow, and only while the job is still Processing.

use std::collections::HashMap;

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{ColumnMapping, JobStatus, NewUploadJob, UploadJob};

/// Result of inserting an upload job
#[derive(Debug, Clone)]
pub enum JobInsertResult {
    /// Job was inserted successfully, contains new job ID
    Created(i64),
    /// Content fingerprint already known, contains existing job ID
    DuplicateHash(i64),
}

impl Database {
    /// Insert an upload job, relying on the unique fingerprint constraint
    /// to catch concurrent submissions of identical content.
    pub fn insert_job(&self, job: &NewUploadJob) -> Result<JobInsertResult> {
        let conn = self.conn()?;
        let mapping_json = serde_json::to_string(&job.column_mapping)?;

        let inserted = conn.execute(
            r#"
            INSERT INTO upload_jobs (actor, file_name, file_hash, status, total_records, records_processed, column_mapping)
            VALUES (?, ?, ?, 'Processing', ?, 0, ?)
            "#,
            params![
                job.actor,
                job.file_name,
                job.file_hash,
                job.total_records,
                mapping_json,
            ],
        );

        match inserted {
            Ok(_) => Ok(JobInsertResult::Created(conn.last_insert_rowid())),
            Err(rusqlite::Error::SqliteFailure(e, Some(msg)))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
                    && msg.contains("upload_jobs.file_hash") =>
            {
                let existing: i64 = conn.query_row(
                    "SELECT id FROM upload_jobs WHERE file_hash = ?",
                    params![job.file_hash],
                    |row| row.get(0),
                )?;
                Ok(JobInsertResult::DuplicateHash(existing))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Find a job by its content fingerprint
    pub fn find_job_by_hash(&self, file_hash: &str) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM upload_jobs WHERE file_hash = ?",
                params![file_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Get a single job by ID
    pub fn get_job(&self, id: i64) -> Result<Option<UploadJob>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            r#"
            SELECT id, actor, file_name, file_hash, status, total_records,
                   records_processed, column_mapping, error, created_at
            FROM upload_jobs
            WHERE id = ?
            "#,
            params![id],
            Self::map_job_row,
        );

        match result {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List jobs, newest first, optionally filtered by actor
    pub fn list_jobs(&self, actor: Option<&str>, limit: i64, offset: i64) -> Result<Vec<UploadJob>> {
        let conn = self.conn()?;

        let (sql, params): (&str, Vec<Box<dyn rusqlite::ToSql>>) = if let Some(actor) = actor {
            (
                r#"
                SELECT id, actor, file_name, file_hash, status, total_records,
                       records_processed, column_mapping, error, created_at
                FROM upload_jobs
                WHERE actor = ?
                ORDER BY created_at DESC, id DESC
                LIMIT ? OFFSET ?
                "#,
                vec![
                    Box::new(actor.to_string()) as Box<dyn rusqlite::ToSql>,
                    Box::new(limit),
                    Box::new(offset),
                ],
            )
        } else {
            (
                r#"
                SELECT id, actor, file_name, file_hash, status, total_records,
                       records_processed, column_mapping, error, created_at
                FROM upload_jobs
                ORDER BY created_at DESC, id DESC
                LIMIT ? OFFSET ?
                "#,
                vec![Box::new(limit) as Box<dyn rusqlite::ToSql>, Box::new(offset)],
            )
        };

        let mut stmt = conn.prepare(sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let jobs = stmt
            .query_map(params_refs.as_slice(), Self::map_job_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(jobs)
    }

    /// Count jobs, optionally filtered by actor
    pub fn count_jobs(&self, actor: Option<&str>) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = if let Some(actor) = actor {
            conn.query_row(
                "SELECT COUNT(*) FROM upload_jobs WHERE actor = ?",
                params![actor],
                |row| row.get(0),
            )?
        } else {
            conn.query_row("SELECT COUNT(*) FROM upload_jobs", [], |row| row.get(0))?
        };
        Ok(count)
    }

    /// Advance records_processed to `processed` (1-based position of the last
    /// persisted row). Rejected once the job is terminal, if the counter would
    /// move backwards, or if it would pass total_records.
    pub fn update_job_progress(&self, id: i64, processed: i64) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE upload_jobs
            SET records_processed = ?1
            WHERE id = ?2
              AND status = 'Processing'
              AND records_processed <= ?1
              AND ?1 <= total_records
            "#,
            params![processed, id],
        )?;

        if updated == 0 {
            return Err(Error::Conflict(format!(
                "progress update to {} rejected for job {}",
                processed, id
            )));
        }
        Ok(())
    }

    /// Replace the user-supplied mapping inside the stored column
    /// configuration (the available-column list is untouched).
    pub fn set_column_mapping(
        &self,
        id: i64,
        mapping: &HashMap<String, String>,
    ) -> Result<UploadJob> {
        let mut job = self
            .get_job(id)?
            .ok_or_else(|| Error::NotFound(format!("upload job {} not found", id)))?;

        job.column_mapping.mapping = mapping.clone();
        let mapping_json = serde_json::to_string(&job.column_mapping)?;

        let conn = self.conn()?;
        conn.execute(
            "UPDATE upload_jobs SET column_mapping = ? WHERE id = ?",
            params![mapping_json, id],
        )?;

        Ok(job)
    }

    /// Transition a job to Completed. Only valid while Processing.
    pub fn complete_job(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE upload_jobs SET status = 'Completed' WHERE id = ? AND status = 'Processing'",
            params![id],
        )?;

        if updated == 0 {
            return Err(Error::Conflict(format!("job {} is not processing", id)));
        }
        Ok(())
    }

    /// Transition a job to Failed with the captured error message.
    /// Only valid while Processing.
    pub fn fail_job(&self, id: i64, error: &str) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE upload_jobs SET status = 'Failed', error = ? WHERE id = ? AND status = 'Processing'",
            params![error, id],
        )?;

        if updated == 0 {
            return Err(Error::Conflict(format!("job {} is not processing", id)));
        }
        Ok(())
    }

    /// Recover any jobs that were left in Processing state (e.g., the process
    /// exited mid-materialization). Marks them as failed.
    /// Returns the number of jobs recovered.
    pub fn fail_stuck_jobs(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.execute(
            r#"UPDATE upload_jobs SET
                status = 'Failed',
                error = 'Processing interrupted before completion. Please resubmit the file.'
            WHERE status = 'Processing'"#,
            [],
        )?;
        Ok(count as i64)
    }

    /// Helper to map a row to UploadJob
    fn map_job_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UploadJob> {
        let status_str: String = row.get(4)?;
        let mapping_json: String = row.get(7)?;
        let created_at_str: String = row.get(9)?;

        Ok(UploadJob {
            id: row.get(0)?,
            actor: row.get(1)?,
            file_name: row.get(2)?,
            file_hash: row.get(3)?,
            status: status_str.parse().unwrap_or(JobStatus::Failed),
            total_records: row.get(5)?,
            records_processed: row.get(6)?,
            column_mapping: serde_json::from_str::<ColumnMapping>(&mapping_json)
                .unwrap_or_default(),
            error: row.get(8)?,
            created_at: parse_datetime(&created_at_str),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job(hash: &str) -> NewUploadJob {
        NewUploadJob {
            actor: "analyst".to_string(),
            file_name: "statement.csv".to_string(),
            file_hash: hash.to_string(),
            total_records: 3,
            column_mapping: ColumnMapping {
                available_columns: vec!["transactionId".to_string(), "amount".to_string()],
                mapping: HashMap::new(),
            },
        }
    }

    #[test]
    fn test_insert_and_get_job() {
        let db = Database::in_memory().unwrap();

        let id = match db.insert_job(&new_job("abc123")).unwrap() {
            JobInsertResult::Created(id) => id,
            other => panic!("expected Created, got {:?}", other),
        };

        let job = db.get_job(id).unwrap().unwrap();
        assert_eq!(job.actor, "analyst");
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.total_records, 3);
        assert_eq!(job.records_processed, 0);
        assert_eq!(
            job.column_mapping.available_columns,
            vec!["transactionId", "amount"]
        );
        assert!(job.error.is_none());
    }

    #[test]
    fn test_duplicate_hash_returns_existing_job() {
        let db = Database::in_memory().unwrap();

        let first = match db.insert_job(&new_job("samehash")).unwrap() {
            JobInsertResult::Created(id) => id,
            other => panic!("expected Created, got {:?}", other),
        };

        match db.insert_job(&new_job("samehash")).unwrap() {
            JobInsertResult::DuplicateHash(id) => assert_eq!(id, first),
            other => panic!("expected DuplicateHash, got {:?}", other),
        }

        assert_eq!(db.count_jobs(None).unwrap(), 1);
    }

    #[test]
    fn test_progress_is_monotonic_and_bounded() {
        let db = Database::in_memory().unwrap();
        let JobInsertResult::Created(id) = db.insert_job(&new_job("h1")).unwrap() else {
            panic!("expected Created");
        };

        db.update_job_progress(id, 1).unwrap();
        db.update_job_progress(id, 2).unwrap();
        // Same position is allowed (idempotent checkpoint)
        db.update_job_progress(id, 2).unwrap();

        // Backwards is rejected
        assert!(matches!(
            db.update_job_progress(id, 1),
            Err(Error::Conflict(_))
        ));

        // Beyond total_records is rejected
        assert!(matches!(
            db.update_job_progress(id, 4),
            Err(Error::Conflict(_))
        ));

        assert_eq!(db.get_job(id).unwrap().unwrap().records_processed, 2);
    }

    #[test]
    fn test_terminal_states_absorb() {
        let db = Database::in_memory().unwrap();
        let JobInsertResult::Created(id) = db.insert_job(&new_job("h2")).unwrap() else {
            panic!("expected Created");
        };

        db.complete_job(id).unwrap();

        // No transition out of a terminal state
        assert!(matches!(db.complete_job(id), Err(Error::Conflict(_))));
        assert!(matches!(db.fail_job(id, "late"), Err(Error::Conflict(_))));
        assert!(matches!(
            db.update_job_progress(id, 3),
            Err(Error::Conflict(_))
        ));

        let job = db.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
    }

    #[test]
    fn test_fail_job_captures_error() {
        let db = Database::in_memory().unwrap();
        let JobInsertResult::Created(id) = db.insert_job(&new_job("h3")).unwrap() else {
            panic!("expected Created");
        };

        db.fail_job(id, "decode blew up").unwrap();

        let job = db.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("decode blew up"));
    }

    #[test]
    fn test_set_column_mapping_keeps_available_columns() {
        let db = Database::in_memory().unwrap();
        let JobInsertResult::Created(id) = db.insert_job(&new_job("h4")).unwrap() else {
            panic!("expected Created");
        };

        let mut mapping = HashMap::new();
        mapping.insert("Txn Ref".to_string(), "transactionId".to_string());

        let job = db.set_column_mapping(id, &mapping).unwrap();
        assert_eq!(
            job.column_mapping.mapping.get("Txn Ref").map(String::as_str),
            Some("transactionId")
        );
        assert_eq!(
            job.column_mapping.available_columns,
            vec!["transactionId", "amount"]
        );

        assert!(matches!(
            db.set_column_mapping(9999, &mapping),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_fail_stuck_jobs() {
        let db = Database::in_memory().unwrap();
        let JobInsertResult::Created(a) = db.insert_job(&new_job("h5")).unwrap() else {
            panic!("expected Created");
        };
        let JobInsertResult::Created(b) = db.insert_job(&new_job("h6")).unwrap() else {
            panic!("expected Created");
        };
        db.complete_job(b).unwrap();

        assert_eq!(db.fail_stuck_jobs().unwrap(), 1);
        assert_eq!(db.get_job(a).unwrap().unwrap().status, JobStatus::Failed);
        assert_eq!(db.get_job(b).unwrap().unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn test_list_jobs_by_actor() {
        let db = Database::in_memory().unwrap();
        db.insert_job(&new_job("h7")).unwrap();
        let mut other = new_job("h8");
        other.actor = "viewer".to_string();
        db.insert_job(&other).unwrap();

        assert_eq!(db.list_jobs(None, 10, 0).unwrap().len(), 2);
        assert_eq!(db.list_jobs(Some("analyst"), 10, 0).unwrap().len(), 1);
        assert_eq!(db.count_jobs(Some("viewer")).unwrap(), 1);
    }
}
