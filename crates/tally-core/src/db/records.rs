//! Normalized record operations

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{NewRecord, Record, RowData};

impl Database {
    /// Insert a materialized record
    pub fn insert_record(&self, record: &NewRecord) -> Result<i64> {
        let conn = self.conn()?;
        let uploaded_json = serde_json::to_string(&record.uploaded_data)?;

        conn.execute(
            r#"
            INSERT INTO records (upload_job_id, transaction_id, reference_number, amount, date, uploaded_data)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                record.upload_job_id,
                record.transaction_id,
                record.reference_number,
                record.amount,
                record.date.to_rfc3339(),
                uploaded_json,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Get a single record by ID
    pub fn get_record(&self, id: i64) -> Result<Option<Record>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            r#"
            SELECT id, upload_job_id, transaction_id, reference_number, amount,
                   date, uploaded_data, system_data, created_at
            FROM records
            WHERE id = ?
            "#,
            params![id],
            Self::map_record_row,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List a job's records in materialization order
    pub fn list_records_for_job(&self, upload_job_id: i64) -> Result<Vec<Record>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, upload_job_id, transaction_id, reference_number, amount,
                   date, uploaded_data, system_data, created_at
            FROM records
            WHERE upload_job_id = ?
            ORDER BY id ASC
            "#,
        )?;

        let records = stmt
            .query_map(params![upload_job_id], Self::map_record_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Count a job's records
    pub fn count_records_for_job(&self, upload_job_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE upload_job_id = ?",
            params![upload_job_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Persist the corrected fields of a record
    pub fn update_record_correction(&self, record: &Record) -> Result<()> {
        let conn = self.conn()?;
        let uploaded_json = serde_json::to_string(&record.uploaded_data)?;

        let updated = conn.execute(
            "UPDATE records SET transaction_id = ?, amount = ?, uploaded_data = ? WHERE id = ?",
            params![
                record.transaction_id,
                record.amount,
                uploaded_json,
                record.id
            ],
        )?;

        if updated == 0 {
            return Err(Error::NotFound(format!("record {} not found", record.id)));
        }
        Ok(())
    }

    /// Helper to map a row to Record
    fn map_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
        let date_str: String = row.get(5)?;
        let uploaded_json: String = row.get(6)?;
        let system_json: Option<String> = row.get(7)?;
        let created_at_str: String = row.get(8)?;

        Ok(Record {
            id: row.get(0)?,
            upload_job_id: row.get(1)?,
            transaction_id: row.get(2)?,
            reference_number: row.get(3)?,
            amount: row.get(4)?,
            date: DateTime::parse_from_rfc3339(&date_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            uploaded_data: serde_json::from_str::<RowData>(&uploaded_json).unwrap_or_default(),
            system_data: system_json.and_then(|s| serde_json::from_str(&s).ok()),
            created_at: parse_datetime(&created_at_str),
        })
    }
}
