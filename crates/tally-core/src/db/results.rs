//! Reconciliation result operations
//!
//! A job's results are always replaced as a whole, inside one SQL
//! transaction, so readers of "current" results never observe a partial set.

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::matching::Classification;
use crate::models::{MatchStatus, ReconciliationResult, ReconciliationStats};

impl Database {
    /// Discard all prior results for a job and insert the freshly computed
    /// set atomically.
    pub fn replace_job_results(
        &self,
        upload_job_id: i64,
        classified: &[(i64, Classification)],
    ) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM reconciliation_results WHERE upload_job_id = ?",
            params![upload_job_id],
        )?;

        for (record_id, classification) in classified {
            let matched_json = serde_json::to_string(&classification.matched_fields)?;
            let mismatched_json = serde_json::to_string(&classification.mismatched_fields)?;
            let system_json = classification
                .system_record
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            tx.execute(
                r#"
                INSERT INTO reconciliation_results
                    (record_id, upload_job_id, status, matched_fields, mismatched_fields, confidence, system_record)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    record_id,
                    upload_job_id,
                    classification.status.as_str(),
                    matched_json,
                    mismatched_json,
                    classification.confidence,
                    system_json,
                ],
            )?;
        }

        tx.commit()?;
        Ok(classified.len())
    }

    /// List all results for a job, in record order
    pub fn list_results_for_job(&self, upload_job_id: i64) -> Result<Vec<ReconciliationResult>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, record_id, upload_job_id, status, matched_fields,
                   mismatched_fields, confidence, system_record, created_at
            FROM reconciliation_results
            WHERE upload_job_id = ?
            ORDER BY record_id ASC
            "#,
        )?;

        let results = stmt
            .query_map(params![upload_job_id], Self::map_result_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(results)
    }

    /// Query a job's results with an optional status filter and pagination
    pub fn query_results(
        &self,
        upload_job_id: i64,
        status: Option<MatchStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ReconciliationResult>> {
        let conn = self.conn()?;

        let (sql, params): (&str, Vec<Box<dyn rusqlite::ToSql>>) = if let Some(status) = status {
            (
                r#"
                SELECT id, record_id, upload_job_id, status, matched_fields,
                       mismatched_fields, confidence, system_record, created_at
                FROM reconciliation_results
                WHERE upload_job_id = ? AND status = ?
                ORDER BY record_id ASC
                LIMIT ? OFFSET ?
                "#,
                vec![
                    Box::new(upload_job_id) as Box<dyn rusqlite::ToSql>,
                    Box::new(status.as_str().to_string()),
                    Box::new(limit),
                    Box::new(offset),
                ],
            )
        } else {
            (
                r#"
                SELECT id, record_id, upload_job_id, status, matched_fields,
                       mismatched_fields, confidence, system_record, created_at
                FROM reconciliation_results
                WHERE upload_job_id = ?
                ORDER BY record_id ASC
                LIMIT ? OFFSET ?
                "#,
                vec![
                    Box::new(upload_job_id) as Box<dyn rusqlite::ToSql>,
                    Box::new(limit),
                    Box::new(offset),
                ],
            )
        };

        let mut stmt = conn.prepare(sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let results = stmt
            .query_map(params_refs.as_slice(), Self::map_result_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(results)
    }

    /// Get the result for a single record, if one exists
    pub fn get_result_for_record(&self, record_id: i64) -> Result<Option<ReconciliationResult>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            r#"
            SELECT id, record_id, upload_job_id, status, matched_fields,
                   mismatched_fields, confidence, system_record, created_at
            FROM reconciliation_results
            WHERE record_id = ?
            "#,
            params![record_id],
            Self::map_result_row,
        );

        match result {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Per-job verdict counts plus the fully-matched percentage
    pub fn job_result_stats(&self, upload_job_id: i64) -> Result<ReconciliationStats> {
        let conn = self.conn()?;

        let (total, matched, partially_matched, not_matched, duplicates): (
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = conn.query_row(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(status = 'Matched'), 0),
                   COALESCE(SUM(status = 'PartiallyMatched'), 0),
                   COALESCE(SUM(status = 'NotMatched'), 0),
                   COALESCE(SUM(status = 'Duplicate'), 0)
            FROM reconciliation_results
            WHERE upload_job_id = ?
            "#,
            params![upload_job_id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        )?;

        let accuracy = if total > 0 {
            matched as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Ok(ReconciliationStats {
            total,
            matched,
            partially_matched,
            not_matched,
            duplicates,
            accuracy,
        })
    }

    /// Helper to map a row to ReconciliationResult
    fn map_result_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReconciliationResult> {
        let status_str: String = row.get(3)?;
        let matched_json: String = row.get(4)?;
        let mismatched_json: String = row.get(5)?;
        let system_json: Option<String> = row.get(7)?;
        let created_at_str: String = row.get(8)?;

        Ok(ReconciliationResult {
            id: row.get(0)?,
            record_id: row.get(1)?,
            upload_job_id: row.get(2)?,
            status: status_str.parse().unwrap_or(MatchStatus::NotMatched),
            matched_fields: serde_json::from_str(&matched_json).unwrap_or_default(),
            mismatched_fields: serde_json::from_str(&mismatched_json).unwrap_or_default(),
            confidence: row.get(6)?,
            system_record: system_json.and_then(|s| serde_json::from_str(&s).ok()),
            created_at: parse_datetime(&created_at_str),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnMapping, FieldMismatch, LedgerRecord, NewRecord, NewUploadJob};
    use chrono::{NaiveDate, Utc};
    use serde_json::json;

    fn setup_job_with_records(db: &Database, count: usize) -> (i64, Vec<i64>) {
        let job = NewUploadJob {
            actor: "analyst".to_string(),
            file_name: "statement.csv".to_string(),
            file_hash: format!("resulttest-{}", count),
            total_records: count as i64,
            column_mapping: ColumnMapping::default(),
        };
        let job_id = match db.insert_job(&job).unwrap() {
            super::super::JobInsertResult::Created(id) => id,
            other => panic!("expected Created, got {:?}", other),
        };

        let record_ids = (0..count)
            .map(|i| {
                db.insert_record(&NewRecord {
                    upload_job_id: job_id,
                    transaction_id: format!("TXN-{}", i),
                    reference_number: format!("REF-{}", i),
                    amount: 100.0 + i as f64,
                    date: Utc::now(),
                    uploaded_data: Default::default(),
                })
                .unwrap()
            })
            .collect();

        (job_id, record_ids)
    }

    fn matched(confidence: i64) -> Classification {
        Classification {
            status: MatchStatus::Matched,
            matched_fields: vec!["transactionId".to_string(), "amount".to_string()],
            mismatched_fields: vec![],
            confidence,
            system_record: Some(LedgerRecord {
                transaction_id: "TXN-0".to_string(),
                reference_number: "REF-0".to_string(),
                amount: 100.0,
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                description: None,
            }),
        }
    }

    fn not_matched() -> Classification {
        Classification {
            status: MatchStatus::NotMatched,
            matched_fields: vec![],
            mismatched_fields: vec![],
            confidence: 0,
            system_record: None,
        }
    }

    #[test]
    fn test_replace_and_list_results() {
        let db = Database::in_memory().unwrap();
        let (job_id, record_ids) = setup_job_with_records(&db, 2);

        let classified = vec![
            (record_ids[0], matched(100)),
            (record_ids[1], not_matched()),
        ];
        assert_eq!(db.replace_job_results(job_id, &classified).unwrap(), 2);

        let results = db.list_results_for_job(job_id).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, MatchStatus::Matched);
        assert_eq!(results[0].confidence, 100);
        assert_eq!(
            results[0].system_record.as_ref().unwrap().transaction_id,
            "TXN-0"
        );
        assert_eq!(results[1].status, MatchStatus::NotMatched);
        assert!(results[1].system_record.is_none());
    }

    #[test]
    fn test_replace_is_idempotent_per_record() {
        let db = Database::in_memory().unwrap();
        let (job_id, record_ids) = setup_job_with_records(&db, 1);

        // Running twice must not trip the unique record_id constraint
        let classified = vec![(record_ids[0], matched(100))];
        db.replace_job_results(job_id, &classified).unwrap();
        db.replace_job_results(job_id, &classified).unwrap();

        assert_eq!(db.list_results_for_job(job_id).unwrap().len(), 1);
    }

    #[test]
    fn test_query_results_status_filter() {
        let db = Database::in_memory().unwrap();
        let (job_id, record_ids) = setup_job_with_records(&db, 3);

        let classified = vec![
            (record_ids[0], matched(100)),
            (record_ids[1], not_matched()),
            (record_ids[2], not_matched()),
        ];
        db.replace_job_results(job_id, &classified).unwrap();

        let unmatched = db
            .query_results(job_id, Some(MatchStatus::NotMatched), 10, 0)
            .unwrap();
        assert_eq!(unmatched.len(), 2);

        let page = db.query_results(job_id, None, 2, 1).unwrap();
        assert_eq!(page.len(), 2);
    }

    #[test]
    fn test_mismatched_fields_round_trip() {
        let db = Database::in_memory().unwrap();
        let (job_id, record_ids) = setup_job_with_records(&db, 1);

        let classification = Classification {
            status: MatchStatus::PartiallyMatched,
            matched_fields: vec!["referenceNumber".to_string()],
            mismatched_fields: vec![FieldMismatch {
                field_name: "amount".to_string(),
                uploaded_value: json!(99.99),
                system_value: json!(100.0),
            }],
            confidence: 75,
            system_record: None,
        };
        db.replace_job_results(job_id, &[(record_ids[0], classification)])
            .unwrap();

        let result = db.get_result_for_record(record_ids[0]).unwrap().unwrap();
        assert_eq!(result.mismatched_fields.len(), 1);
        assert_eq!(result.mismatched_fields[0].field_name, "amount");
        assert_eq!(result.mismatched_fields[0].uploaded_value, json!(99.99));
    }

    #[test]
    fn test_job_result_stats() {
        let db = Database::in_memory().unwrap();
        let (job_id, record_ids) = setup_job_with_records(&db, 4);

        let classified = vec![
            (record_ids[0], matched(100)),
            (record_ids[1], matched(100)),
            (record_ids[2], not_matched()),
            (record_ids[3], not_matched()),
        ];
        db.replace_job_results(job_id, &classified).unwrap();

        let stats = db.job_result_stats(job_id).unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.matched, 2);
        assert_eq!(stats.not_matched, 2);
        assert_eq!(stats.accuracy, 50.0);

        let empty = db.job_result_stats(9999).unwrap();
        assert_eq!(empty.total, 0);
        assert_eq!(empty.accuracy, 0.0);
    }
}
