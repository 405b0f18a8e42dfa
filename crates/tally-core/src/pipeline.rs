//! Ingestion coordinator: the upload processing and reconciliation pipeline
//!
//! `submit_upload` fingerprints the content, short-circuits resubmissions,
//! creates the job, and hands the decoded rows to a detached background
//! thread. Materialization is strictly sequential with a progress checkpoint
//! after every row; callers poll job status rather than wait.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::decode::{extract_columns, FileDecoder, SpreadsheetDecoder};
use crate::error::{Error, Result};
use crate::ledger::LedgerProvider;
use crate::matching::classify_records;
use crate::models::{
    AuditAction, AuditSource, ColumnMapping, CorrectionPatch, JobStatus, NewAuditEntry,
    NewUploadJob, Record, ReconciliationResult, SubmitOutcome, UploadJob,
};
use crate::normalize::normalize_row;

/// Advisory per-job locks: materialization and reconciliation runs on the
/// same job are mutually exclusive.
#[derive(Clone, Default)]
struct JobLocks {
    active: Arc<Mutex<HashSet<i64>>>,
}

impl JobLocks {
    fn acquire(&self, job_id: i64) -> Result<JobLockGuard> {
        let mut active = self.active.lock().expect("job lock poisoned");
        if !active.insert(job_id) {
            return Err(Error::Conflict(format!(
                "job {} is already being processed",
                job_id
            )));
        }
        Ok(JobLockGuard {
            locks: self.clone(),
            job_id,
        })
    }
}

struct JobLockGuard {
    locks: JobLocks,
    job_id: i64,
}

impl Drop for JobLockGuard {
    fn drop(&mut self) {
        self.locks
            .active
            .lock()
            .expect("job lock poisoned")
            .remove(&self.job_id);
    }
}

/// Orchestrates decoding, materialization, matching, and the audit trail
#[derive(Clone)]
pub struct ReconciliationPipeline {
    db: Database,
    decoder: Arc<dyn FileDecoder>,
    ledger: Arc<dyn LedgerProvider>,
    locks: JobLocks,
    progress_cadence: i64,
}

impl ReconciliationPipeline {
    pub fn new(db: Database, ledger: Arc<dyn LedgerProvider>) -> Self {
        Self {
            db,
            decoder: Arc::new(SpreadsheetDecoder),
            ledger,
            locks: JobLocks::default(),
            progress_cadence: 1,
        }
    }

    /// Swap in a different decoder (the default handles CSV and xlsx)
    pub fn with_decoder(mut self, decoder: Arc<dyn FileDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Persist progress every `cadence` rows instead of after every row.
    ///
    /// Progress stays monotonic and the position of the last persisted row is
    /// always flushed at the end of the batch; a larger cadence only trades
    /// polling granularity for fewer store round-trips.
    pub fn with_progress_cadence(mut self, cadence: i64) -> Self {
        self.progress_cadence = cadence.max(1);
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Submit an upload for processing.
    ///
    /// Idempotent on content: byte-identical resubmissions return the
    /// existing job id without creating anything. On success the job is
    /// created in Processing state and materialization continues on a
    /// background thread; the returned metadata is available immediately.
    pub fn submit_upload(
        &self,
        actor: &str,
        file_name: &str,
        content: &[u8],
        content_type: &str,
        mapping: Option<HashMap<String, String>>,
    ) -> Result<SubmitOutcome> {
        let file_hash = hex::encode(Sha256::digest(content));

        if let Some(job_id) = self.db.find_job_by_hash(&file_hash)? {
            info!("upload {} already processed as job {}", file_name, job_id);
            return Ok(SubmitOutcome::Duplicate { job_id });
        }

        let rows = self.decoder.decode(content, content_type)?;
        if rows.is_empty() {
            return Err(Error::Validation(
                "file is empty or contained no data rows".to_string(),
            ));
        }

        let available_columns = extract_columns(&rows);
        let total_records = rows.len() as i64;

        let job = NewUploadJob {
            actor: actor.to_string(),
            file_name: file_name.to_string(),
            file_hash,
            total_records,
            column_mapping: ColumnMapping {
                available_columns: available_columns.clone(),
                mapping: mapping.unwrap_or_default(),
            },
        };

        let job_id = match self.db.insert_job(&job)? {
            // A concurrent identical submission won the race; same outcome
            // as finding the job up front.
            crate::db::JobInsertResult::DuplicateHash(job_id) => {
                return Ok(SubmitOutcome::Duplicate { job_id });
            }
            crate::db::JobInsertResult::Created(job_id) => job_id,
        };

        info!(
            "created job {} for {} ({} rows)",
            job_id, file_name, total_records
        );

        let worker = self.clone();
        std::thread::spawn(move || worker.process_job(job_id, rows));

        Ok(SubmitOutcome::Created {
            job_id,
            total_records,
            available_columns,
        })
    }

    /// Replace the user-supplied field mapping on a job's stored column
    /// configuration
    pub fn update_column_mapping(
        &self,
        job_id: i64,
        mapping: &HashMap<String, String>,
    ) -> Result<UploadJob> {
        self.db.set_column_mapping(job_id, mapping)
    }

    /// Background entry point: materialize rows, run matching, finalize the
    /// job. Failures land on the job record, never on a caller.
    fn process_job(&self, job_id: i64, rows: Vec<Value>) {
        let _guard = match self.locks.acquire(job_id) {
            Ok(guard) => guard,
            Err(e) => {
                warn!("job {} skipped: {}", job_id, e);
                return;
            }
        };

        if let Err(e) = self.materialize_and_match(job_id, &rows) {
            error!("upload processing failed for job {}: {}", job_id, e);
            if let Err(e2) = self.db.fail_job(job_id, &e.to_string()) {
                error!("failed to mark job {} as failed: {}", job_id, e2);
            }
        }
    }

    fn materialize_and_match(&self, job_id: i64, rows: &[Value]) -> Result<()> {
        let job = self
            .db
            .get_job(job_id)?
            .ok_or_else(|| Error::NotFound(format!("upload job {} not found", job_id)))?;

        let mut pending_checkpoint = None;
        for (index, row) in rows.iter().enumerate() {
            let Some(fields) = row.as_object() else {
                warn!("skipping malformed row {} in job {}", index, job_id);
                continue;
            };

            let record = normalize_row(job_id, index, fields);
            self.db.insert_record(&record)?;

            // Checkpoint at the row's 1-based position so pollers see
            // monotonic progress
            let position = (index + 1) as i64;
            if position % self.progress_cadence == 0 {
                self.db.update_job_progress(job_id, position)?;
                pending_checkpoint = None;
            } else {
                pending_checkpoint = Some(position);
            }
        }
        if let Some(position) = pending_checkpoint {
            self.db.update_job_progress(job_id, position)?;
        }

        debug!("materialized {} rows for job {}", rows.len(), job_id);

        self.run_matching(job_id)?;
        self.db.complete_job(job_id)?;

        self.db.append_audit(&NewAuditEntry {
            record_id: None,
            actor: Some(job.actor),
            action: AuditAction::Upload,
            old_value: None,
            new_value: None,
            source: AuditSource::System,
            description: format!("Uploaded {} records", rows.len()),
        })?;

        info!("upload processing completed for job {}", job_id);
        Ok(())
    }

    /// Compute and store the current verdict set for a job. Prior results
    /// are discarded first; the swap is atomic with respect to readers.
    fn run_matching(&self, job_id: i64) -> Result<Vec<ReconciliationResult>> {
        let records = self.db.list_records_for_job(job_id)?;
        let ledger = self.ledger.reference_records()?;

        let classified: Vec<(i64, _)> = records
            .iter()
            .map(|r| r.id)
            .zip(classify_records(&records, &ledger))
            .collect();

        self.db.replace_job_results(job_id, &classified)?;
        self.db.list_results_for_job(job_id)
    }

    /// Explicitly re-run reconciliation for a job.
    ///
    /// Idempotent given unchanged records and ledger. Rejected while the job
    /// is still materializing; results are recomputed from scratch.
    pub fn rerun_reconciliation(
        &self,
        job_id: i64,
        actor: Option<&str>,
    ) -> Result<Vec<ReconciliationResult>> {
        let job = self
            .db
            .get_job(job_id)?
            .ok_or_else(|| Error::NotFound(format!("upload job {} not found", job_id)))?;

        if job.status == JobStatus::Processing {
            return Err(Error::Conflict(format!(
                "job {} is still processing; reconciliation can run once ingestion finishes",
                job_id
            )));
        }

        let _guard = self.locks.acquire(job_id)?;
        let results = self.run_matching(job_id)?;

        // Best-effort trail entry; the recomputed results stand either way
        let audit = NewAuditEntry {
            record_id: None,
            actor: actor.map(str::to_string),
            action: AuditAction::Reconcile,
            old_value: None,
            new_value: None,
            source: AuditSource::Auto,
            description: format!("Reconciled {} records", results.len()),
        };
        if let Err(e) = self.db.append_audit(&audit) {
            warn!("audit append failed after reconciliation of job {}: {}", job_id, e);
        }

        Ok(results)
    }

    /// Apply an explicit correction to a record.
    ///
    /// Only supplied fields change: a blank transaction id or zero amount is
    /// treated as absent rather than an overwrite, and uploaded data is
    /// shallow-merged key by key. The audit entry is appended after the
    /// record write is durable; if the append fails the correction still
    /// stands (the two stores are eventually, not atomically, consistent).
    /// Matching is NOT re-run; existing results may go stale until an
    /// explicit rerun.
    pub fn correct_record(
        &self,
        actor: &str,
        record_id: i64,
        patch: &CorrectionPatch,
    ) -> Result<Record> {
        if patch.is_empty() {
            return Err(Error::Validation("corrected data required".to_string()));
        }

        let record = self
            .db
            .get_record(record_id)?
            .ok_or_else(|| Error::NotFound(format!("record {} not found", record_id)))?;

        let old_value = correction_snapshot(&record);

        let mut updated = record;
        if let Some(transaction_id) = patch.transaction_id.as_deref() {
            let trimmed = transaction_id.trim();
            if !trimmed.is_empty() {
                updated.transaction_id = trimmed.to_string();
            }
        }
        if let Some(amount) = patch.amount {
            if amount != 0.0 {
                updated.amount = amount;
            }
        }
        if let Some(data) = &patch.uploaded_data {
            for (key, value) in data {
                updated.uploaded_data.insert(key.clone(), value.clone());
            }
        }

        self.db.update_record_correction(&updated)?;

        let audit = NewAuditEntry {
            record_id: Some(record_id),
            actor: Some(actor.to_string()),
            action: AuditAction::Correct,
            old_value: Some(old_value),
            new_value: Some(correction_snapshot(&updated)),
            source: AuditSource::Manual,
            description: format!("Record corrected by {}", actor),
        };
        if let Err(e) = self.db.append_audit(&audit) {
            warn!(
                "correction applied to record {} but audit append failed: {}",
                record_id, e
            );
        }

        Ok(updated)
    }

    /// Poll a job until it leaves Processing or the timeout elapses.
    /// Returns the job in whatever state it is in at that point.
    pub fn wait_for_job(&self, job_id: i64, timeout: Duration) -> Result<UploadJob> {
        let deadline = Instant::now() + timeout;
        loop {
            let job = self
                .db
                .get_job(job_id)?
                .ok_or_else(|| Error::NotFound(format!("upload job {} not found", job_id)))?;

            if job.status != JobStatus::Processing || Instant::now() >= deadline {
                return Ok(job);
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

/// The correction-relevant slice of a record, as stored in audit snapshots
fn correction_snapshot(record: &Record) -> Value {
    json!({
        "transactionId": record.transaction_id,
        "amount": record.amount,
        "uploadedData": record.uploaded_data,
    })
}
