//! Domain models for Tally

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decoded upload row: string-keyed fields in source column order.
pub type RowData = serde_json::Map<String, Value>;

/// Canonical row keys the normalizer consumes.
pub const MANDATORY_FIELDS: [&str; 4] = ["transactionId", "amount", "referenceNumber", "date"];

/// Lifecycle states of an upload job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "Processing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Processing" => Ok(Self::Processing),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Matching verdicts for a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    Matched,
    PartiallyMatched,
    NotMatched,
    Duplicate,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matched => "Matched",
            Self::PartiallyMatched => "PartiallyMatched",
            Self::NotMatched => "NotMatched",
            Self::Duplicate => "Duplicate",
        }
    }
}

impl std::str::FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Matched" => Ok(Self::Matched),
            "PartiallyMatched" => Ok(Self::PartiallyMatched),
            "NotMatched" => Ok(Self::NotMatched),
            "Duplicate" => Ok(Self::Duplicate),
            _ => Err(format!("Unknown match status: {}", s)),
        }
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State-changing actions recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Upload,
    Reconcile,
    Correct,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Upload => "UPLOAD",
            Self::Reconcile => "RECONCILE",
            Self::Correct => "CORRECT",
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            "UPLOAD" => Ok(Self::Upload),
            "RECONCILE" => Ok(Self::Reconcile),
            "CORRECT" => Ok(Self::Correct),
            _ => Err(format!("Unknown audit action: {}", s)),
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Origin of an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditSource {
    Manual,
    Auto,
    System,
}

impl AuditSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "Manual",
            Self::Auto => "Auto",
            Self::System => "System",
        }
    }
}

impl std::str::FromStr for AuditSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Manual" => Ok(Self::Manual),
            "Auto" => Ok(Self::Auto),
            "System" => Ok(Self::System),
            _ => Err(format!("Unknown audit source: {}", s)),
        }
    }
}

impl std::fmt::Display for AuditSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Column configuration carried by an upload job: the field names found in
/// the file plus the user-supplied field-to-canonical-field mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub available_columns: Vec<String>,
    #[serde(default)]
    pub mapping: HashMap<String, String>,
}

/// One submitted file's processing lifecycle and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    pub id: i64,
    /// Authenticated user who submitted the file (opaque actor reference)
    pub actor: String,
    pub file_name: String,
    /// SHA-256 of the raw upload bytes; unique across all jobs
    pub file_hash: String,
    pub status: JobStatus,
    pub total_records: i64,
    pub records_processed: i64,
    pub column_mapping: ColumnMapping,
    /// Set only when status is Failed
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A new upload job (before DB insertion)
#[derive(Debug, Clone)]
pub struct NewUploadJob {
    pub actor: String,
    pub file_name: String,
    pub file_hash: String,
    pub total_records: i64,
    pub column_mapping: ColumnMapping,
}

/// One normalized transaction row belonging to an upload job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub upload_job_id: i64,
    pub transaction_id: String,
    pub reference_number: String,
    pub amount: f64,
    pub date: DateTime<Utc>,
    /// Raw uploaded row, preserved verbatim
    pub uploaded_data: RowData,
    pub system_data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// A new record to be materialized (before DB insertion)
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub upload_job_id: i64,
    pub transaction_id: String,
    pub reference_number: String,
    pub amount: f64,
    pub date: DateTime<Utc>,
    pub uploaded_data: RowData,
}

/// A reference (system-of-record) transaction used for matching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    pub transaction_id: String,
    pub reference_number: String,
    pub amount: f64,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A field whose uploaded and system values disagree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMismatch {
    pub field_name: String,
    pub uploaded_value: Value,
    pub system_value: Value,
}

/// The matching verdict for one record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub id: i64,
    pub record_id: i64,
    pub upload_job_id: i64,
    pub status: MatchStatus,
    pub matched_fields: Vec<String>,
    pub mismatched_fields: Vec<FieldMismatch>,
    /// 0-100 match strength (100 exact, 75 partial, 0 otherwise)
    pub confidence: i64,
    /// Snapshot of the matched ledger record, if any
    pub system_record: Option<LedgerRecord>,
    pub created_at: DateTime<Utc>,
}

/// An immutable audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    /// Null for job-level events
    pub record_id: Option<i64>,
    /// Null for system-originated events
    pub actor: Option<String>,
    pub action: AuditAction,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub source: AuditSource,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A new audit entry (before DB insertion)
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub record_id: Option<i64>,
    pub actor: Option<String>,
    pub action: AuditAction,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub source: AuditSource,
    pub description: String,
}

/// Partial update applied to a record by an explicit correction.
///
/// transaction_id and amount overwrite only when a usable value is supplied
/// (non-blank id, non-zero amount); uploaded_data is shallow-merged key by key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionPatch {
    pub transaction_id: Option<String>,
    pub amount: Option<f64>,
    pub uploaded_data: Option<RowData>,
}

impl CorrectionPatch {
    pub fn is_empty(&self) -> bool {
        self.transaction_id.is_none() && self.amount.is_none() && self.uploaded_data.is_none()
    }
}

/// Outcome of submitting an upload
#[derive(Debug, Clone, Serialize)]
pub enum SubmitOutcome {
    /// A new job was created and background processing started
    Created {
        job_id: i64,
        total_records: i64,
        available_columns: Vec<String>,
    },
    /// Byte-identical content was already processed; no new job created
    Duplicate { job_id: i64 },
}

/// Per-job reconciliation summary
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationStats {
    pub total: i64,
    pub matched: i64,
    pub partially_matched: i64,
    pub not_matched: i64,
    pub duplicates: i64,
    /// Percentage of records fully matched
    pub accuracy: f64,
}
