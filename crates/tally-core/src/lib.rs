//! Tally Core Library
//!
//! Shared functionality for the Tally reconciliation tool:
//! - Database access and migrations
//! - Upload decoders (CSV, Excel)
//! - Record normalization with lossy-by-design defaulting
//! - The matching engine (duplicate / exact / partial classification)
//! - Upload job lifecycle and per-job progress tracking
//! - The append-only audit trail
//! - The ingestion pipeline tying it all together

pub mod db;
pub mod decode;
pub mod error;
pub mod ledger;
pub mod matching;
pub mod models;
pub mod normalize;
pub mod pipeline;

pub use db::{AuditFilter, Database, JobInsertResult};
pub use decode::{FileDecoder, SpreadsheetDecoder, CONTENT_TYPE_CSV, CONTENT_TYPE_XLSX};
pub use error::{Error, Result};
pub use ledger::{CsvLedger, LedgerProvider, StaticLedger};
pub use matching::{classify_records, Classification, PARTIAL_MATCH_TOLERANCE};
pub use models::{
    AuditAction, AuditLogEntry, AuditSource, ColumnMapping, CorrectionPatch, FieldMismatch,
    JobStatus, LedgerRecord, MatchStatus, NewAuditEntry, NewRecord, NewUploadJob, Record,
    ReconciliationResult, ReconciliationStats, RowData, SubmitOutcome, UploadJob,
};
pub use pipeline::ReconciliationPipeline;
