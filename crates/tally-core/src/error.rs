//! Error types for Tally

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid data: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Audit log entries are immutable")]
    ImmutableAuditLog,

    #[error("Not found: {0}")]
    NotFound(String),
}

// Hand-written so that the append-only triggers on audit_log surface as the
// invariant violation they are, not as a generic database error.
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(_, Some(message)) = &err {
            if message.contains("append-only") {
                return Error::ImmutableAuditLog;
            }
        }
        Error::Database(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
