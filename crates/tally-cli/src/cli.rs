//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - Reconcile uploaded transactions against a reference ledger
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Transaction reconciliation with an auditable trail", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "tally.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set TALLY_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// Reference ledger CSV (defaults to the built-in demo ledger)
    ///
    /// Expected columns: transactionId, referenceNumber, amount, date,
    /// and an optional description.
    #[arg(long, global = true)]
    pub ledger: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Submit a statement file for reconciliation
    Upload {
        /// CSV or xlsx file to upload
        #[arg(short, long)]
        file: PathBuf,

        /// MIME type (inferred from the file extension if not specified)
        #[arg(long)]
        content_type: Option<String>,

        /// Acting user recorded on the job and audit trail
        #[arg(long, default_value = "cli")]
        actor: String,

        /// Return immediately instead of waiting for processing to finish
        #[arg(long)]
        no_wait: bool,
    },

    /// List upload jobs
    Jobs {
        /// Only show jobs submitted by this actor
        #[arg(long)]
        actor: Option<String>,

        /// Maximum number of jobs to show
        #[arg(long, default_value = "20")]
        limit: i64,

        /// Mark jobs stuck in Processing (e.g. after a crash) as failed
        #[arg(long)]
        recover: bool,
    },

    /// Show one job's status and reconciliation summary
    Status {
        /// Upload job ID
        job_id: i64,
    },

    /// Update a job's column mapping
    Map {
        /// Upload job ID
        job_id: i64,

        /// Mapping entries as source=canonical (repeatable)
        #[arg(long = "set", value_name = "SOURCE=CANONICAL")]
        set: Vec<String>,
    },

    /// Re-run reconciliation for a completed job
    Reconcile {
        /// Upload job ID
        job_id: i64,

        /// Acting user recorded on the audit trail
        #[arg(long, default_value = "cli")]
        actor: String,
    },

    /// List reconciliation results for a job
    Results {
        /// Upload job ID
        job_id: i64,

        /// Filter by verdict: Matched, PartiallyMatched, NotMatched, Duplicate
        #[arg(long)]
        status: Option<String>,

        /// Maximum number of results to show
        #[arg(long, default_value = "50")]
        limit: i64,

        /// Offset for pagination
        #[arg(long, default_value = "0")]
        offset: i64,
    },

    /// Show one record with its verdict and audit trail
    Record {
        /// Record ID
        record_id: i64,
    },

    /// Apply a correction to a record
    Correct {
        /// Record ID
        record_id: i64,

        /// Replacement transaction id
        #[arg(long)]
        transaction_id: Option<String>,

        /// Replacement amount
        #[arg(long)]
        amount: Option<f64>,

        /// Uploaded-data fields to merge, as key=value (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Acting user recorded on the audit trail
        #[arg(long, default_value = "cli")]
        actor: String,
    },

    /// Inspect the audit trail
    Audit {
        /// Only entries for this record
        #[arg(long)]
        record_id: Option<i64>,

        /// Only entries by this actor
        #[arg(long)]
        actor: Option<String>,

        /// Only entries with this action (CREATE, UPLOAD, RECONCILE, CORRECT, ...)
        #[arg(long)]
        action: Option<String>,

        /// Only entries from this source (Manual, Auto, System)
        #[arg(long)]
        source: Option<String>,

        /// Maximum number of entries to show
        #[arg(long, default_value = "50")]
        limit: i64,
    },
}
