//! Command implementations and shared utilities

mod audit;
mod correct;
mod jobs;
mod reconcile;
mod upload;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tally_core::{CsvLedger, Database, LedgerProvider, ReconciliationPipeline, StaticLedger};

use crate::cli::Cli;

pub use audit::cmd_audit;
pub use correct::cmd_correct;
pub use jobs::{cmd_jobs, cmd_map, cmd_status};
pub use reconcile::{cmd_reconcile, cmd_record, cmd_results};
pub use upload::cmd_upload;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path.to_str().context("Invalid database path")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Build a pipeline wired to the selected ledger provider
pub fn build_pipeline(cli: &Cli) -> Result<ReconciliationPipeline> {
    let db = open_db(&cli.db, cli.no_encrypt)?;

    let ledger: Arc<dyn LedgerProvider> = match &cli.ledger {
        Some(path) => Arc::new(CsvLedger::new(path)),
        None => Arc::new(StaticLedger::builtin()),
    };

    Ok(ReconciliationPipeline::new(db, ledger))
}

/// Parse repeated `key=value` arguments
pub fn parse_pairs(entries: &[String]) -> Result<Vec<(String, String)>> {
    entries
        .iter()
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .with_context(|| format!("Expected key=value, got: {}", entry))
        })
        .collect()
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let _db = open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Submit a statement: tally upload --file statement.csv");
    println!("  2. Check progress:     tally status <job-id>");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pairs() {
        let pairs = parse_pairs(&[
            "Txn Ref=transactionId".to_string(),
            "Amount (USD)=amount".to_string(),
        ])
        .unwrap();
        assert_eq!(
            pairs,
            vec![
                ("Txn Ref".to_string(), "transactionId".to_string()),
                ("Amount (USD)".to_string(), "amount".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_pairs_rejects_missing_equals() {
        assert!(parse_pairs(&["oops".to_string()]).is_err());
    }
}
