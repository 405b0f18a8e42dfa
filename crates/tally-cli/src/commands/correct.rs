//! Record correction command

use anyhow::Result;
use serde_json::Value;
use tally_core::{CorrectionPatch, RowData};

use super::{build_pipeline, parse_pairs};
use crate::cli::Cli;

pub fn cmd_correct(
    cli: &Cli,
    record_id: i64,
    transaction_id: Option<String>,
    amount: Option<f64>,
    set: &[String],
    actor: &str,
) -> Result<()> {
    let pipeline = build_pipeline(cli)?;

    let uploaded_data = if set.is_empty() {
        None
    } else {
        let mut data = RowData::new();
        for (key, value) in parse_pairs(set)? {
            data.insert(key, Value::String(value));
        }
        Some(data)
    };

    let patch = CorrectionPatch {
        transaction_id,
        amount,
        uploaded_data,
    };

    let record = pipeline.correct_record(actor, record_id, &patch)?;

    println!("✅ Record {} corrected", record.id);
    println!("   Transaction id: {}", record.transaction_id);
    println!("   Amount:         {}", record.amount);
    println!("   Note: existing reconciliation results are not recomputed;");
    println!("         run `tally reconcile {}` to refresh them.", record.upload_job_id);

    Ok(())
}
