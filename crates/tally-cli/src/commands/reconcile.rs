//! Reconciliation and result inspection commands

use anyhow::{anyhow, Context, Result};
use tally_core::{MatchStatus, ReconciliationResult};

use super::build_pipeline;
use crate::cli::Cli;

pub fn cmd_reconcile(cli: &Cli, job_id: i64, actor: &str) -> Result<()> {
    let pipeline = build_pipeline(cli)?;

    println!("🔍 Re-running reconciliation for job {}...", job_id);
    let results = pipeline.rerun_reconciliation(job_id, Some(actor))?;

    println!("✅ Reconciliation completed: {} results", results.len());
    let stats = pipeline.db().job_result_stats(job_id)?;
    println!("   Matched:           {}", stats.matched);
    println!("   Partially matched: {}", stats.partially_matched);
    println!("   Not matched:       {}", stats.not_matched);
    println!("   Duplicates:        {}", stats.duplicates);

    Ok(())
}

pub fn cmd_results(
    cli: &Cli,
    job_id: i64,
    status: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<()> {
    let pipeline = build_pipeline(cli)?;

    let status = status
        .map(|s| {
            s.parse::<MatchStatus>()
                .map_err(|e| anyhow!("{}", e))
        })
        .transpose()?;

    let results = pipeline.db().query_results(job_id, status, limit, offset)?;
    if results.is_empty() {
        println!("No results for job {}.", job_id);
        return Ok(());
    }

    for result in &results {
        print_result(result);
    }

    Ok(())
}

pub fn cmd_record(cli: &Cli, record_id: i64) -> Result<()> {
    let pipeline = build_pipeline(cli)?;

    let record = pipeline
        .db()
        .get_record(record_id)?
        .with_context(|| format!("Record {} not found", record_id))?;

    println!("Record {} (job {})", record.id, record.upload_job_id);
    println!("  Transaction id:   {}", record.transaction_id);
    println!("  Reference number: {}", record.reference_number);
    println!("  Amount:           {}", record.amount);
    println!("  Date:             {}", record.date);
    println!(
        "  Uploaded data:    {}",
        serde_json::to_string_pretty(&record.uploaded_data)?
    );

    match pipeline.db().get_result_for_record(record_id)? {
        Some(result) => print_result(&result),
        None => println!("  (no reconciliation result yet)"),
    }

    let trail = pipeline.db().record_audit_trail(record_id, 20)?;
    if !trail.is_empty() {
        println!("  Audit trail:");
        for entry in trail {
            println!(
                "    [{}] {} {} by {} - {}",
                entry.id,
                entry.created_at,
                entry.action,
                entry.actor.as_deref().unwrap_or("system"),
                entry.description
            );
        }
    }

    Ok(())
}

fn print_result(result: &ReconciliationResult) {
    println!(
        "  record {} -> {} (confidence {})",
        result.record_id, result.status, result.confidence
    );
    if !result.matched_fields.is_empty() {
        println!("    matched: {}", result.matched_fields.join(", "));
    }
    for mismatch in &result.mismatched_fields {
        println!(
            "    mismatch on {}: uploaded {} vs system {}",
            mismatch.field_name, mismatch.uploaded_value, mismatch.system_value
        );
    }
    if let Some(system) = &result.system_record {
        println!(
            "    ledger: {} / {} ({})",
            system.transaction_id, system.reference_number, system.amount
        );
    }
}
