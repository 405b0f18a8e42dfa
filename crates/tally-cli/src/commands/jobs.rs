//! Job listing, status, and column mapping commands

use std::collections::HashMap;

use anyhow::{Context, Result};
use tally_core::JobStatus;

use super::{build_pipeline, parse_pairs};
use crate::cli::Cli;

pub fn cmd_jobs(cli: &Cli, actor: Option<&str>, limit: i64, recover: bool) -> Result<()> {
    let pipeline = build_pipeline(cli)?;

    if recover {
        let recovered = pipeline.db().fail_stuck_jobs()?;
        if recovered > 0 {
            println!("🔁 Marked {} stuck job(s) as failed", recovered);
        }
    }

    let jobs = pipeline.db().list_jobs(actor, limit, 0)?;
    let total = pipeline.db().count_jobs(actor)?;

    if jobs.is_empty() {
        println!("No upload jobs found.");
        return Ok(());
    }

    println!("Upload jobs ({} total):", total);
    for job in jobs {
        println!(
            "  [{}] {} - {} - {}/{} rows - {}",
            job.id, job.file_name, job.status, job.records_processed, job.total_records, job.actor
        );
        if let Some(error) = &job.error {
            println!("        error: {}", error);
        }
    }

    Ok(())
}

pub fn cmd_status(cli: &Cli, job_id: i64) -> Result<()> {
    let pipeline = build_pipeline(cli)?;

    let job = pipeline
        .db()
        .get_job(job_id)?
        .with_context(|| format!("Upload job {} not found", job_id))?;

    println!("Job {} ({})", job.id, job.file_name);
    println!("  Actor:     {}", job.actor);
    println!("  Status:    {}", job.status);
    println!("  Progress:  {}/{} rows", job.records_processed, job.total_records);
    println!("  Submitted: {}", job.created_at);
    if let Some(error) = &job.error {
        println!("  Error:     {}", error);
    }

    if !job.column_mapping.mapping.is_empty() {
        println!("  Mapping:");
        for (source, canonical) in &job.column_mapping.mapping {
            println!("    {} -> {}", source, canonical);
        }
    }

    if job.status == JobStatus::Completed {
        let stats = pipeline.db().job_result_stats(job_id)?;
        println!("  Reconciliation:");
        println!("    Matched:           {}", stats.matched);
        println!("    Partially matched: {}", stats.partially_matched);
        println!("    Not matched:       {}", stats.not_matched);
        println!("    Duplicates:        {}", stats.duplicates);
        println!("    Accuracy:          {:.2}%", stats.accuracy);
    }

    Ok(())
}

pub fn cmd_map(cli: &Cli, job_id: i64, set: &[String]) -> Result<()> {
    let pipeline = build_pipeline(cli)?;

    let mapping: HashMap<String, String> = parse_pairs(set)?.into_iter().collect();
    let job = pipeline.update_column_mapping(job_id, &mapping)?;

    println!("✅ Mapping updated for job {}", job.id);
    println!("   Available columns: {}", job.column_mapping.available_columns.join(", "));
    for (source, canonical) in &job.column_mapping.mapping {
        println!("   {} -> {}", source, canonical);
    }

    Ok(())
}
