//! Upload command implementation

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tally_core::{JobStatus, SubmitOutcome, CONTENT_TYPE_CSV, CONTENT_TYPE_XLSX};

use super::build_pipeline;
use crate::cli::Cli;

/// How long `upload` waits for background processing before giving up
const PROCESSING_TIMEOUT: Duration = Duration::from_secs(300);

pub fn cmd_upload(
    cli: &Cli,
    file: &Path,
    content_type: Option<&str>,
    actor: &str,
    no_wait: bool,
) -> Result<()> {
    let content = std::fs::read(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    let content_type = match content_type {
        Some(ct) => ct.to_string(),
        None => infer_content_type(file)?,
    };

    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.display().to_string());

    println!("📥 Uploading {}...", file.display());

    let pipeline = build_pipeline(cli)?;
    let outcome = pipeline.submit_upload(actor, &file_name, &content, &content_type, None)?;

    let job_id = match outcome {
        SubmitOutcome::Duplicate { job_id } => {
            println!("♻️  This file has already been processed as job {}", job_id);
            return Ok(());
        }
        SubmitOutcome::Created {
            job_id,
            total_records,
            available_columns,
        } => {
            println!("   Job {} created ({} rows)", job_id, total_records);
            println!("   Columns: {}", available_columns.join(", "));
            job_id
        }
    };

    if no_wait {
        println!("   Processing in the background; poll with: tally status {}", job_id);
        return Ok(());
    }

    let job = pipeline.wait_for_job(job_id, PROCESSING_TIMEOUT)?;
    match job.status {
        JobStatus::Completed => {
            let stats = pipeline.db().job_result_stats(job_id)?;
            println!("✅ Processing complete!");
            println!("   Matched:           {}", stats.matched);
            println!("   Partially matched: {}", stats.partially_matched);
            println!("   Not matched:       {}", stats.not_matched);
            println!("   Duplicates:        {}", stats.duplicates);
            println!("   Accuracy:          {:.2}%", stats.accuracy);
        }
        JobStatus::Failed => {
            bail!(
                "Processing failed: {}",
                job.error.as_deref().unwrap_or("unknown error")
            );
        }
        JobStatus::Processing => {
            println!(
                "⏳ Still processing ({}/{} rows); poll with: tally status {}",
                job.records_processed, job.total_records, job_id
            );
        }
    }

    Ok(())
}

fn infer_content_type(file: &Path) -> Result<String> {
    match file
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("csv") => Ok(CONTENT_TYPE_CSV.to_string()),
        Some("xlsx") => Ok(CONTENT_TYPE_XLSX.to_string()),
        _ => bail!(
            "Could not infer content type from {}; specify --content-type",
            file.display()
        ),
    }
}
