//! Tally CLI - Transaction reconciliation pipeline
//!
//! Usage:
//!   tally init                      Initialize database
//!   tally upload --file FILE        Submit a statement for reconciliation
//!   tally status JOB_ID             Poll a job's processing status
//!   tally reconcile JOB_ID          Re-run matching for a job
//!   tally audit                     Inspect the audit trail

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match &cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Upload {
            file,
            content_type,
            actor,
            no_wait,
        } => commands::cmd_upload(&cli, file, content_type.as_deref(), actor, *no_wait),
        Commands::Jobs {
            actor,
            limit,
            recover,
        } => commands::cmd_jobs(&cli, actor.as_deref(), *limit, *recover),
        Commands::Status { job_id } => commands::cmd_status(&cli, *job_id),
        Commands::Map { job_id, set } => commands::cmd_map(&cli, *job_id, set),
        Commands::Reconcile { job_id, actor } => commands::cmd_reconcile(&cli, *job_id, actor),
        Commands::Results {
            job_id,
            status,
            limit,
            offset,
        } => commands::cmd_results(&cli, *job_id, status.as_deref(), *limit, *offset),
        Commands::Record { record_id } => commands::cmd_record(&cli, *record_id),
        Commands::Correct {
            record_id,
            transaction_id,
            amount,
            set,
            actor,
        } => commands::cmd_correct(&cli, *record_id, transaction_id.clone(), *amount, set, actor),
        Commands::Audit {
            record_id,
            actor,
            action,
            source,
            limit,
        } => commands::cmd_audit(
            &cli,
            *record_id,
            actor.as_deref(),
            action.as_deref(),
            source.as_deref(),
            *limit,
        ),
    }
}
