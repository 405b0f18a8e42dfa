//! Audit trail inspection command

use anyhow::{anyhow, Result};
use tally_core::{AuditAction, AuditFilter, AuditSource};

use super::build_pipeline;
use crate::cli::Cli;

pub fn cmd_audit(
    cli: &Cli,
    record_id: Option<i64>,
    actor: Option<&str>,
    action: Option<&str>,
    source: Option<&str>,
    limit: i64,
) -> Result<()> {
    let pipeline = build_pipeline(cli)?;

    let action = action
        .map(|s| s.parse::<AuditAction>().map_err(|e| anyhow!("{}", e)))
        .transpose()?;
    let source = source
        .map(|s| s.parse::<AuditSource>().map_err(|e| anyhow!("{}", e)))
        .transpose()?;

    let filter = AuditFilter {
        record_id,
        actor: actor.map(str::to_string),
        action,
        source,
    };

    let entries = pipeline.db().list_audit(&filter, limit, 0)?;
    if entries.is_empty() {
        println!("No audit entries found.");
        return Ok(());
    }

    for entry in entries {
        println!(
            "[{}] {} {} ({}) by {} - {}",
            entry.id,
            entry.created_at,
            entry.action,
            entry.source,
            entry.actor.as_deref().unwrap_or("system"),
            entry.description
        );
        if let Some(record_id) = entry.record_id {
            println!("      record: {}", record_id);
        }
        if let Some(old) = &entry.old_value {
            println!("      old: {}", old);
        }
        if let Some(new) = &entry.new_value {
            println!("      new: {}", new);
        }
    }

    Ok(())
}
