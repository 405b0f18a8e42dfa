//! Append-only audit trail operations
//!
//! There is deliberately no update or delete API here. The schema backs that
//! up with BEFORE UPDATE / BEFORE DELETE triggers, so even raw SQL cannot
//! rewrite history.

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{AuditAction, AuditLogEntry, AuditSource, NewAuditEntry};

/// Filters for audit trail queries
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub record_id: Option<i64>,
    pub actor: Option<String>,
    pub action: Option<AuditAction>,
    pub source: Option<AuditSource>,
}

impl Database {
    /// Append an audit entry
    pub fn append_audit(&self, entry: &NewAuditEntry) -> Result<i64> {
        let conn = self.conn()?;

        let old_json = entry
            .old_value
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let new_json = entry
            .new_value
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            r#"
            INSERT INTO audit_log (record_id, actor, action, old_value, new_value, source, description)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                entry.record_id,
                entry.actor,
                entry.action.as_str(),
                old_json,
                new_json,
                entry.source.as_str(),
                entry.description,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Get a single audit entry by ID
    pub fn get_audit_entry(&self, id: i64) -> Result<Option<AuditLogEntry>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            r#"
            SELECT id, record_id, actor, action, old_value, new_value, source, description, created_at
            FROM audit_log
            WHERE id = ?
            "#,
            params![id],
            Self::map_audit_row,
        );

        match result {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List audit entries matching the filter, newest first
    pub fn list_audit(
        &self,
        filter: &AuditFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLogEntry>> {
        let conn = self.conn()?;

        // Build dynamic WHERE clause
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(record_id) = filter.record_id {
            conditions.push("record_id = ?".to_string());
            params.push(Box::new(record_id));
        }
        if let Some(actor) = &filter.actor {
            conditions.push("actor = ?".to_string());
            params.push(Box::new(actor.clone()));
        }
        if let Some(action) = filter.action {
            conditions.push("action = ?".to_string());
            params.push(Box::new(action.as_str().to_string()));
        }
        if let Some(source) = filter.source {
            conditions.push("source = ?".to_string());
            params.push(Box::new(source.as_str().to_string()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            r#"
            SELECT id, record_id, actor, action, old_value, new_value, source, description, created_at
            FROM audit_log
            {}
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
            where_clause
        );

        params.push(Box::new(limit));
        params.push(Box::new(offset));

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let entries = stmt
            .query_map(params_refs.as_slice(), Self::map_audit_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// The audit trail of one record, newest first
    pub fn record_audit_trail(&self, record_id: i64, limit: i64) -> Result<Vec<AuditLogEntry>> {
        self.list_audit(
            &AuditFilter {
                record_id: Some(record_id),
                ..Default::default()
            },
            limit,
            0,
        )
    }

    /// Helper to map a row to AuditLogEntry
    fn map_audit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditLogEntry> {
        let action_str: String = row.get(3)?;
        let old_json: Option<String> = row.get(4)?;
        let new_json: Option<String> = row.get(5)?;
        let source_str: String = row.get(6)?;
        let created_at_str: String = row.get(8)?;

        Ok(AuditLogEntry {
            id: row.get(0)?,
            record_id: row.get(1)?,
            actor: row.get(2)?,
            action: action_str.parse().unwrap_or(AuditAction::Update),
            old_value: old_json.and_then(|s| serde_json::from_str(&s).ok()),
            new_value: new_json.and_then(|s| serde_json::from_str(&s).ok()),
            source: source_str.parse().unwrap_or(AuditSource::System),
            description: row.get(7)?,
            created_at: parse_datetime(&created_at_str),
        })
    }
}
