//! Record normalizer: decoded rows to canonical records
//!
//! The defaulting rules here are deliberately lossy and must stay that way
//! for compatibility with existing uploads: a missing or unparsable amount
//! becomes 0, a missing transaction id gets a generated placeholder, and a
//! bad date falls back to the processing timestamp. None of these are
//! reported as errors.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::models::{NewRecord, RowData};

/// Normalize one decoded row into a record for the given job.
///
/// `index` is the row's 0-based position in the upload; generated
/// placeholders embed it, so they never collide within a batch.
pub fn normalize_row(upload_job_id: i64, index: usize, row: &RowData) -> NewRecord {
    let transaction_id = field_string(row, "transactionId")
        .unwrap_or_else(|| format!("TXN-{}-{}", upload_job_id, index));
    let reference_number =
        field_string(row, "referenceNumber").unwrap_or_else(|| format!("REF-{}", index));
    let amount = row
        .get("amount")
        .and_then(parse_amount_value)
        .unwrap_or(0.0);
    let date = row.get("date").and_then(parse_date_value).unwrap_or_else(Utc::now);

    NewRecord {
        upload_job_id,
        transaction_id,
        reference_number,
        amount,
        date,
        uploaded_data: row.clone(),
    }
}

/// A row field as a non-blank trimmed string
fn field_string(row: &RowData, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse an amount cell, tolerating currency symbols, thousands separators,
/// and parenthesized negatives
fn parse_amount_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .replace(['$', ',', ' '], "")
                .replace('(', "-")
                .replace(')', "");
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    }
}

/// Parse a date cell from common formats
fn parse_date_value(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let formats = [
        "%Y-%m-%d", // 2024-01-15
        "%m/%d/%Y", // 01/15/2024
        "%m/%d/%y", // 01/15/24
        "%m-%d-%Y", // 01-15-2024
        "%d/%m/%Y", // 15/01/2024 (European)
    ];

    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(fields: &[(&str, Value)]) -> RowData {
        let mut row = RowData::new();
        for (key, value) in fields {
            row.insert(key.to_string(), value.clone());
        }
        row
    }

    #[test]
    fn test_normalize_complete_row() {
        let row = row(&[
            ("transactionId", json!("TXN001")),
            ("referenceNumber", json!("REF001")),
            ("amount", json!("1,000.00")),
            ("date", json!("2024-01-15")),
            ("memo", json!("quarterly invoice")),
        ]);

        let record = normalize_row(7, 0, &row);
        assert_eq!(record.upload_job_id, 7);
        assert_eq!(record.transaction_id, "TXN001");
        assert_eq!(record.reference_number, "REF001");
        assert_eq!(record.amount, 1000.0);
        assert_eq!(record.date.date_naive().to_string(), "2024-01-15");
        // The raw row survives untouched
        assert_eq!(record.uploaded_data["memo"], json!("quarterly invoice"));
    }

    #[test]
    fn test_generated_placeholders_are_unique_per_row() {
        let empty = row(&[]);

        let first = normalize_row(3, 0, &empty);
        let second = normalize_row(3, 1, &empty);

        assert_eq!(first.transaction_id, "TXN-3-0");
        assert_eq!(second.transaction_id, "TXN-3-1");
        assert_ne!(first.transaction_id, second.transaction_id);
        assert_eq!(first.reference_number, "REF-0");
        assert_eq!(second.reference_number, "REF-1");
    }

    #[test]
    fn test_blank_transaction_id_gets_placeholder() {
        let record = normalize_row(3, 4, &row(&[("transactionId", json!("  "))]));
        assert_eq!(record.transaction_id, "TXN-3-4");
    }

    #[test]
    fn test_unparsable_amount_defaults_to_zero() {
        let record = normalize_row(1, 0, &row(&[("amount", json!("twelve dollars"))]));
        assert_eq!(record.amount, 0.0);

        let record = normalize_row(1, 0, &row(&[]));
        assert_eq!(record.amount, 0.0);

        let record = normalize_row(1, 0, &row(&[("amount", json!(null))]));
        assert_eq!(record.amount, 0.0);
    }

    #[test]
    fn test_amount_parsing_variants() {
        let cases = [
            (json!("$1,234.56"), 1234.56),
            (json!("(100.00)"), -100.0),
            (json!("-42.5"), -42.5),
            (json!(99.99), 99.99),
        ];
        for (value, expected) in cases {
            let record = normalize_row(1, 0, &row(&[("amount", value)]));
            assert_eq!(record.amount, expected);
        }
    }

    #[test]
    fn test_bad_date_defaults_to_processing_time() {
        let before = Utc::now();
        let record = normalize_row(1, 0, &row(&[("date", json!("soonish"))]));
        assert!(record.date >= before);

        let record = normalize_row(1, 0, &row(&[("date", json!("01/15/2024"))]));
        assert_eq!(record.date.date_naive().to_string(), "2024-01-15");
    }

    #[test]
    fn test_numeric_transaction_id_is_stringified() {
        let record = normalize_row(1, 0, &row(&[("transactionId", json!(100234))]));
        assert_eq!(record.transaction_id, "100234");
    }
}
