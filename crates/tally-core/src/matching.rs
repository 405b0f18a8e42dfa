//! Matching engine: pure classification of uploaded records against a ledger
//!
//! Precedence is fixed and the first hit wins:
//! 1. Duplicate - the transaction id appears more than once in the job
//! 2. Matched - a ledger entry agrees on transaction id AND amount exactly
//! 3. PartiallyMatched - reference number agrees and the amount is within
//!    2% of the uploaded amount (inclusive)
//! 4. NotMatched
//!
//! The duplicate check runs over the whole job before any ledger comparison,
//! and flags every occurrence, not just the later ones.

use std::collections::HashMap;

use serde_json::json;

use crate::models::{FieldMismatch, LedgerRecord, MatchStatus, Record};

/// Partial matches tolerate an amount variance of 2% of the uploaded amount
pub const PARTIAL_MATCH_TOLERANCE: f64 = 0.02;

/// The verdict for one record, before it is persisted
#[derive(Debug, Clone)]
pub struct Classification {
    pub status: MatchStatus,
    pub matched_fields: Vec<String>,
    pub mismatched_fields: Vec<FieldMismatch>,
    pub confidence: i64,
    pub system_record: Option<LedgerRecord>,
}

impl Classification {
    fn unmatched() -> Self {
        Self {
            status: MatchStatus::NotMatched,
            matched_fields: vec![],
            mismatched_fields: vec![],
            confidence: 0,
            system_record: None,
        }
    }

    fn duplicate() -> Self {
        Self {
            status: MatchStatus::Duplicate,
            ..Self::unmatched()
        }
    }
}

/// Classify every record of a job against the ledger.
///
/// Pure function of its inputs; the returned list is parallel to `records`.
pub fn classify_records(records: &[Record], ledger: &[LedgerRecord]) -> Vec<Classification> {
    let mut id_counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        *id_counts.entry(record.transaction_id.as_str()).or_insert(0) += 1;
    }

    records
        .iter()
        .map(|record| {
            if id_counts[record.transaction_id.as_str()] > 1 {
                return Classification::duplicate();
            }
            classify_against_ledger(record, ledger)
        })
        .collect()
}

fn classify_against_ledger(record: &Record, ledger: &[LedgerRecord]) -> Classification {
    if let Some(system) = ledger.iter().find(|sr| is_exact_match(record, sr)) {
        return Classification {
            status: MatchStatus::Matched,
            matched_fields: vec!["transactionId".to_string(), "amount".to_string()],
            mismatched_fields: vec![],
            confidence: 100,
            system_record: Some(system.clone()),
        };
    }

    if let Some(system) = ledger.iter().find(|sr| is_partial_match(record, sr)) {
        let mismatched_fields = if record.amount != system.amount {
            vec![FieldMismatch {
                field_name: "amount".to_string(),
                uploaded_value: json!(record.amount),
                system_value: json!(system.amount),
            }]
        } else {
            vec![]
        };

        return Classification {
            status: MatchStatus::PartiallyMatched,
            matched_fields: vec!["referenceNumber".to_string()],
            mismatched_fields,
            confidence: 75,
            system_record: Some(system.clone()),
        };
    }

    Classification::unmatched()
}

/// Exact match: transaction id and amount strictly equal, no tolerance
fn is_exact_match(record: &Record, system: &LedgerRecord) -> bool {
    record.transaction_id == system.transaction_id && record.amount == system.amount
}

/// Partial match: same reference number, amount within tolerance (inclusive)
fn is_partial_match(record: &Record, system: &LedgerRecord) -> bool {
    if record.reference_number != system.reference_number {
        return false;
    }

    let amount_diff = (record.amount - system.amount).abs();
    amount_diff <= record.amount * PARTIAL_MATCH_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn record(transaction_id: &str, reference_number: &str, amount: f64) -> Record {
        Record {
            id: 0,
            upload_job_id: 1,
            transaction_id: transaction_id.to_string(),
            reference_number: reference_number.to_string(),
            amount,
            date: Utc::now(),
            uploaded_data: Default::default(),
            system_data: None,
            created_at: Utc::now(),
        }
    }

    fn ledger_entry(transaction_id: &str, reference_number: &str, amount: f64) -> LedgerRecord {
        LedgerRecord {
            transaction_id: transaction_id.to_string(),
            reference_number: reference_number.to_string(),
            amount,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            description: None,
        }
    }

    #[test]
    fn test_exact_match_needs_both_fields() {
        let ledger = vec![ledger_entry("TXN001", "REF001", 1000.0)];

        let hit = classify_records(&[record("TXN001", "X", 1000.0)], &ledger);
        assert_eq!(hit[0].status, MatchStatus::Matched);
        assert_eq!(hit[0].confidence, 100);
        assert_eq!(hit[0].matched_fields, vec!["transactionId", "amount"]);

        // Same id, different amount: never an exact match
        let miss = classify_records(&[record("TXN001", "X", 999.99)], &ledger);
        assert_eq!(miss[0].status, MatchStatus::NotMatched);
        assert_eq!(miss[0].confidence, 0);
        assert!(miss[0].system_record.is_none());
    }

    #[test]
    fn test_partial_match_within_tolerance() {
        let ledger = vec![ledger_entry("TXN-1006", "REF-ABC-006", 100.0)];

        let results = classify_records(&[record("OTHER", "REF-ABC-006", 99.99)], &ledger);
        assert_eq!(results[0].status, MatchStatus::PartiallyMatched);
        assert_eq!(results[0].confidence, 75);
        assert_eq!(results[0].matched_fields, vec!["referenceNumber"]);
        assert_eq!(results[0].mismatched_fields.len(), 1);
        assert_eq!(results[0].mismatched_fields[0].field_name, "amount");
        assert_eq!(results[0].mismatched_fields[0].uploaded_value, json!(99.99));
        assert_eq!(results[0].mismatched_fields[0].system_value, json!(100.0));
    }

    #[test]
    fn test_partial_match_boundary_is_inclusive() {
        // Tolerance is 2% of the uploaded amount: 100.0 * 0.02 = 2.0
        let ledger = vec![ledger_entry("L1", "REF-B", 102.0)];
        let results = classify_records(&[record("U1", "REF-B", 100.0)], &ledger);
        assert_eq!(results[0].status, MatchStatus::PartiallyMatched);

        // A hair beyond the boundary misses
        let ledger = vec![ledger_entry("L1", "REF-B", 102.01)];
        let results = classify_records(&[record("U1", "REF-B", 100.0)], &ledger);
        assert_eq!(results[0].status, MatchStatus::NotMatched);
    }

    #[test]
    fn test_partial_match_with_equal_amounts_has_no_mismatch() {
        let ledger = vec![ledger_entry("L1", "REF-C", 100.0)];
        let results = classify_records(&[record("U1", "REF-C", 100.0)], &ledger);

        assert_eq!(results[0].status, MatchStatus::PartiallyMatched);
        assert!(results[0].mismatched_fields.is_empty());
    }

    #[test]
    fn test_duplicates_flag_every_occurrence() {
        // Ledger content is irrelevant once a transaction id repeats
        let ledger = vec![ledger_entry("DUPXYZ", "REF001", 50.0)];
        let records = vec![
            record("DUPXYZ", "REF001", 50.0),
            record("SOLO", "REF-NONE", 1.0),
            record("DUPXYZ", "REF002", 75.0),
        ];

        let results = classify_records(&records, &ledger);
        assert_eq!(results[0].status, MatchStatus::Duplicate);
        assert_eq!(results[0].confidence, 0);
        assert!(results[0].matched_fields.is_empty());
        assert!(results[0].system_record.is_none());
        assert_eq!(results[2].status, MatchStatus::Duplicate);
        assert_eq!(results[1].status, MatchStatus::NotMatched);
    }

    #[test]
    fn test_first_qualifying_ledger_entry_wins() {
        let ledger = vec![
            ledger_entry("TXN1", "REF-A", 10.0),
            ledger_entry("TXN1", "REF-B", 10.0),
        ];

        let results = classify_records(&[record("TXN1", "NONE", 10.0)], &ledger);
        assert_eq!(
            results[0].system_record.as_ref().unwrap().reference_number,
            "REF-A"
        );
    }

    #[test]
    fn test_exact_match_takes_precedence_over_partial() {
        let ledger = vec![
            ledger_entry("OTHER", "REF-P", 100.5),
            ledger_entry("TXN1", "REF-X", 100.0),
        ];

        let results = classify_records(&[record("TXN1", "REF-P", 100.0)], &ledger);
        assert_eq!(results[0].status, MatchStatus::Matched);
    }

    #[test]
    fn test_mixed_batch_classification() {
        let ledger = vec![
            ledger_entry("TXN001", "REF001", 1000.0),
            ledger_entry("TXN-1006", "REF-ABC-006", 100.0),
        ];

        let records = vec![
            record("TXN001", "REF001", 1000.0),
            record("TXN-PARTIAL", "REF-ABC-006", 99.99),
            record("TXN999", "REF999", 1.0),
            record("DUPXYZ", "REF-D1", 10.0),
            record("DUPXYZ", "REF-D2", 20.0),
        ];

        let results = classify_records(&records, &ledger);
        assert_eq!(results[0].status, MatchStatus::Matched);
        assert_eq!(results[0].confidence, 100);
        assert_eq!(results[1].status, MatchStatus::PartiallyMatched);
        assert_eq!(results[1].confidence, 75);
        assert_eq!(results[1].mismatched_fields.len(), 1);
        assert_eq!(results[2].status, MatchStatus::NotMatched);
        assert_eq!(results[2].confidence, 0);
        assert_eq!(results[3].status, MatchStatus::Duplicate);
        assert_eq!(results[4].status, MatchStatus::Duplicate);
    }
}
