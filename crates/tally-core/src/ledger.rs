//! Reference ledger providers
//!
//! The matching engine compares uploads against whatever a `LedgerProvider`
//! returns. Ordering must be stable within a single reconciliation run; ties
//! between qualifying ledger entries are broken by iteration order.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::ReaderBuilder;

use crate::error::{Error, Result};
use crate::models::LedgerRecord;

/// Supplies the set of system-of-record transactions to match against
pub trait LedgerProvider: Send + Sync {
    fn reference_records(&self) -> Result<Vec<LedgerRecord>>;
}

/// An in-memory ledger with a fixed record list
pub struct StaticLedger {
    records: Vec<LedgerRecord>,
}

impl StaticLedger {
    pub fn new(records: Vec<LedgerRecord>) -> Self {
        Self { records }
    }

    /// The built-in reference data set, useful for demos and smoke tests
    pub fn builtin() -> Self {
        fn entry(
            transaction_id: &str,
            reference_number: &str,
            amount: f64,
            date: (i32, u32, u32),
            description: Option<&str>,
        ) -> LedgerRecord {
            LedgerRecord {
                transaction_id: transaction_id.to_string(),
                reference_number: reference_number.to_string(),
                amount,
                date: NaiveDate::from_ymd_opt(date.0, date.1, date.2)
                    .unwrap_or_default(),
                description: description.map(str::to_string),
            }
        }

        Self::new(vec![
            entry("TXN001", "REF001", 1000.0, (2024, 1, 1), None),
            entry("TXN002", "REF002", 2500.5, (2024, 1, 2), None),
            entry("TXN003", "REF003", 500.25, (2024, 1, 3), None),
            entry("TXN004", "REF004", 7500.0, (2024, 1, 4), None),
            entry("TXN005", "REF005", 300.75, (2024, 1, 5), None),
            entry(
                "TXN-1001",
                "REF-ABC-001",
                150.5,
                (2023, 1, 15),
                Some("Payment for Services"),
            ),
            entry(
                "TXN-1002",
                "REF-ABC-002",
                2500.0,
                (2023, 1, 16),
                Some("Monthly Retainer"),
            ),
            entry(
                "TXN-1004",
                "REF-ABC-004",
                1200.0,
                (2023, 1, 18),
                Some("Consulting Fee"),
            ),
            entry(
                "TXN-1005",
                "REF-ABC-005",
                300.0,
                (2023, 1, 19),
                Some("Software License"),
            ),
            entry(
                "TXN-1006",
                "REF-ABC-006",
                99.99,
                (2023, 1, 20),
                Some("Partial Match Test"),
            ),
        ])
    }
}

impl LedgerProvider for StaticLedger {
    fn reference_records(&self) -> Result<Vec<LedgerRecord>> {
        Ok(self.records.clone())
    }
}

/// A ledger loaded from a CSV export of the system of record
///
/// Expected columns: transactionId, referenceNumber, amount, date, and an
/// optional description. Rows are returned in file order.
pub struct CsvLedger {
    path: PathBuf,
}

impl CsvLedger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl LedgerProvider for CsvLedger {
    fn reference_records(&self) -> Result<Vec<LedgerRecord>> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;

        let headers = rdr.headers()?.clone();
        let field = |name: &str| headers.iter().position(|h| h == name);

        let txn_col = field("transactionId").ok_or_else(|| {
            Error::Validation("ledger CSV is missing a transactionId column".to_string())
        })?;
        let ref_col = field("referenceNumber").ok_or_else(|| {
            Error::Validation("ledger CSV is missing a referenceNumber column".to_string())
        })?;
        let amount_col = field("amount").ok_or_else(|| {
            Error::Validation("ledger CSV is missing an amount column".to_string())
        })?;
        let date_col =
            field("date").ok_or_else(|| Error::Validation("ledger CSV is missing a date column".to_string()))?;
        let description_col = field("description");

        let mut records = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result?;

            let amount_str = record.get(amount_col).unwrap_or("");
            let amount = amount_str.trim().parse::<f64>().map_err(|_| {
                Error::Validation(format!(
                    "ledger row {}: unable to parse amount: {}",
                    line + 1,
                    amount_str
                ))
            })?;

            let date_str = record.get(date_col).unwrap_or("");
            let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d").map_err(|_| {
                Error::Validation(format!(
                    "ledger row {}: unable to parse date: {}",
                    line + 1,
                    date_str
                ))
            })?;

            records.push(LedgerRecord {
                transaction_id: record.get(txn_col).unwrap_or("").trim().to_string(),
                reference_number: record.get(ref_col).unwrap_or("").trim().to_string(),
                amount,
                date,
                description: description_col
                    .and_then(|col| record.get(col))
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
            });
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_ledger_contents() {
        let ledger = StaticLedger::builtin();
        let records = ledger.reference_records().unwrap();

        assert_eq!(records.len(), 10);
        assert_eq!(records[0].transaction_id, "TXN001");
        assert_eq!(records[0].amount, 1000.0);

        // The partial-match row carries the reference the uploads hit
        let partial = records
            .iter()
            .find(|r| r.reference_number == "REF-ABC-006")
            .unwrap();
        assert_eq!(partial.amount, 99.99);
    }

    #[test]
    fn test_csv_ledger_round_trip() {
        let path = std::env::temp_dir().join(format!("tally_ledger_{}.csv", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "transactionId,referenceNumber,amount,date,description").unwrap();
        writeln!(file, "TXN900,REF900,42.50,2024-06-01,Office supplies").unwrap();
        writeln!(file, "TXN901,REF901,19.99,2024-06-02,").unwrap();
        drop(file);

        let ledger = CsvLedger::new(&path);
        let records = ledger.reference_records().unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].transaction_id, "TXN900");
        assert_eq!(records[0].amount, 42.5);
        assert_eq!(records[0].description.as_deref(), Some("Office supplies"));
        assert!(records[1].description.is_none());
    }

    #[test]
    fn test_csv_ledger_rejects_bad_amount() {
        let path = std::env::temp_dir().join(format!("tally_ledger_bad_{}.csv", std::process::id()));
        std::fs::write(
            &path,
            "transactionId,referenceNumber,amount,date\nTXN1,REF1,not-a-number,2024-01-01\n",
        )
        .unwrap();

        let err = CsvLedger::new(&path).reference_records().unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_csv_ledger_requires_columns() {
        let path = std::env::temp_dir().join(format!("tally_ledger_cols_{}.csv", std::process::id()));
        std::fs::write(&path, "id,value\n1,2\n").unwrap();

        let err = CsvLedger::new(&path).reference_records().unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, Error::Validation(_)));
    }
}
