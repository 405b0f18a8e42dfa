//! Upload decoders: raw bytes in, ordered string-keyed rows out
//!
//! The pipeline only ever sees `Vec<Value>`; which bytes produced them is
//! this module's problem. Content types outside the supported set are
//! rejected up front.

use calamine::{Data, Reader, Xlsx};
use csv::ReaderBuilder;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::RowData;

/// MIME type for CSV uploads
pub const CONTENT_TYPE_CSV: &str = "text/csv";

/// MIME type for Excel (.xlsx) uploads
pub const CONTENT_TYPE_XLSX: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Converts an uploaded byte stream into an ordered sequence of rows
pub trait FileDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8], content_type: &str) -> Result<Vec<Value>>;
}

/// Default decoder covering CSV and Excel uploads
pub struct SpreadsheetDecoder;

impl FileDecoder for SpreadsheetDecoder {
    fn decode(&self, bytes: &[u8], content_type: &str) -> Result<Vec<Value>> {
        match content_type {
            CONTENT_TYPE_CSV => decode_csv(bytes),
            CONTENT_TYPE_XLSX => decode_xlsx(bytes),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Field names of the first decoded row, in source column order
pub fn extract_columns(rows: &[Value]) -> Vec<String> {
    rows.first()
        .and_then(Value::as_object)
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default()
}

/// Parse CSV bytes into rows keyed by the header line
fn decode_csv(bytes: &[u8]) -> Result<Vec<Value>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = rdr.headers()?.clone();
    let mut rows = Vec::new();

    for result in rdr.records() {
        let record = result?;
        let mut row = RowData::new();
        for (i, header) in headers.iter().enumerate() {
            if let Some(value) = record.get(i) {
                row.insert(header.to_string(), Value::String(value.to_string()));
            }
        }
        rows.push(Value::Object(row));
    }

    Ok(rows)
}

/// Parse the first worksheet of an xlsx workbook, first row as headers
fn decode_xlsx(bytes: &[u8]) -> Result<Vec<Value>> {
    let cursor = std::io::Cursor::new(bytes);
    let mut workbook: Xlsx<_> =
        Xlsx::new(cursor).map_err(|e| Error::Spreadsheet(e.to_string()))?;

    let sheet_names = workbook.sheet_names().to_owned();
    let first_sheet = sheet_names
        .first()
        .cloned()
        .ok_or_else(|| Error::Spreadsheet("no worksheets found in workbook".to_string()))?;

    let range = workbook
        .worksheet_range(&first_sheet)
        .map_err(|e| Error::Spreadsheet(e.to_string()))?;

    let mut sheet_rows = range.rows();
    let headers: Vec<String> = match sheet_rows.next() {
        Some(header_row) => header_row.iter().map(|cell| cell.to_string()).collect(),
        None => return Ok(Vec::new()),
    };

    let mut rows = Vec::new();
    for sheet_row in sheet_rows {
        let mut row = RowData::new();
        for (i, cell) in sheet_row.iter().enumerate() {
            let Some(header) = headers.get(i).filter(|h| !h.is_empty()) else {
                continue;
            };
            if let Some(value) = cell_to_value(cell) {
                row.insert(header.clone(), value);
            }
        }
        // Rows where every cell is empty carry no data
        if !row.is_empty() {
            rows.push(Value::Object(row));
        }
    }

    Ok(rows)
}

fn cell_to_value(cell: &Data) -> Option<Value> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(Value::String(s.clone())),
        Data::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number),
        Data::Int(i) => Some(Value::Number((*i).into())),
        Data::Bool(b) => Some(Value::Bool(*b)),
        other => Some(Value::String(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_csv() {
        let csv = "transactionId,referenceNumber,amount,date\n\
                   TXN001,REF001,1000.00,2024-01-01\n\
                   TXN002,REF002,2500.50,2024-01-02";

        let rows = SpreadsheetDecoder
            .decode(csv.as_bytes(), CONTENT_TYPE_CSV)
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["transactionId"], "TXN001");
        assert_eq!(rows[1]["amount"], "2500.50");
    }

    #[test]
    fn test_columns_keep_source_order() {
        let csv = "zeta,alpha,midpoint\n1,2,3";

        let rows = SpreadsheetDecoder
            .decode(csv.as_bytes(), CONTENT_TYPE_CSV)
            .unwrap();
        assert_eq!(extract_columns(&rows), vec!["zeta", "alpha", "midpoint"]);
    }

    #[test]
    fn test_decode_csv_short_rows() {
        // flexible mode: rows may have fewer fields than the header
        let csv = "transactionId,amount,notes\nTXN001,50.00";

        let rows = SpreadsheetDecoder
            .decode(csv.as_bytes(), CONTENT_TYPE_CSV)
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = rows[0].as_object().unwrap();
        assert_eq!(row.len(), 2);
        assert!(!row.contains_key("notes"));
    }

    #[test]
    fn test_decode_header_only_csv_is_empty() {
        let rows = SpreadsheetDecoder
            .decode(b"transactionId,amount", CONTENT_TYPE_CSV)
            .unwrap();
        assert!(rows.is_empty());
        assert!(extract_columns(&rows).is_empty());
    }

    #[test]
    fn test_unsupported_content_type() {
        let err = SpreadsheetDecoder
            .decode(b"{}", "application/json")
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_invalid_xlsx_bytes() {
        let err = SpreadsheetDecoder
            .decode(b"not a zip archive", CONTENT_TYPE_XLSX)
            .unwrap_err();
        assert!(matches!(err, Error::Spreadsheet(_)));
    }
}
