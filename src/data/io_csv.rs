//! CSV record format.
//!
//! Every file starts with a literal header line:
//!
//! | Record kind        | Header                      |
//! |--------------------|-----------------------------|
//! | predicted instance | `ID,LABEL,FUNCTION_ID,VALUE` |
//! | observed instance  | `ID,LABEL,VALUE`            |
//! | error rate         | `LABEL,FUNCTION_ID,VALUE`   |
//!
//! Booleans are written as `1`/`0`. The header is written even when there are
//! no records, and a missing or different header is rejected on read.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{ErrorRate, Label, ObservedInstance, PredictedInstance};
use crate::error::LabelFuseError;

// ============================================================================
// CSV row types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictedRow {
    #[serde(rename = "ID")]
    id: i64,
    #[serde(rename = "LABEL")]
    label: String,
    #[serde(rename = "FUNCTION_ID")]
    function_id: i64,
    #[serde(rename = "VALUE")]
    value: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ObservedRow {
    #[serde(rename = "ID")]
    id: i64,
    #[serde(rename = "LABEL")]
    label: String,
    #[serde(rename = "VALUE")]
    value: u8,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorRateRow {
    #[serde(rename = "LABEL")]
    label: String,
    #[serde(rename = "FUNCTION_ID")]
    function_id: i64,
    #[serde(rename = "VALUE")]
    value: f64,
}

/// A record kind with a CSV representation.
pub trait CsvRecord: Sized {
    const HEADER: &'static [&'static str];
    type Row: Serialize + DeserializeOwned;

    fn to_row(&self) -> Self::Row;
    fn from_row(row: Self::Row) -> Result<Self, String>;
}

impl CsvRecord for PredictedInstance {
    const HEADER: &'static [&'static str] = &["ID", "LABEL", "FUNCTION_ID", "VALUE"];
    type Row = PredictedRow;

    fn to_row(&self) -> Self::Row {
        PredictedRow {
            id: self.id,
            label: self.label.name().to_string(),
            function_id: self.source_id,
            value: self.value,
        }
    }

    fn from_row(row: Self::Row) -> Result<Self, String> {
        Ok(PredictedInstance::new(
            row.id,
            Label::from(row.label),
            row.function_id,
            row.value,
        ))
    }
}

impl CsvRecord for ObservedInstance {
    const HEADER: &'static [&'static str] = &["ID", "LABEL", "VALUE"];
    type Row = ObservedRow;

    fn to_row(&self) -> Self::Row {
        ObservedRow {
            id: self.id,
            label: self.label.name().to_string(),
            value: u8::from(self.value),
        }
    }

    fn from_row(row: Self::Row) -> Result<Self, String> {
        let value = match row.value {
            0 => false,
            1 => true,
            other => return Err(format!("boolean VALUE must be 1 or 0, got {}", other)),
        };
        Ok(ObservedInstance::new(row.id, Label::from(row.label), value))
    }
}

impl CsvRecord for ErrorRate {
    const HEADER: &'static [&'static str] = &["LABEL", "FUNCTION_ID", "VALUE"];
    type Row = ErrorRateRow;

    fn to_row(&self) -> Self::Row {
        ErrorRateRow {
            label: self.label.name().to_string(),
            function_id: self.source_id,
            value: self.value,
        }
    }

    fn from_row(row: Self::Row) -> Result<Self, String> {
        Ok(ErrorRate::new(Label::from(row.label), row.function_id, row.value))
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Reads records from a CSV file.
pub fn read_csv<R: CsvRecord>(path: &Path) -> Result<Vec<R>, LabelFuseError> {
    let file = File::open(path).map_err(LabelFuseError::Io)?;
    parse_records(BufReader::new(file), path)
}

/// Writes records to a CSV file.
pub fn write_csv<R: CsvRecord>(path: &Path, records: &[R]) -> Result<(), LabelFuseError> {
    let file = File::create(path).map_err(LabelFuseError::Io)?;
    let writer = write_records(BufWriter::new(file), records, path)?;
    writer
        .into_inner()
        .map_err(|e| LabelFuseError::Io(e.into_error()))?
        .flush()
        .map_err(LabelFuseError::Io)
}

/// Reads records from a CSV string.
///
/// Useful for testing without file I/O.
pub fn from_csv_str<R: CsvRecord>(csv_str: &str) -> Result<Vec<R>, LabelFuseError> {
    parse_records(csv_str.as_bytes(), Path::new("<string>"))
}

/// Writes records to a CSV string.
pub fn to_csv_string<R: CsvRecord>(records: &[R]) -> Result<String, LabelFuseError> {
    let dummy_path = Path::new("<string>");
    let writer = write_records(Vec::new(), records, dummy_path)?;
    let bytes = writer
        .into_inner()
        .map_err(|e| LabelFuseError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| LabelFuseError::MalformedRecord {
        path: dummy_path.to_path_buf(),
        location: "output".to_string(),
        message: format!("Invalid UTF-8 in output: {}", e),
    })
}

// ============================================================================
// Internals
// ============================================================================

fn parse_records<R: CsvRecord, T: Read>(reader: T, path: &Path) -> Result<Vec<R>, LabelFuseError> {
    let malformed = |line: u64, message: String| LabelFuseError::MalformedRecord {
        path: path.to_path_buf(),
        location: format!("line {}", line),
        message,
    };

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| malformed(error_line(&e).unwrap_or(1), e.to_string()))?
        .clone();
    if headers.iter().ne(R::HEADER.iter().copied()) {
        return Err(malformed(
            1,
            format!(
                "expected header '{}', found '{}'",
                R::HEADER.join(","),
                headers.iter().collect::<Vec<_>>().join(",")
            ),
        ));
    }

    let mut records = Vec::new();
    for result in csv_reader.records() {
        let record = result.map_err(|e| malformed(error_line(&e).unwrap_or(0), e.to_string()))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let row: R::Row = record
            .deserialize(Some(&headers))
            .map_err(|e| malformed(line, e.to_string()))?;
        records.push(R::from_row(row).map_err(|message| malformed(line, message))?);
    }

    Ok(records)
}

fn write_records<R: CsvRecord, W: Write>(
    writer: W,
    records: &[R],
    path: &Path,
) -> Result<csv::Writer<W>, LabelFuseError> {
    let csv_error = |source| LabelFuseError::CsvWrite {
        path: path.to_path_buf(),
        source,
    };

    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv_writer.write_record(R::HEADER).map_err(csv_error)?;
    for record in records {
        csv_writer.serialize(record.to_row()).map_err(csv_error)?;
    }
    Ok(csv_writer)
}

fn error_line(error: &csv::Error) -> Option<u64> {
    error.position().map(|p| p.line())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_for_empty_collection() {
        let csv = to_csv_string::<ErrorRate>(&[]).expect("write");
        assert_eq!(csv, "LABEL,FUNCTION_ID,VALUE\n");
    }

    #[test]
    fn writes_booleans_as_digits() {
        let csv = to_csv_string(&[
            ObservedInstance::new(1, "a", true),
            ObservedInstance::new(2, "a", false),
        ])
        .expect("write");
        assert_eq!(csv, "ID,LABEL,VALUE\n1,a,1\n2,a,0\n");
    }

    #[test]
    fn parses_predicted_rows() {
        let csv = "ID,LABEL,FUNCTION_ID,VALUE\n0,animal,3,1.0\n1,animal,3,0.25\n";
        let records: Vec<PredictedInstance> = from_csv_str(csv).expect("parse");
        assert_eq!(
            records,
            vec![
                PredictedInstance::new(0, "animal", 3, 1.0),
                PredictedInstance::new(1, "animal", 3, 0.25),
            ]
        );
    }

    #[test]
    fn rejects_wrong_header() {
        let csv = "ID,LABEL,VALUE\n0,animal,1\n";
        let err = from_csv_str::<PredictedInstance>(csv).unwrap_err();
        match err {
            LabelFuseError::MalformedRecord { location, .. } => assert_eq!(location, "line 1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_missing_header() {
        assert!(from_csv_str::<ErrorRate>("").is_err());
    }

    #[test]
    fn reports_line_of_bad_number() {
        let csv = "LABEL,FUNCTION_ID,VALUE\na,1,0.5\nb,oops,0.5\n";
        let err = from_csv_str::<ErrorRate>(csv).unwrap_err();
        match err {
            LabelFuseError::MalformedRecord { location, .. } => assert_eq!(location, "line 3"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_non_binary_boolean() {
        let csv = "ID,LABEL,VALUE\n0,a,2\n";
        let err = from_csv_str::<ObservedInstance>(csv).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn rejects_short_rows() {
        let csv = "ID,LABEL,FUNCTION_ID,VALUE\n0,a,1\n";
        assert!(from_csv_str::<PredictedInstance>(csv).is_err());
    }
}
