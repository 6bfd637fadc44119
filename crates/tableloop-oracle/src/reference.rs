//! Loading the expected output for a task.
//!
//! Reference files are CSV. Column dtypes are inferred the way
//! `pandas.read_csv` infers them with default options, so a candidate that
//! builds its table with the usual pandas conversions can match exactly.

use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::{Cell, DType, Table, TableError};

/// Strings read as missing values
const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

const TRUE_VALUES: &[&str] = &["True", "TRUE", "true"];
const FALSE_VALUES: &[&str] = &["False", "FALSE", "false"];

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("Reference file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read reference CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Reference CSV has no header row")]
    NoHeader,

    #[error("Malformed reference table: {0}")]
    Table(#[from] TableError),
}

/// Source of ground-truth tables
pub trait ReferenceSource: Send + Sync {
    fn load(&self, path: &Path) -> Result<Table, ReferenceError>;
}

/// Reads reference tables from CSV files
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReference;

impl ReferenceSource for CsvReference {
    fn load(&self, path: &Path) -> Result<Table, ReferenceError> {
        if !path.exists() {
            return Err(ReferenceError::NotFound(path.to_path_buf()));
        }
        let reader = csv::ReaderBuilder::new().from_path(path)?;
        let table = read_table(reader)?;
        debug!(path = %path.display(), shape = ?table.shape(), "Loaded reference table");
        Ok(table)
    }
}

/// Parse CSV text from any reader
pub fn parse_csv<R: Read>(input: R) -> Result<Table, ReferenceError> {
    read_table(csv::ReaderBuilder::new().from_reader(input))
}

fn read_table<R: Read>(mut reader: csv::Reader<R>) -> Result<Table, ReferenceError> {
    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(ReferenceError::NoHeader);
    }
    let columns: Vec<String> = headers.iter().map(str::to_string).collect();

    let mut raw_columns: Vec<Vec<String>> = vec![Vec::new(); columns.len()];
    for record in reader.records() {
        let record = record?;
        for (column, field) in raw_columns.iter_mut().zip(record.iter()) {
            column.push(field.to_string());
        }
    }

    let typed: Vec<(DType, Vec<Cell>)> = raw_columns.iter().map(|raw| infer_column(raw)).collect();
    let row_count = raw_columns.first().map_or(0, Vec::len);

    let dtypes = typed.iter().map(|(dtype, _)| dtype.clone()).collect();
    let rows = (0..row_count)
        .map(|i| typed.iter().map(|(_, cells)| cells[i].clone()).collect())
        .collect();

    Ok(Table::new(columns, dtypes, rows)?)
}

fn is_na(value: &str) -> bool {
    NA_VALUES.contains(&value)
}

fn parse_bool(value: &str) -> Option<bool> {
    if TRUE_VALUES.contains(&value) {
        Some(true)
    } else if FALSE_VALUES.contains(&value) {
        Some(false)
    } else {
        None
    }
}

/// Infer one column's dtype and convert its values.
///
/// int64 needs every value to be an integer with nothing missing; integers
/// with gaps widen to float64, and an entirely empty column is float64 too.
/// Any spelling of NaN that parses as a float is missing. Boolean literals
/// make a bool column, or an object column of bools when some are missing.
/// Anything else is object.
fn infer_column(raw: &[String]) -> (DType, Vec<Cell>) {
    if raw.is_empty() {
        return (DType::Object, Vec::new());
    }

    let present: Vec<&str> = raw.iter().map(String::as_str).filter(|v| !is_na(v)).collect();
    let has_missing = present.len() < raw.len();

    if !has_missing && present.iter().all(|v| v.trim().parse::<i64>().is_ok()) {
        let cells = raw
            .iter()
            .map(|v| v.trim().parse::<i64>().map(Cell::Int).unwrap_or(Cell::Null))
            .collect();
        return (DType::Int64, cells);
    }

    if present.iter().all(|v| v.trim().parse::<f64>().is_ok()) {
        let cells = raw
            .iter()
            .map(|v| {
                if is_na(v) {
                    return Cell::Null;
                }
                match v.trim().parse::<f64>() {
                    Ok(f) if !f.is_nan() => Cell::Float(f),
                    _ => Cell::Null,
                }
            })
            .collect();
        return (DType::Float64, cells);
    }

    if present.iter().all(|v| parse_bool(v).is_some()) {
        let cells = raw
            .iter()
            .map(|v| parse_bool(v).map(Cell::Bool).unwrap_or(Cell::Null))
            .collect();
        let dtype = if has_missing { DType::Object } else { DType::Bool };
        return (dtype, cells);
    }

    let cells = raw
        .iter()
        .map(|v| {
            if is_na(v) {
                Cell::Null
            } else {
                Cell::Str(v.clone())
            }
        })
        .collect();
    (DType::Object, cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infers_statement_dtypes() {
        let csv = "Date,Description,Debit Amt,Credit Amt,Balance\n\
                   01-08-2024,Salary Credit,,1935.3,6864.58\n\
                   02-08-2024,Card Payment,2222.0,,4642.58\n";
        let table = parse_csv(csv.as_bytes()).unwrap();

        assert_eq!(table.shape(), (2, 5));
        assert_eq!(
            table.dtypes(),
            &[
                DType::Object,
                DType::Object,
                DType::Float64,
                DType::Float64,
                DType::Float64
            ]
        );
        assert_eq!(table.rows()[0][2], Cell::Null);
        assert_eq!(table.rows()[0][3], Cell::Float(1935.3));
        assert_eq!(table.rows()[1][1], Cell::Str("Card Payment".into()));
    }

    #[test]
    fn test_integers_with_gaps_widen_to_float() {
        let table = parse_csv("n,m\n1,4\n,5\n3,6\n".as_bytes()).unwrap();
        assert_eq!(table.dtypes(), &[DType::Float64, DType::Int64]);
        assert_eq!(table.rows()[0][0], Cell::Float(1.0));
        assert_eq!(table.rows()[1][0], Cell::Null);
        assert_eq!(table.rows()[2][1], Cell::Int(6));
    }

    #[test]
    fn test_all_missing_column_is_float() {
        let table = parse_csv("a,b\nx,\ny,NaN\n".as_bytes()).unwrap();
        assert_eq!(table.dtypes()[1], DType::Float64);
        assert!(table.rows().iter().all(|row| row[1].is_null()));
    }

    #[test]
    fn test_boolean_column() {
        let table = parse_csv("flag\nTrue\nfalse\n".as_bytes()).unwrap();
        assert_eq!(table.dtypes(), &[DType::Bool]);
        assert_eq!(table.rows()[1][0], Cell::Bool(false));
    }

    #[test]
    fn test_boolean_column_with_gaps_keeps_bools() {
        let table = parse_csv("flag\nTrue\n\nFalse\n".as_bytes()).unwrap();
        assert_eq!(table.dtypes(), &[DType::Object]);
        assert_eq!(
            table.rows().iter().map(|r| r[0].clone()).collect::<Vec<_>>(),
            vec![Cell::Bool(true), Cell::Null, Cell::Bool(false)]
        );
    }

    #[test]
    fn test_padded_integers_stay_int() {
        let table = parse_csv("n\n 5\n 6\n".as_bytes()).unwrap();
        assert_eq!(table.dtypes(), &[DType::Int64]);
        assert_eq!(table.rows()[0][0], Cell::Int(5));
    }

    #[test]
    fn test_any_nan_spelling_is_missing() {
        let table = parse_csv("a,b\nNAN,1\n2.5,2\n+nan,3\nNan,4\n".as_bytes()).unwrap();
        assert_eq!(table.dtypes(), &[DType::Float64, DType::Int64]);
        assert_eq!(table.rows()[0][0], Cell::Null);
        assert_eq!(table.rows()[1][0], Cell::Float(2.5));
        assert!(table.rows()[2][0].is_null());
        assert!(table.rows()[3][0].is_null());

        let same = crate::CandidateValue::Table(table.clone());
        assert!(crate::Oracle::compare(&same, &table).is_success());
    }

    #[test]
    fn test_infinity_parses_as_float() {
        let table = parse_csv("x\ninf\n-inf\n1.0\n".as_bytes()).unwrap();
        assert_eq!(table.dtypes(), &[DType::Float64]);
        assert_eq!(table.rows()[0][0], Cell::Float(f64::INFINITY));
        assert_eq!(table.rows()[1][0], Cell::Float(f64::NEG_INFINITY));
    }

    #[test]
    fn test_header_only_csv_has_object_columns() {
        let table = parse_csv("a,b\n".as_bytes()).unwrap();
        assert_eq!(table.shape(), (0, 2));
        assert_eq!(table.dtypes(), &[DType::Object, DType::Object]);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = CsvReference.load(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, ReferenceError::NotFound(_)));
    }

    #[test]
    fn test_loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expected.csv");
        std::fs::write(&path, "Date,Amount\n01-01-2024,1.5\n").unwrap();
        let table = CsvReference.load(&path).unwrap();
        assert_eq!(table.columns(), &["Date".to_string(), "Amount".to_string()]);
        assert_eq!(table.rows()[0][1], Cell::Float(1.5));
    }
}
