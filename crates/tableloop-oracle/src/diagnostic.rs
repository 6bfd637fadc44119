use serde::{Deserialize, Serialize};
use std::fmt;

use crate::table::{render_dict, render_dtype_map, render_list};
use crate::{Cell, DType};

/// Why a candidate failed verification.
///
/// The `Display` form is the exact text handed to the next generation
/// attempt, so it must stay deterministic for a given payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The entry point returned something other than a table
    TypeMismatch { expected: String, actual: String },
    /// Column names differ in order or membership
    SchemaMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },
    /// (rows, columns) differ
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    /// Same schema and shape, but some value or dtype differs
    ValueMismatch {
        expected_first_row: Vec<(String, Cell)>,
        actual_first_row: Vec<(String, Cell)>,
        expected_dtypes: Vec<(String, DType)>,
        actual_dtypes: Vec<(String, DType)>,
        first_difference: Option<CellDifference>,
    },
    /// The candidate module could not be imported
    LoadFailure {
        exception_type: String,
        message: String,
        traceback: String,
    },
    /// The module loaded but does not expose the required entry point
    ContractViolation { violation: ContractViolation },
    /// The entry point raised
    RuntimeFailure {
        exception_type: String,
        message: String,
        traceback: String,
    },
    /// The entry point did not return within the execution limit
    Timeout { limit_secs: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellDifference {
    pub row: usize,
    pub column: String,
    pub expected: Cell,
    pub actual: Cell,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContractViolation {
    MissingEntryPoint { name: String },
    NotCallable { name: String, type_name: String },
    WrongArity { name: String, found: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    TypeMismatch,
    SchemaMismatch,
    ShapeMismatch,
    ValueMismatch,
    LoadFailure,
    ContractViolation,
    RuntimeFailure,
    Timeout,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::TypeMismatch => "TYPE MISMATCH",
            DiagnosticKind::SchemaMismatch => "SCHEMA MISMATCH",
            DiagnosticKind::ShapeMismatch => "SHAPE MISMATCH",
            DiagnosticKind::ValueMismatch => "VALUE MISMATCH",
            DiagnosticKind::LoadFailure => "LOAD FAILURE",
            DiagnosticKind::ContractViolation => "CONTRACT VIOLATION",
            DiagnosticKind::RuntimeFailure => "RUNTIME FAILURE",
            DiagnosticKind::Timeout => "TIMEOUT",
        };
        f.write_str(name)
    }
}

impl Diagnostic {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Diagnostic::TypeMismatch { .. } => DiagnosticKind::TypeMismatch,
            Diagnostic::SchemaMismatch { .. } => DiagnosticKind::SchemaMismatch,
            Diagnostic::ShapeMismatch { .. } => DiagnosticKind::ShapeMismatch,
            Diagnostic::ValueMismatch { .. } => DiagnosticKind::ValueMismatch,
            Diagnostic::LoadFailure { .. } => DiagnosticKind::LoadFailure,
            Diagnostic::ContractViolation { .. } => DiagnosticKind::ContractViolation,
            Diagnostic::RuntimeFailure { .. } => DiagnosticKind::RuntimeFailure,
            Diagnostic::Timeout { .. } => DiagnosticKind::Timeout,
        }
    }

    /// True when the candidate produced more rows than the reference.
    /// This is the usual signature of header rows repeated on every page.
    pub fn has_extra_rows(&self) -> bool {
        matches!(self, Diagnostic::ShapeMismatch { expected, actual } if actual.0 > expected.0)
    }

    pub fn has_missing_rows(&self) -> bool {
        matches!(self, Diagnostic::ShapeMismatch { expected, actual } if actual.0 < expected.0)
    }

    /// True for a value mismatch where the reference has empty numeric
    /// cells but the candidate filled them with something else
    pub fn has_numeric_fill_mismatch(&self) -> bool {
        match self {
            Diagnostic::ValueMismatch {
                first_difference: Some(diff),
                ..
            } => diff.expected.is_null() && matches!(diff.actual, Cell::Float(_) | Cell::Int(_)),
            Diagnostic::ValueMismatch {
                expected_first_row,
                actual_first_row,
                ..
            } => expected_first_row
                .iter()
                .zip(actual_first_row)
                .any(|((_, e), (_, a))| e.is_null() && !a.is_null()),
            _ => false,
        }
    }

    /// One-line description for logs and the attempt banner
    pub fn short_description(&self) -> String {
        match self {
            Diagnostic::TypeMismatch { actual, .. } => format!("{} (got {})", self.kind(), actual),
            Diagnostic::SchemaMismatch { actual, .. } => {
                format!("{} ({} columns)", self.kind(), actual.len())
            }
            Diagnostic::ShapeMismatch { expected, actual } => format!(
                "{} (expected {:?}, got {:?})",
                self.kind(),
                expected,
                actual
            ),
            Diagnostic::ValueMismatch {
                first_difference: Some(diff),
                ..
            } => format!("{} (row {}, {})", self.kind(), diff.row, diff.column),
            Diagnostic::LoadFailure { exception_type, .. }
            | Diagnostic::RuntimeFailure { exception_type, .. } => {
                format!("{} ({})", self.kind(), exception_type)
            }
            _ => self.kind().to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::TypeMismatch { expected, actual } => {
                write!(f, "parse() returned {}, expected {}", actual, expected)
            }
            Diagnostic::SchemaMismatch { expected, actual } => write!(
                f,
                "Column mismatch!\nExpected: {}\nGot: {}",
                render_list(expected),
                render_list(actual)
            ),
            Diagnostic::ShapeMismatch { expected, actual } => {
                write!(
                    f,
                    "Shape mismatch!\nExpected: {:?} (rows, cols)\nGot: {:?}",
                    expected, actual
                )?;
                if actual.0 > expected.0 {
                    write!(
                        f,
                        "\n{} more rows than expected: header rows repeated on each page or section are probably being kept as data.",
                        actual.0 - expected.0
                    )?;
                } else if actual.0 < expected.0 {
                    write!(
                        f,
                        "\n{} fewer rows than expected: data rows are probably being dropped (a page skipped, or rows filtered out as headers).",
                        expected.0 - actual.0
                    )?;
                }
                Ok(())
            }
            Diagnostic::ValueMismatch {
                expected_first_row,
                actual_first_row,
                expected_dtypes,
                actual_dtypes,
                first_difference,
            } => {
                writeln!(f, "DataFrames not exactly equal. Differences found:")?;
                writeln!(f, "Expected first row:\n{}", render_cells(expected_first_row))?;
                writeln!(f, "Actual first row:\n{}", render_cells(actual_first_row))?;
                writeln!(f, "Expected dtypes:\n{}", render_dtype_map(expected_dtypes))?;
                write!(f, "Actual dtypes:\n{}", render_dtype_map(actual_dtypes))?;
                if let Some(diff) = first_difference {
                    write!(
                        f,
                        "\nFirst differing cell: row {}, column {}: expected {}, got {}",
                        diff.row,
                        Cell::Str(diff.column.clone()).repr(),
                        diff.expected.repr(),
                        diff.actual.repr()
                    )?;
                }
                Ok(())
            }
            Diagnostic::LoadFailure {
                exception_type,
                message,
                traceback,
            } => write!(
                f,
                "Code failed to load: {}\n{}\nTraceback:\n{}",
                exception_type, message, traceback
            ),
            Diagnostic::ContractViolation { violation } => match violation {
                ContractViolation::MissingEntryPoint { name } => {
                    write!(f, "Contract violation: module defines no `{}` function", name)
                }
                ContractViolation::NotCallable { name, type_name } => write!(
                    f,
                    "Contract violation: `{}` is a {}, not a function",
                    name, type_name
                ),
                ContractViolation::WrongArity { name, found } => write!(
                    f,
                    "Contract violation: `{}` must take exactly one parameter (the input path), found {}",
                    name, found
                ),
            },
            Diagnostic::RuntimeFailure {
                exception_type,
                message,
                traceback,
            } => write!(
                f,
                "Code execution error: {}\n{}\nTraceback:\n{}",
                exception_type, message, traceback
            ),
            Diagnostic::Timeout { limit_secs } => write!(
                f,
                "Execution timed out after {:.0}s without returning. Look for unbounded loops or repeated work over the whole document.",
                limit_secs
            ),
        }
    }
}

fn render_cells(pairs: &[(String, Cell)]) -> String {
    render_dict(pairs.iter().map(|(k, v)| (k.clone(), v.repr())))
}
