use tracing::debug;

use crate::{CellDifference, Diagnostic, Table};

/// Whatever the candidate's entry point handed back
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateValue {
    Table(Table),
    /// A non-table return value, identified by its type name
    Foreign { type_name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonResult {
    Success,
    Mismatch(Diagnostic),
}

impl ComparisonResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ComparisonResult::Success)
    }
}

/// Strict pass/fail comparison against a reference table.
///
/// Checks run cheapest first and stop at the first failure: return type,
/// column names, shape, then dtypes and cell values. There is no partial
/// credit.
pub struct Oracle;

impl Oracle {
    pub fn compare(actual: &CandidateValue, expected: &Table) -> ComparisonResult {
        let actual = match actual {
            CandidateValue::Table(table) => table,
            CandidateValue::Foreign { type_name } => {
                return ComparisonResult::Mismatch(Diagnostic::TypeMismatch {
                    expected: "DataFrame".to_string(),
                    actual: type_name.clone(),
                });
            }
        };

        if actual.columns() != expected.columns() {
            return ComparisonResult::Mismatch(Diagnostic::SchemaMismatch {
                expected: expected.columns().to_vec(),
                actual: actual.columns().to_vec(),
            });
        }

        if actual.shape() != expected.shape() {
            return ComparisonResult::Mismatch(Diagnostic::ShapeMismatch {
                expected: expected.shape(),
                actual: actual.shape(),
            });
        }

        let first_difference = first_difference(actual, expected);
        if first_difference.is_none() && actual.dtypes() == expected.dtypes() {
            debug!(shape = ?actual.shape(), "Candidate output matches reference");
            return ComparisonResult::Success;
        }

        ComparisonResult::Mismatch(Diagnostic::ValueMismatch {
            expected_first_row: expected.row_map(0),
            actual_first_row: actual.row_map(0),
            expected_dtypes: expected.dtype_map(),
            actual_dtypes: actual.dtype_map(),
            first_difference,
        })
    }
}

fn first_difference(actual: &Table, expected: &Table) -> Option<CellDifference> {
    expected
        .rows()
        .iter()
        .zip(actual.rows())
        .enumerate()
        .find_map(|(row, (expected_row, actual_row))| {
            expected_row
                .iter()
                .zip(actual_row)
                .zip(expected.columns())
                .find(|((e, a), _)| e != a)
                .map(|((e, a), column)| CellDifference {
                    row,
                    column: column.clone(),
                    expected: e.clone(),
                    actual: a.clone(),
                })
        })
}
