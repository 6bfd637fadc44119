mod comparator;
mod diagnostic;
pub mod reference;
mod table;

pub use comparator::{CandidateValue, ComparisonResult, Oracle};
pub use diagnostic::{CellDifference, ContractViolation, Diagnostic, DiagnosticKind};
pub use reference::{CsvReference, ReferenceError, ReferenceSource};
pub use table::{Cell, DType, Table, TableError};
