use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single table value.
///
/// Missing values of any column type are `Null`, matching how a dataframe
/// stores `NaN`/`None` in numeric and object columns alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Python literal form, used when showing rows as dicts
    pub fn repr(&self) -> String {
        match self {
            Cell::Null => "nan".to_string(),
            Cell::Bool(true) => "True".to_string(),
            Cell::Bool(false) => "False".to_string(),
            Cell::Int(v) => v.to_string(),
            Cell::Float(v) => format!("{:?}", v),
            Cell::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => write!(f, "NaN"),
            Cell::Str(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.repr()),
        }
    }
}

/// Column data type, named the way pandas names them
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DType {
    Int64,
    Float64,
    Bool,
    Object,
    Other(String),
}

impl DType {
    pub fn name(&self) -> &str {
        match self {
            DType::Int64 => "int64",
            DType::Float64 => "float64",
            DType::Bool => "bool",
            DType::Object => "object",
            DType::Other(name) => name,
        }
    }
}

impl From<String> for DType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "int64" => DType::Int64,
            "float64" => DType::Float64,
            "bool" => DType::Bool,
            "object" => DType::Object,
            _ => DType::Other(name),
        }
    }
}

impl From<DType> for String {
    fn from(dtype: DType) -> Self {
        dtype.name().to_string()
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum TableError {
    #[error("{columns} columns but {dtypes} dtypes")]
    DtypeCount { columns: usize, dtypes: usize },

    #[error("row {row} has {found} values, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// A rectangular table with ordered, typed columns
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    dtypes: Vec<DType>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(
        columns: Vec<String>,
        dtypes: Vec<DType>,
        rows: Vec<Vec<Cell>>,
    ) -> Result<Self, TableError> {
        if columns.len() != dtypes.len() {
            return Err(TableError::DtypeCount {
                columns: columns.len(),
                dtypes: dtypes.len(),
            });
        }
        if let Some((row, values)) = rows
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != columns.len())
        {
            return Err(TableError::RaggedRow {
                row,
                expected: columns.len(),
                found: values.len(),
            });
        }
        Ok(Self {
            columns,
            dtypes,
            rows,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn dtypes(&self) -> &[DType] {
        &self.dtypes
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// (row count, column count)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    pub fn row(&self, index: usize) -> Option<&[Cell]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// Ordered column -> dtype pairs
    pub fn dtype_map(&self) -> Vec<(String, DType)> {
        self.columns
            .iter()
            .cloned()
            .zip(self.dtypes.iter().cloned())
            .collect()
    }

    /// Ordered column -> value pairs for one row
    pub fn row_map(&self, index: usize) -> Vec<(String, Cell)> {
        match self.row(index) {
            Some(values) => self
                .columns
                .iter()
                .cloned()
                .zip(values.iter().cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Column names as a Python list literal
    pub fn render_columns(&self) -> String {
        render_list(&self.columns)
    }

    /// Column dtypes as a Python dict literal, e.g. `{'Amount': dtype('float64')}`
    pub fn render_dtypes(&self) -> String {
        render_dtype_map(&self.dtype_map())
    }

    /// Render the first `n` rows as a fixed-width text grid with a row index
    pub fn render_head(&self, n: usize) -> String {
        let shown = &self.rows[..n.min(self.rows.len())];

        let index_width = shown.len().saturating_sub(1).to_string().len();
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        let rendered: Vec<Vec<String>> = shown
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();
        for row in &rendered {
            for (width, value) in widths.iter_mut().zip(row) {
                *width = (*width).max(value.chars().count());
            }
        }

        let mut out = String::new();
        out.push_str(&" ".repeat(index_width));
        for (column, width) in self.columns.iter().zip(&widths) {
            out.push_str(&format!("  {:>width$}", column, width = *width));
        }
        for (i, row) in rendered.iter().enumerate() {
            out.push('\n');
            out.push_str(&format!("{:<width$}", i, width = index_width));
            for (value, width) in row.iter().zip(&widths) {
                out.push_str(&format!("  {:>width$}", value, width = *width));
            }
        }
        out
    }
}

/// Render ordered pairs the way Python prints a dict
pub(crate) fn render_dict<V: AsRef<str>>(pairs: impl IntoIterator<Item = (String, V)>) -> String {
    let body: Vec<String> = pairs
        .into_iter()
        .map(|(key, value)| format!("{}: {}", Cell::Str(key).repr(), value.as_ref()))
        .collect();
    format!("{{{}}}", body.join(", "))
}

pub(crate) fn render_dtype_map(pairs: &[(String, DType)]) -> String {
    render_dict(
        pairs
            .iter()
            .map(|(k, v)| (k.clone(), format!("dtype('{}')", v))),
    )
}

/// Render a list of names the way Python prints a list of strings
pub(crate) fn render_list(items: &[String]) -> String {
    let body: Vec<String> = items.iter().map(|s| Cell::Str(s.clone()).repr()).collect();
    format!("[{}]", body.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(
            vec!["Date".into(), "Amount".into()],
            vec![DType::Object, DType::Float64],
            vec![
                vec![Cell::Str("01-08-2024".into()), Cell::Float(1935.3)],
                vec![Cell::Str("02-08-2024".into()), Cell::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let err = Table::new(
            vec!["a".into(), "b".into()],
            vec![DType::Object, DType::Object],
            vec![vec![Cell::Null]],
        )
        .unwrap_err();
        assert_eq!(
            err,
            TableError::RaggedRow {
                row: 0,
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn test_shape_and_maps() {
        let table = sample();
        assert_eq!(table.shape(), (2, 2));
        assert_eq!(
            table.dtype_map(),
            vec![
                ("Date".to_string(), DType::Object),
                ("Amount".to_string(), DType::Float64)
            ]
        );
        assert_eq!(table.row_map(1)[1], ("Amount".to_string(), Cell::Null));
        assert!(table.row_map(5).is_empty());
    }

    #[test]
    fn test_cell_repr() {
        assert_eq!(Cell::Float(5.0).repr(), "5.0");
        assert_eq!(Cell::Str("it's".into()).repr(), "'it\\'s'");
        assert_eq!(Cell::Null.repr(), "nan");
        assert_eq!(Cell::Bool(true).repr(), "True");
    }

    #[test]
    fn test_cell_deserializes_from_json() {
        let cells: Vec<Cell> = serde_json::from_str(r#"[null, true, 3, 3.0, "x"]"#).unwrap();
        assert_eq!(
            cells,
            vec![
                Cell::Null,
                Cell::Bool(true),
                Cell::Int(3),
                Cell::Float(3.0),
                Cell::Str("x".into())
            ]
        );
    }

    #[test]
    fn test_dtype_names_round_trip_through_strings() {
        assert_eq!(DType::from("float64".to_string()), DType::Float64);
        assert_eq!(
            DType::from("datetime64[ns]".to_string()),
            DType::Other("datetime64[ns]".into())
        );
        assert_eq!(DType::Other("category".into()).to_string(), "category");
    }

    #[test]
    fn test_render_head_aligns_columns() {
        let rendered = sample().render_head(3);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "         Date  Amount");
        assert_eq!(lines[1], "0  01-08-2024  1935.3");
        assert_eq!(lines[2], "1  02-08-2024     NaN");
    }

    #[test]
    fn test_render_schema_as_python_literals() {
        let table = sample();
        assert_eq!(table.render_columns(), "['Date', 'Amount']");
        assert_eq!(
            table.render_dtypes(),
            "{'Date': dtype('object'), 'Amount': dtype('float64')}"
        );
    }
}
