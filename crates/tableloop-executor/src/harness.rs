//! The in-interpreter side of candidate execution and its report format.

use serde::Deserialize;

use tableloop_oracle::{CandidateValue, Cell, ContractViolation, DType, Table};

use crate::{ExecutionFailure, ExecutionResult};

pub(crate) const HARNESS_FILE_NAME: &str = "tableloop_harness.py";
pub(crate) const RESULT_FILE_NAME: &str = "result.json";

/// Loads the candidate, checks the entry point, calls it once and writes a
/// tagged JSON report. Invoked as:
/// `python tableloop_harness.py <candidate> <input> <result> <entry_point>`
pub(crate) const HARNESS_SCRIPT: &str = r#"import importlib.util
import inspect
import json
import math
import sys
import traceback

sys.dont_write_bytecode = True


def write_result(path, payload):
    with open(path, "w", encoding="utf-8") as fh:
        json.dump(payload, fh, allow_nan=False)


def error_payload(status, exc):
    return {
        "status": status,
        "exception_type": type(exc).__name__,
        "message": str(exc),
        "traceback": traceback.format_exc(),
    }


def to_cell(value):
    if value is None:
        return None
    if hasattr(value, "item") and not isinstance(value, (str, bytes)):
        try:
            value = value.item()
        except Exception:
            pass
    if isinstance(value, (bool, int, str)):
        return value
    if isinstance(value, float):
        if math.isnan(value):
            return None
        return value if math.isfinite(value) else repr(value)
    try:
        if value != value:
            return None
    except Exception:
        return None
    return str(value)


def table_payload(frame):
    return {
        "status": "table",
        "columns": [str(c) for c in frame.columns],
        "dtypes": [str(t) for t in frame.dtypes],
        "rows": [
            [to_cell(v) for v in row]
            for row in frame.itertuples(index=False, name=None)
        ],
    }


def main():
    candidate_path, input_path, result_path, entry_name = sys.argv[1:5]

    try:
        spec = importlib.util.spec_from_file_location("candidate", candidate_path)
        module = importlib.util.module_from_spec(spec)
        spec.loader.exec_module(module)
    except BaseException as exc:
        write_result(result_path, error_payload("load_error", exc))
        return

    entry = getattr(module, entry_name, None)
    if entry is None:
        write_result(result_path, {"status": "missing_entry_point", "name": entry_name})
        return
    if not callable(entry):
        write_result(result_path, {
            "status": "not_callable",
            "name": entry_name,
            "type_name": type(entry).__name__,
        })
        return
    try:
        arity = len(inspect.signature(entry).parameters)
    except (TypeError, ValueError):
        arity = 1
    if arity != 1:
        write_result(result_path, {"status": "bad_arity", "name": entry_name, "found": arity})
        return

    try:
        value = entry(input_path)
    except BaseException as exc:
        write_result(result_path, error_payload("runtime_error", exc))
        return

    kind = type(value)
    if kind.__name__ != "DataFrame" or not kind.__module__.startswith("pandas"):
        write_result(result_path, {"status": "foreign", "type_name": kind.__name__})
        return

    try:
        payload = table_payload(value)
    except Exception as exc:
        payload = error_payload("runtime_error", exc)
    write_result(result_path, payload)


if __name__ == "__main__":
    main()
"#;

/// Report written by the harness
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum HarnessReport {
    Table {
        columns: Vec<String>,
        dtypes: Vec<DType>,
        rows: Vec<Vec<Cell>>,
    },
    Foreign {
        type_name: String,
    },
    LoadError {
        exception_type: String,
        message: String,
        traceback: String,
    },
    MissingEntryPoint {
        name: String,
    },
    NotCallable {
        name: String,
        type_name: String,
    },
    BadArity {
        name: String,
        found: usize,
    },
    RuntimeError {
        exception_type: String,
        message: String,
        traceback: String,
    },
}

/// JSON has no infinity, so the harness sends `repr()` text for it. Float
/// columns get the value back; text in object columns stays text.
fn restore_infinities(dtypes: &[DType], rows: &mut [Vec<Cell>]) {
    for (index, dtype) in dtypes.iter().enumerate() {
        if *dtype != DType::Float64 {
            continue;
        }
        for row in rows.iter_mut() {
            let Some(cell) = row.get_mut(index) else {
                continue;
            };
            let restored = match cell {
                Cell::Str(text) if text == "inf" => Cell::Float(f64::INFINITY),
                Cell::Str(text) if text == "-inf" => Cell::Float(f64::NEG_INFINITY),
                _ => continue,
            };
            *cell = restored;
        }
    }
}

impl HarnessReport {
    pub(crate) fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub(crate) fn into_result(self) -> ExecutionResult {
        match self {
            HarnessReport::Table {
                columns,
                dtypes,
                mut rows,
            } => {
                restore_infinities(&dtypes, &mut rows);
                match Table::new(columns, dtypes, rows) {
                    Ok(table) => ExecutionResult::Produced(CandidateValue::Table(table)),
                    Err(e) => ExecutionResult::Failed(ExecutionFailure::Runtime {
                        exception_type: "MalformedTable".into(),
                        message: e.to_string(),
                        traceback: String::new(),
                    }),
                }
            }
            HarnessReport::Foreign { type_name } => {
                ExecutionResult::Produced(CandidateValue::Foreign { type_name })
            }
            HarnessReport::LoadError {
                exception_type,
                message,
                traceback,
            } => ExecutionResult::Failed(ExecutionFailure::Load {
                exception_type,
                message,
                traceback,
            }),
            HarnessReport::MissingEntryPoint { name } => ExecutionResult::Failed(
                ExecutionFailure::Contract(ContractViolation::MissingEntryPoint { name }),
            ),
            HarnessReport::NotCallable { name, type_name } => ExecutionResult::Failed(
                ExecutionFailure::Contract(ContractViolation::NotCallable { name, type_name }),
            ),
            HarnessReport::BadArity { name, found } => ExecutionResult::Failed(
                ExecutionFailure::Contract(ContractViolation::WrongArity { name, found }),
            ),
            HarnessReport::RuntimeError {
                exception_type,
                message,
                traceback,
            } => ExecutionResult::Failed(ExecutionFailure::Runtime {
                exception_type,
                message,
                traceback,
            }),
        }
    }
}
