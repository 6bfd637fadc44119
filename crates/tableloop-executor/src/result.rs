use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use tableloop_oracle::{CandidateValue, ContractViolation, Diagnostic};

/// Failures of the executor itself, not of the candidate
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to start interpreter {}: {source}", .interpreter.display())]
    Interpreter {
        interpreter: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare execution sandbox: {0}")]
    Sandbox(#[from] std::io::Error),

    #[error("Candidate file not found: {}", .0.display())]
    CandidateMissing(PathBuf),

    #[error("Process plumbing failed: {0}")]
    Process(String),
}

/// Outcome of running one candidate: a value, or a classified failure
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Produced(CandidateValue),
    Failed(ExecutionFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionFailure {
    /// The module raised while being imported (syntax errors, bad imports)
    Load {
        exception_type: String,
        message: String,
        traceback: String,
    },
    Contract(ContractViolation),
    /// The entry point raised, or the interpreter died without reporting
    Runtime {
        exception_type: String,
        message: String,
        traceback: String,
    },
    Timeout { limit: Duration },
}

impl ExecutionFailure {
    pub fn into_diagnostic(self) -> Diagnostic {
        match self {
            ExecutionFailure::Load {
                exception_type,
                message,
                traceback,
            } => Diagnostic::LoadFailure {
                exception_type,
                message,
                traceback,
            },
            ExecutionFailure::Contract(violation) => Diagnostic::ContractViolation { violation },
            ExecutionFailure::Runtime {
                exception_type,
                message,
                traceback,
            } => Diagnostic::RuntimeFailure {
                exception_type,
                message,
                traceback,
            },
            ExecutionFailure::Timeout { limit } => Diagnostic::Timeout {
                limit_secs: limit.as_secs_f64(),
            },
        }
    }
}

impl ExecutionResult {
    pub fn is_produced(&self) -> bool {
        matches!(self, ExecutionResult::Produced(_))
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionResult::Produced(CandidateValue::Table(_)) => "table",
            ExecutionResult::Produced(CandidateValue::Foreign { .. }) => "foreign value",
            ExecutionResult::Failed(ExecutionFailure::Load { .. }) => "load failure",
            ExecutionResult::Failed(ExecutionFailure::Contract(_)) => "contract violation",
            ExecutionResult::Failed(ExecutionFailure::Runtime { .. }) => "runtime failure",
            ExecutionResult::Failed(ExecutionFailure::Timeout { .. }) => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tableloop_oracle::DiagnosticKind;

    #[test]
    fn test_failures_map_to_diagnostic_kinds() {
        let cases = vec![
            (
                ExecutionFailure::Load {
                    exception_type: "SyntaxError".into(),
                    message: "invalid syntax".into(),
                    traceback: String::new(),
                },
                DiagnosticKind::LoadFailure,
            ),
            (
                ExecutionFailure::Contract(ContractViolation::MissingEntryPoint {
                    name: "parse".into(),
                }),
                DiagnosticKind::ContractViolation,
            ),
            (
                ExecutionFailure::Runtime {
                    exception_type: "KeyError".into(),
                    message: "'Date'".into(),
                    traceback: String::new(),
                },
                DiagnosticKind::RuntimeFailure,
            ),
            (
                ExecutionFailure::Timeout {
                    limit: Duration::from_secs(3),
                },
                DiagnosticKind::Timeout,
            ),
        ];
        for (failure, kind) in cases {
            assert_eq!(failure.into_diagnostic().kind(), kind);
        }
    }
}
