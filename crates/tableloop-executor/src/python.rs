use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use tableloop_agent::{ProcessConfig, ProcessError, ProcessOutput, ProcessSpawner};

use crate::harness::{HarnessReport, HARNESS_FILE_NAME, HARNESS_SCRIPT, RESULT_FILE_NAME};
use crate::{ExecutionFailure, ExecutionResult, ExecutorError};

const DEFAULT_INTERPRETER: &str = "python3";
const DEFAULT_ENTRY_POINT: &str = "parse";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const TRACEBACK_TAIL_LINES: usize = 60;

/// Runs one candidate against one input and classifies the outcome
#[async_trait]
pub trait CandidateExecutor: Send + Sync {
    async fn execute(
        &self,
        candidate: &Path,
        input: &Path,
    ) -> Result<ExecutionResult, ExecutorError>;
}

/// Executes Python candidates in a separate interpreter process.
///
/// Each call gets its own temporary directory as working directory, so no
/// module cache or stray files survive between attempts.
#[derive(Debug, Clone)]
pub struct PythonExecutor {
    interpreter: PathBuf,
    entry_point: String,
    timeout: Duration,
}

impl Default for PythonExecutor {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from(DEFAULT_INTERPRETER),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PythonExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn read_report(&self, result_path: &Path, output: &ProcessOutput) -> ExecutionResult {
        let text = match std::fs::read_to_string(result_path) {
            Ok(text) => text,
            Err(_) => {
                warn!(
                    exit_code = output.exit_code,
                    "Interpreter exited without writing a result"
                );
                return ExecutionResult::Failed(ExecutionFailure::Runtime {
                    exception_type: "ProcessExit".into(),
                    message: format!(
                        "interpreter exited with code {} before reporting a result",
                        output.exit_code
                    ),
                    traceback: output.stderr_tail(TRACEBACK_TAIL_LINES),
                });
            }
        };

        match HarnessReport::parse(&text) {
            Ok(report) => report.into_result(),
            Err(e) => ExecutionResult::Failed(ExecutionFailure::Runtime {
                exception_type: "UnreadableResult".into(),
                message: e.to_string(),
                traceback: output.stderr_tail(TRACEBACK_TAIL_LINES),
            }),
        }
    }
}

#[async_trait]
impl CandidateExecutor for PythonExecutor {
    async fn execute(
        &self,
        candidate: &Path,
        input: &Path,
    ) -> Result<ExecutionResult, ExecutorError> {
        let candidate = candidate
            .canonicalize()
            .map_err(|_| ExecutorError::CandidateMissing(candidate.to_path_buf()))?;
        // A missing input is the candidate's problem to report, so keep it as given
        let input = input.canonicalize().unwrap_or_else(|_| input.to_path_buf());

        let sandbox = tempfile::tempdir()?;
        let harness_path = sandbox.path().join(HARNESS_FILE_NAME);
        let result_path = sandbox.path().join(RESULT_FILE_NAME);
        tokio::fs::write(&harness_path, HARNESS_SCRIPT).await?;

        let harness_arg = harness_path.to_string_lossy();
        let candidate_arg = candidate.to_string_lossy();
        let input_arg = input.to_string_lossy();
        let result_arg = result_path.to_string_lossy();
        let args = [
            harness_arg.as_ref(),
            candidate_arg.as_ref(),
            input_arg.as_ref(),
            result_arg.as_ref(),
            self.entry_point.as_str(),
        ];

        let config = ProcessConfig::new(sandbox.path().to_path_buf())
            .with_timeout(self.timeout)
            .with_env("PYTHONDONTWRITEBYTECODE".into(), "1".into())
            .with_env("PYTHONUNBUFFERED".into(), "1".into());

        debug!(
            candidate = %candidate.display(),
            input = %input.display(),
            sandbox = %sandbox.path().display(),
            "Executing candidate"
        );

        let output = match ProcessSpawner::spawn(&self.interpreter, &args, &config).await {
            Ok(output) => output,
            Err(ProcessError::Timeout(limit)) => {
                warn!(limit_secs = limit.as_secs_f64(), "Candidate timed out");
                return Ok(ExecutionResult::Failed(ExecutionFailure::Timeout { limit }));
            }
            Err(ProcessError::SpawnFailed(source)) => {
                return Err(ExecutorError::Interpreter {
                    interpreter: self.interpreter.clone(),
                    source,
                })
            }
            Err(ProcessError::ReadFailed(msg)) => return Err(ExecutorError::Process(msg)),
        };

        let result = self.read_report(&result_path, &output);
        info!(
            outcome = result.label(),
            duration_ms = output.duration.as_millis(),
            "Candidate executed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let executor = PythonExecutor::new();
        assert_eq!(executor.interpreter(), Path::new("python3"));
        assert_eq!(executor.entry_point(), "parse");
        assert_eq!(executor.timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_missing_result_file_is_process_exit() {
        let executor = PythonExecutor::new();
        let dir = tempfile::tempdir().unwrap();
        let output = ProcessOutput::new(
            String::new(),
            "Killed".into(),
            137,
            Duration::from_millis(10),
        );
        let result = executor.read_report(&dir.path().join("absent.json"), &output);
        match result {
            ExecutionResult::Failed(ExecutionFailure::Runtime {
                exception_type,
                message,
                traceback,
            }) => {
                assert_eq!(exception_type, "ProcessExit");
                assert!(message.contains("137"));
                assert_eq!(traceback, "Killed");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_garbled_result_file_is_unreadable_result() {
        let executor = PythonExecutor::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        std::fs::write(&path, "{\"status\": \"tab").unwrap();
        let output = ProcessOutput::new(String::new(), String::new(), 0, Duration::ZERO);
        assert!(matches!(
            executor.read_report(&path, &output),
            ExecutionResult::Failed(ExecutionFailure::Runtime { ref exception_type, .. })
                if exception_type == "UnreadableResult"
        ));
    }

    #[tokio::test]
    async fn test_missing_candidate_is_executor_error() {
        let executor = PythonExecutor::new();
        let err = executor
            .execute(Path::new("/nonexistent/candidate.py"), Path::new("input.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::CandidateMissing(_)));
    }
}
