use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, trace};

use crate::ProcessOutput;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to spawn process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to read process output: {0}")]
    ReadFailed(String),
}

/// Configuration for a child process
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Working directory for the process
    pub working_dir: PathBuf,
    /// Optional timeout (None = no limit)
    pub timeout: Option<Duration>,
    /// Additional environment variables
    pub env_vars: HashMap<String, String>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            timeout: None,
            env_vars: HashMap::new(),
        }
    }
}

impl ProcessConfig {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_env(mut self, key: String, value: String) -> Self {
        self.env_vars.insert(key, value);
        self
    }
}

/// Utility for spawning child processes
pub struct ProcessSpawner;

impl ProcessSpawner {
    /// Spawn a process and capture its output.
    ///
    /// When the configured timeout expires the child is killed and
    /// `ProcessError::Timeout` is returned.
    pub async fn spawn(
        binary: &Path,
        args: &[&str],
        config: &ProcessConfig,
    ) -> Result<ProcessOutput, ProcessError> {
        let start = Instant::now();

        debug!(
            binary = %binary.display(),
            args = ?args,
            working_dir = %config.working_dir.display(),
            "Spawning process"
        );

        let mut cmd = Command::new(binary);
        cmd.args(args)
            .current_dir(&config.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null()) // Non-interactive
            .kill_on_drop(true);

        for (key, value) in &config.env_vars {
            cmd.env(key, value);
        }

        let child = cmd.spawn()?;

        // Dropping the collection future on timeout drops the child, which kills it
        let (stdout, stderr, exit_code) = match config.timeout {
            Some(limit) => tokio::time::timeout(limit, Self::collect(child))
                .await
                .map_err(|_| ProcessError::Timeout(limit))??,
            None => Self::collect(child).await?,
        };
        let duration = start.elapsed();

        debug!(
            exit_code,
            duration_ms = duration.as_millis(),
            "Process completed"
        );

        Ok(ProcessOutput::new(stdout, stderr, exit_code, duration))
    }

    async fn collect(mut child: Child) -> Result<(String, String, i32), ProcessError> {
        let stdout_handle = child
            .stdout
            .take()
            .ok_or_else(|| ProcessError::ReadFailed("stdout not captured".into()))?;
        let stderr_handle = child
            .stderr
            .take()
            .ok_or_else(|| ProcessError::ReadFailed("stderr not captured".into()))?;

        let mut stdout_reader = BufReader::new(stdout_handle).lines();
        let mut stderr_reader = BufReader::new(stderr_handle).lines();

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut stderr_open = true;

        // Read both streams concurrently
        loop {
            tokio::select! {
                biased;

                result = stdout_reader.next_line() => {
                    match result {
                        Ok(Some(line)) => {
                            trace!(line = %line, "stdout");
                            push_line(&mut stdout, &line);
                        }
                        Ok(None) => {
                            // stdout closed, drain stderr
                            while stderr_open {
                                match stderr_reader.next_line().await {
                                    Ok(Some(line)) => {
                                        trace!(line = %line, "stderr");
                                        push_line(&mut stderr, &line);
                                    }
                                    _ => stderr_open = false,
                                }
                            }
                            break;
                        }
                        Err(e) => {
                            return Err(ProcessError::ReadFailed(format!("stdout: {}", e)));
                        }
                    }
                }
                result = stderr_reader.next_line(), if stderr_open => {
                    match result {
                        Ok(Some(line)) => {
                            trace!(line = %line, "stderr");
                            push_line(&mut stderr, &line);
                        }
                        Ok(None) => stderr_open = false,
                        Err(e) => {
                            return Err(ProcessError::ReadFailed(format!("stderr: {}", e)));
                        }
                    }
                }
            }
        }

        let status = child.wait().await?;
        Ok((stdout, stderr, status.code().unwrap_or(-1)))
    }
}

fn push_line(buffer: &mut String, line: &str) {
    if !buffer.is_empty() {
        buffer.push('\n');
    }
    buffer.push_str(line);
}
