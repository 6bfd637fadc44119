use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const BOX_WIDTH: usize = 69;

/// Structured log events for the synthesis loop.
///
/// Attempt numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    TaskStarted {
        task_id: String,
        input: PathBuf,
        reference: PathBuf,
        max_attempts: usize,
        expected_rows: usize,
        expected_columns: usize,
    },
    AttemptStarted {
        attempt: usize,
        max_attempts: usize,
        prompt_chars: usize,
    },
    GenerationCompleted {
        attempt: usize,
        code_chars: usize,
        duration_secs: f64,
    },
    CandidatePersisted {
        attempt: usize,
        path: PathBuf,
    },
    ExecutionCompleted {
        attempt: usize,
        outcome: String,
        duration_secs: f64,
    },
    VerdictReached {
        attempt: usize,
        passed: bool,
        /// Diagnostic kind, absent on success
        kind: Option<String>,
        detail: String,
    },
    TaskCompleted {
        attempts: usize,
        candidate_path: PathBuf,
        duration_secs: f64,
    },
    AttemptsExhausted {
        attempts: usize,
    },
    ErrorEncountered {
        attempt: usize,
        error: String,
    },
}

impl LogEvent {
    /// Add a timestamp to serialize with the event
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors and visual structure
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Logger for loop events - handles both console output and file logging
pub struct Logger {
    format: LogFormat,
    file_writer: Option<Mutex<File>>,
    quiet: bool,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            file_writer: None,
            quiet: false,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            file_writer: Some(Mutex::new(file)),
            quiet: false,
        })
    }

    /// Suppress console output; file output is unaffected
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn log(&self, event: &LogEvent) {
        // File output is always JSON
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let json = event.with_timestamp();
                let _ = writeln!(file, "{}", json);
            }
        }

        if self.quiet {
            return;
        }

        match self.format {
            LogFormat::Json => self.log_json(event),
            LogFormat::Pretty => self.log_pretty(event),
            LogFormat::Compact => self.log_compact(event),
        }
    }

    fn log_json(&self, event: &LogEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{}", json);
        }
    }

    fn log_pretty(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        match event {
            LogEvent::TaskStarted {
                task_id,
                input,
                reference,
                max_attempts,
                expected_rows,
                expected_columns,
            } => {
                let rule = "─".repeat(BOX_WIDTH);
                let _ = writeln!(stderr);
                let _ = writeln!(stderr, "{}", format!("╭{}╮", rule).bright_blue());
                let _ = writeln!(
                    stderr,
                    "{}  {}{}",
                    "│".bright_blue(),
                    "tableloop".bold().bright_white(),
                    " ".repeat(BOX_WIDTH - 11) + &"│".bright_blue().to_string()
                );
                let rows = [
                    ("Task:", task_id.clone()),
                    ("Input:", input.display().to_string()),
                    ("Reference:", reference.display().to_string()),
                    (
                        "Expect:",
                        format!(
                            "{} rows x {} columns, up to {} attempts",
                            expected_rows, expected_columns, max_attempts
                        ),
                    ),
                ];
                for (label, value) in rows {
                    let width = BOX_WIDTH - label.len() - 3;
                    let _ = writeln!(
                        stderr,
                        "{}  {} {}{}",
                        "│".bright_blue(),
                        label.dimmed(),
                        Self::truncate_with_padding(&value, width).dimmed(),
                        "│".bright_blue()
                    );
                }
                let _ = writeln!(stderr, "{}", format!("╰{}╯", rule).bright_blue());
                let _ = writeln!(stderr);
            }
            LogEvent::AttemptStarted {
                attempt,
                max_attempts,
                ..
            } => {
                let header = format!("─ Attempt {}/{} ", attempt, max_attempts);
                let padding = "─".repeat(BOX_WIDTH.saturating_sub(header.chars().count()));
                let _ = writeln!(
                    stderr,
                    "{}{}{}",
                    "┌".bright_blue(),
                    header.bright_blue().bold(),
                    padding.bright_blue()
                );
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "▶".bright_cyan(),
                    "GENERATE".bright_cyan().bold()
                );
            }
            LogEvent::GenerationCompleted {
                code_chars,
                duration_secs,
                ..
            } => {
                let _ = writeln!(
                    stderr,
                    "    {} {} characters of code ({:.1}s)",
                    "✓".bright_green(),
                    code_chars,
                    duration_secs
                );
            }
            LogEvent::CandidatePersisted { path, .. } => {
                let _ = writeln!(
                    stderr,
                    "    {} {}",
                    "📄".dimmed(),
                    format!("Saved to {}", path.display()).dimmed()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::ExecutionCompleted {
                outcome,
                duration_secs,
                ..
            } => {
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "▶".bright_magenta(),
                    "EXECUTE".bright_magenta().bold()
                );
                let mark = if outcome == "table" {
                    "✓".bright_green()
                } else {
                    "✗".bright_red()
                };
                let _ = writeln!(stderr, "    {} {} ({:.1}s)", mark, outcome, duration_secs);
                let _ = writeln!(stderr);
            }
            LogEvent::VerdictReached {
                passed,
                kind,
                detail,
                ..
            } => {
                if *passed {
                    let _ = writeln!(stderr, "    {}", "✓ Verdict: MATCH".bright_green());
                } else {
                    let kind = kind.as_deref().unwrap_or("MISMATCH");
                    let _ = writeln!(
                        stderr,
                        "    {}",
                        format!("→ Verdict: {}", kind).bright_yellow()
                    );
                    for line in detail.lines().take(12) {
                        let _ = writeln!(stderr, "    {} {}", "│".dimmed(), line.dimmed());
                    }
                }
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{}",
                    format!("└{}┘", "─".repeat(BOX_WIDTH)).bright_blue()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::TaskCompleted { .. } => {
                // Printed by the binary together with the outcome
            }
            LogEvent::AttemptsExhausted { attempts } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} Attempt budget exhausted ({})",
                    "⚠".bright_yellow(),
                    attempts
                );
            }
            LogEvent::ErrorEncountered { attempt, error } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} Error in attempt {}: {}",
                    "✗".bright_red(),
                    attempt,
                    error.bright_red()
                );
            }
        }
    }

    fn log_compact(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        let timestamp = chrono::Utc::now().format("%H:%M:%S");
        let msg = match event {
            LogEvent::TaskStarted { task_id, .. } => {
                format!("[{}] task:start {}", timestamp, task_id)
            }
            LogEvent::AttemptStarted {
                attempt,
                max_attempts,
                ..
            } => format!("[{}] attempt:start:{}/{}", timestamp, attempt, max_attempts),
            LogEvent::GenerationCompleted {
                attempt,
                code_chars,
                duration_secs,
            } => format!(
                "[{}] generate:done:{} chars={} {:.1}s",
                timestamp, attempt, code_chars, duration_secs
            ),
            LogEvent::CandidatePersisted { attempt, path } => {
                format!("[{}] saved:{} {}", timestamp, attempt, path.display())
            }
            LogEvent::ExecutionCompleted {
                attempt,
                outcome,
                duration_secs,
            } => format!(
                "[{}] execute:done:{} {} {:.1}s",
                timestamp, attempt, outcome, duration_secs
            ),
            LogEvent::VerdictReached {
                attempt,
                passed,
                kind,
                ..
            } => {
                let verdict = if *passed {
                    "MATCH"
                } else {
                    kind.as_deref().unwrap_or("MISMATCH")
                };
                format!("[{}] verdict:{} {}", timestamp, attempt, verdict)
            }
            LogEvent::TaskCompleted {
                attempts,
                duration_secs,
                ..
            } => format!(
                "[{}] task:done:{} {:.1}s",
                timestamp, attempts, duration_secs
            ),
            LogEvent::AttemptsExhausted { attempts } => {
                format!("[{}] task:exhausted:{}", timestamp, attempts)
            }
            LogEvent::ErrorEncountered { attempt, error } => {
                format!("[{}] error:{}:{}", timestamp, attempt, error)
            }
        };
        let _ = writeln!(stderr, "{}", msg);
    }

    /// Truncate a string and pad it to exactly `width` characters
    fn truncate_with_padding(s: &str, width: usize) -> String {
        let count = s.chars().count();
        if count > width {
            let kept: String = s.chars().take(width.saturating_sub(3)).collect();
            format!("{}...", kept)
        } else {
            format!("{}{}", s, " ".repeat(width - count))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_event_is_tagged() {
        let event = LogEvent::VerdictReached {
            attempt: 2,
            passed: false,
            kind: Some("SHAPE MISMATCH".into()),
            detail: "Shape mismatch!".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "verdict_reached");
        assert_eq!(value["attempt"], 2);
        assert_eq!(value["kind"], "SHAPE MISMATCH");
    }

    #[test]
    fn test_truncate_with_padding() {
        assert_eq!(Logger::truncate_with_padding("abc", 6), "abc   ");
        assert_eq!(Logger::truncate_with_padding("abcdefgh", 6), "abc...");
        assert_eq!(Logger::truncate_with_padding("ĂĂĂĂĂĂĂĂ", 6).chars().count(), 6);
    }

    #[test]
    fn test_file_output_is_timestamped_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.jsonl");
        let logger = Logger::with_file(LogFormat::Compact, &path).unwrap().quiet();

        logger.log(&LogEvent::AttemptsExhausted { attempts: 3 });
        logger.log(&LogEvent::ErrorEncountered {
            attempt: 1,
            error: "backend returned 503".into(),
        });

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "attempts_exhausted");
        assert!(lines[1]["timestamp"].is_string());
    }
}
