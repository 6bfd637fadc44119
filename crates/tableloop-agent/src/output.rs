use std::time::Duration;

/// What a finished child process left behind
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// -1 when the process was ended by a signal
    pub exit_code: i32,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn new(stdout: String, stderr: String, exit_code: i32, duration: Duration) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            duration,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// The last `max_lines` lines of stderr.
    ///
    /// Python tracebacks put the exception on the final line, so the tail is
    /// what matters when stderr is long.
    pub fn stderr_tail(&self, max_lines: usize) -> String {
        let lines: Vec<&str> = self.stderr.lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join("\n")
    }

    /// Last non-blank stderr line, if any
    pub fn last_error_line(&self) -> Option<&str> {
        self.stderr.lines().rev().find(|line| !line.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_stderr(stderr: &str) -> ProcessOutput {
        ProcessOutput::new(String::new(), stderr.to_string(), 1, Duration::ZERO)
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let out = with_stderr("Traceback:\n  File \"x.py\"\n    boom()\nValueError: bad");
        assert_eq!(out.stderr_tail(2), "    boom()\nValueError: bad");
        assert_eq!(out.stderr_tail(10), out.stderr);
        assert_eq!(with_stderr("").stderr_tail(5), "");
    }

    #[test]
    fn test_last_error_line_skips_blank_lines() {
        assert_eq!(
            with_stderr("warning\nModuleNotFoundError: pdfplumber\n\n").last_error_line(),
            Some("ModuleNotFoundError: pdfplumber")
        );
        assert_eq!(with_stderr("  \n").last_error_line(), None);
        assert!(!with_stderr("").success());
    }
}
