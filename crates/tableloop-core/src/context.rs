use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tableloop_oracle::{Diagnostic, DiagnosticKind};

use crate::prompt::Feedback;

/// Where the loop is in its state machine.
///
/// `Idle -> Generating -> Testing -> {Success, Retrying -> Generating, Exhausted}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Generating,
    Testing,
    Retrying,
    Success,
    Exhausted,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Success | Phase::Exhausted)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Generating => "generating",
            Phase::Testing => "testing",
            Phase::Retrying => "retrying",
            Phase::Success => "success",
            Phase::Exhausted => "exhausted",
        };
        f.write_str(name)
    }
}

/// One generated payload and where it was persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub attempt: usize,
    pub code: String,
    pub path: PathBuf,
}

/// Record of a single attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: usize,
    pub code_chars: usize,
    pub candidate_path: PathBuf,
    /// Execution outcome label ("table", "runtime failure", ...)
    pub execution: String,
    pub passed: bool,
    pub diagnostic_kind: Option<DiagnosticKind>,
    pub diagnostic: Option<Diagnostic>,
    /// The exact text fed back to the next attempt
    pub diagnostic_text: Option<String>,
    pub generation_secs: f64,
    pub execution_secs: f64,
    pub timestamp: DateTime<Utc>,
}

/// Mutable state of one loop run
#[derive(Debug, Clone)]
pub struct LoopState {
    /// Attempts started so far (1-based number of the current attempt)
    attempt: usize,
    max_attempts: usize,
    phase: Phase,
    last_candidate: Option<Candidate>,
    last_diagnostic: Option<Diagnostic>,
    history: Vec<AttemptRecord>,
    started_at: Instant,
}

impl LoopState {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            phase: Phase::Idle,
            last_candidate: None,
            last_diagnostic: None,
            history: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn attempt(&self) -> usize {
        self.attempt
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_candidate(&self) -> Option<&Candidate> {
        self.last_candidate.as_ref()
    }

    pub fn last_diagnostic(&self) -> Option<&Diagnostic> {
        self.last_diagnostic.as_ref()
    }

    pub fn history(&self) -> &[AttemptRecord] {
        &self.history
    }

    pub fn into_history(self) -> Vec<AttemptRecord> {
        self.history
    }

    pub fn total_duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn can_start_attempt(&self) -> bool {
        matches!(self.phase, Phase::Idle | Phase::Retrying) && self.attempt < self.max_attempts
    }

    /// Enter `Generating` and return the new attempt number
    pub fn begin_attempt(&mut self) -> usize {
        debug_assert!(self.can_start_attempt(), "attempt started from {}", self.phase);
        self.attempt += 1;
        self.phase = Phase::Generating;
        self.attempt
    }

    /// The candidate is persisted and about to run
    pub fn begin_testing(&mut self) {
        debug_assert_eq!(self.phase, Phase::Generating);
        self.phase = Phase::Testing;
    }

    pub fn record_success(&mut self, candidate: Candidate) {
        debug_assert_eq!(self.phase, Phase::Testing);
        self.last_candidate = Some(candidate);
        self.last_diagnostic = None;
        self.phase = Phase::Success;
    }

    /// Carry the failed candidate and its diagnostic forward. Moves to
    /// `Exhausted` when this was the last allowed attempt.
    pub fn record_failure(&mut self, candidate: Candidate, diagnostic: Diagnostic) {
        debug_assert_eq!(self.phase, Phase::Testing);
        self.last_candidate = Some(candidate);
        self.last_diagnostic = Some(diagnostic);
        self.phase = if self.attempt >= self.max_attempts {
            Phase::Exhausted
        } else {
            Phase::Retrying
        };
    }

    pub fn push_record(&mut self, record: AttemptRecord) {
        self.history.push(record);
    }

    /// Prior code and diagnostic for the next prompt, once an attempt failed
    pub fn feedback(&self) -> Option<Feedback<'_>> {
        match (&self.last_candidate, &self.last_diagnostic) {
            (Some(candidate), Some(diagnostic)) => Some(Feedback {
                attempt: candidate.attempt,
                code: &candidate.code,
                diagnostic,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(attempt: usize) -> Candidate {
        Candidate {
            attempt,
            code: format!("# attempt {}", attempt),
            path: PathBuf::from("custom_parser/icici_parser.py"),
        }
    }

    fn shape_mismatch() -> Diagnostic {
        Diagnostic::ShapeMismatch {
            expected: (50, 3),
            actual: (60, 3),
        }
    }

    #[test]
    fn test_failure_then_success() {
        let mut state = LoopState::new(3);
        assert_eq!(state.phase(), Phase::Idle);
        assert!(state.feedback().is_none());

        assert_eq!(state.begin_attempt(), 1);
        assert_eq!(state.phase(), Phase::Generating);
        state.begin_testing();
        state.record_failure(candidate(1), shape_mismatch());
        assert_eq!(state.phase(), Phase::Retrying);

        let feedback = state.feedback().unwrap();
        assert_eq!(feedback.attempt, 1);
        assert_eq!(feedback.code, "# attempt 1");
        assert_eq!(feedback.diagnostic, &shape_mismatch());

        assert_eq!(state.begin_attempt(), 2);
        state.begin_testing();
        state.record_success(candidate(2));
        assert_eq!(state.phase(), Phase::Success);
        assert!(state.phase().is_terminal());
        assert!(state.last_diagnostic().is_none());
        assert!(!state.can_start_attempt());
    }

    #[test]
    fn test_exhausted_exactly_on_last_failure() {
        let mut state = LoopState::new(2);
        for attempt in 1..=2 {
            assert!(state.can_start_attempt());
            state.begin_attempt();
            state.begin_testing();
            state.record_failure(candidate(attempt), shape_mismatch());
        }
        assert_eq!(state.phase(), Phase::Exhausted);
        assert_eq!(state.attempt(), 2);
        assert!(!state.can_start_attempt());
    }
}
