use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use tableloop_oracle::Diagnostic;

use crate::AttemptRecord;

/// The final outcome of a synthesis loop
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoopOutcome {
    /// A candidate matched the reference exactly
    Success {
        attempts: usize,
        candidate_path: PathBuf,
        #[serde(skip)]
        history: Vec<AttemptRecord>,
        total_duration_secs: f64,
    },
    /// Every allowed attempt was rejected
    Exhausted {
        attempts: usize,
        last_diagnostic: Option<Diagnostic>,
        #[serde(skip)]
        history: Vec<AttemptRecord>,
        total_duration_secs: f64,
    },
    /// User requested stop (e.g., Ctrl+C)
    UserInterrupted {
        attempts: usize,
        #[serde(skip)]
        history: Vec<AttemptRecord>,
        total_duration_secs: f64,
    },
    /// Unrecoverable error, such as an unreachable generation backend
    Failed {
        attempts: usize,
        error: String,
        #[serde(skip)]
        history: Vec<AttemptRecord>,
        total_duration_secs: f64,
    },
}

impl LoopOutcome {
    pub fn success(
        attempts: usize,
        candidate_path: PathBuf,
        history: Vec<AttemptRecord>,
        duration: Duration,
    ) -> Self {
        Self::Success {
            attempts,
            candidate_path,
            history,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn exhausted(
        attempts: usize,
        last_diagnostic: Option<Diagnostic>,
        history: Vec<AttemptRecord>,
        duration: Duration,
    ) -> Self {
        Self::Exhausted {
            attempts,
            last_diagnostic,
            history,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn interrupted(attempts: usize, history: Vec<AttemptRecord>, duration: Duration) -> Self {
        Self::UserInterrupted {
            attempts,
            history,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn failed(
        attempts: usize,
        error: String,
        history: Vec<AttemptRecord>,
        duration: Duration,
    ) -> Self {
        Self::Failed {
            attempts,
            error,
            history,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn attempts(&self) -> usize {
        match self {
            Self::Success { attempts, .. } => *attempts,
            Self::Exhausted { attempts, .. } => *attempts,
            Self::UserInterrupted { attempts, .. } => *attempts,
            Self::Failed { attempts, .. } => *attempts,
        }
    }

    pub fn history(&self) -> &[AttemptRecord] {
        match self {
            Self::Success { history, .. } => history,
            Self::Exhausted { history, .. } => history,
            Self::UserInterrupted { history, .. } => history,
            Self::Failed { history, .. } => history,
        }
    }

    pub fn total_duration_secs(&self) -> f64 {
        match self {
            Self::Success {
                total_duration_secs,
                ..
            }
            | Self::Exhausted {
                total_duration_secs,
                ..
            }
            | Self::UserInterrupted {
                total_duration_secs,
                ..
            }
            | Self::Failed {
                total_duration_secs,
                ..
            } => *total_duration_secs,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short status name, as serialized
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Exhausted { .. } => "exhausted",
            Self::UserInterrupted { .. } => "user_interrupted",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success { .. } => 0,
            Self::Exhausted { .. } => 1,
            Self::UserInterrupted { .. } => 130,
            Self::Failed { .. } => 1,
        }
    }
}
