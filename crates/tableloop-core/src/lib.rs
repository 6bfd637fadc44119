mod context;
mod error;
mod loop_runner;
mod outcome;
mod prompt;
mod store;
mod task;

pub use context::{AttemptRecord, Candidate, LoopState, Phase};
pub use error::LoopError;
pub use loop_runner::LoopRunner;
pub use outcome::LoopOutcome;
pub use prompt::{Feedback, PromptBuilder};
pub use store::{CandidateStore, FsCandidateStore};
pub use task::TaskSpec;
