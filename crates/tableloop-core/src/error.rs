use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoopError {
    #[error("Generation error: {0}")]
    Generation(#[from] tableloop_agent::GenerationError),

    #[error("Executor error: {0}")]
    Executor(#[from] tableloop_executor::ExecutorError),

    #[error("Reference error: {0}")]
    Reference(#[from] tableloop_oracle::ReferenceError),

    #[error("Failed to persist candidate: {0}")]
    Persist(#[source] std::io::Error),

    #[error("{what} not found: {}", .path.display())]
    MissingInput { what: &'static str, path: PathBuf },

    #[error("Invalid task: {0}")]
    InvalidTask(String),
}
