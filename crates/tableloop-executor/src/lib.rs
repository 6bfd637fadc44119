//! # tableloop-executor
//!
//! Runs generated candidates against a real input artifact.
//!
//! Candidates are untrusted: they may fail to import, omit the entry point,
//! raise, hang, or return the wrong thing. Each execution happens in a
//! separate interpreter process inside a fresh temporary directory, and
//! every one of those outcomes comes back as data in [`ExecutionResult`]
//! rather than as an error. [`ExecutorError`] is reserved for problems with
//! the executor itself, such as a missing interpreter.
//!
//! ## Key Types
//!
//! - [`CandidateExecutor`] - Execution abstraction
//! - [`PythonExecutor`] - Subprocess executor for Python candidates
//! - [`ArtifactProbe`] - Cheap structural preview of the input artifact

mod harness;
mod probe;
mod python;
mod result;

pub use probe::{ArtifactPreview, ArtifactProbe, PdfPlumberProbe, RawProbe};
pub use python::{CandidateExecutor, PythonExecutor};
pub use result::{ExecutionFailure, ExecutionResult, ExecutorError};
