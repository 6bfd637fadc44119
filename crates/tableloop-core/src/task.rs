use std::path::{Path, PathBuf};

use crate::LoopError;

/// One synthesis job: an input artifact, its reference output and an
/// attempt budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    id: String,
    input: PathBuf,
    reference: PathBuf,
    max_attempts: usize,
}

impl TaskSpec {
    pub fn new(
        id: impl Into<String>,
        input: impl Into<PathBuf>,
        reference: impl Into<PathBuf>,
        max_attempts: usize,
    ) -> Result<Self, LoopError> {
        let id = id.into();
        validate_id(&id)?;
        if max_attempts == 0 {
            return Err(LoopError::InvalidTask(
                "max attempts must be at least 1".into(),
            ));
        }
        Ok(Self {
            id,
            input: input.into(),
            reference: reference.into(),
            max_attempts,
        })
    }

    /// The conventional layout: `<data_dir>/<id>/<id>_sample.pdf` and
    /// `<data_dir>/<id>/<id>_sample.csv`
    pub fn from_data_dir(
        data_dir: &Path,
        id: impl Into<String>,
        max_attempts: usize,
    ) -> Result<Self, LoopError> {
        let id = id.into();
        validate_id(&id)?;
        let dir = data_dir.join(&id);
        let input = dir.join(format!("{}_sample.pdf", id));
        let reference = dir.join(format!("{}_sample.csv", id));
        Self::new(id, input, reference, max_attempts)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn reference(&self) -> &Path {
        &self.reference
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Fail with `MissingInput` unless both files exist
    pub fn check_inputs(&self) -> Result<(), LoopError> {
        if !self.input.is_file() {
            return Err(LoopError::MissingInput {
                what: "Input artifact",
                path: self.input.clone(),
            });
        }
        if !self.reference.is_file() {
            return Err(LoopError::MissingInput {
                what: "Reference output",
                path: self.reference.clone(),
            });
        }
        Ok(())
    }
}

// Ids end up in file names
fn validate_id(id: &str) -> Result<(), LoopError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(LoopError::InvalidTask(format!(
            "task id '{}' may only contain letters, digits, '_' and '-'",
            id
        )))
    }
}
