use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where candidates are written before they are executed.
///
/// One location per task: each attempt overwrites the previous one.
pub trait CandidateStore: Send + Sync {
    fn persist(&self, task_id: &str, code: &str) -> io::Result<PathBuf>;

    /// Location a task's candidate is (or would be) stored at
    fn location(&self, task_id: &str) -> PathBuf;
}

/// Stores candidates as `<output_dir>/<task_id>_parser.py`
#[derive(Debug, Clone)]
pub struct FsCandidateStore {
    output_dir: PathBuf,
}

impl FsCandidateStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl CandidateStore for FsCandidateStore {
    fn persist(&self, task_id: &str, code: &str) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.location(task_id);
        let mut contents = code.to_string();
        if !contents.ends_with('\n') {
            contents.push('\n');
        }
        std::fs::write(&path, contents)?;
        debug!(path = %path.display(), bytes = code.len(), "Candidate persisted");
        Ok(path)
    }

    fn location(&self, task_id: &str) -> PathBuf {
        self.output_dir.join(format!("{}_parser.py", task_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_creates_dir_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsCandidateStore::new(dir.path().join("custom_parser"));

        let first = store.persist("icici", "x = 1").unwrap();
        assert_eq!(first, dir.path().join("custom_parser").join("icici_parser.py"));
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "x = 1\n");

        let second = store.persist("icici", "x = 2\n").unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "x = 2\n");
        assert_eq!(std::fs::read_dir(store.output_dir()).unwrap().count(), 1);
    }

    #[test]
    fn test_tasks_get_separate_locations() {
        let store = FsCandidateStore::new("custom_parser");
        assert_ne!(store.location("icici"), store.location("sbi"));
    }
}
