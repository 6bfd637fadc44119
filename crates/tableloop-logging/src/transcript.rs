use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Each line type in a transcript file
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptLine {
    RunStart {
        timestamp: DateTime<Utc>,
        task_id: String,
        input: PathBuf,
        reference: PathBuf,
        generator: String,
        model: Option<String>,
        max_attempts: usize,
    },
    /// One attempt; the record's own fields are inlined
    Attempt {
        #[serde(flatten)]
        record: serde_json::Value,
    },
    RunEnd {
        outcome: String,
        attempts: usize,
        duration_secs: f64,
        timestamp: DateTime<Utc>,
    },
}

/// Writes one run's transcript as JSONL under
/// `<data_dir>/tableloop/transcripts/`.
pub struct TranscriptWriter {
    file: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl TranscriptWriter {
    /// Create a transcript in the platform data directory
    pub fn new(task_id: &str) -> io::Result<Self> {
        Self::in_dir(&Self::transcripts_dir()?, task_id)
    }

    /// Create a transcript in `dir`, named from the current UTC time and a
    /// short hash of the task id
    pub fn in_dir(dir: &Path, task_id: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;

        let now = Utc::now();
        let timestamp_str = now.format("%Y-%m-%dT%H-%M-%SZ").to_string();

        let mut hasher = Sha256::new();
        hasher.update(task_id.as_bytes());
        hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        let hash = hex::encode(hasher.finalize());

        let path = dir.join(format!("{}_{}.jsonl", timestamp_str, &hash[..6]));
        let file = File::create(&path)?;

        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_start(
        &self,
        task_id: &str,
        input: &Path,
        reference: &Path,
        generator: &str,
        model: Option<&str>,
        max_attempts: usize,
    ) {
        self.write_line(&TranscriptLine::RunStart {
            timestamp: Utc::now(),
            task_id: task_id.to_string(),
            input: input.to_path_buf(),
            reference: reference.to_path_buf(),
            generator: generator.to_string(),
            model: model.map(String::from),
            max_attempts,
        });
    }

    /// Write an attempt line. Takes any serializable record so this crate
    /// stays independent of the loop's record type.
    pub fn write_attempt<T: Serialize>(&self, record: &T) {
        match serde_json::to_value(record) {
            Ok(record) => self.write_line(&TranscriptLine::Attempt { record }),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize attempt record"),
        }
    }

    pub fn write_end(&self, outcome: &str, attempts: usize, duration_secs: f64) {
        self.write_line(&TranscriptLine::RunEnd {
            outcome: outcome.to_string(),
            attempts,
            duration_secs,
            timestamp: Utc::now(),
        });
    }

    fn write_line(&self, line: &TranscriptLine) {
        if let Ok(json) = serde_json::to_string(line) {
            if let Ok(mut writer) = self.file.lock() {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
    }

    fn transcripts_dir() -> io::Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine data directory",
            )
        })?;
        Ok(data_dir.join("tableloop").join("transcripts"))
    }
}
