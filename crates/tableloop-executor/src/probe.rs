use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use tableloop_agent::{ProcessConfig, ProcessSpawner};

const SAMPLE_CHARS: usize = 500;
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

const PDFPLUMBER_PROBE: &str = r#"import json
import sys

import pdfplumber

with pdfplumber.open(sys.argv[1]) as pdf:
    page = pdf.pages[0]
    tables = page.extract_tables()
    print(json.dumps({
        "page_count": len(pdf.pages),
        "text_sample": (page.extract_text() or "")[:int(sys.argv[2])],
        "table_count": len(tables),
        "first_table_rows": len(tables[0]) if tables else None,
    }))
"#;

/// Structural summary of an input artifact, shown to the generator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPreview {
    pub page_count: Option<usize>,
    pub text_sample: Option<String>,
    pub table_count: Option<usize>,
    pub first_table_rows: Option<usize>,
    pub size_bytes: Option<u64>,
    /// Set when the artifact could not be analyzed
    pub unavailable: Option<String>,
}

impl ArtifactPreview {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            unavailable: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }
}

impl fmt::Display for ArtifactPreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref reason) = self.unavailable {
            return write!(f, "Could not analyze input: {}", reason);
        }
        if let Some(pages) = self.page_count {
            writeln!(f, "Input has {} page(s)", pages)?;
        }
        if let Some(size) = self.size_bytes {
            writeln!(f, "Input size: {} bytes", size)?;
        }
        if let Some(ref sample) = self.text_sample {
            writeln!(f, "First page text sample:\n{}", sample)?;
        }
        if let Some(tables) = self.table_count {
            writeln!(f, "Number of tables detected: {}", tables)?;
        }
        if let Some(rows) = self.first_table_rows {
            write!(f, "First table has {} rows", rows)?;
        }
        Ok(())
    }
}

/// Cheap, non-fatal inspection of the input artifact
#[async_trait]
pub trait ArtifactProbe: Send + Sync {
    /// Never fails: problems come back as an unavailable preview
    async fn probe(&self, input: &Path) -> ArtifactPreview;
}

/// Probes PDFs with pdfplumber in a short-lived interpreter
#[derive(Debug, Clone)]
pub struct PdfPlumberProbe {
    interpreter: PathBuf,
    timeout: Duration,
}

impl Default for PdfPlumberProbe {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python3"),
            timeout: PROBE_TIMEOUT,
        }
    }
}

impl PdfPlumberProbe {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ArtifactProbe for PdfPlumberProbe {
    async fn probe(&self, input: &Path) -> ArtifactPreview {
        if !input.exists() {
            return ArtifactPreview::unavailable(format!("{} does not exist", input.display()));
        }

        let input_arg = input.to_string_lossy();
        let limit = SAMPLE_CHARS.to_string();
        let args = ["-c", PDFPLUMBER_PROBE, input_arg.as_ref(), limit.as_str()];
        let config = ProcessConfig::default().with_timeout(self.timeout);

        let output = match ProcessSpawner::spawn(&self.interpreter, &args, &config).await {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "Input probe could not run");
                return ArtifactPreview::unavailable(e.to_string());
            }
        };
        if !output.success() {
            let reason = output
                .last_error_line()
                .unwrap_or("probe exited with an error")
                .to_string();
            debug!(exit_code = output.exit_code, %reason, "Input probe failed");
            return ArtifactPreview::unavailable(reason);
        }

        match serde_json::from_str::<ArtifactPreview>(output.stdout.trim()) {
            Ok(mut preview) => {
                preview.size_bytes = std::fs::metadata(input).ok().map(|m| m.len());
                preview
            }
            Err(e) => ArtifactPreview::unavailable(format!("unreadable probe output: {}", e)),
        }
    }
}

/// Interpreter-free probe: byte size and a lossy text sample
#[derive(Debug, Clone, Copy, Default)]
pub struct RawProbe;

#[async_trait]
impl ArtifactProbe for RawProbe {
    async fn probe(&self, input: &Path) -> ArtifactPreview {
        match tokio::fs::read(input).await {
            Ok(bytes) => {
                let end = bytes.len().min(SAMPLE_CHARS);
                ArtifactPreview {
                    size_bytes: Some(bytes.len() as u64),
                    text_sample: Some(String::from_utf8_lossy(&bytes[..end]).into_owned()),
                    ..Default::default()
                }
            }
            Err(e) => ArtifactPreview::unavailable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_layout() {
        let preview = ArtifactPreview {
            page_count: Some(2),
            text_sample: Some("ChatGPT Powered Karbon Bannk".into()),
            table_count: Some(1),
            first_table_rows: Some(36),
            ..Default::default()
        };
        assert_eq!(
            preview.to_string(),
            "Input has 2 page(s)\nFirst page text sample:\nChatGPT Powered Karbon Bannk\n\
             Number of tables detected: 1\nFirst table has 36 rows"
        );
    }

    #[test]
    fn test_unavailable_display() {
        let preview = ArtifactPreview::unavailable("No module named 'pdfplumber'");
        assert!(!preview.is_available());
        assert_eq!(
            preview.to_string(),
            "Could not analyze input: No module named 'pdfplumber'"
        );
    }

    #[tokio::test]
    async fn test_raw_probe_samples_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.pdf");
        let body = "x".repeat(800);
        std::fs::write(&path, &body).unwrap();

        let preview = RawProbe.probe(&path).await;
        assert_eq!(preview.size_bytes, Some(800));
        assert_eq!(preview.text_sample.as_deref().map(str::len), Some(500));
    }

    #[tokio::test]
    async fn test_probes_degrade_on_missing_input() {
        let missing = Path::new("/nonexistent/sample.pdf");
        assert!(!RawProbe.probe(missing).await.is_available());
        assert!(!PdfPlumberProbe::default().probe(missing).await.is_available());
    }

    #[tokio::test]
    async fn test_missing_interpreter_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        let probe = PdfPlumberProbe::new("/nonexistent/python");
        let preview = probe.probe(&path).await;
        assert!(preview.unavailable.is_some());
    }
}
