use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::{
    GenerationError, GenerationRequest, Generator, GeneratorConfig, ProcessConfig, ProcessSpawner,
};

const STDERR_TAIL_LINES: usize = 20;

/// Generator backed by an external CLI such as `claude --print`.
///
/// The prompt is passed as the final positional argument and stdout is the
/// reply.
pub struct CommandGenerator {
    binary_path: PathBuf,
    args: Vec<String>,
    model: Option<String>,
    process: ProcessConfig,
}

impl CommandGenerator {
    pub fn new(binary_path: PathBuf, args: Vec<String>) -> Self {
        Self {
            binary_path,
            args,
            model: None,
            process: ProcessConfig::default(),
        }
    }

    pub fn from_config(config: GeneratorConfig) -> Self {
        let (binary_path, args) = match config.command {
            Some(path) => (path, config.command_args),
            None => (PathBuf::from("claude"), vec!["--print".to_string()]),
        };
        let mut process = ProcessConfig::default();
        process.timeout = config.timeout;
        Self {
            binary_path,
            args,
            model: config.model,
            process,
        }
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

#[async_trait]
impl Generator for CommandGenerator {
    fn name(&self) -> &str {
        "command"
    }

    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.binary_path)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        debug!(
            binary = %self.binary_path.display(),
            prompt_len = request.prompt.len(),
            attempt = request.attempt,
            "Running generator command"
        );

        let mut args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        if let Some(ref model) = self.model {
            args.push("--model");
            args.push(model);
        }
        // Keep prompts starting with '-' from being read as options
        args.push("--");
        args.push(&request.prompt);

        let output = ProcessSpawner::spawn(&self.binary_path, &args, &self.process).await?;
        if !output.success() {
            return Err(GenerationError::ProcessExited {
                code: output.exit_code,
                stderr: output.stderr_tail(STDERR_TAIL_LINES),
            });
        }
        if output.stdout.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(output.stdout)
    }
}
