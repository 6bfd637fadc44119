mod config;

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::warn;

use config::{Overrides, ProjectConfig, Settings};
use tableloop_agent::{create_generator, BackendType, GeneratorConfig};
use tableloop_core::{FsCandidateStore, LoopOutcome, LoopRunner, PromptBuilder, TaskSpec};
use tableloop_executor::{PdfPlumberProbe, PythonExecutor};
use tableloop_logging::{init_tracing, LogFormat, Logger, TranscriptWriter};

#[derive(Parser, Debug)]
#[command(
    name = "tableloop",
    about = "Synthesizes table-extraction parsers by generating, running and checking candidates",
    version,
    author
)]
struct Cli {
    /// Task identifier; inputs are read from <data-dir>/<target>/<target>_sample.{pdf,csv}
    #[arg(long)]
    target: String,

    /// Maximum generate/test attempts (default: 3)
    #[arg(long)]
    max_attempts: Option<usize>,

    /// Directory holding the per-target inputs (default: data)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory generated parsers are written to (default: custom_parser)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Generation backend (default: gemini)
    #[arg(long, value_enum)]
    provider: Option<ProviderChoice>,

    /// Model to request from the backend
    #[arg(short, long)]
    model: Option<String>,

    /// Python interpreter used to run candidates (default: python3)
    #[arg(long)]
    python: Option<PathBuf>,

    /// Wall-clock limit for one candidate run, in seconds (default: 120)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Function every candidate must define (default: parse)
    #[arg(long)]
    entry_point: Option<String>,

    /// Log output format (default: pretty)
    #[arg(long, value_enum)]
    log_format: Option<LogFormatChoice>,

    /// Also write events as JSON lines to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Output final result as JSON
    #[arg(long)]
    json_output: bool,

    /// Dry run: show what would happen without executing
    #[arg(long)]
    dry_run: bool,

    /// Working directory (default: current directory)
    #[arg(short = 'd', long)]
    working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderChoice {
    Gemini,
    Anthropic,
    Command,
}

impl From<ProviderChoice> for BackendType {
    fn from(choice: ProviderChoice) -> Self {
        match choice {
            ProviderChoice::Gemini => BackendType::Gemini,
            ProviderChoice::Anthropic => BackendType::Anthropic,
            ProviderChoice::Command => BackendType::Command,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            max_attempts: self.max_attempts,
            data_dir: self.data_dir.clone(),
            output_dir: self.output_dir.clone(),
            provider: self.provider.map(Into::into),
            model: self.model.clone(),
            python: self.python.clone(),
            timeout_secs: self.timeout_secs,
            entry_point: self.entry_point.clone(),
            log_format: self.log_format.map(Into::into),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let working_dir = match cli.working_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    // API keys may live in a .env next to the data
    let _ = dotenvy::from_path(working_dir.join(".env"));

    let file_config = ProjectConfig::load(&working_dir)?.unwrap_or_default();
    let settings = Settings::resolve(&working_dir, cli.overrides(), file_config)?;

    init_tracing("warn", settings.log_format);

    let task = TaskSpec::from_data_dir(&settings.data_dir, cli.target.as_str(), settings.max_attempts)?;

    let mut generator_config = GeneratorConfig::new(settings.provider);
    if let Some(ref model) = settings.model {
        generator_config = generator_config.with_model(model.clone());
    }
    if let Some(key) = settings
        .provider
        .api_key_env()
        .and_then(|var| std::env::var(var).ok())
    {
        generator_config = generator_config.with_api_key(key);
    }
    if let Some(ref binary) = settings.command {
        generator_config =
            generator_config.with_command(binary.clone(), settings.command_args.clone());
    }

    if cli.dry_run {
        println!("=== Dry Run ===");
        println!("Target: {}", task.id());
        println!("Input: {}", task.input().display());
        println!("Reference: {}", task.reference().display());
        println!("Output dir: {}", settings.output_dir.display());
        println!("Max attempts: {}", task.max_attempts());
        println!("Provider: {}", settings.provider);
        match generator_config.effective_model() {
            Some(model) => println!("Model: {}", model),
            None => println!("Model: backend default"),
        }
        println!("Python: {}", settings.python.display());
        println!("Timeout: {}s", settings.timeout.as_secs());
        println!("Entry point: {}", settings.entry_point);
        return Ok(());
    }

    let logger = match cli.log_file {
        Some(ref path) => Logger::with_file(settings.log_format, path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?,
        None => Logger::new(settings.log_format),
    };
    let logger = Arc::new(logger);

    let generator = create_generator(generator_config).context("Failed to set up generator")?;
    if !generator.is_available().await {
        anyhow::bail!(
            "Generator '{}' is not available. Make sure it's installed and in PATH.",
            generator.name()
        );
    }

    let executor = PythonExecutor::new()
        .with_interpreter(settings.python.clone())
        .with_entry_point(settings.entry_point.clone())
        .with_timeout(settings.timeout);
    let probe = PdfPlumberProbe::new(settings.python.clone());
    let store = FsCandidateStore::new(settings.output_dir.clone());

    let mut runner = LoopRunner::new(generator.as_ref(), &executor, &probe, &store, logger)
        .with_prompt_builder(PromptBuilder::new(settings.entry_point.clone()));
    match TranscriptWriter::new(task.id()) {
        Ok(transcript) => runner = runner.with_transcript(Arc::new(transcript)),
        Err(e) => warn!(error = %e, "Transcript disabled"),
    }

    // Handle Ctrl+C gracefully
    let interrupt_handle = runner.interrupt_handle();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Finishing current attempt...");
        interrupt_handle.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let outcome = runner.run(&task).await?;

    if cli.json_output {
        let json = serde_json::to_string_pretty(&outcome)?;
        println!("{}", json);
    } else {
        print_outcome(&outcome);
    }

    std::process::exit(outcome.exit_code());
}

fn print_outcome(outcome: &LoopOutcome) {
    match outcome {
        LoopOutcome::Success {
            attempts,
            candidate_path,
            total_duration_secs,
            ..
        } => {
            eprintln!();
            eprintln!("=== SUCCESS ===");
            eprintln!("Matched the reference on attempt {}", attempts);
            eprintln!("Parser: {}", candidate_path.display());
            eprintln!("Duration: {:.1}s", total_duration_secs);
        }
        LoopOutcome::Exhausted {
            attempts,
            last_diagnostic,
            total_duration_secs,
            ..
        } => {
            eprintln!();
            eprintln!("=== EXHAUSTED ===");
            eprintln!("No candidate matched after {} attempt(s)", attempts);
            if let Some(diagnostic) = last_diagnostic {
                eprintln!("Last failure: {}", diagnostic.short_description());
            }
            eprintln!("Duration: {:.1}s", total_duration_secs);
        }
        LoopOutcome::UserInterrupted {
            attempts,
            total_duration_secs,
            ..
        } => {
            eprintln!();
            eprintln!("=== INTERRUPTED ===");
            eprintln!("User stopped after {} attempt(s)", attempts);
            eprintln!("Duration: {:.1}s", total_duration_secs);
        }
        LoopOutcome::Failed {
            attempts,
            error,
            total_duration_secs,
            ..
        } => {
            eprintln!();
            eprintln!("=== FAILED ===");
            eprintln!("Error in attempt {}: {}", attempts, error);
            eprintln!("Duration: {:.1}s", total_duration_secs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_is_required() {
        assert!(Cli::try_parse_from(["tableloop"]).is_err());
    }

    #[test]
    fn test_flags_map_to_overrides() {
        let cli = Cli::try_parse_from([
            "tableloop",
            "--target",
            "icici",
            "--max-attempts",
            "5",
            "--provider",
            "anthropic",
            "--log-format",
            "json",
            "--timeout-secs",
            "10",
        ])
        .unwrap();
        assert_eq!(cli.target, "icici");

        let overrides = cli.overrides();
        assert_eq!(overrides.max_attempts, Some(5));
        assert_eq!(overrides.provider, Some(BackendType::Anthropic));
        assert_eq!(overrides.log_format, Some(LogFormat::Json));
        assert_eq!(overrides.timeout_secs, Some(10));
        assert!(overrides.data_dir.is_none());
    }

    #[test]
    fn test_unset_flags_leave_room_for_file_values() {
        let cli = Cli::try_parse_from(["tableloop", "--target", "sbi"]).unwrap();
        let overrides = cli.overrides();
        assert!(overrides.max_attempts.is_none());
        assert!(overrides.provider.is_none());
        assert!(!cli.dry_run);
    }
}
