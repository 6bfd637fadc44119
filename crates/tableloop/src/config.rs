//! Project configuration file support for tableloop.
//!
//! Loads defaults from `tableloop.toml` in the working directory. Command-line
//! flags override file values, which override built-in defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tableloop_agent::BackendType;
use tableloop_logging::LogFormat;

/// The config file name
pub const CONFIG_FILE_NAME: &str = "tableloop.toml";

const DEFAULT_MAX_ATTEMPTS: usize = 3;
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_OUTPUT_DIR: &str = "custom_parser";
const DEFAULT_PYTHON: &str = "python3";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_ENTRY_POINT: &str = "parse";

/// Project-level configuration loaded from `tableloop.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    pub max_attempts: Option<usize>,
    pub data_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    /// Generation backend: gemini, anthropic or command
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Python interpreter used to run candidates
    pub python: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub entry_point: Option<String>,
    pub log_format: Option<String>,
    /// Settings for the command backend
    #[serde(default)]
    pub command: CommandConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct CommandConfig {
    pub binary: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ProjectConfig {
    /// Load configuration from the working directory.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists and parses successfully
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but fails to parse (hard error)
    pub fn load(working_dir: &Path) -> Result<Option<Self>> {
        let config_path = working_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(Some(config))
    }
}

/// Values given on the command line; `None` means "not given"
#[derive(Debug, Default)]
pub struct Overrides {
    pub max_attempts: Option<usize>,
    pub data_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub provider: Option<BackendType>,
    pub model: Option<String>,
    pub python: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub entry_point: Option<String>,
    pub log_format: Option<LogFormat>,
}

/// Fully resolved run settings
#[derive(Debug)]
pub struct Settings {
    pub max_attempts: usize,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub provider: BackendType,
    pub model: Option<String>,
    pub python: PathBuf,
    pub timeout: Duration,
    pub entry_point: String,
    pub log_format: LogFormat,
    pub command: Option<PathBuf>,
    pub command_args: Vec<String>,
}

impl Settings {
    /// Merge CLI values over file values over defaults. Relative directories
    /// are resolved against `working_dir`.
    pub fn resolve(working_dir: &Path, cli: Overrides, file: ProjectConfig) -> Result<Self> {
        let provider = match (cli.provider, file.provider) {
            (Some(provider), _) => provider,
            (None, Some(name)) => name
                .parse::<BackendType>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("Invalid provider in {}", CONFIG_FILE_NAME))?,
            (None, None) => BackendType::Gemini,
        };
        let log_format = match (cli.log_format, file.log_format) {
            (Some(format), _) => format,
            (None, Some(name)) => name
                .parse::<LogFormat>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("Invalid log_format in {}", CONFIG_FILE_NAME))?,
            (None, None) => LogFormat::default(),
        };

        let data_dir = cli
            .data_dir
            .or(file.data_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let output_dir = cli
            .output_dir
            .or(file.output_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

        Ok(Self {
            max_attempts: cli
                .max_attempts
                .or(file.max_attempts)
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            data_dir: working_dir.join(data_dir),
            output_dir: working_dir.join(output_dir),
            provider,
            model: cli.model.or(file.model),
            python: cli
                .python
                .or(file.python)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PYTHON)),
            timeout: Duration::from_secs(
                cli.timeout_secs
                    .or(file.timeout_secs)
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            entry_point: cli
                .entry_point
                .or(file.entry_point)
                .unwrap_or_else(|| DEFAULT_ENTRY_POINT.to_string()),
            log_format,
            command: file.command.binary,
            command_args: file.command.args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProjectConfig::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_parse_full_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
max_attempts = 5
provider = "command"
python = ".venv/bin/python"
timeout_secs = 30

[command]
binary = "claude"
args = ["--print"]
"#,
        )
        .unwrap();

        let config = ProjectConfig::load(dir.path()).unwrap().unwrap();
        assert_eq!(config.max_attempts, Some(5));
        assert_eq!(config.provider.as_deref(), Some("command"));
        assert_eq!(config.command.binary, Some(PathBuf::from("claude")));
        assert_eq!(config.command.args, vec!["--print".to_string()]);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "max_attempt = 5\n").unwrap();
        assert!(ProjectConfig::load(dir.path()).is_err());
    }

    #[test]
    fn test_defaults() {
        let settings =
            Settings::resolve(Path::new("/work"), Overrides::default(), ProjectConfig::default())
                .unwrap();
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.data_dir, PathBuf::from("/work/data"));
        assert_eq!(settings.output_dir, PathBuf::from("/work/custom_parser"));
        assert_eq!(settings.provider, BackendType::Gemini);
        assert_eq!(settings.python, PathBuf::from("python3"));
        assert_eq!(settings.timeout, Duration::from_secs(120));
        assert_eq!(settings.entry_point, "parse");
        assert_eq!(settings.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_cli_wins_over_file() {
        let file = ProjectConfig {
            max_attempts: Some(5),
            provider: Some("anthropic".into()),
            model: Some("file-model".into()),
            timeout_secs: Some(30),
            ..Default::default()
        };
        let cli = Overrides {
            max_attempts: Some(2),
            model: Some("cli-model".into()),
            ..Default::default()
        };
        let settings = Settings::resolve(Path::new("/work"), cli, file).unwrap();
        assert_eq!(settings.max_attempts, 2);
        assert_eq!(settings.model.as_deref(), Some("cli-model"));
        assert_eq!(settings.provider, BackendType::Anthropic);
        assert_eq!(settings.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_provider_in_file() {
        let file = ProjectConfig {
            provider: Some("openai".into()),
            ..Default::default()
        };
        assert!(Settings::resolve(Path::new("/work"), Overrides::default(), file).is_err());
    }

    #[test]
    fn test_absolute_dirs_are_kept() {
        let cli = Overrides {
            output_dir: Some(PathBuf::from("/tmp/parsers")),
            ..Default::default()
        };
        let settings =
            Settings::resolve(Path::new("/work"), cli, ProjectConfig::default()).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/parsers"));
    }
}
