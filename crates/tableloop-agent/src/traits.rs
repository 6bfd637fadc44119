use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::ProcessError;

/// Errors talking to a generation backend.
///
/// All of these are transport-level: the backend could not be reached or
/// did not answer with text. They abort the task rather than being retried.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generator process failed: {0}")]
    Process(#[from] ProcessError),

    #[error("Generator exited with code {code}: {stderr}")]
    ProcessExited { code: i32, stderr: String },

    #[error("Backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Backend returned HTTP {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("Backend response contained no text")]
    EmptyResponse,

    #[error("Generator configuration error: {0}")]
    ConfigError(String),
}

/// One request to the generative backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Full prompt text
    pub prompt: String,
    /// 1-based attempt this request belongs to
    pub attempt: usize,
}

/// Supported backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    Gemini,
    Anthropic,
    /// Any CLI that takes the prompt as its last argument and prints a reply
    Command,
}

impl BackendType {
    pub fn default_model(&self) -> Option<&'static str> {
        match self {
            BackendType::Gemini => Some("gemini-2.0-flash"),
            BackendType::Anthropic => Some("claude-3-5-sonnet-latest"),
            BackendType::Command => None,
        }
    }

    /// Environment variable holding the API key, if the backend needs one
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            BackendType::Gemini => Some("GEMINI_API_KEY"),
            BackendType::Anthropic => Some("ANTHROPIC_API_KEY"),
            BackendType::Command => None,
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Gemini => write!(f, "gemini"),
            BackendType::Anthropic => write!(f, "anthropic"),
            BackendType::Command => write!(f, "command"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(BackendType::Gemini),
            "anthropic" | "claude-api" => Ok(BackendType::Anthropic),
            "command" | "cmd" | "cli" => Ok(BackendType::Command),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Explicit configuration handle for a generator
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub backend: BackendType,
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// Override the provider endpoint (tests, proxies)
    pub base_url: Option<String>,
    /// Request timeout (None = no limit)
    pub timeout: Option<Duration>,
    pub max_tokens: u32,
    /// Binary for the command backend
    pub command: Option<PathBuf>,
    /// Extra arguments placed before the prompt for the command backend
    pub command_args: Vec<String>,
}

impl GeneratorConfig {
    pub fn new(backend: BackendType) -> Self {
        Self {
            backend,
            model: None,
            api_key: None,
            base_url: None,
            timeout: Some(Duration::from_secs(120)),
            max_tokens: 8192,
            command: None,
            command_args: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_command(mut self, command: PathBuf, args: Vec<String>) -> Self {
        self.command = Some(command);
        self.command_args = args;
        self
    }

    /// Model to request, falling back to the backend's default
    pub fn effective_model(&self) -> Option<String> {
        self.model
            .clone()
            .or_else(|| self.backend.default_model().map(String::from))
    }
}

/// A generative backend that turns a prompt into raw text
#[async_trait]
pub trait Generator: Send + Sync {
    /// Human-readable name of the backend
    fn name(&self) -> &str;

    /// Model the backend is asked for, when it has one
    fn model(&self) -> Option<&str> {
        None
    }

    /// Send the request and return the raw reply text
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Check whether the backend looks usable before starting a task
    async fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_type_parses_aliases() {
        assert_eq!("Gemini".parse::<BackendType>(), Ok(BackendType::Gemini));
        assert_eq!("cli".parse::<BackendType>(), Ok(BackendType::Command));
        assert!("openai".parse::<BackendType>().is_err());
    }

    #[test]
    fn test_effective_model_falls_back_to_default() {
        let config = GeneratorConfig::new(BackendType::Gemini);
        assert_eq!(config.effective_model().as_deref(), Some("gemini-2.0-flash"));
        let config = config.with_model("gemini-1.5-pro".into());
        assert_eq!(config.effective_model().as_deref(), Some("gemini-1.5-pro"));
        assert_eq!(GeneratorConfig::new(BackendType::Command).effective_model(), None);
    }
}
