use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::{BackendType, GenerationError, GenerationRequest, Generator, GeneratorConfig};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Generator that calls a hosted model over HTTPS
pub struct HttpGenerator {
    client: reqwest::Client,
    backend: BackendType,
    model: String,
    api_key: String,
    base_url: String,
    max_tokens: u32,
}

impl HttpGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self, GenerationError> {
        let base_url = match config.backend {
            BackendType::Gemini => config.base_url.clone().unwrap_or_else(|| GEMINI_BASE_URL.into()),
            BackendType::Anthropic => config
                .base_url
                .clone()
                .unwrap_or_else(|| ANTHROPIC_BASE_URL.into()),
            BackendType::Command => {
                return Err(GenerationError::ConfigError(
                    "the command backend is not an HTTP backend".into(),
                ))
            }
        };
        let model = config.effective_model().ok_or_else(|| {
            GenerationError::ConfigError(format!("no model configured for {}", config.backend))
        })?;
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                GenerationError::ConfigError(format!(
                    "missing API key for {} (set {})",
                    config.backend,
                    config.backend.api_key_env().unwrap_or("an API key")
                ))
            })?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            backend: config.backend,
            model,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_tokens: config.max_tokens,
        })
    }

    fn build_request(&self, prompt: &str) -> reqwest::RequestBuilder {
        match self.backend {
            BackendType::Anthropic => self
                .client
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&json!({
                    "model": self.model,
                    "max_tokens": self.max_tokens,
                    "messages": [{ "role": "user", "content": prompt }],
                })),
            // Command never reaches here; new() rejects it
            BackendType::Gemini | BackendType::Command => self
                .client
                .post(format!(
                    "{}/v1beta/models/{}:generateContent",
                    self.base_url, self.model
                ))
                .header("x-goog-api-key", &self.api_key)
                .json(&json!({
                    "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
                    "generationConfig": { "maxOutputTokens": self.max_tokens },
                })),
        }
    }

    fn extract_text(&self, body: &str) -> Result<String, GenerationError> {
        let text = match self.backend {
            BackendType::Anthropic => {
                let response: AnthropicResponse = serde_json::from_str(body)
                    .map_err(|e| GenerationError::Backend {
                        status: 200,
                        body: format!("unreadable response ({}): {}", e, body),
                    })?;
                response
                    .content
                    .into_iter()
                    .filter(|block| block.kind == "text")
                    .filter_map(|block| block.text)
                    .collect::<Vec<_>>()
                    .join("")
            }
            BackendType::Gemini | BackendType::Command => {
                let response: GeminiResponse = serde_json::from_str(body)
                    .map_err(|e| GenerationError::Backend {
                        status: 200,
                        body: format!("unreadable response ({}): {}", e, body),
                    })?;
                response
                    .candidates
                    .into_iter()
                    .next()
                    .and_then(|candidate| candidate.content)
                    .map(|content| {
                        content
                            .parts
                            .into_iter()
                            .filter_map(|part| part.text)
                            .collect::<Vec<_>>()
                            .join("")
                    })
                    .unwrap_or_default()
            }
        };

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    fn name(&self) -> &str {
        match self.backend {
            BackendType::Anthropic => "anthropic",
            BackendType::Gemini | BackendType::Command => "gemini",
        }
    }

    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        debug!(
            backend = %self.backend,
            model = %self.model,
            prompt_len = request.prompt.len(),
            attempt = request.attempt,
            "Sending generation request"
        );

        let response = self.build_request(&request.prompt).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Generation backend returned an error");
            return Err(GenerationError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        self.extract_text(&body)
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}
