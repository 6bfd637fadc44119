use serde_json::json;
use tableloop_agent::{
    BackendType, GenerationError, GenerationRequest, Generator, GeneratorConfig, HttpGenerator,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(prompt: &str) -> GenerationRequest {
    GenerationRequest {
        prompt: prompt.to_string(),
        attempt: 1,
    }
}

fn config(backend: BackendType, server: &MockServer) -> GeneratorConfig {
    GeneratorConfig::new(backend)
        .with_api_key("test-key".into())
        .with_base_url(server.uri())
}

#[tokio::test]
async fn test_gemini_returns_joined_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{ "role": "user", "parts": [{ "text": "write parse()" }] }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "```python\n" }, { "text": "x = 1\n```" }] }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let generator = HttpGenerator::new(config(BackendType::Gemini, &server)).unwrap();
    let text = generator.generate(&request("write parse()")).await.unwrap();
    assert_eq!(text, "```python\nx = 1\n```");
}

#[tokio::test]
async fn test_anthropic_uses_messages_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({ "model": "claude-test" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "import pandas as pd" }]
        })))
        .mount(&server)
        .await;

    let generator = HttpGenerator::new(
        config(BackendType::Anthropic, &server).with_model("claude-test".into()),
    )
    .unwrap();
    assert_eq!(generator.name(), "anthropic");
    let text = generator.generate(&request("hi")).await.unwrap();
    assert_eq!(text, "import pandas as pd");
}

#[tokio::test]
async fn test_http_error_status_is_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let generator = HttpGenerator::new(config(BackendType::Gemini, &server)).unwrap();
    match generator.generate(&request("hi")).await {
        Err(GenerationError::Backend { status, body }) => {
            assert_eq!(status, 429);
            assert_eq!(body, "rate limited");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_candidates_is_empty_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let generator = HttpGenerator::new(config(BackendType::Gemini, &server)).unwrap();
    let err = generator.generate(&request("hi")).await.unwrap_err();
    assert!(matches!(err, GenerationError::EmptyResponse));
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() {
    let config = GeneratorConfig::new(BackendType::Gemini)
        .with_api_key("k".into())
        .with_base_url("http://127.0.0.1:9".into());
    let generator = HttpGenerator::new(config).unwrap();
    let err = generator.generate(&request("hi")).await.unwrap_err();
    assert!(matches!(err, GenerationError::Transport(_)));
}

#[test]
fn test_missing_api_key_is_config_error() {
    let err = HttpGenerator::new(GeneratorConfig::new(BackendType::Gemini)).err();
    assert!(matches!(err, Some(GenerationError::ConfigError(_))));
}
