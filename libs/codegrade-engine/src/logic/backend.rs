//! Remote logic-assessment backends
//!
//! A backend takes a prompt and returns generated text. Every transport or
//! protocol failure is classified into a `BackendError`, which the analyzer
//! turns into a fallback reason; nothing here is allowed to panic.

use crate::config::{BackendConfig, BackendKind};
use async_trait::async_trait;
use codegrade_common::types::FallbackReason;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Error bodies are only kept for logs, so cap them
const MAX_ERROR_BODY_CHARS: usize = 300;
const CLIENT_USER_AGENT: &str = "codegrade-engine/0.1";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("model is still loading")]
    ModelLoading,
    #[error("backend rejected the request (HTTP {status}): {body}")]
    Client { status: u16, body: String },
    #[error("backend failed (HTTP {status}): {body}")]
    Server { status: u16, body: String },
    #[error("backend call timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected backend reply: {0}")]
    Unexpected(String),
}

impl BackendError {
    /// Fallback reason recorded in the assessment
    pub fn kind(&self) -> FallbackReason {
        match self {
            BackendError::ModelLoading => FallbackReason::ModelLoading,
            BackendError::Client { .. } => FallbackReason::ClientError,
            BackendError::Server { .. } => FallbackReason::ServerError,
            BackendError::Timeout => FallbackReason::Timeout,
            BackendError::Network(_) => FallbackReason::NetworkError,
            BackendError::Unexpected(_) => FallbackReason::UnexpectedError,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else if err.is_decode() {
            BackendError::Unexpected(err.to_string())
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

#[async_trait]
pub trait LogicBackend: Send + Sync {
    /// Short label for logs
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, BackendError>;
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Serialize)]
struct HfParameters {
    max_new_tokens: u32,
    temperature: f32,
    return_full_text: bool,
}

#[derive(Serialize)]
struct HfRequest<'a> {
    inputs: &'a str,
    parameters: HfParameters,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

fn clip(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

/// Ollama replies with one JSON object, or NDJSON chunks when streaming;
/// the text is the concatenation of every `response` field
pub fn parse_ollama_body(body: &str) -> Result<String, BackendError> {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(body) {
        return match obj.get("response").and_then(Value::as_str) {
            Some(text) => Ok(text.to_string()),
            None => Err(BackendError::Unexpected("missing 'response' field".to_string())),
        };
    }

    let mut text = String::new();
    let mut chunks = 0;
    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        if let Ok(chunk) = serde_json::from_str::<Value>(line) {
            if let Some(part) = chunk.get("response").and_then(Value::as_str) {
                text.push_str(part);
                chunks += 1;
            }
        }
    }

    if chunks == 0 {
        return Err(BackendError::Unexpected(format!("unparseable body: {}", clip(body))));
    }
    Ok(text)
}

/// Hugging Face text generation: `[{"generated_text": ...}]`, a bare object,
/// or `{"error": "... loading ..."}` while the model warms up
pub fn parse_huggingface_body(body: &str) -> Result<String, BackendError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| BackendError::Unexpected(format!("invalid JSON: {}", e)))?;

    let generated = match &value {
        Value::Array(items) => items.first().and_then(|i| i.get("generated_text")),
        Value::Object(obj) => obj.get("generated_text"),
        _ => None,
    };

    if let Some(text) = generated.and_then(Value::as_str) {
        return Ok(text.to_string());
    }

    match value.get("error").and_then(Value::as_str) {
        Some(err) if err.to_ascii_lowercase().contains("loading") => Err(BackendError::ModelLoading),
        Some(err) => Err(BackendError::Unexpected(clip(err))),
        None => Err(BackendError::Unexpected("missing 'generated_text'".to_string())),
    }
}

/// reqwest-backed backend speaking one of the supported HTTP protocols
pub struct HttpBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Unexpected(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        let base = self.config.url.trim_end_matches('/');
        match self.config.kind {
            BackendKind::Ollama => format!("{}/api/generate", base),
            BackendKind::HuggingFace => base.to_string(),
            BackendKind::OpenAi => format!("{}/chat/completions", base),
        }
    }

    fn request(&self, prompt: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(self.endpoint())
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(CONTENT_TYPE, "application/json");

        let builder = match &self.config.api_key {
            Some(key) => builder.header(AUTHORIZATION, format!("Bearer {}", key)),
            None => builder,
        };

        match self.config.kind {
            BackendKind::Ollama => builder.json(&OllamaRequest {
                model: &self.config.model,
                prompt,
                stream: false,
            }),
            BackendKind::HuggingFace => builder.json(&HfRequest {
                inputs: prompt,
                parameters: HfParameters {
                    max_new_tokens: 512,
                    temperature: 0.2,
                    return_full_text: false,
                },
            }),
            BackendKind::OpenAi => builder.json(&ChatRequest {
                model: &self.config.model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt,
                }],
                temperature: 0.2,
            }),
        }
    }

    fn classify_status(&self, status: StatusCode, body: &str) -> BackendError {
        let loading = body.to_ascii_lowercase().contains("loading");
        if status == StatusCode::SERVICE_UNAVAILABLE || (status.is_server_error() && loading) {
            return BackendError::ModelLoading;
        }
        if status.is_client_error() {
            BackendError::Client {
                status: status.as_u16(),
                body: clip(body),
            }
        } else {
            BackendError::Server {
                status: status.as_u16(),
                body: clip(body),
            }
        }
    }
}

#[async_trait]
impl LogicBackend for HttpBackend {
    fn name(&self) -> &str {
        match self.config.kind {
            BackendKind::Ollama => "ollama",
            BackendKind::HuggingFace => "huggingface",
            BackendKind::OpenAi => "openai",
        }
    }

    #[instrument(skip(self, prompt), fields(model = %self.config.model, prompt_bytes = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let response = self.request(prompt).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let err = self.classify_status(status, &body);
            warn!(status = status.as_u16(), error = %err, "Logic backend returned an error status");
            return Err(err);
        }

        debug!(response_bytes = body.len(), "Logic backend replied");

        match self.config.kind {
            BackendKind::Ollama => parse_ollama_body(&body),
            BackendKind::HuggingFace => parse_huggingface_body(&body),
            BackendKind::OpenAi => {
                let chat: ChatResponse = serde_json::from_str(&body)
                    .map_err(|e| BackendError::Unexpected(format!("invalid chat completion: {}", e)))?;
                chat.choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .ok_or_else(|| BackendError::Unexpected("chat completion without content".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::time::Duration;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config(kind: BackendKind, url: String, api_key: Option<&str>) -> BackendConfig {
        BackendConfig {
            kind,
            url,
            api_key: api_key.map(str::to_string),
            model: kind.default_model().to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_ollama_single_object() {
        let text = parse_ollama_body(r#"{"model":"llama3","response":"SCORE: 8/10","done":true}"#).unwrap();
        assert_eq!(text, "SCORE: 8/10");
    }

    #[test]
    fn test_ollama_ndjson_stream() {
        let body = "{\"response\":\"SCORE: \"}\n{\"response\":\"7/10\"}\n{\"done\":true}\n";
        assert_eq!(parse_ollama_body(body).unwrap(), "SCORE: 7/10");
    }

    #[test]
    fn test_ollama_garbage_is_unexpected() {
        let err = parse_ollama_body("<html>oops</html>").unwrap_err();
        assert_eq!(err.kind(), FallbackReason::UnexpectedError);
    }

    #[test]
    fn test_huggingface_bodies() {
        assert_eq!(parse_huggingface_body(r#"[{"generated_text":"ok"}]"#).unwrap(), "ok");
        assert_eq!(parse_huggingface_body(r#"{"generated_text":"ok"}"#).unwrap(), "ok");
        let err = parse_huggingface_body(r#"{"error":"Model is currently loading","estimated_time":20.0}"#).unwrap_err();
        assert_eq!(err.kind(), FallbackReason::ModelLoading);
    }

    #[tokio::test]
    async fn test_ollama_over_http() {
        let app = Router::new().route(
            "/api/generate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["stream"], false);
                Json(serde_json::json!({"response": format!("model={}", body["model"].as_str().unwrap_or(""))}))
            }),
        );
        let url = serve(app).await;
        let backend = HttpBackend::new(config(BackendKind::Ollama, url, None)).unwrap();
        assert_eq!(backend.generate("hi").await.unwrap(), "model=llama3");
    }

    #[tokio::test]
    async fn test_openai_over_http_sends_bearer_key() {
        let app = Router::new().route(
            "/chat/completions",
            post(|headers: axum::http::HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                Json(serde_json::json!({"choices": [{"message": {"content": auth}}]}))
            }),
        );
        let url = serve(app).await;
        let backend = HttpBackend::new(config(BackendKind::OpenAi, url, Some("sk-test"))).unwrap();
        assert_eq!(backend.generate("hi").await.unwrap(), "Bearer sk-test");
    }

    #[tokio::test]
    async fn test_status_classification() {
        let app = Router::new()
            .route("/loading", post(|| async { (AxumStatus::SERVICE_UNAVAILABLE, "Model is loading") }))
            .route("/bad", post(|| async { (AxumStatus::BAD_REQUEST, "bad prompt") }))
            .route("/broken", post(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "boom") }));
        let url = serve(app).await;

        for (path, expected) in [
            ("loading", FallbackReason::ModelLoading),
            ("bad", FallbackReason::ClientError),
            ("broken", FallbackReason::ServerError),
        ] {
            let backend =
                HttpBackend::new(config(BackendKind::HuggingFace, format!("{}/{}", url, path), Some("hf"))).unwrap();
            let err = backend.generate("hi").await.unwrap_err();
            assert_eq!(err.kind(), expected, "path {}", path);
        }
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = HttpBackend::new(config(BackendKind::Ollama, format!("http://{}", addr), None)).unwrap();
        let err = backend.generate("hi").await.unwrap_err();
        assert_eq!(err.kind(), FallbackReason::NetworkError);
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(serde_json::json!({"response": "late"}))
            }),
        );
        let url = serve(app).await;
        let mut cfg = config(BackendKind::Ollama, url, None);
        cfg.timeout = Duration::from_millis(200);
        let backend = HttpBackend::new(cfg).unwrap();
        let err = backend.generate("hi").await.unwrap_err();
        assert_eq!(err.kind(), FallbackReason::Timeout);
    }
}
