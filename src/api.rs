use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::Config;
use crate::error::{GeneratorError, Result};

pub const GROQ_DEFAULT_URL: &str = "https://api.groq.com/openai/v1";
pub const GROQ_DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const GEMINI_DEFAULT_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-1.5-flash";

const TEMPERATURE: f32 = 0.2;
const MAX_TOKENS: u32 = 8000;

/// One unit of a provider token stream.
#[derive(Debug, Clone)]
pub enum TokenEvent {
    Start,
    Chunk(String),
    End,
    Error(String),
}

/// A pluggable model provider: given a system prompt and a user prompt,
/// produce either a full completion or a token stream. Adding a provider
/// means adding one implementation and one registry entry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Single short completion, used by the intent classifier.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Streamed completion. HTTP-level failures surface as `Err` before
    /// any token arrives; mid-stream failures arrive as `TokenEvent::Error`.
    async fn stream(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<mpsc::UnboundedReceiver<TokenEvent>>;
}

impl std::fmt::Debug for dyn ModelBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBackend")
            .field("name", &self.name())
            .finish()
    }
}

fn build_http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(300))
        .user_agent("sitesmith/0.1")
        .build()
        .expect("Failed to create HTTP client")
}

/// Pump an SSE response body into a token channel. Lines are `data:`
/// payloads, possibly split across network chunks; `[DONE]` or end of
/// body terminates the stream.
async fn pump_sse<F>(
    response: reqwest::Response,
    tx: mpsc::UnboundedSender<TokenEvent>,
    parse_delta: F,
) where
    F: Fn(&str) -> Option<String>,
{
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();

    while let Some(item) = stream.next().await {
        let bytes = match item {
            Ok(bytes) => bytes,
            Err(err) => {
                let _ = tx.send(TokenEvent::Error(format!("stream error: {}", err)));
                return;
            }
        };
        buffer.push_str(&String::from_utf8_lossy(&bytes));

        while let Some(pos) = buffer.find('\n') {
            let line = buffer[..pos].trim_end_matches('\r').to_string();
            buffer.drain(..=pos);

            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim();
            if payload == "[DONE]" {
                let _ = tx.send(TokenEvent::End);
                return;
            }
            if let Some(delta) = parse_delta(payload) {
                if !delta.is_empty() {
                    let _ = tx.send(TokenEvent::Chunk(delta));
                }
            }
        }
    }
    let _ = tx.send(TokenEvent::End);
}

fn network_error(provider: &str, err: reqwest::Error) -> GeneratorError {
    GeneratorError::Provider {
        status: None,
        message: format!("{} request failed: {}", provider, err),
    }
}

async fn check_status(provider: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GeneratorError::from_status(status.as_u16(), provider, &body))
}

/// Groq backend, OpenAI-compatible chat completions with SSE streaming.
#[derive(Debug, Clone)]
pub struct GroqClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl GroqClient {
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        Self {
            client: build_http_client(),
            api_url,
            api_key,
            model,
        }
    }

    fn require_key(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(GeneratorError::Config(
                "Groq API key is not configured. Set GROQ_API_KEY or add it to the config file."
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn request_body(&self, system_prompt: &str, user_prompt: &str, stream: bool) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
            "stream": stream,
        })
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|err| network_error("Groq", err))?;
        check_status("Groq", response).await
    }
}

#[async_trait]
impl ModelBackend for GroqClient {
    fn name(&self) -> &'static str {
        "groq"
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.require_key()?;
        let response = self
            .send(&self.request_body(system_prompt, user_prompt, false))
            .await?;
        let value: Value = response.json().await.map_err(|err| network_error("Groq", err))?;

        value["choices"][0]["message"]["content"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| GeneratorError::Provider {
                status: None,
                message: "Groq response contained no choices".to_string(),
            })
    }

    async fn stream(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<mpsc::UnboundedReceiver<TokenEvent>> {
        self.require_key()?;
        let response = self
            .send(&self.request_body(system_prompt, user_prompt, true))
            .await?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let _ = tx.send(TokenEvent::Start);
            pump_sse(response, tx, |payload| {
                let value: Value = serde_json::from_str(payload).ok()?;
                value["choices"][0]["delta"]["content"]
                    .as_str()
                    .map(String::from)
            })
            .await;
        });
        Ok(rx)
    }
}

/// Gemini backend, generateContent API with SSE streaming.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        Self {
            client: build_http_client(),
            api_url,
            api_key,
            model,
        }
    }

    fn require_key(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(GeneratorError::Config(
                "Gemini API key is not configured. Set GEMINI_API_KEY or add it to the config file."
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn request_body(&self, system_prompt: &str, user_prompt: &str) -> Value {
        json!({
            "systemInstruction": { "parts": [{ "text": system_prompt }] },
            "contents": [
                { "role": "user", "parts": [{ "text": user_prompt }] }
            ],
            "generationConfig": { "temperature": TEMPERATURE },
        })
    }

    fn parse_candidate_text(value: &Value) -> Option<String> {
        let parts = value["candidates"][0]["content"]["parts"].as_array()?;
        let text: String = parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect();
        Some(text)
    }
}

#[async_trait]
impl ModelBackend for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.require_key()?;
        let url = format!("{}/models/{}:generateContent", self.api_url, self.model);
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(system_prompt, user_prompt))
            .send()
            .await
            .map_err(|err| network_error("Gemini", err))?;
        let response = check_status("Gemini", response).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|err| network_error("Gemini", err))?;

        Self::parse_candidate_text(&value).ok_or_else(|| GeneratorError::Provider {
            status: None,
            message: "Gemini response contained no candidates".to_string(),
        })
    }

    async fn stream(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<mpsc::UnboundedReceiver<TokenEvent>> {
        self.require_key()?;
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.api_url, self.model
        );
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(system_prompt, user_prompt))
            .send()
            .await
            .map_err(|err| network_error("Gemini", err))?;
        let response = check_status("Gemini", response).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let _ = tx.send(TokenEvent::Start);
            pump_sse(response, tx, |payload| {
                let value: Value = serde_json::from_str(payload).ok()?;
                GeminiClient::parse_candidate_text(&value)
            })
            .await;
        });
        Ok(rx)
    }
}

/// Maps model identifiers to backend implementations.
pub struct ModelRegistry {
    backends: HashMap<String, Arc<dyn ModelBackend>>,
    classifier_id: String,
}

impl ModelRegistry {
    /// Registry with no backends. Callers insert their own; the
    /// classifier id defaults to "groq".
    pub fn empty() -> Self {
        Self {
            backends: HashMap::new(),
            classifier_id: "groq".to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::empty();
        registry.insert(
            "groq",
            Arc::new(GroqClient::new(
                config.groq.api_key.clone(),
                config.groq.api_url.clone(),
                config.groq.model.clone(),
            )),
        );
        registry.insert(
            "gemini",
            Arc::new(GeminiClient::new(
                config.gemini.api_key.clone(),
                config.gemini.api_url.clone(),
                config.gemini.model.clone(),
            )),
        );
        registry
    }

    pub fn insert(&mut self, id: &str, backend: Arc<dyn ModelBackend>) {
        debug!(id, "registering model backend");
        self.backends.insert(id.to_string(), backend);
    }

    pub fn resolve(&self, model: &str) -> Result<Arc<dyn ModelBackend>> {
        self.backends.get(model).cloned().ok_or_else(|| {
            GeneratorError::Config(format!(
                "Unknown model '{}'. Available: {}",
                model,
                self.available().join(", ")
            ))
        })
    }

    /// Backend used for intent classification calls.
    pub fn classifier(&self) -> Result<Arc<dyn ModelBackend>> {
        self.resolve(&self.classifier_id)
    }

    pub fn set_classifier(&mut self, id: &str) {
        self.classifier_id = id.to_string();
    }

    pub fn available(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.backends.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn groq_sse_body() -> String {
        let mut body = String::new();
        for token in ["[--FILE:", "index.html", "--]\n<p>hi</p>"] {
            body.push_str(&format!(
                "data: {}\n\n",
                json!({"choices": [{"delta": {"content": token}}]})
            ));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    async fn collect_chunks(mut rx: mpsc::UnboundedReceiver<TokenEvent>) -> String {
        let mut accumulated = String::new();
        while let Some(event) = rx.recv().await {
            match event {
                TokenEvent::Chunk(chunk) => accumulated.push_str(&chunk),
                TokenEvent::End => break,
                TokenEvent::Error(err) => panic!("unexpected stream error: {}", err),
                TokenEvent::Start => {}
            }
        }
        accumulated
    }

    #[tokio::test]
    async fn groq_stream_concatenates_sse_deltas() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(groq_sse_body(), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let client = GroqClient::new("test-key".into(), server.uri(), "test-model".into());
        let rx = client.stream("system", "user").await.unwrap();
        let accumulated = collect_chunks(rx).await;
        assert_eq!(accumulated, "[--FILE:index.html--]\n<p>hi</p>");
    }

    #[tokio::test]
    async fn groq_complete_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "create"}}]
            })))
            .mount(&server)
            .await;

        let client = GroqClient::new("test-key".into(), server.uri(), "test-model".into());
        let text = client.complete("system", "user").await.unwrap();
        assert_eq!(text, "create");
    }

    #[tokio::test]
    async fn groq_rate_limit_maps_to_readable_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = GroqClient::new("test-key".into(), server.uri(), "test-model".into());
        let err = client.stream("system", "user").await.unwrap_err();
        assert!(err.to_string().contains("rate limit"));
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_call() {
        let client = GroqClient::new(String::new(), "http://unreachable".into(), "m".into());
        let err = client.complete("s", "u").await.unwrap_err();
        assert!(matches!(err, GeneratorError::Config(_)));
    }

    #[tokio::test]
    async fn gemini_stream_joins_candidate_parts() {
        let server = MockServer::start().await;
        let body = format!(
            "data: {}\n\ndata: {}\n\n",
            json!({"candidates": [{"content": {"parts": [{"text": "hello "}]}}]}),
            json!({"candidates": [{"content": {"parts": [{"text": "world"}]}}]}),
        );
        Mock::given(method("POST"))
            .and(path("/models/test-model:streamGenerateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = GeminiClient::new("test-key".into(), server.uri(), "test-model".into());
        let rx = client.stream("system", "user").await.unwrap();
        let accumulated = collect_chunks(rx).await;
        assert_eq!(accumulated, "hello world");
    }

    #[test]
    fn registry_resolves_known_models_only() {
        let registry = ModelRegistry::from_config(&Config::default());
        assert_eq!(registry.resolve("groq").unwrap().name(), "groq");
        assert_eq!(registry.resolve("gemini").unwrap().name(), "gemini");
        let err = registry.resolve("deepseek").unwrap_err();
        assert!(matches!(err, GeneratorError::Config(_)));
    }
}
