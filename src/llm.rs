//! OpenAI-compatible chat-completions client.
//!
//! Implements [`LanguageModel`] against `POST {base_url}/chat/completions`,
//! which OpenAI, Groq, Ollama (`/v1`), vLLM and most hosted gateways
//! accept.
//!
//! # Retry Strategy
//!
//! Same policy as the embedding providers:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Failures are reported as [`LlmError`] wrapped in `anyhow::Error` so the
//! pipeline can tell a timeout from malformed output.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use adaptive_rag_core::llm::{CompletionRequest, LanguageModel};
use adaptive_rag_core::LlmError;

use crate::config::LlmConfig;

pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_retries: u32,
    backoff_unit: Duration,
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("adaptive-rag/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            temperature: 0.0,
            max_retries: 3,
            backoff_unit: Duration::from_secs(1),
        })
    }

    /// Build a client from `[llm]`, reading the API key from the named
    /// environment variable.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(
                std::env::var(var)
                    .map_err(|_| anyhow::anyhow!("{} environment variable not set", var))?,
            ),
            None => None,
        };
        Ok(Self::new(
            &config.base_url,
            &config.model,
            api_key,
            Duration::from_secs(config.timeout_secs),
        )?
        .with_temperature(config.temperature)
        .with_max_retries(config.max_retries))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Base delay for exponential backoff (default one second).
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature.unwrap_or(self.temperature),
        });
        if let Some(schema) = &request.schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.schema,
                },
            });
        }
        body
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

fn parse_chat_response(text: &str) -> Result<String, LlmError> {
    let parsed: ChatResponse = serde_json::from_str(text)
        .map_err(|e| LlmError::Malformed(format!("invalid response JSON: {}", e)))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| LlmError::Malformed("response has no message content".to_string()))
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(request);

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff_unit * (1u32 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut builder = self.http.post(&url).json(&body);
            if let Some(key) = &self.api_key {
                builder = builder.header("Authorization", format!("Bearer {}", key));
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();

                    if status.is_success() {
                        debug!(task = request.task.as_str(), attempt, "completion ok");
                        return parse_chat_response(&text).map_err(Into::into);
                    }

                    if status.as_u16() == 429 {
                        last_err = Some(LlmError::RateLimited(format!("{}: {}", status, text)));
                        continue;
                    }
                    if status.is_server_error() {
                        last_err = Some(LlmError::Unavailable(format!("{}: {}", status, text)));
                        continue;
                    }

                    return Err(
                        LlmError::Unavailable(format!("API error {}: {}", status, text)).into(),
                    );
                }
                Err(e) if e.is_timeout() => {
                    last_err = Some(LlmError::Timeout(e.to_string()));
                }
                Err(e) => {
                    last_err = Some(LlmError::Unavailable(format!(
                        "connection error (is the model server running at {}?): {}",
                        self.base_url, e
                    )));
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| LlmError::Unavailable("completion failed after retries".to_string()))
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptive_rag_core::llm::{ChatMessage, Task};
    use adaptive_rag_core::prompts;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> OpenAiCompatibleClient {
        OpenAiCompatibleClient::new(
            "http://unused",
            "test-model",
            Some("test_key".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
        .with_base_url(server.base_url())
        .with_max_retries(2)
        .with_backoff_unit(Duration::from_millis(1))
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(Task::AnswerGeneral, vec![ChatMessage::user("Hi")])
    }

    #[tokio::test]
    async fn complete_returns_first_choice_content() {
        let server = MockServer::start_async().await;

        let completion_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("Authorization", "Bearer test_key");
            then.status(200).json_body(json!({
                "choices": [
                    { "message": { "role": "assistant", "content": "Hello!" } }
                ]
            }));
        });

        let reply = client(&server).complete(&request()).await.unwrap();
        assert_eq!(reply, "Hello!");
        completion_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn complete_sends_json_schema_when_requested() {
        let server = MockServer::start_async().await;

        let completion_mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions").is_true(|req| {
                let body = String::from_utf8_lossy(req.body().as_ref());
                body.contains("json_schema") && body.contains("route_decision")
            });
            then.status(200).json_body(json!({
                "choices": [
                    { "message": { "role": "assistant", "content": "{\"label\":\"general\"}" } }
                ]
            }));
        });

        let req = CompletionRequest::new(Task::Route, vec![ChatMessage::user("Hi")])
            .with_schema(prompts::route_schema());
        let reply = client(&server).complete(&req).await.unwrap();
        assert!(reply.contains("general"));
        completion_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn complete_retries_server_errors_then_gives_up() {
        let server = MockServer::start_async().await;

        let completion_mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(503).body("overloaded");
        });

        let err = client(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LlmError>(),
            Some(LlmError::Unavailable(_))
        ));
        assert!(err.to_string().contains("overloaded"));
        completion_mock.assert_calls(3);
    }

    #[tokio::test]
    async fn complete_rate_limit_is_classified() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(429).body("slow down");
        });

        let err = client(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LlmError>(),
            Some(LlmError::RateLimited(_))
        ));
    }

    #[tokio::test]
    async fn complete_does_not_retry_client_errors() {
        let server = MockServer::start_async().await;

        let completion_mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(401).body("bad key");
        });

        let err = client(&server).complete(&request()).await.unwrap_err();
        assert!(err.to_string().contains("401"));
        completion_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn complete_empty_choices_is_malformed() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({ "choices": [] }));
        });

        let err = client(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LlmError>(),
            Some(LlmError::Malformed(_))
        ));
    }

    #[test]
    fn from_config_requires_key_variable() {
        let config = LlmConfig {
            api_key_env: Some("ARAG_TEST_SURELY_UNSET_KEY".to_string()),
            ..LlmConfig::default()
        };
        let err = OpenAiCompatibleClient::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("ARAG_TEST_SURELY_UNSET_KEY"));

        let keyless = LlmConfig {
            api_key_env: None,
            ..LlmConfig::default()
        };
        assert!(OpenAiCompatibleClient::from_config(&keyless).is_ok());
    }
}
