use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::response::LlmResponse;
use super::types::TextGenerator;
use super::GenerationError;
use crate::config::GenerationSettings;

/// HTTP client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatClient {
    base_url: String,
    settings: GenerationSettings,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(settings: GenerationSettings) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| GenerationError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            settings,
            client,
        })
    }

    /// Client configured from `SOURCEDOC_*` environment variables.
    pub fn from_env() -> Result<Self, GenerationError> {
        Self::new(GenerationSettings::from_env())
    }

    pub fn model_id(&self) -> &str {
        &self.settings.model_id
    }
}

/// Request body for `/chat/completions`
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[async_trait]
impl TextGenerator for OpenAiCompatClient {
    async fn invoke(&self, prompt: &str) -> Result<LlmResponse, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.settings.model_id,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
            max_tokens: self.settings.max_tokens,
            stream: false,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                GenerationError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                GenerationError::HttpClient(format!(
                    "Request timed out after {}s",
                    self.settings.timeout_secs
                ))
            } else {
                GenerationError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::ResponseParsing(e.to_string()))?;

        Ok(LlmResponse::Json(value))
    }
}

/// Mock text generator for testing: returns a configurable response.
pub struct MockTextGenerator {
    response: LlmResponse,
    calls: AtomicUsize,
}

impl MockTextGenerator {
    pub fn new(response: impl Into<LlmResponse>) -> Self {
        Self {
            response: response.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `invoke` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn invoke(&self, _prompt: &str) -> Result<LlmResponse, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_returns_configured_response() {
        let mock = MockTextGenerator::new("test response");
        let out = mock.invoke("prompt").await.unwrap();
        assert_eq!(out, LlmResponse::Text("test response".into()));
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = OpenAiCompatClient::new(GenerationSettings {
            base_url: "http://localhost:8080/v1/".into(),
            ..GenerationSettings::default()
        })
        .unwrap();
        assert_eq!(client.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn request_body_shape() {
        let body = ChatRequest {
            model: "m",
            messages: [ChatMessage {
                role: "user",
                content: "hello",
            }],
            temperature: 0.0,
            top_p: 1.0,
            max_tokens: 16,
            stream: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["content"], "hello");
        assert_eq!(json["model"], "m");
        assert_eq!(json["stream"], false);
    }
}
