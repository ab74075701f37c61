use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::data::{CompletionError, CompletionService, ModelParams};

/// Longest slice of an error body carried into the error message
const BODY_EXCERPT_CHARS: usize = 300;

/// Chat-completions client for OpenAI-compatible endpoints (OpenRouter, OpenAI).
pub struct OpenAiChatClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
    request_timeout: Duration,
}

impl OpenAiChatClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            request_timeout,
        }
    }

    /// Client configured from settings, reading the key from the configured
    /// environment variable
    pub fn from_settings(settings: &Settings) -> Self {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            warn!("{} is not set; completion requests will fail", settings.api_key_env);
        }
        Self {
            api_key_env: settings.api_key_env.clone(),
            ..Self::new(
                settings.api_base_url.clone(),
                api_key,
                settings.request_timeout(),
            )
        }
    }
}

#[async_trait]
impl CompletionService for OpenAiChatClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: &ModelParams,
    ) -> Result<String, CompletionError> {
        let Some(key) = &self.api_key else {
            return Err(CompletionError::Upstream(format!(
                "no API key: set {}",
                self.api_key_env
            )));
        };

        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &params.model,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
        };

        debug!(model = %params.model, url = %url, "sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CompletionError::Upstream(format!(
                "completion endpoint returned {}: {}",
                status,
                excerpt(&text)
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| CompletionError::Upstream("completion returned no content".to_string()))
    }
}

impl OpenAiChatClient {
    fn map_transport_error(&self, e: reqwest::Error) -> CompletionError {
        if e.is_timeout() {
            CompletionError::Timeout(self.request_timeout)
        } else if e.is_decode() {
            CompletionError::Upstream(format!("malformed completion response: {}", e))
        } else {
            CompletionError::Upstream(format!("completion request failed: {}", e))
        }
    }
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(BODY_EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_truncates_long_bodies() {
        let body = "x".repeat(BODY_EXCERPT_CHARS + 50);
        let cut = excerpt(&body);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.len(), BODY_EXCERPT_CHARS + 3);
        assert_eq!(excerpt("  short  "), "short");
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let client = OpenAiChatClient::new("http://localhost:9/v1/", None, Duration::from_secs(1));
        assert_eq!(client.base_url, "http://localhost:9/v1");
    }

    #[tokio::test]
    async fn missing_key_fails_before_sending() {
        let client = OpenAiChatClient::new("http://127.0.0.1:9", None, Duration::from_secs(1));
        let err = client
            .complete("s", "u", &ModelParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Upstream(msg) if msg.contains("OPENROUTER_API_KEY")));
    }
}
