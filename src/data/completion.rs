use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Model settings for one completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub model: String,
    pub temperature: f32,
    /// Step/turn budget for tool-using agents.
    pub max_steps: u32,
    pub max_tokens: Option<u32>,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            model: "gpt-4.1-mini".to_string(),
            temperature: 0.3,
            max_steps: 50,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompletionError {
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Upstream(String),
}

/// Prompt in, text out. Implementations do not parse the returned text.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: &ModelParams,
    ) -> Result<String, CompletionError>;
}
