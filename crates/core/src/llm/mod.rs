pub mod error;
pub mod openai;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// One completed chat call, with wall-clock latency measured around the
/// network round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletion {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Copy)]
pub enum Provider {
    OpenAi,
}

#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Single request/response exchange. No retry, no backoff; failures are
    /// classified by [`error::LlmError`] so callers can tell a timeout from
    /// an upstream rejection.
    async fn chat(&self, req: ChatRequest) -> Result<ChatCompletion, error::LlmError>;
}
