use crate::config::Settings;
use crate::llm::error::LlmError;
use crate::llm::{ChatClient, ChatCompletion, ChatMessage, ChatRequest, Provider};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 45;

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl OpenAiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_openai_api_key()?.to_string();
        let base_url = settings
            .openai_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = settings
            .openai_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let timeout_secs = std::env::var("OPENAI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            timeout_secs,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }

    fn classify_send_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout {
                after_secs: self.timeout_secs,
            }
        } else {
            LlmError::Transport {
                detail: err.to_string(),
            }
        }
    }
}

#[async_trait::async_trait]
impl ChatClient for OpenAiClient {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    async fn chat(&self, req: ChatRequest) -> Result<ChatCompletion, LlmError> {
        let body = CompletionsRequest {
            model: &self.model,
            messages: &req.messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        };

        let started = Instant::now();
        let res = self
            .http
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_send_error(e))?;

        let status = res.status();
        let text = res.text().await.map_err(|e| self.classify_send_error(e))?;
        let latency_ms = started.elapsed().as_millis() as u64;

        if !status.is_success() {
            return Err(LlmError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed =
            serde_json::from_str::<CompletionsResponse>(&text).map_err(|e| LlmError::Transport {
                detail: format!("failed to decode completions response: {e}"),
            })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Transport {
                detail: "completions response contained no choices".to_string(),
            })?;

        Ok(ChatCompletion {
            content,
            tokens_used: parsed.usage.map(|u| u.total_tokens),
            model: parsed.model,
            latency_ms,
        })
    }
}

#[derive(Debug, Serialize)]
struct CompletionsRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionsResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_completions_response() {
        let v = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "HOLD"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        });

        let parsed: CompletionsResponse = serde_json::from_value(v).unwrap();
        assert_eq!(parsed.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(parsed.usage.map(|u| u.total_tokens), Some(12));
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("HOLD")
        );
    }

    #[test]
    fn decodes_response_without_usage() {
        let v = json!({
            "choices": [{"message": {"content": "text"}}]
        });
        let parsed: CompletionsResponse = serde_json::from_value(v).unwrap();
        assert!(parsed.usage.is_none());
        assert!(parsed.model.is_none());
    }

    #[test]
    fn serializes_roles_lowercase() {
        let msg = ChatMessage::system("persona");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "system");
    }
}
