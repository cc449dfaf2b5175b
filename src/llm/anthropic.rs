//! Anthropic messages API provider.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, ChunkStream, CompletionResponse, LlmProvider, Role, TokenUsage,
};
use crate::llm::sse;

const PROVIDER: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Anthropic messages API client.
pub struct AnthropicProvider {
    client: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: SecretString, model: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self) -> String {
        format!("{}/messages", self.base_url.trim_end_matches('/'))
    }

    fn wire_messages(messages: &[ChatMessage]) -> Vec<WireMessage> {
        // The messages API takes system prompts out of band and only
        // user/assistant turns in the list.
        messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| WireMessage {
                role: m.role.as_str(),
                content: m.content.clone(),
            })
            .collect()
    }

    async fn post(&self, body: &MessagesRequest<'_>) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(self.url())
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 401 {
                return Err(LlmError::AuthFailed {
                    provider: PROVIDER.to_string(),
                });
            }
            if status.as_u16() == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(std::time::Duration::from_secs);
                return Err(LlmError::RateLimited {
                    provider: PROVIDER.to_string(),
                    retry_after,
                });
            }
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<CompletionResponse, LlmError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: system_prompt,
            messages: Self::wire_messages(messages),
            stream: false,
        };

        let response = self.post(&body).await?;
        let parsed: MessagesResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    reason: e.to_string(),
                })?;

        let content = parsed
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            content,
            model: parsed.model,
            usage: TokenUsage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            },
        })
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<ChunkStream, LlmError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: system_prompt,
            messages: Self::wire_messages(messages),
            stream: true,
        };

        let response = self.post(&body).await?;
        let chunks = sse::data_events(response, PROVIDER).filter_map(|payload| async {
            match payload {
                Ok(data) => serde_json::from_str::<StreamEvent>(&data)
                    .ok()
                    .filter(|e| e.kind == "content_block_delta")
                    .and_then(|e| e.delta)
                    .and_then(|d| d.text)
                    .filter(|t| !t.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(Box::pin(chunks))
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<WireMessage>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<ContentBlock>,
    usage: WireUsage,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_are_filtered_from_turns() {
        let messages = vec![
            ChatMessage {
                role: Role::System,
                content: "sys".into(),
            },
            ChatMessage::user("hi"),
        ];
        let wire = AnthropicProvider::wire_messages(&messages);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, "user");
    }

    #[test]
    fn response_parsing() {
        let raw = r#"{
            "model": "claude-3-5-sonnet-20241022",
            "content": [{"type": "text", "text": "FINAL(4)"}],
            "usage": {"input_tokens": 20, "output_tokens": 6}
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.content[0].text.as_deref(), Some("FINAL(4)"));
        assert_eq!(parsed.usage.output_tokens, 6);
    }

    #[test]
    fn stream_event_parsing() {
        let raw = r#"{"type": "content_block_delta", "delta": {"type": "text_delta", "text": "hi"}}"#;
        let event: StreamEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.kind, "content_block_delta");
        assert_eq!(event.delta.unwrap().text.as_deref(), Some("hi"));
    }
}
