//! Google Gemini provider via the OpenAI-compatible endpoint.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::LlmError;
use crate::llm::openai::OpenAiProvider;
use crate::llm::provider::{ChatMessage, ChunkStream, CompletionResponse, LlmProvider};

const PROVIDER: &str = "google";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Google AI Studio client.
///
/// Gemini speaks the chat-completions dialect on its compatibility endpoint,
/// so this wraps the OpenAI client pointed at Google's base URL; only the
/// provider name in logs and errors differs.
pub struct GoogleGeminiProvider {
    inner: OpenAiProvider,
}

impl GoogleGeminiProvider {
    pub fn new(api_key: SecretString, model: String) -> Self {
        Self {
            inner: OpenAiProvider::new(api_key, model).with_base_url(DEFAULT_BASE_URL),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.inner = self.inner.with_base_url(base_url);
        self
    }
}

#[async_trait]
impl LlmProvider for GoogleGeminiProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<CompletionResponse, LlmError> {
        self.inner
            .complete(messages, system_prompt)
            .await
            .map_err(rebrand)
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<ChunkStream, LlmError> {
        self.inner
            .stream(messages, system_prompt)
            .await
            .map_err(rebrand)
    }
}

fn rebrand(err: LlmError) -> LlmError {
    match err {
        LlmError::AuthFailed { .. } => LlmError::AuthFailed {
            provider: PROVIDER.to_string(),
        },
        LlmError::RequestFailed { reason, .. } => LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason,
        },
        LlmError::RateLimited { retry_after, .. } => LlmError::RateLimited {
            provider: PROVIDER.to_string(),
            retry_after,
        },
        LlmError::InvalidResponse { reason, .. } => LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebrand_keeps_detail() {
        let err = rebrand(LlmError::RequestFailed {
            provider: "openai".to_string(),
            reason: "boom".to_string(),
        });
        match err {
            LlmError::RequestFailed { provider, reason } => {
                assert_eq!(provider, "google");
                assert_eq!(reason, "boom");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
