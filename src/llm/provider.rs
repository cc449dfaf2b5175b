//! Provider-neutral types and the client trait.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::LlmError;

/// Message role in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in the conversation history.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Token counts reported by the provider for one request.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A completed model response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    /// Model name as the provider reported it (may carry a date suffix).
    pub model: String,
    pub usage: TokenUsage,
}

/// Lazy sequence of content chunks from a streaming completion.
pub type ChunkStream = BoxStream<'static, Result<String, LlmError>>;

/// An LLM backend the orchestrator can drive.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider name for logs and errors.
    fn name(&self) -> &'static str;

    /// Request one completion over the full conversation.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<CompletionResponse, LlmError>;

    /// Stream a completion as content chunks. Token usage is not reported
    /// on this path; callers that bill must use [`complete`].
    ///
    /// [`complete`]: LlmProvider::complete
    async fn stream(
        &self,
        messages: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<ChunkStream, LlmError>;
}
