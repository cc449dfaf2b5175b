//! LLM integration for the agent loop.
//!
//! Providers implement [`LlmProvider`]; the orchestrator only ever sees the
//! trait. API keys come from the conventional provider environment variables
//! and never leave the client structs.

mod anthropic;
mod google;
mod openai;
mod provider;
mod sse;

pub use anthropic::AnthropicProvider;
pub use google::GoogleGeminiProvider;
pub use openai::OpenAiProvider;
pub use provider::{ChatMessage, ChunkStream, CompletionResponse, LlmProvider, Role, TokenUsage};

use std::sync::Arc;

use secrecy::SecretString;

use crate::error::{Error, LlmError, Result};
use crate::settings::{LlmProviderKind, Settings};

/// Build the configured provider.
pub fn create_provider(settings: &Settings) -> Result<Arc<dyn LlmProvider>> {
    let model = settings.llm_model.clone();
    match settings.llm_provider {
        LlmProviderKind::OpenAi => {
            let key = api_key("OPENAI_API_KEY", "openai")?;
            tracing::info!(model, "using OpenAI provider");
            Ok(Arc::new(OpenAiProvider::new(key, model)))
        }
        LlmProviderKind::Anthropic => {
            let key = api_key("ANTHROPIC_API_KEY", "anthropic")?;
            tracing::info!(model, "using Anthropic provider");
            Ok(Arc::new(AnthropicProvider::new(key, model)))
        }
        LlmProviderKind::Google => {
            let key = api_key("GEMINI_API_KEY", "google")
                .or_else(|_| api_key("GOOGLE_API_KEY", "google"))?;
            tracing::info!(model, "using Google Gemini provider");
            Ok(Arc::new(GoogleGeminiProvider::new(key, model)))
        }
    }
}

fn api_key(env_var: &str, provider: &str) -> Result<SecretString> {
    std::env::var(env_var)
        .ok()
        .filter(|v| !v.is_empty())
        .map(SecretString::new)
        .ok_or_else(|| {
            Error::Llm(LlmError::AuthFailed {
                provider: provider.to_string(),
            })
        })
}
