//! Runtime configuration from environment variables.
//!
//! All keys share the `CRUCIBLE_` prefix and have working defaults; a `.env`
//! file is honored when present. Settings are read once at boot and handed to
//! each orchestrator by value, so nothing ambient can change mid-run.

use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::{Error, Result};

const PREFIX: &str = "CRUCIBLE_";

/// Which container runtime the supervisor may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeSelector {
    /// Prefer the user-space-kernel runtime, fall back per policy.
    #[default]
    Auto,
    /// Require the user-space-kernel runtime (runsc).
    Secure,
    /// Use the daemon's default runtime unconditionally.
    Standard,
}

impl std::str::FromStr for RuntimeSelector {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(RuntimeSelector::Auto),
            "secure" | "runsc" => Ok(RuntimeSelector::Secure),
            "standard" | "runc" => Ok(RuntimeSelector::Standard),
            _ => Err(format!(
                "invalid runtime '{s}', expected 'auto', 'secure', or 'standard'"
            )),
        }
    }
}

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProviderKind {
    #[default]
    OpenAi,
    Anthropic,
    Google,
}

impl std::str::FromStr for LlmProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LlmProviderKind::OpenAi),
            "anthropic" => Ok(LlmProviderKind::Anthropic),
            "google" | "gemini" => Ok(LlmProviderKind::Google),
            _ => Err(format!(
                "invalid provider '{s}', expected 'openai', 'anthropic', or 'google'"
            )),
        }
    }
}

/// Boot-time configuration for the whole system.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base image for sandbox containers.
    pub container_image: String,
    /// Runtime selection policy.
    pub runtime: RuntimeSelector,
    /// Permit falling back to the default runtime when runsc is absent.
    pub allow_unsafe_runtime: bool,
    /// Memory ceiling in bytes (swap is pinned to the same value).
    pub memory_limit_bytes: u64,
    /// Fractional CPU cores.
    pub cpu_limit: f64,
    /// Max processes inside the container.
    pub pids_limit: i64,
    /// Wall-clock timeout per sandbox run.
    pub execution_timeout: Duration,
    /// Give the container a network interface (logged as security-relevant).
    pub network_enabled: bool,
    /// Bits per symbol above which a token run is redacted.
    pub entropy_threshold: f64,
    /// Minimum token-run length examined for entropy.
    pub min_entropy_length: usize,
    /// Jaccard containment threshold for context-echo redaction.
    pub similarity_threshold: f64,
    /// Pre-filter truncation ceiling for observations.
    pub max_stdout_bytes: usize,
    /// Provider selector for the agent loop.
    pub llm_provider: LlmProviderKind,
    /// Model identifier passed to the provider.
    pub llm_model: String,
    /// Orchestrator loop cap.
    pub max_iterations: u32,
    /// Hard cost ceiling in dollars.
    pub max_budget_dollars: Decimal,
    /// Optional JSON pricing-table override.
    pub pricing_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            container_image: "python:3.11-slim".to_string(),
            runtime: RuntimeSelector::Auto,
            allow_unsafe_runtime: false,
            memory_limit_bytes: 256 * 1024 * 1024,
            cpu_limit: 0.5,
            pids_limit: 50,
            execution_timeout: Duration::from_secs(30),
            network_enabled: false,
            entropy_threshold: 4.5,
            min_entropy_length: 20,
            similarity_threshold: 0.8,
            max_stdout_bytes: 4000,
            llm_provider: LlmProviderKind::OpenAi,
            llm_model: "gpt-4o-mini".to_string(),
            max_iterations: 10,
            max_budget_dollars: dec!(1.0),
            pricing_path: None,
        }
    }
}

impl Settings {
    /// Load settings from the environment, honoring a `.env` file.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut s = Settings::default();

        if let Some(v) = var("CONTAINER_IMAGE") {
            s.container_image = v;
        }
        if let Some(v) = var("RUNTIME") {
            s.runtime = v.parse().map_err(invalid)?;
        }
        if let Some(v) = var("ALLOW_UNSAFE_RUNTIME") {
            s.allow_unsafe_runtime = parse_flag(&v)?;
        }
        if let Some(v) = var("MEMORY_LIMIT") {
            s.memory_limit_bytes = parse_byte_size(&v)?;
        }
        if let Some(v) = var("CPU_LIMIT") {
            s.cpu_limit = parse_num(&v, "CPU_LIMIT")?;
            if s.cpu_limit <= 0.0 {
                return Err(invalid("CPU_LIMIT must be positive".to_string()));
            }
        }
        if let Some(v) = var("PIDS_LIMIT") {
            s.pids_limit = parse_num(&v, "PIDS_LIMIT")?;
        }
        if let Some(v) = var("EXECUTION_TIMEOUT") {
            s.execution_timeout = Duration::from_secs(parse_num(&v, "EXECUTION_TIMEOUT")?);
        }
        if let Some(v) = var("NETWORK_ENABLED") {
            s.network_enabled = parse_flag(&v)?;
        }
        if let Some(v) = var("ENTROPY_THRESHOLD") {
            s.entropy_threshold = parse_num(&v, "ENTROPY_THRESHOLD")?;
        }
        if let Some(v) = var("MIN_ENTROPY_LENGTH") {
            s.min_entropy_length = parse_num(&v, "MIN_ENTROPY_LENGTH")?;
        }
        if let Some(v) = var("SIMILARITY_THRESHOLD") {
            s.similarity_threshold = parse_num(&v, "SIMILARITY_THRESHOLD")?;
        }
        if let Some(v) = var("MAX_STDOUT_BYTES") {
            s.max_stdout_bytes = parse_num(&v, "MAX_STDOUT_BYTES")?;
        }
        if let Some(v) = var("LLM_PROVIDER") {
            s.llm_provider = v.parse().map_err(invalid)?;
        }
        if let Some(v) = var("LLM_MODEL") {
            s.llm_model = v;
        }
        if let Some(v) = var("MAX_ITERATIONS") {
            s.max_iterations = parse_num(&v, "MAX_ITERATIONS")?;
        }
        if let Some(v) = var("MAX_BUDGET_DOLLARS") {
            s.max_budget_dollars = v
                .parse()
                .map_err(|_| invalid(format!("MAX_BUDGET_DOLLARS: '{v}' is not a decimal")))?;
        }
        if let Some(v) = var("PRICING_PATH") {
            s.pricing_path = Some(PathBuf::from(v));
        }

        s.validate()?;
        Ok(s)
    }

    fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(invalid("MAX_ITERATIONS must be at least 1".to_string()));
        }
        if self.memory_limit_bytes < 4 * 1024 * 1024 {
            return Err(invalid("MEMORY_LIMIT below 4 MiB is not runnable".to_string()));
        }
        if self.max_budget_dollars <= Decimal::ZERO {
            return Err(invalid("MAX_BUDGET_DOLLARS must be positive".to_string()));
        }
        Ok(())
    }
}

fn var(key: &str) -> Option<String> {
    std::env::var(format!("{PREFIX}{key}"))
        .ok()
        .filter(|v| !v.is_empty())
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::Configuration {
        reason: reason.into(),
    }
}

fn parse_flag(v: &str) -> Result<bool> {
    match v {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(invalid(format!("'{other}' is not a boolean flag"))),
    }
}

fn parse_num<T: std::str::FromStr>(v: &str, key: &str) -> Result<T> {
    v.parse()
        .map_err(|_| invalid(format!("{key}: '{v}' is not a valid number")))
}

/// Parse docker-style byte sizes: `256m`, `1g`, `512k`, or plain bytes.
pub fn parse_byte_size(v: &str) -> Result<u64> {
    let v = v.trim().to_lowercase();
    let (digits, multiplier) = match v.chars().last() {
        Some('k') => (&v[..v.len() - 1], 1024u64),
        Some('m') => (&v[..v.len() - 1], 1024 * 1024),
        Some('g') => (&v[..v.len() - 1], 1024 * 1024 * 1024),
        _ => (v.as_str(), 1),
    };
    let n: u64 = digits
        .parse()
        .map_err(|_| invalid(format!("MEMORY_LIMIT: '{v}' is not a byte size")))?;
    Ok(n * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_sizes() {
        assert_eq!(parse_byte_size("256m").unwrap(), 256 * 1024 * 1024);
        assert_eq!(parse_byte_size("1g").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_byte_size("4096").unwrap(), 4096);
        assert!(parse_byte_size("lots").is_err());
    }

    #[test]
    fn defaults_match_contract() {
        let s = Settings::default();
        assert_eq!(s.container_image, "python:3.11-slim");
        assert_eq!(s.memory_limit_bytes, 256 * 1024 * 1024);
        assert!(!s.allow_unsafe_runtime);
        assert!(!s.network_enabled);
        assert_eq!(s.max_stdout_bytes, 4000);
        assert_eq!(s.max_iterations, 10);
    }

    #[test]
    fn runtime_selector_parsing() {
        assert_eq!(
            "secure".parse::<RuntimeSelector>().unwrap(),
            RuntimeSelector::Secure
        );
        assert_eq!(
            "runc".parse::<RuntimeSelector>().unwrap(),
            RuntimeSelector::Standard
        );
        assert!("vm".parse::<RuntimeSelector>().is_err());
    }
}
