//! Error taxonomy for the supervisor.
//!
//! Every failure class callers need to distinguish is a separate variant with
//! a stable `code()` string for programmatic handling. Sandbox outcomes that
//! the agent can recover from (timeout, OOM, non-zero exit) are *not* errors;
//! they travel inside `ExecutionResult`.

use std::path::PathBuf;

use crate::egress::EgressEvent;

/// Which part of the container stack failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxFault {
    /// Daemon unreachable or not responding.
    Daemon,
    /// Image missing and could not be pulled.
    Image,
    /// Requested runtime is not registered with the daemon.
    Runtime,
    /// Anything else on the supervisor's side.
    Internal,
}

impl SandboxFault {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxFault::Daemon => "daemon",
            SandboxFault::Image => "image",
            SandboxFault::Runtime => "runtime",
            SandboxFault::Internal => "internal",
        }
    }
}

/// Errors from the sandbox supervisor.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Container stack failure (daemon, image, runtime, internal).
    #[error("sandbox {}: {reason}", kind.as_str())]
    Failed { kind: SandboxFault, reason: String },

    /// The secure runtime is required but absent and fallback is not allowed.
    #[error("security violation: {reason}")]
    SecurityViolation { reason: String },

    /// I/O while staging the scratch directory.
    #[error("scratch I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    pub fn daemon(reason: impl Into<String>) -> Self {
        SandboxError::Failed {
            kind: SandboxFault::Daemon,
            reason: reason.into(),
        }
    }

    pub fn image(reason: impl Into<String>) -> Self {
        SandboxError::Failed {
            kind: SandboxFault::Image,
            reason: reason.into(),
        }
    }

    pub fn runtime(reason: impl Into<String>) -> Self {
        SandboxError::Failed {
            kind: SandboxFault::Runtime,
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        SandboxError::Failed {
            kind: SandboxFault::Internal,
            reason: reason.into(),
        }
    }
}

/// Errors from LLM providers.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Missing or rejected credentials.
    #[error("authentication failed for provider '{provider}'")]
    AuthFailed { provider: String },

    /// Transport or HTTP-level failure.
    #[error("request to '{provider}' failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    /// Provider asked us to back off.
    #[error("rate limited by '{provider}'")]
    RateLimited {
        provider: String,
        retry_after: Option<std::time::Duration>,
    },

    /// Response body did not match the expected schema.
    #[error("invalid response from '{provider}': {reason}")]
    InvalidResponse { provider: String, reason: String },
}

impl LlmError {
    /// Whether a single retry with backoff is worth attempting.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RequestFailed { .. } | LlmError::RateLimited { .. }
        )
    }
}

/// Top-level error for the supervisor.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Secure runtime required and absent, or a forbidden opt-out.
    #[error("security violation: {reason}")]
    SecurityViolation { reason: String },

    /// The egress filter fired a non-truncation event under `raise_on_leak`.
    #[error("data leakage detected: {} event(s)", events.len())]
    DataLeakage { events: Vec<EgressEvent> },

    /// Container stack failure.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// Context file is binary and was refused at open.
    #[error("context file is binary: {path}")]
    ContextBinary { path: PathBuf, detail: String },

    /// Context file missing or unreadable.
    #[error("context file not found: {path}")]
    ContextNotFound { path: PathBuf },

    /// Hard cost ceiling reached.
    #[error("budget exceeded: spent ${spent} of ${limit}")]
    BudgetExceeded {
        spent: rust_decimal::Decimal,
        limit: rust_decimal::Decimal,
    },

    /// Provider failure that survived the retry policy.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Invalid configuration at boot.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    /// The model produced nothing actionable after a retry.
    #[error("no actionable code or final answer in model output")]
    ParseFailure,
}

impl Error {
    /// Stable machine-readable code for each failure class.
    pub fn code(&self) -> &'static str {
        match self {
            Error::SecurityViolation { .. } => "security_violation",
            Error::DataLeakage { .. } => "data_leak",
            Error::Sandbox(SandboxError::SecurityViolation { .. }) => "security_violation",
            Error::Sandbox(_) => "sandbox",
            Error::ContextBinary { .. } => "context_binary",
            Error::ContextNotFound { .. } => "context_not_found",
            Error::BudgetExceeded { .. } => "budget_exceeded",
            Error::Llm(_) => "llm",
            Error::Configuration { .. } => "config",
            Error::ParseFailure => "parse_failure",
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            Error::SecurityViolation {
                reason: "x".into()
            }
            .code(),
            "security_violation"
        );
        assert_eq!(Error::Sandbox(SandboxError::daemon("down")).code(), "sandbox");
        assert_eq!(
            Error::Sandbox(SandboxError::SecurityViolation {
                reason: "runsc missing".into()
            })
            .code(),
            "security_violation"
        );
        assert_eq!(Error::ParseFailure.code(), "parse_failure");
    }

    #[test]
    fn transient_llm_errors() {
        assert!(
            LlmError::RequestFailed {
                provider: "openai".into(),
                reason: "timeout".into()
            }
            .is_transient()
        );
        assert!(
            !LlmError::AuthFailed {
                provider: "openai".into()
            }
            .is_transient()
        );
    }
}
