//! Structured records of sanitization actions.

use std::ops::Range;

/// Which rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EgressKind {
    /// Output exceeded the ceiling and was head/tail truncated.
    Truncated,
    /// A token run crossed the entropy threshold.
    HighEntropy,
    /// A secret pattern matched.
    SecretPattern,
    /// A line echoed the mounted context.
    ContextEcho,
    /// The buffer began with a known binary magic.
    BinaryPayload,
}

impl EgressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EgressKind::Truncated => "truncated",
            EgressKind::HighEntropy => "high_entropy",
            EgressKind::SecretPattern => "secret_pattern",
            EgressKind::ContextEcho => "context_echo",
            EgressKind::BinaryPayload => "binary_payload",
        }
    }

    /// Truncation is bookkeeping; everything else is a potential leak.
    pub fn is_leak(&self) -> bool {
        !matches!(self, EgressKind::Truncated)
    }
}

/// One sanitization action at a specific place in the buffer.
///
/// Offsets are relative to the buffer as it looked when the owning stage
/// ran, since earlier stages may already have rewritten it.
#[derive(Debug, Clone)]
pub struct EgressEvent {
    pub kind: EgressKind,
    pub range: Range<usize>,
    /// The substitution that replaced the offending bytes.
    pub placeholder: String,
}

impl std::fmt::Display for EgressEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at {}..{} -> {}",
            self.kind.as_str(),
            self.range.start,
            self.range.end,
            self.placeholder
        )
    }
}
