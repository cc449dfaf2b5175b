//! Execution seam between the agent loop and the container stack.

use std::path::Path;

use async_trait::async_trait;

use crate::error::SandboxError;
use crate::sandbox::supervisor::ExecutionResult;

/// Anything that can run one untrusted snippet and report what happened.
///
/// The Docker supervisor is the production implementation; tests drive the
/// agent loop with scripted runners.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Verify the runner can execute at all (daemon reachable, runtime
    /// policy satisfiable). Called once before the first iteration so
    /// fail-closed refusals happen before any model tokens are spent.
    async fn preflight(&self) -> Result<(), SandboxError> {
        Ok(())
    }

    /// Execute `code` in a fresh sandbox, optionally mounting a context
    /// file read-only at the fixed in-container path.
    async fn run_code(
        &self,
        code: &str,
        context_mount: Option<&Path>,
    ) -> Result<ExecutionResult, SandboxError>;
}
