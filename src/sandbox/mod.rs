//! Disposable, isolated execution of untrusted code.
//!
//! Every snippet runs in its own ephemeral Docker container:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Sandbox Container                        │
//! │                                                              │
//! │  Runtime:  runsc (user-space kernel) unless opted out        │
//! │  Network:  none (bridge only with explicit opt-in)           │
//! │  Mounts:   /sandbox      ─▶ scratch dir with main.py (ro)    │
//! │            /mnt/context  ─▶ optional context file (ro)       │
//! │  Limits:   memory = swap, fractional CPU, pids cap           │
//! │  Privs:    no-new-privileges, ipc=none                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Timeouts, OOM kills, and non-zero exits are normal [`ExecutionResult`]
//! outcomes; only daemon/image/runtime trouble is an error.

mod config;
mod runner;
mod supervisor;

pub use config::SandboxConfig;
pub use runner::CodeRunner;
pub use supervisor::{DockerSupervisor, ExecutionResult, SecurityAudit, connect_docker};

/// Fixed in-container mount point for the agent's context file.
pub const CONTEXT_MOUNT_PATH: &str = "/mnt/context";
/// Fixed in-container mount point for the scratch directory.
pub const SANDBOX_MOUNT_PATH: &str = "/sandbox";
