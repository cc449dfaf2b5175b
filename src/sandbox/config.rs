//! Per-execution sandbox configuration.

use std::time::Duration;

use crate::settings::{RuntimeSelector, Settings};

/// Immutable configuration applied to exactly one sandbox run.
///
/// A restart never reuses a config object; callers build a fresh one (or
/// clone this one) per execution, so a run can never observe a mutation.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Container image for the sandbox.
    pub image: String,
    /// Wall-clock execution timeout.
    pub timeout: Duration,
    /// Memory ceiling in bytes; swap is pinned to the same value.
    pub memory_limit_bytes: u64,
    /// Fractional CPU cores.
    pub cpu_limit: f64,
    /// Max processes inside the container.
    pub pids_limit: i64,
    /// Runtime selection policy.
    pub runtime: RuntimeSelector,
    /// Give the container a bridge network. Logged when set.
    pub network_enabled: bool,
    /// Permit running without the user-space-kernel runtime.
    pub allow_unsafe_runtime: bool,
    /// Per-stream capture cap in bytes.
    pub max_stream_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "python:3.11-slim".to_string(),
            timeout: Duration::from_secs(30),
            memory_limit_bytes: 256 * 1024 * 1024,
            cpu_limit: 0.5,
            pids_limit: 50,
            runtime: RuntimeSelector::Auto,
            network_enabled: false,
            allow_unsafe_runtime: false,
            max_stream_bytes: 64 * 1024,
        }
    }
}

impl SandboxConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            image: settings.container_image.clone(),
            timeout: settings.execution_timeout,
            memory_limit_bytes: settings.memory_limit_bytes,
            cpu_limit: settings.cpu_limit,
            pids_limit: settings.pids_limit,
            runtime: settings.runtime,
            network_enabled: settings.network_enabled,
            allow_unsafe_runtime: settings.allow_unsafe_runtime,
            max_stream_bytes: 64 * 1024,
        }
    }

    /// CPU quota in the daemon's nano-cpu unit.
    pub fn nano_cpus(&self) -> i64 {
        (self.cpu_limit * 1_000_000_000.0) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_hardened() {
        let c = SandboxConfig::default();
        assert!(!c.network_enabled);
        assert!(!c.allow_unsafe_runtime);
        assert_eq!(c.pids_limit, 50);
        assert_eq!(c.nano_cpus(), 500_000_000);
    }

    #[test]
    fn from_settings_copies_limits() {
        let mut s = Settings::default();
        s.cpu_limit = 2.0;
        s.pids_limit = 10;
        let c = SandboxConfig::from_settings(&s);
        assert_eq!(c.nano_cpus(), 2_000_000_000);
        assert_eq!(c.pids_limit, 10);
    }
}
