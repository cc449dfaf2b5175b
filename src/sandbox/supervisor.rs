//! Docker container lifecycle for one untrusted execution.
//!
//! The supervisor owns its container from create to removal. Every exit
//! path — clean exit, timeout, OOM kill, daemon error, task cancellation —
//! ends with the container force-removed and the scratch directory gone.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    WaitContainerOptions,
};
use bollard::models::HostConfig;
use futures::StreamExt;
use tokio::sync::OnceCell;

use crate::error::SandboxError;
use crate::sandbox::config::SandboxConfig;
use crate::sandbox::runner::CodeRunner;
use crate::sandbox::{CONTEXT_MOUNT_PATH, SANDBOX_MOUNT_PATH};
use crate::settings::RuntimeSelector;

/// Name of the user-space-kernel runtime as the daemon registers it.
const SECURE_RUNTIME: &str = "runsc";
/// Grace period between stop and kill on timeout.
const STOP_GRACE_SECS: i64 = 2;
/// Conventional exit code reported for timed-out runs.
const TIMEOUT_EXIT_CODE: i64 = 124;

/// Helper module mounted read-only into every context-bearing sandbox.
///
/// User code imports `ContextHandle` from here; the module file sits next to
/// `main.py`, so the script directory on `sys.path` resolves it. No code is
/// ever spliced into the user's snippet beyond the two-line prelude.
const HELPER_MODULE: &str = r#""""Read-only access to the mounted context file."""

import os
import re

_CONTEXT_PATH = "/mnt/context"


class ContextHandle:
    def __init__(self, path=_CONTEXT_PATH):
        if not os.path.exists(path):
            raise FileNotFoundError(f"context file not found at {path}")
        self.path = path
        self._size = os.path.getsize(path)

    @property
    def size(self):
        return self._size

    def read(self, start, length):
        start = max(0, start)
        with open(self.path, "r", encoding="utf-8", errors="replace") as f:
            f.seek(start)
            return f.read(length)

    def read_window(self, offset, radius=500):
        return self.read(max(0, offset - radius), radius * 2)

    def snippet(self, offset, window=500):
        return self.read_window(offset, window // 2)

    def head(self, n=1000):
        return self.read(0, n)

    def tail(self, n=1000):
        return self.read(max(0, self._size - n), n)

    def search(self, pattern, max_results=10):
        matches = []
        offset = 0
        compiled = re.compile(pattern)
        with open(self.path, "r", encoding="utf-8", errors="replace") as f:
            for line in f:
                for m in compiled.finditer(line):
                    matches.append((offset + m.start(), m.group()))
                    if len(matches) >= max_results:
                        return matches
                offset += len(line)
        return matches
"#;

/// Two-line prelude for context-bearing runs.
const CONTEXT_PRELUDE: &str = "from agentctx import ContextHandle\nctx = ContextHandle()\n\n";

/// What happened inside one sandbox run.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Captured stdout, bounded by the per-stream cap.
    pub stdout: String,
    /// Captured stderr, bounded by the per-stream cap.
    pub stderr: String,
    /// Exit status reported by the daemon.
    pub exit_code: i64,
    /// The wall-clock timer fired before the container exited.
    pub timed_out: bool,
    /// The kernel OOM killer terminated the container.
    pub oom_killed: bool,
    /// Wall-clock duration of the run.
    pub duration: Duration,
    /// Either stream hit the capture cap.
    pub truncated: bool,
}

impl ExecutionResult {
    /// Clean exit with no resource-limit kill.
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out && !self.oom_killed
    }
}

/// Security posture snapshot for the `security-check` command.
#[derive(Debug, Clone)]
pub struct SecurityAudit {
    pub daemon_available: bool,
    pub secure_runtime: bool,
    pub network_disabled: bool,
    pub memory_limited: bool,
    pub pids_limited: bool,
}

/// Connect to the Docker daemon.
///
/// Tries these locations in order:
/// 1. `DOCKER_HOST` env var (bollard default)
/// 2. `/var/run/docker.sock` (Linux default)
/// 3. `~/.docker/run/docker.sock` (Docker Desktop on macOS)
pub async fn connect_docker() -> Result<Docker, SandboxError> {
    if let Ok(docker) = Docker::connect_with_local_defaults()
        && docker.ping().await.is_ok()
    {
        return Ok(docker);
    }

    if let Some(home) = std::env::var_os("HOME") {
        let desktop_sock = Path::new(&home).join(".docker/run/docker.sock");
        if desktop_sock.exists() {
            let sock_str = desktop_sock.to_string_lossy();
            if let Ok(docker) =
                Docker::connect_with_socket(&sock_str, 120, bollard::API_DEFAULT_VERSION)
                && docker.ping().await.is_ok()
            {
                return Ok(docker);
            }
        }
    }

    Err(SandboxError::daemon(
        "socket not found: /var/run/docker.sock",
    ))
}

/// Supervisor for disposable hardened containers.
///
/// Safe to share across tasks; each execution gets its own container and
/// scratch directory and shares nothing mutable with any other run.
pub struct DockerSupervisor {
    docker: Docker,
    config: SandboxConfig,
    resolved_runtime: OnceCell<Option<String>>,
}

impl DockerSupervisor {
    pub fn new(docker: Docker, config: SandboxConfig) -> Self {
        Self {
            docker,
            config,
            resolved_runtime: OnceCell::new(),
        }
    }

    /// Connect to the daemon and build a supervisor.
    pub async fn connect(config: SandboxConfig) -> Result<Self, SandboxError> {
        let docker = connect_docker().await?;
        Ok(Self::new(docker, config))
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Resolve which runtime this supervisor will use, fail-closed.
    ///
    /// `Some(name)` selects a daemon runtime explicitly; `None` means the
    /// daemon default (only reachable through an explicit opt-out).
    async fn runtime(&self) -> Result<Option<String>, SandboxError> {
        self.resolved_runtime
            .get_or_try_init(|| async {
                match self.config.runtime {
                    RuntimeSelector::Secure => {
                        if self.secure_runtime_present().await? {
                            Ok(Some(SECURE_RUNTIME.to_string()))
                        } else {
                            Err(SandboxError::SecurityViolation {
                                reason: format!(
                                    "secure runtime '{SECURE_RUNTIME}' required but not registered with the daemon"
                                ),
                            })
                        }
                    }
                    RuntimeSelector::Standard => {
                        if self.config.allow_unsafe_runtime {
                            tracing::warn!(
                                "running with the default runtime by explicit configuration"
                            );
                            Ok(None)
                        } else {
                            Err(SandboxError::SecurityViolation {
                                reason: "standard runtime requested without allow_unsafe_runtime"
                                    .to_string(),
                            })
                        }
                    }
                    RuntimeSelector::Auto => {
                        if self.secure_runtime_present().await? {
                            tracing::info!("secure runtime '{SECURE_RUNTIME}' detected");
                            Ok(Some(SECURE_RUNTIME.to_string()))
                        } else if self.config.allow_unsafe_runtime {
                            tracing::warn!(
                                "secure runtime '{SECURE_RUNTIME}' not found; falling back to the default runtime"
                            );
                            Ok(None)
                        } else {
                            Err(SandboxError::SecurityViolation {
                                reason: format!(
                                    "secure runtime '{SECURE_RUNTIME}' not found and unsafe fallback is disabled"
                                ),
                            })
                        }
                    }
                }
            })
            .await
            .cloned()
    }

    async fn secure_runtime_present(&self) -> Result<bool, SandboxError> {
        let info = self
            .docker
            .info()
            .await
            .map_err(|e| SandboxError::daemon(e.to_string()))?;
        Ok(info
            .runtimes
            .map(|r| r.contains_key(SECURE_RUNTIME))
            .unwrap_or(false))
    }

    async fn ensure_image(&self) -> Result<(), SandboxError> {
        if self.docker.inspect_image(&self.config.image).await.is_ok() {
            return Ok(());
        }

        tracing::info!("pulling sandbox image: {}", self.config.image);
        let options = bollard::image::CreateImageOptions {
            from_image: self.config.image.clone(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| SandboxError::image(format!("image pull failed: {e}")))?;
        }
        Ok(())
    }

    /// Audit the security posture without executing anything.
    pub async fn validate_security(&self) -> SecurityAudit {
        let daemon_available = self.docker.ping().await.is_ok();
        let secure_runtime = match self.secure_runtime_present().await {
            Ok(present) => present,
            Err(_) => false,
        };
        SecurityAudit {
            daemon_available,
            secure_runtime,
            network_disabled: !self.config.network_enabled,
            memory_limited: self.config.memory_limit_bytes > 0,
            pids_limited: self.config.pids_limit < 100,
        }
    }

    /// Execute one snippet in a fresh container.
    pub async fn execute(
        &self,
        code: &str,
        context_mount: Option<&Path>,
    ) -> Result<ExecutionResult, SandboxError> {
        let start_time = Instant::now();
        let runtime = self.runtime().await?;
        self.ensure_image().await?;

        // Scratch directory holding the entry point and helper module,
        // mounted read-only. TempDir removes it on every exit path.
        let scratch = tempfile::tempdir()?;
        let main_py = match context_mount {
            Some(_) => format!("{CONTEXT_PRELUDE}{code}\n"),
            None => format!("{code}\n"),
        };
        tokio::fs::write(scratch.path().join("main.py"), main_py).await?;
        if context_mount.is_some() {
            tokio::fs::write(scratch.path().join("agentctx.py"), HELPER_MODULE).await?;
        }

        let mut binds = vec![format!(
            "{}:{}:ro",
            scratch.path().display(),
            SANDBOX_MOUNT_PATH
        )];
        if let Some(ctx) = context_mount {
            binds.push(format!("{}:{}:ro", ctx.display(), CONTEXT_MOUNT_PATH));
        }

        let network_mode = if self.config.network_enabled {
            tracing::warn!("sandbox network access enabled; container gets a bridge interface");
            "bridge"
        } else {
            "none"
        };

        let host_config = HostConfig {
            binds: Some(binds),
            memory: Some(self.config.memory_limit_bytes as i64),
            // Swap pinned to memory: the ceiling is the ceiling.
            memory_swap: Some(self.config.memory_limit_bytes as i64),
            nano_cpus: Some(self.config.nano_cpus()),
            pids_limit: Some(self.config.pids_limit),
            security_opt: Some(vec!["no-new-privileges:true".to_string()]),
            ipc_mode: Some("none".to_string()),
            network_mode: Some(network_mode.to_string()),
            runtime: runtime.clone(),
            ..Default::default()
        };

        let config = Config {
            image: Some(self.config.image.clone()),
            cmd: Some(vec![
                "python3".to_string(),
                format!("{SANDBOX_MOUNT_PATH}/main.py"),
            ]),
            working_dir: Some(SANDBOX_MOUNT_PATH.to_string()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: format!("crucible-{}", uuid::Uuid::new_v4()),
            ..Default::default()
        };

        let container_id = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| SandboxError::internal(format!("container create failed: {e}")))?
            .id;

        // From here on the guard guarantees removal, including when the
        // caller's task is cancelled at an await point.
        let mut guard = ContainerGuard::new(self.docker.clone(), container_id.clone());

        tracing::debug!(
            container = %container_id,
            runtime = runtime.as_deref().unwrap_or("default"),
            network = network_mode,
            "starting sandbox"
        );

        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SandboxError::internal(format!("container start failed: {e}")))?;

        let wait_outcome =
            tokio::time::timeout(self.config.timeout, self.wait_for_exit(&container_id)).await;

        let (exit_code, timed_out) = match wait_outcome {
            Ok(Ok(code)) => (code, false),
            Ok(Err(e)) => {
                guard.remove_now().await;
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(container = %container_id, "sandbox timed out; stopping");
                let stopped = self
                    .docker
                    .stop_container(
                        &container_id,
                        Some(StopContainerOptions { t: STOP_GRACE_SECS }),
                    )
                    .await
                    .is_ok();
                if !stopped {
                    let _ = self
                        .docker
                        .kill_container(&container_id, None::<KillContainerOptions<String>>)
                        .await;
                }
                (TIMEOUT_EXIT_CODE, true)
            }
        };

        let (stdout, stderr, truncated) = self.collect_logs(&container_id).await;
        let oom_killed = self.was_oom_killed(&container_id).await;

        guard.remove_now().await;

        Ok(ExecutionResult {
            stdout,
            stderr,
            exit_code,
            timed_out,
            oom_killed,
            duration: start_time.elapsed(),
            truncated,
        })
    }

    async fn wait_for_exit(&self, container_id: &str) -> Result<i64, SandboxError> {
        let mut wait_stream = self.docker.wait_container(
            container_id,
            Some(WaitContainerOptions {
                condition: "not-running",
            }),
        );

        match wait_stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // Non-zero exits surface as a typed error on some daemon
            // versions; the code is still a normal outcome.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(SandboxError::internal(format!("container wait failed: {e}"))),
            None => Err(SandboxError::internal(
                "container wait stream ended unexpectedly",
            )),
        }
    }

    /// Collect stdout and stderr, each bounded by the per-stream cap.
    async fn collect_logs(&self, container_id: &str) -> (String, String, bool) {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            ..Default::default()
        };

        let mut stream = self.docker.logs(container_id, Some(options));
        let cap = self.config.max_stream_bytes;
        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut truncated = false;

        while let Some(result) = stream.next().await {
            match result {
                Ok(LogOutput::StdOut { message }) => {
                    append_bounded(&mut stdout, &message, cap, &mut truncated);
                }
                Ok(LogOutput::StdErr { message }) => {
                    append_bounded(&mut stderr, &message, cap, &mut truncated);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("error reading container logs: {e}");
                    break;
                }
            }
        }

        (stdout, stderr, truncated)
    }

    async fn was_oom_killed(&self, container_id: &str) -> bool {
        self.docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .ok()
            .and_then(|inspect| inspect.state)
            .and_then(|state| state.oom_killed)
            .unwrap_or(false)
    }
}

#[async_trait]
impl CodeRunner for DockerSupervisor {
    async fn preflight(&self) -> Result<(), SandboxError> {
        self.docker
            .ping()
            .await
            .map_err(|e| SandboxError::daemon(e.to_string()))?;
        self.runtime().await?;
        Ok(())
    }

    async fn run_code(
        &self,
        code: &str,
        context_mount: Option<&Path>,
    ) -> Result<ExecutionResult, SandboxError> {
        self.execute(code, context_mount).await
    }
}

fn append_bounded(buf: &mut String, chunk: &[u8], cap: usize, truncated: &mut bool) {
    if buf.len() >= cap {
        *truncated = true;
        return;
    }
    let text = String::from_utf8_lossy(chunk);
    let remaining = cap - buf.len();
    if text.len() > remaining {
        let mut cut = remaining;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        buf.push_str(&text[..cut]);
        *truncated = true;
    } else {
        buf.push_str(&text);
    }
}

/// Removal guard: if an execution is cancelled mid-flight, the container is
/// still force-removed in the background.
struct ContainerGuard {
    docker: Docker,
    id: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(docker: Docker, id: String) -> Self {
        Self {
            docker,
            id,
            armed: true,
        }
    }

    async fn remove_now(&mut self) {
        self.armed = false;
        let _ = self
            .docker
            .remove_container(
                &self.id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let docker = self.docker.clone();
        let id = self.id.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = docker
                    .remove_container(
                        &id,
                        Some(RemoveContainerOptions {
                            force: true,
                            ..Default::default()
                        }),
                    )
                    .await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_derivation() {
        let base = ExecutionResult {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
            timed_out: false,
            oom_killed: false,
            duration: Duration::ZERO,
            truncated: false,
        };
        assert!(base.success());
        assert!(
            !ExecutionResult {
                exit_code: 1,
                ..base.clone()
            }
            .success()
        );
        assert!(
            !ExecutionResult {
                timed_out: true,
                ..base.clone()
            }
            .success()
        );
        assert!(
            !ExecutionResult {
                oom_killed: true,
                ..base
            }
            .success()
        );
    }

    #[test]
    fn bounded_append_respects_cap() {
        let mut buf = String::new();
        let mut truncated = false;
        append_bounded(&mut buf, &[b'a'; 100], 64, &mut truncated);
        assert_eq!(buf.len(), 64);
        assert!(truncated);

        append_bounded(&mut buf, b"more", 64, &mut truncated);
        assert_eq!(buf.len(), 64);
    }

    #[test]
    fn helper_module_is_self_contained() {
        // The helper must not import anything beyond the stdlib and must
        // reference the fixed mount path.
        assert!(HELPER_MODULE.contains("/mnt/context"));
        assert!(!HELPER_MODULE.contains("import requests"));
        assert!(HELPER_MODULE.contains("class ContextHandle"));
    }

    #[tokio::test]
    async fn docker_connection_smoke() {
        // Requires a running daemon; skip quietly otherwise.
        let Ok(docker) = connect_docker().await else {
            eprintln!("skipping Docker test: daemon not available");
            return;
        };
        let supervisor = DockerSupervisor::new(docker, SandboxConfig::default());
        let audit = supervisor.validate_security().await;
        assert!(audit.daemon_available);
        assert!(audit.network_disabled);
    }
}
