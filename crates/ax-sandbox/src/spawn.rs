//! Agent process supervision.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{SandboxError, SandboxResult};
use crate::kind::SandboxKind;

/// Everything needed to launch one agent run.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    /// Agent binary.
    pub program: PathBuf,
    /// Arguments (socket paths, workspace, skills dir).
    pub args: Vec<String>,
    /// Workspace directory mounted into the sandbox.
    pub workspace: PathBuf,
    /// Directory holding the IPC and proxy sockets.
    pub socket_dir: PathBuf,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Memory cap in MiB.
    pub memory_mb: u64,
    /// Image used by the docker backend.
    pub docker_image: String,
}

/// Result of a completed (or killed) agent run.
#[derive(Debug)]
pub struct RunOutput {
    /// Collected stdout (the assistant turn).
    pub stdout: String,
    /// Collected stderr (agent diagnostics).
    pub stderr: String,
    /// Exit code, when the process exited on its own.
    pub exit_code: Option<i32>,
    /// Whether the timeout fired.
    pub timed_out: bool,
}

/// Launches and supervises agent processes for one backend.
#[derive(Debug, Clone)]
pub struct SandboxLauncher {
    kind: SandboxKind,
    timeout: Duration,
}

impl SandboxLauncher {
    /// Create a launcher.
    #[must_use]
    pub fn new(kind: SandboxKind, timeout: Duration) -> Self {
        Self { kind, timeout }
    }

    /// The backend in use.
    #[must_use]
    pub fn kind(&self) -> SandboxKind {
        self.kind
    }

    /// Run the agent to completion.
    ///
    /// `stdin_payload` is written and stdin closed; stdout lines are
    /// forwarded to `stdout_tx` as they arrive (streaming to the caller)
    /// while also being collected. On timeout the process is killed
    /// (SIGTERM with a grace period for container backends, SIGKILL
    /// otherwise) and `timed_out` is set. Cancelling `cancel` kills the
    /// process the same way; the run then fails with
    /// [`SandboxError::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned, its pipes cannot
    /// be driven, or the run is cancelled.
    pub async fn run(
        &self,
        spec: &SpawnSpec,
        stdin_payload: &[u8],
        stdout_tx: Option<mpsc::Sender<String>>,
        cancel: CancellationToken,
    ) -> SandboxResult<RunOutput> {
        let mut command = self.kind.build_command(spec);
        command
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| SandboxError::SpawnFailed(format!("{}: {e}", self.kind)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A fast-exiting child may close stdin before we write; that is
            // its prerogative, not a spawn failure.
            if let Err(e) = stdin.write_all(stdin_payload).await {
                debug!(error = %e, "Agent did not consume stdin");
            }
            let _ = stdin.shutdown().await;
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::SpawnFailed("no stdout pipe".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SandboxError::SpawnFailed("no stderr pipe".to_string()))?;

        let stdout_task = tokio::spawn(async move {
            let mut collected = String::new();
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(ref tx) = stdout_tx {
                    let _ = tx.send(line.clone()).await;
                }
                collected.push_str(&line);
                collected.push('\n');
            }
            collected
        });
        let stderr_task = tokio::spawn(async move {
            let mut collected = String::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push_str(&line);
                collected.push('\n');
            }
            collected
        });

        let mut timed_out = false;
        let exit_code = tokio::select! {
            waited = tokio::time::timeout(self.timeout, child.wait()) => match waited {
                Ok(Ok(status)) => status.code(),
                Ok(Err(e)) => return Err(SandboxError::Io(e)),
                Err(_) => {
                    timed_out = true;
                    warn!(kind = %self.kind, timeout_secs = self.timeout.as_secs(), "Agent timed out, killing");
                    self.kill(&mut child).await;
                    None
                },
            },
            () = cancel.cancelled() => {
                info!(kind = %self.kind, "Run cancelled, killing agent");
                self.kill(&mut child).await;
                return Err(SandboxError::Cancelled);
            },
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        debug!(kind = %self.kind, ?exit_code, timed_out, "Agent run finished");

        Ok(RunOutput {
            stdout,
            stderr,
            exit_code,
            timed_out,
        })
    }

    /// Kill a runaway child. Container backends get SIGTERM plus a grace
    /// window; everything else gets SIGKILL immediately.
    async fn kill(&self, child: &mut tokio::process::Child) {
        if self.kind.graceful_kill()
            && let Some(pid) = child.id().and_then(|p| i32::try_from(p).ok())
        {
            let _ = signal::kill(Pid::from_raw(pid), Signal::SIGTERM);
            if tokio::time::timeout(Duration::from_secs(2), child.wait())
                .await
                .is_ok()
            {
                return;
            }
        }
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}
