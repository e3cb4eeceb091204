//! Sandbox backend selection and command construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::process::Command;

use crate::spawn::SpawnSpec;

/// The closed set of sandbox backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxKind {
    /// Plain child process. The portable floor; isolation comes only from
    /// the agent's own path discipline.
    Subprocess,
    /// macOS `sandbox-exec` profile.
    Seatbelt,
    /// Linux nsjail.
    Nsjail,
    /// Docker container.
    Docker,
}

impl SandboxKind {
    /// Parse a config selector value.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "subprocess" => Some(Self::Subprocess),
            "seatbelt" => Some(Self::Seatbelt),
            "nsjail" => Some(Self::Nsjail),
            "docker" => Some(Self::Docker),
            _ => None,
        }
    }

    /// Whether the host sends SIGTERM with a grace period before SIGKILL.
    /// Container backends get the grace; raw subprocesses are killed hard.
    #[must_use]
    pub fn graceful_kill(self) -> bool {
        matches!(self, Self::Docker | Self::Nsjail)
    }

    /// Build the spawn command for this backend.
    #[must_use]
    pub fn build_command(self, spec: &SpawnSpec) -> Command {
        match self {
            Self::Subprocess => {
                let mut cmd = Command::new(&spec.program);
                cmd.args(&spec.args);
                cmd
            },
            Self::Seatbelt => {
                let mut cmd = Command::new("sandbox-exec");
                cmd.arg("-p")
                    .arg(seatbelt_profile(spec))
                    .arg(&spec.program)
                    .args(&spec.args);
                cmd
            },
            Self::Nsjail => {
                let mut cmd = Command::new("nsjail");
                cmd.arg("--quiet")
                    .arg("--mode")
                    .arg("o")
                    .arg("--bindmount")
                    .arg(format!("{0}:{0}", spec.workspace.display()))
                    .arg("--bindmount")
                    .arg(format!("{0}:{0}", spec.socket_dir.display()))
                    .arg("--rlimit_as")
                    .arg(spec.memory_mb.to_string())
                    .arg("--")
                    .arg(&spec.program)
                    .args(&spec.args);
                cmd
            },
            Self::Docker => {
                let mut cmd = Command::new("docker");
                cmd.arg("run")
                    .arg("--rm")
                    .arg("-i")
                    .arg("--network")
                    .arg("none")
                    .arg("--memory")
                    .arg(format!("{}m", spec.memory_mb))
                    .arg("-v")
                    .arg(format!("{}:/workspace", spec.workspace.display()))
                    .arg("-v")
                    .arg(format!("{}:/sockets", spec.socket_dir.display()))
                    .arg(&spec.docker_image)
                    .arg(&spec.program)
                    .args(&spec.args);
                cmd
            },
        }
    }
}

impl fmt::Display for SandboxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subprocess => write!(f, "subprocess"),
            Self::Seatbelt => write!(f, "seatbelt"),
            Self::Nsjail => write!(f, "nsjail"),
            Self::Docker => write!(f, "docker"),
        }
    }
}

/// Minimal seatbelt profile: deny by default, allow the workspace and the
/// socket directory.
fn seatbelt_profile(spec: &SpawnSpec) -> String {
    format!(
        "(version 1)\n(deny default)\n(allow process-exec)\n(allow process-fork)\n\
         (allow file-read* file-write* (subpath \"{}\"))\n\
         (allow file-read* file-write* (subpath \"{}\"))\n\
         (allow network-outbound (remote ip \"localhost:*\"))",
        spec.workspace.display(),
        spec.socket_dir.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn spec() -> SpawnSpec {
        SpawnSpec {
            program: PathBuf::from("/usr/local/bin/ax-agent"),
            args: vec!["--workspace".to_string(), "/tmp/w".to_string()],
            workspace: PathBuf::from("/tmp/w"),
            socket_dir: PathBuf::from("/tmp/s"),
            env: Vec::new(),
            memory_mb: 1024,
            docker_image: "ax-agent:latest".to_string(),
        }
    }

    #[test]
    fn test_parse_selector() {
        assert_eq!(SandboxKind::parse("nsjail"), Some(SandboxKind::Nsjail));
        assert_eq!(SandboxKind::parse("vmware"), None);
    }

    #[test]
    fn test_subprocess_command_is_direct() {
        let cmd = SandboxKind::Subprocess.build_command(&spec());
        assert_eq!(
            cmd.as_std().get_program().to_string_lossy(),
            "/usr/local/bin/ax-agent"
        );
    }

    #[test]
    fn test_docker_command_mounts_workspace() {
        let cmd = SandboxKind::Docker.build_command(&spec());
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert!(args.contains(&"/tmp/w:/workspace".to_string()));
        assert!(args.contains(&"--memory".to_string()));
    }

    #[test]
    fn test_kill_grace() {
        assert!(!SandboxKind::Subprocess.graceful_kill());
        assert!(SandboxKind::Docker.graceful_kill());
    }
}
