//! Bootstrap gate.
//!
//! While an agent has operator rules (`BOOTSTRAP.md`) but has not yet
//! written its own `SOUL.md`, only listed admins may interact. The admins
//! file is re-read on every check so operators can amend it without a
//! restart.

use std::path::PathBuf;
use tracing::debug;

/// Canned reply for non-admins during bootstrap.
pub const BOOTSTRAP_REPLY: &str =
    "This agent is still being set up by its operator. Please try again later.";

/// Gate over one agent's directory.
#[derive(Debug, Clone)]
pub struct BootstrapGate {
    agent_dir: PathBuf,
}

impl BootstrapGate {
    /// Create a gate for `agents/<name>/`.
    #[must_use]
    pub fn new(agent_dir: impl Into<PathBuf>) -> Self {
        Self {
            agent_dir: agent_dir.into(),
        }
    }

    /// Whether the agent is in bootstrap mode.
    #[must_use]
    pub fn is_bootstrap(&self) -> bool {
        self.agent_dir.join("BOOTSTRAP.md").exists() && !self.agent_dir.join("SOUL.md").exists()
    }

    /// Whether `user_id` is an admin. The `admins` file holds one ID per
    /// line; blank lines and `#` comments are ignored.
    #[must_use]
    pub fn is_admin(&self, user_id: &str) -> bool {
        let Ok(contents) = std::fs::read_to_string(self.agent_dir.join("admins")) else {
            return false;
        };
        contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .any(|l| l == user_id)
    }

    /// Whether this sender may interact right now. Outside bootstrap mode
    /// everyone may; inside it, admins only.
    #[must_use]
    pub fn allows(&self, user_id: Option<&str>) -> bool {
        if !self.is_bootstrap() {
            return true;
        }
        let allowed = user_id.is_some_and(|id| self.is_admin(id));
        debug!(allowed, "Bootstrap gate check");
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gate(dir: &TempDir) -> BootstrapGate {
        BootstrapGate::new(dir.path())
    }

    #[test]
    fn test_not_bootstrap_without_files() {
        let dir = TempDir::new().unwrap();
        assert!(!gate(&dir).is_bootstrap());
        assert!(gate(&dir).allows(None));
    }

    #[test]
    fn test_bootstrap_admits_admins_only() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("BOOTSTRAP.md"), "setup").unwrap();
        std::fs::write(dir.path().join("admins"), "# ops\nalice\nbob\n").unwrap();

        let gate = gate(&dir);
        assert!(gate.is_bootstrap());
        assert!(gate.allows(Some("alice")));
        assert!(!gate.allows(Some("mallory")));
        assert!(!gate.allows(None));
    }

    #[test]
    fn test_soul_ends_bootstrap() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("BOOTSTRAP.md"), "setup").unwrap();
        std::fs::write(dir.path().join("SOUL.md"), "I exist").unwrap();
        assert!(!gate(&dir).is_bootstrap());
        assert!(gate(&dir).allows(Some("anyone")));
    }

    #[test]
    fn test_admins_refreshed_each_call() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("BOOTSTRAP.md"), "setup").unwrap();
        std::fs::write(dir.path().join("admins"), "alice\n").unwrap();

        let gate = gate(&dir);
        assert!(!gate.allows(Some("carol")));
        std::fs::write(dir.path().join("admins"), "alice\ncarol\n").unwrap();
        assert!(gate.allows(Some("carol")));
    }
}
