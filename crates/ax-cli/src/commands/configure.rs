//! `ax configure`: write a starter setup.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

const STARTER_CONFIG: &str = "\
# ax configuration
#
# profile maps to the taint threshold that gates sensitive actions:
#   paranoid    0.10
#   standard    0.30
#   power-user  0.60
profile: standard

providers:
  llm: claude            # claude | openai-compat
  memory: file           # file | memory
  audit: jsonl           # jsonl | memory
  sandbox: subprocess    # subprocess | seatbelt | nsjail | docker
  scheduler: file        # file | memory
  channels: []           # e.g. [console]

sandbox:
  timeout_secs: 300
  memory_mb: 1024

history:
  max_turns: 40
  thread_context_turns: 10

scheduler:
  active_hours_start: 0
  active_hours_end: 24
  heartbeat_interval_mins: 0

channels:
  dedup_ttl_secs: 60

logging:
  level: info
  json: false

model:
  model: claude-sonnet-4-20250514
  context_window: 200000
  max_tokens: 8192
";

const STARTER_ENV: &str = "\
# ax secrets. Keep this file 0600.
# ANTHROPIC_API_KEY=sk-ant-...
# OPENAI_API_KEY=sk-...
";

const STARTER_AGENTS: &str = "\
# Operating rules

You are a personal assistant agent. Follow your operator's instructions,
protect their data, and prefer asking over guessing.
";

const STARTER_BOOTSTRAP: &str = "\
# First run

Introduce yourself to your operator, ask what they want you to handle, and
write what you learn into SOUL.md via your workspace. Until SOUL.md exists,
only admins can talk to you.
";

/// Write starter files, refusing to clobber existing ones.
pub fn run(state_root: &Path) -> Result<()> {
    std::fs::create_dir_all(state_root).context("creating state root")?;
    std::fs::create_dir_all(state_root.join("data"))?;
    std::fs::create_dir_all(state_root.join("skills"))?;

    write_if_absent(&state_root.join("ax.yaml"), STARTER_CONFIG)?;
    let env_path = state_root.join(".env");
    if write_if_absent(&env_path, STARTER_ENV)? {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&env_path, std::fs::Permissions::from_mode(0o600))?;
        }
    }

    let agent_dir = state_root.join("agents/default");
    std::fs::create_dir_all(agent_dir.join("users"))?;
    write_if_absent(&agent_dir.join("AGENTS.md"), STARTER_AGENTS)?;
    write_if_absent(&agent_dir.join("BOOTSTRAP.md"), STARTER_BOOTSTRAP)?;
    write_if_absent(&agent_dir.join("admins"), "# one admin user id per line\n")?;

    println!(
        "{} {}",
        "configured".green().bold(),
        state_root.display()
    );
    println!("  edit {} and add credentials to {}", "ax.yaml".bold(), ".env".bold());
    println!("  then run {}", "ax serve".bold());
    Ok(())
}

fn write_if_absent(path: &Path, contents: &str) -> Result<bool> {
    if path.exists() {
        println!("  {} {} (exists, left untouched)", "skip".yellow(), path.display());
        return Ok(false);
    }
    std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))?;
    println!("  {} {}", "wrote".green(), path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_configure_writes_starter_files() {
        let dir = TempDir::new().unwrap();
        run(dir.path()).unwrap();

        assert!(dir.path().join("ax.yaml").exists());
        assert!(dir.path().join(".env").exists());
        assert!(dir.path().join("agents/default/AGENTS.md").exists());
        assert!(dir.path().join("agents/default/BOOTSTRAP.md").exists());

        // Starter config parses cleanly.
        let config = ax_config::load_from(&dir.path().join("ax.yaml")).unwrap();
        assert_eq!(config.history.max_turns, 40);
    }

    #[test]
    fn test_configure_never_clobbers() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("ax.yaml"), "profile: paranoid\n").unwrap();
        run(dir.path()).unwrap();
        let config = ax_config::load_from(&dir.path().join("ax.yaml")).unwrap();
        assert_eq!(config.profile, ax_config::SecurityProfile::Paranoid);
    }

    #[cfg(unix)]
    #[test]
    fn test_env_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        run(dir.path()).unwrap();
        let mode = std::fs::metadata(dir.path().join(".env"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
