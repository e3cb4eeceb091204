//! Configuration loading.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Config file name under the state root.
pub const CONFIG_FILE: &str = "ax.yaml";

/// The default state root: `~/.ax`, overridable with `AX_HOME`.
///
/// # Errors
///
/// Returns [`ConfigError::NoHome`] if no home directory can be resolved.
pub fn default_state_root() -> ConfigResult<PathBuf> {
    if let Ok(home) = std::env::var("AX_HOME") {
        return Ok(PathBuf::from(home));
    }
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".ax"))
        .ok_or(ConfigError::NoHome)
}

/// Load configuration from the default state root.
///
/// A missing file yields the default configuration; an unreadable or
/// unparsable file is a fatal error.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load() -> ConfigResult<Config> {
    let root = default_state_root()?;
    load_from(&root.join(CONFIG_FILE))
}

/// Load configuration from an explicit path.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_from(path: &Path) -> ConfigResult<Config> {
    if !path.exists() {
        debug!(path = %path.display(), "No config file, using defaults");
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let config: Config = serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_from(&dir.path().join("ax.yaml")).unwrap();
        assert_eq!(config.history.max_turns, 40);
    }

    #[test]
    fn test_bad_yaml_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ax.yaml");
        std::fs::write(&path, "profile: [unterminated").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn test_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ax.yaml");
        std::fs::write(&path, "profile: power-user\nsandbox:\n  timeout_secs: 60\n").unwrap();
        let config = load_from(&path).unwrap();
        assert_eq!(config.sandbox.timeout_secs, 60);
    }
}
