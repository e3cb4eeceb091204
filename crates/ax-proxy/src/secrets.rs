//! The host's secret store: a `.env` file plus process environment.
//!
//! The `.env` file is the durable store. Rewrites (token refresh) preserve
//! unrelated lines, comments, and ordering. The file is the user's; we
//! only own the keys we manage.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::warn;

use crate::error::{ProxyError, ProxyResult};

/// A parsed `.env` file that can be rewritten without clobbering lines we
/// do not own.
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
    lines: Vec<String>,
}

impl EnvFile {
    /// Load a `.env` file. A missing file is an empty one.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, or has
    /// group/other permission bits set.
    pub fn load(path: impl AsRef<Path>) -> ProxyResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(Self {
                path,
                lines: Vec::new(),
            });
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path)?.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(ProxyError::SecretStore(format!(
                    "{} has insecure permissions {:o}, should be 0600",
                    path.display(),
                    mode & 0o777
                )));
            }
        }

        let contents = std::fs::read_to_string(&path)?;
        Ok(Self {
            lines: contents.lines().map(ToString::to_string).collect(),
            path,
        })
    }

    /// Get a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.lines.iter().find_map(|line| parse_line(line, key))
    }

    /// Set a key, replacing its existing line in place or appending.
    pub fn set(&mut self, key: &str, value: &str) {
        let new_line = format!("{key}={value}");
        for line in &mut self.lines {
            if parse_line(line, key).is_some() {
                *line = new_line;
                return;
            }
        }
        self.lines.push(new_line);
    }

    /// Write the file back with 0600 permissions, preserving every line we
    /// did not touch.
    ///
    /// # Errors
    ///
    /// Returns an error on write failure.
    pub fn save(&self) -> ProxyResult<()> {
        let mut contents = self.lines.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        std::fs::write(&self.path, contents)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// All keys present in the file.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter_map(|line| {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    return None;
                }
                trimmed.split_once('=').map(|(k, _)| k.trim().to_string())
            })
            .collect()
    }
}

/// Parse `KEY=value` if the line defines `key`; comments and other keys
/// yield `None`.
fn parse_line(line: &str, key: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.starts_with('#') {
        return None;
    }
    let (k, v) = trimmed.split_once('=')?;
    if k.trim() != key {
        return None;
    }
    let v = v.trim();
    let v = v
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(v);
    Some(v.to_string())
}

/// Thread-safe secret lookup over the `.env` file and process environment.
///
/// Values never appear in `Debug` output or logs.
pub struct SecretStore {
    env_file: RwLock<EnvFile>,
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self
            .env_file
            .read()
            .map_or_else(|_| Vec::new(), |e| e.keys());
        f.debug_struct("SecretStore").field("keys", &keys).finish()
    }
}

impl SecretStore {
    /// Load the store from a `.env` path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is unreadable or badly
    /// permissioned.
    pub fn load(path: impl AsRef<Path>) -> ProxyResult<Self> {
        Ok(Self {
            env_file: RwLock::new(EnvFile::load(path)?),
        })
    }

    /// Resolve a secret: `.env` first, process environment second.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        if let Ok(env_file) = self.env_file.read()
            && let Some(value) = env_file.get(key)
        {
            return Some(value);
        }
        std::env::var(key).ok()
    }

    /// Update a managed key and persist, preserving unrelated lines.
    ///
    /// # Errors
    ///
    /// Returns an error on write failure.
    pub fn update(&self, key: &str, value: &str) -> ProxyResult<()> {
        let mut env_file = self
            .env_file
            .write()
            .map_err(|_| ProxyError::SecretStore("poisoned lock".to_string()))?;
        env_file.set(key, value);
        if let Err(e) = env_file.save() {
            warn!(error = %e, "Failed to persist secret update");
            return Err(e);
        }
        Ok(())
    }
}
