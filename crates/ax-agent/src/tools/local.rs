//! Local tools: workspace file access and shell.
//!
//! Every path goes through the central safe-path helper; nothing escapes
//! the workspace root. Shell commands run with the workspace as cwd.

use ax_core::safe_join;
use ax_llm::ToolDef;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AgentError, AgentResult};

const SHELL_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_READ_BYTES: usize = 256 * 1024;

/// Tools executed inside the sandbox.
pub struct LocalTools {
    workspace: PathBuf,
}

impl LocalTools {
    /// Create local tools bounded to `workspace`.
    #[must_use]
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    /// Tool definitions exposed to the model.
    #[must_use]
    pub fn definitions() -> Vec<ToolDef> {
        vec![
            ToolDef {
                name: "fs_read".to_string(),
                description: "Read a file from the workspace.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {"path": {"type": "string"}},
                    "required": ["path"],
                }),
            },
            ToolDef {
                name: "fs_write".to_string(),
                description: "Write a file in the workspace, creating parent directories."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string"},
                        "content": {"type": "string"},
                    },
                    "required": ["path", "content"],
                }),
            },
            ToolDef {
                name: "fs_edit".to_string(),
                description: "Replace an exact string in a workspace file.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string"},
                        "find": {"type": "string"},
                        "replace": {"type": "string"},
                    },
                    "required": ["path", "find", "replace"],
                }),
            },
            ToolDef {
                name: "shell".to_string(),
                description: "Run a shell command with the workspace as working directory."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {"command": {"type": "string"}},
                    "required": ["command"],
                }),
            },
        ]
    }

    /// Whether a tool name is handled locally.
    #[must_use]
    pub fn handles(name: &str) -> bool {
        matches!(name, "fs_read" | "fs_write" | "fs_edit" | "shell")
    }

    /// Execute a local tool. Failures return `Err`; the runner converts
    /// them into error outcomes for the model.
    ///
    /// # Errors
    ///
    /// Returns an error for unsafe paths, missing arguments, or I/O
    /// failures.
    pub async fn execute(&self, name: &str, args: &Value) -> AgentResult<String> {
        match name {
            "fs_read" => self.read(str_arg(args, "path")?).await,
            "fs_write" => {
                self.write(str_arg(args, "path")?, str_arg(args, "content")?)
                    .await
            },
            "fs_edit" => {
                self.edit(
                    str_arg(args, "path")?,
                    str_arg(args, "find")?,
                    str_arg(args, "replace")?,
                )
                .await
            },
            "shell" => self.shell(str_arg(args, "command")?).await,
            other => Err(AgentError::LocalTool(format!("unknown tool: {other}"))),
        }
    }

    async fn read(&self, path: &str) -> AgentResult<String> {
        let full = safe_join(&self.workspace, path)
            .map_err(|e| AgentError::LocalTool(e.to_string()))?;
        let contents = tokio::fs::read_to_string(&full).await?;
        if contents.len() > MAX_READ_BYTES {
            let mut end = MAX_READ_BYTES;
            while !contents.is_char_boundary(end) {
                end = end.saturating_sub(1);
            }
            return Ok(format!("{}\n[truncated]", &contents[..end]));
        }
        Ok(contents)
    }

    async fn write(&self, path: &str, content: &str) -> AgentResult<String> {
        let full = safe_join(&self.workspace, path)
            .map_err(|e| AgentError::LocalTool(e.to_string()))?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        Ok(format!("wrote {} bytes to {path}", content.len()))
    }

    async fn edit(&self, path: &str, find: &str, replace: &str) -> AgentResult<String> {
        let full = safe_join(&self.workspace, path)
            .map_err(|e| AgentError::LocalTool(e.to_string()))?;
        let contents = tokio::fs::read_to_string(&full).await?;
        let occurrences = contents.matches(find).count();
        if occurrences == 0 {
            return Err(AgentError::LocalTool("find string not present".to_string()));
        }
        if occurrences > 1 {
            return Err(AgentError::LocalTool(format!(
                "find string matches {occurrences} times, must be unique"
            )));
        }
        tokio::fs::write(&full, contents.replacen(find, replace, 1)).await?;
        Ok(format!("edited {path}"))
    }

    async fn shell(&self, command: &str) -> AgentResult<String> {
        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workspace)
            .output();
        let output = tokio::time::timeout(SHELL_TIMEOUT, child)
            .await
            .map_err(|_| AgentError::LocalTool("shell command timed out".to_string()))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(format!(
            "exit: {}\nstdout:\n{stdout}\nstderr:\n{stderr}",
            output.status.code().unwrap_or(-1)
        ))
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> AgentResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::LocalTool(format!("missing argument: {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_read_edit_round_trip() {
        let dir = TempDir::new().unwrap();
        let tools = LocalTools::new(dir.path());

        tools
            .execute("fs_write", &json!({"path": "notes/a.txt", "content": "hello world"}))
            .await
            .unwrap();
        let read = tools
            .execute("fs_read", &json!({"path": "notes/a.txt"}))
            .await
            .unwrap();
        assert_eq!(read, "hello world");

        tools
            .execute(
                "fs_edit",
                &json!({"path": "notes/a.txt", "find": "world", "replace": "there"}),
            )
            .await
            .unwrap();
        let read = tools
            .execute("fs_read", &json!({"path": "notes/a.txt"}))
            .await
            .unwrap();
        assert_eq!(read, "hello there");
    }

    #[tokio::test]
    async fn test_paths_cannot_escape_workspace() {
        let dir = TempDir::new().unwrap();
        let tools = LocalTools::new(dir.path());

        for path in ["../outside.txt", "a/../../outside.txt", "/etc/passwd"] {
            let result = tools
                .execute("fs_write", &json!({"path": path, "content": "x"}))
                .await;
            assert!(result.is_err(), "path {path} should be rejected");
        }
    }

    #[tokio::test]
    async fn test_shell_runs_in_workspace() {
        let dir = TempDir::new().unwrap();
        let tools = LocalTools::new(dir.path());
        let output = tools
            .execute("shell", &json!({"command": "pwd"}))
            .await
            .unwrap();
        assert!(output.contains(&dir.path().canonicalize().unwrap().display().to_string())
            || output.contains(&dir.path().display().to_string()));
    }

    #[test]
    fn test_handles() {
        assert!(LocalTools::handles("fs_read"));
        assert!(!LocalTools::handles("memory_write"));
    }
}
