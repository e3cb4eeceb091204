//! Agent-side IPC client.
//!
//! One request, one response, over a single sequential connection. The
//! client reconnects lazily if the previous connection was dropped (the
//! server closes connections on schema failures).

use serde_json::Value;
use std::path::PathBuf;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{IpcError, IpcResult};
use crate::frame::{read_frame, write_frame};

/// Client for the host IPC socket.
pub struct IpcClient {
    socket_path: PathBuf,
    stream: Mutex<Option<UnixStream>>,
}

impl IpcClient {
    /// Create a client for the given socket path. No connection is made
    /// until the first call.
    #[must_use]
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            stream: Mutex::new(None),
        }
    }

    /// Send one request and await its response.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is unreachable or the response frame
    /// is malformed. A `{ok:false}` response is NOT an error at this layer;
    /// callers inspect the value.
    pub async fn call(&self, request: &Value) -> IpcResult<Value> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| IpcError::MalformedJson(e.to_string()))?;

        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            debug!(path = %self.socket_path.display(), "IPC client connecting");
            *guard = Some(UnixStream::connect(&self.socket_path).await?);
        }
        let stream = guard
            .as_mut()
            .ok_or(IpcError::ConnectionClosed)?;

        if let Err(e) = write_frame(stream, &payload).await {
            *guard = None;
            return Err(e);
        }

        match read_frame(stream).await {
            Ok(Some(frame)) => {
                let value: Value = serde_json::from_slice(&frame)
                    .map_err(|e| IpcError::MalformedJson(e.to_string()))?;
                // The server closes the connection after schema failures;
                // force a reconnect next call if this response is an error
                // of that kind.
                if value.get("ok").and_then(Value::as_bool) == Some(false) {
                    *guard = None;
                }
                Ok(value)
            },
            Ok(None) => {
                *guard = None;
                Err(IpcError::ConnectionClosed)
            },
            Err(e) => {
                *guard = None;
                Err(e)
            },
        }
    }

    /// Convenience: build `{"action": …, …fields}` and call.
    ///
    /// # Errors
    ///
    /// Same as [`IpcClient::call`].
    pub async fn call_action(&self, action: &str, mut fields: Value) -> IpcResult<Value> {
        let obj = fields
            .as_object_mut()
            .ok_or_else(|| IpcError::MalformedJson("fields must be an object".to_string()))?;
        obj.insert("action".to_string(), Value::String(action.to_string()));
        self.call(&fields).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::net::UnixListener;

    /// Minimal echo server speaking the frame protocol.
    async fn spawn_echo(socket: PathBuf) -> tokio::task::JoinHandle<()> {
        let listener = UnixListener::bind(&socket).unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    while let Ok(Some(frame)) = read_frame(&mut stream).await {
                        let value: Value = serde_json::from_slice(&frame).unwrap();
                        let reply = json!({"ok": true, "echo": value});
                        let bytes = serde_json::to_vec(&reply).unwrap();
                        if write_frame(&mut stream, &bytes).await.is_err() {
                            break;
                        }
                    }
                });
            }
        })
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("echo.sock");
        let handle = spawn_echo(socket.clone()).await;

        let client = IpcClient::new(&socket);
        let response = client
            .call_action("memory_list", json!({}))
            .await
            .unwrap();
        assert_eq!(response["ok"], true);
        assert_eq!(response["echo"]["action"], "memory_list");

        // Second call reuses the connection.
        let response = client
            .call_action("skill_list", json!({}))
            .await
            .unwrap();
        assert_eq!(response["echo"]["action"], "skill_list");
        handle.abort();
    }

    #[tokio::test]
    async fn test_unreachable_socket_errors() {
        let dir = TempDir::new().unwrap();
        let client = IpcClient::new(dir.path().join("nothing.sock"));
        assert!(client.call(&json!({"action": "memory_list"})).await.is_err());
    }
}
