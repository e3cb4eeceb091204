//! HTTP client over the host's Unix socket.

use anyhow::{Context, Result, bail};
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper::body::Bytes;
use hyper_util::rt::TokioIo;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::net::UnixStream;

/// The host API socket under a state root.
#[must_use]
pub fn api_socket(state_root: &Path) -> PathBuf {
    state_root.join("run/ax.sock")
}

/// Minimal client for the host API.
pub struct ApiClient {
    socket: PathBuf,
}

impl ApiClient {
    /// Create a client for a state root.
    #[must_use]
    pub fn new(state_root: &Path) -> Self {
        Self {
            socket: api_socket(state_root),
        }
    }

    async fn request(&self, method: &str, path: &str, body: Option<&Value>) -> Result<Value> {
        let stream = UnixStream::connect(&self.socket)
            .await
            .with_context(|| format!("is the host running? ({})", self.socket.display()))?;
        let (mut sender, connection) =
            hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(connection);

        let body_bytes = body.map(Value::to_string).unwrap_or_default();
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "ax")
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(body_bytes)))?;

        let response = sender.send_request(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        let value: Value = serde_json::from_slice(&bytes)
            .with_context(|| format!("non-JSON response (status {status})"))?;

        if !status.is_success() {
            let message = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("request failed");
            bail!("{status}: {message}");
        }
        Ok(value)
    }

    /// POST a chat completion (non-streaming) and return the response.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-2xx status.
    pub async fn chat(&self, message: &str, session_id: Option<&str>) -> Result<Value> {
        let mut body = serde_json::json!({
            "model": "default",
            "messages": [{"role": "user", "content": message}],
        });
        if let Some(session) = session_id {
            body["session_id"] = Value::String(session.to_string());
        }
        self.request("POST", "/v1/chat/completions", Some(&body))
            .await
    }

    /// GET `/health`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is unreachable.
    pub async fn health(&self) -> Result<()> {
        let stream = UnixStream::connect(&self.socket)
            .await
            .with_context(|| format!("is the host running? ({})", self.socket.display()))?;
        let (mut sender, connection) =
            hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(connection);

        let request = Request::builder()
            .method("GET")
            .uri("/health")
            .header("host", "ax")
            .body(Full::new(Bytes::new()))?;
        let response = sender.send_request(request).await?;
        if !response.status().is_success() {
            bail!("health check failed: {}", response.status());
        }
        Ok(())
    }
}

/// Extract the assistant text and session ID from a completion response.
#[must_use]
pub fn parse_completion(value: &Value) -> (String, Option<String>) {
    let text = value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let session = value
        .get("session_id")
        .and_then(Value::as_str)
        .map(ToString::to_string);
    (text, session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion() {
        let value = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "hello"}}],
            "session_id": "abc",
        });
        let (text, session) = parse_completion(&value);
        assert_eq!(text, "hello");
        assert_eq!(session.as_deref(), Some("abc"));
    }

    #[test]
    fn test_api_socket_layout() {
        let socket = api_socket(Path::new("/home/u/.ax"));
        assert_eq!(socket, PathBuf::from("/home/u/.ax/run/ax.sock"));
    }
}
