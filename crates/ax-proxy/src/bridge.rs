//! The agent-side TCP→UDS bridge.
//!
//! A TCP listener on an ephemeral loopback port inside the sandbox. Every
//! accepted connection is spliced byte-for-byte onto the host's proxy
//! socket, SSE and all. No policy lives here; if the host socket is
//! unreachable the SDK gets a plain 502.

use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, UnixStream};
use tracing::{debug, info, warn};

use crate::error::ProxyResult;

const BAD_GATEWAY: &[u8] =
    b"HTTP/1.1 502 Bad Gateway\r\ncontent-length: 22\r\nconnection: close\r\n\r\nhost proxy unreachable";

/// The in-sandbox bridge.
pub struct TcpBridge {
    listener: TcpListener,
    host_socket: PathBuf,
}

impl TcpBridge {
    /// Bind an ephemeral loopback port.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be bound.
    pub async fn bind(host_socket: impl Into<PathBuf>) -> ProxyResult<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        Ok(Self {
            listener,
            host_socket: host_socket.into(),
        })
    }

    /// The base URL the model SDK should be pointed at.
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be read.
    pub fn base_url(&self) -> ProxyResult<String> {
        let addr = self.listener.local_addr()?;
        Ok(format!("http://127.0.0.1:{}", addr.port()))
    }

    /// Serve until aborted.
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(socket = %self.host_socket.display(), "TCP bridge forwarding");
            loop {
                match self.listener.accept().await {
                    Ok((stream, _addr)) => {
                        let host_socket = self.host_socket.clone();
                        tokio::spawn(async move {
                            splice(stream, host_socket).await;
                        });
                    },
                    Err(e) => {
                        warn!(error = %e, "Bridge accept failed");
                    },
                }
            }
        })
    }
}

/// Splice one TCP connection onto the host socket.
async fn splice(mut tcp: TcpStream, host_socket: PathBuf) {
    let mut uds = match UnixStream::connect(&host_socket).await {
        Ok(uds) => uds,
        Err(e) => {
            debug!(error = %e, "Host socket unreachable, answering 502");
            let _ = tcp.write_all(BAD_GATEWAY).await;
            let _ = tcp.shutdown().await;
            return;
        },
    };

    match tokio::io::copy_bidirectional(&mut tcp, &mut uds).await {
        Ok((to_host, to_agent)) => {
            debug!(to_host, to_agent, "Bridge connection closed");
        },
        Err(e) => {
            debug!(error = %e, "Bridge splice ended with error");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn test_bytes_pass_through_unchanged() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("host.sock");

        // Host side: uppercase everything it receives.
        let listener = UnixListener::bind(&socket).unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            let reply = String::from_utf8_lossy(&buf[..n]).to_uppercase();
            stream.write_all(reply.as_bytes()).await.unwrap();
        });

        let bridge = TcpBridge::bind(&socket).await.unwrap();
        let base_url = bridge.base_url().unwrap();
        let handle = bridge.spawn();

        let addr = base_url.strip_prefix("http://").unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"hello sse").await.unwrap();
        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"HELLO SSE");
        handle.abort();
    }

    #[tokio::test]
    async fn test_unreachable_host_returns_502() {
        let dir = TempDir::new().unwrap();
        let bridge = TcpBridge::bind(dir.path().join("absent.sock")).await.unwrap();
        let base_url = bridge.base_url().unwrap();
        let handle = bridge.spawn();

        let addr = base_url.strip_prefix("http://").unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"POST /v1/messages HTTP/1.1\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        let _ = client.read_to_string(&mut response).await;
        assert!(response.starts_with("HTTP/1.1 502"));
        handle.abort();
    }
}
