//! Web and browser providers.
//!
//! Host-side fetch/search on the agent's behalf. The returned content is
//! the canonical taint source in this system; the IPC server records it
//! into the budget the moment these calls succeed.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{HostError, HostResult};

const MAX_BODY_BYTES: usize = 512 * 1024;

/// Web access on behalf of the agent.
#[async_trait]
pub trait WebProvider: Send + Sync {
    /// Fetch a URL and return its textual body (bounded).
    async fn fetch(&self, url: &str) -> HostResult<String>;

    /// Search and return result snippets.
    async fn search(&self, query: &str, max_results: usize) -> HostResult<Vec<String>>;
}

/// Plain HTTP web provider.
pub struct HttpWebProvider {
    client: reqwest::Client,
    search_endpoint: Option<String>,
}

impl HttpWebProvider {
    /// Create a provider. `search_endpoint` points at a SearXNG-style JSON
    /// search API; without one, searches fail as a provider error the
    /// agent can read.
    #[must_use]
    pub fn new(search_endpoint: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("ax-host/0.3")
            .build()
            .unwrap_or_default();
        Self {
            client,
            search_endpoint,
        }
    }
}

#[async_trait]
impl WebProvider for HttpWebProvider {
    async fn fetch(&self, url: &str) -> HostResult<String> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(HostError::InvalidRequest(format!(
                "unsupported url scheme: {url}"
            )));
        }
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HostError::Provider(format!("web_fetch: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(HostError::Provider(format!("web_fetch: status {status}")));
        }
        let body = response
            .text()
            .await
            .map_err(|e| HostError::Provider(format!("web_fetch: {e}")))?;
        if body.len() > MAX_BODY_BYTES {
            let mut end = MAX_BODY_BYTES;
            while !body.is_char_boundary(end) {
                end = end.saturating_sub(1);
            }
            return Ok(body[..end].to_string());
        }
        Ok(body)
    }

    async fn search(&self, query: &str, max_results: usize) -> HostResult<Vec<String>> {
        let Some(ref endpoint) = self.search_endpoint else {
            return Err(HostError::Provider(
                "web_search: no search endpoint configured".to_string(),
            ));
        };
        let response = self
            .client
            .get(endpoint)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .map_err(|e| HostError::Provider(format!("web_search: {e}")))?;
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| HostError::Provider(format!("web_search: {e}")))?;

        let snippets = value
            .get("results")
            .and_then(serde_json::Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .take(max_results)
                    .filter_map(|r| {
                        let title = r.get("title").and_then(serde_json::Value::as_str)?;
                        let url = r.get("url").and_then(serde_json::Value::as_str)?;
                        let content = r
                            .get("content")
                            .and_then(serde_json::Value::as_str)
                            .unwrap_or("");
                        Some(format!("{title} ({url})\n{content}"))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(snippets)
    }
}

/// Browser automation on behalf of the agent.
#[async_trait]
pub trait BrowserProvider: Send + Sync {
    /// Navigate to a URL.
    async fn navigate(&self, url: &str) -> HostResult<String>;

    /// Capture the current page as text.
    async fn snapshot(&self) -> HostResult<String>;

    /// Click an element.
    async fn click(&self, selector: &str) -> HostResult<String>;

    /// Type into an element.
    async fn type_text(&self, selector: &str, text: &str) -> HostResult<String>;

    /// Capture the current page as a base64 PNG.
    async fn screenshot(&self) -> HostResult<String>;
}

/// The default browser provider: everything fails as a tool-level error
/// the agent can relay. A real driver slots in behind the same trait.
pub struct DisabledBrowser;

macro_rules! disabled {
    () => {
        Err(HostError::Provider(
            "browser provider disabled in configuration".to_string(),
        ))
    };
}

#[async_trait]
impl BrowserProvider for DisabledBrowser {
    async fn navigate(&self, _url: &str) -> HostResult<String> {
        disabled!()
    }

    async fn snapshot(&self) -> HostResult<String> {
        disabled!()
    }

    async fn click(&self, _selector: &str) -> HostResult<String> {
        disabled!()
    }

    async fn type_text(&self, _selector: &str, _text: &str) -> HostResult<String> {
        disabled!()
    }

    async fn screenshot(&self) -> HostResult<String> {
        disabled!()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_rejects_non_http_schemes() {
        let provider = HttpWebProvider::new(None);
        assert!(provider.fetch("file:///etc/passwd").await.is_err());
        assert!(provider.fetch("ftp://example.com").await.is_err());
    }

    #[tokio::test]
    async fn test_search_without_endpoint_is_provider_error() {
        let provider = HttpWebProvider::new(None);
        let err = provider.search("rust", 5).await.unwrap_err();
        assert!(matches!(err, HostError::Provider(_)));
    }

    #[tokio::test]
    async fn test_disabled_browser_errors() {
        let browser = DisabledBrowser;
        assert!(browser.navigate("https://example.com").await.is_err());
        assert!(browser.snapshot().await.is_err());
    }
}
