//! Eager OAuth token refresh.
//!
//! Vendors with OAuth flows store three keys in the `.env` file per vendor
//! prefix: `<PREFIX>_ACCESS_TOKEN`, `<PREFIX>_REFRESH_TOKEN`, and
//! `<PREFIX>_EXPIRES_AT` (unix seconds). Refresh happens eagerly, at least
//! five minutes before expiry, and rewrites the tokens in place.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{ProxyError, ProxyResult};
use crate::secrets::SecretStore;

/// Refresh this long before expiry.
const REFRESH_MARGIN_SECS: i64 = 300;

/// Outcome of a refresh check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Token is fresh enough; nothing done.
    StillValid,
    /// Token was refreshed and persisted.
    Refreshed,
    /// No OAuth keys are configured for this prefix.
    NotConfigured,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Refreshes OAuth tokens against a vendor token endpoint.
pub struct OAuthRefresher {
    secrets: Arc<SecretStore>,
    client: reqwest::Client,
    /// Env key prefix, e.g. `ANTHROPIC_OAUTH`.
    prefix: String,
    /// Token endpoint URL.
    token_url: String,
    /// OAuth client ID.
    client_id: String,
}

impl OAuthRefresher {
    /// Create a refresher for one vendor.
    #[must_use]
    pub fn new(
        secrets: Arc<SecretStore>,
        prefix: impl Into<String>,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            secrets,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            prefix: prefix.into(),
            token_url: token_url.into(),
            client_id: client_id.into(),
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}_{suffix}", self.prefix)
    }

    /// Seconds until the stored token expires; `None` when unknown.
    fn secs_to_expiry(&self) -> Option<i64> {
        let expires_at: i64 = self.secrets.get(&self.key("EXPIRES_AT"))?.parse().ok()?;
        Some(expires_at.saturating_sub(Utc::now().timestamp()))
    }

    /// Refresh the token if it expires within the margin.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::RefreshFailed`] if the endpoint rejects the
    /// refresh. Startup callers treat this as non-fatal and tell the user to
    /// re-authenticate.
    pub async fn refresh_if_needed(&self) -> ProxyResult<RefreshOutcome> {
        let Some(refresh_token) = self.secrets.get(&self.key("REFRESH_TOKEN")) else {
            return Ok(RefreshOutcome::NotConfigured);
        };

        if let Some(secs) = self.secs_to_expiry()
            && secs > REFRESH_MARGIN_SECS
        {
            return Ok(RefreshOutcome::StillValid);
        }

        info!(prefix = %self.prefix, "Refreshing OAuth token");
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::RefreshFailed(format!(
                "{status}: {}",
                body.chars().take(256).collect::<String>()
            )));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProxyError::RefreshFailed(e.to_string()))?;

        self.secrets
            .update(&self.key("ACCESS_TOKEN"), &tokens.access_token)?;
        if let Some(ref new_refresh) = tokens.refresh_token {
            self.secrets
                .update(&self.key("REFRESH_TOKEN"), new_refresh)?;
        }
        if let Some(expires_in) = tokens.expires_in {
            let expires_at = Utc::now()
                .timestamp()
                .saturating_add(i64::try_from(expires_in).unwrap_or(0));
            self.secrets
                .update(&self.key("EXPIRES_AT"), &expires_at.to_string())?;
        }

        Ok(RefreshOutcome::Refreshed)
    }

    /// Spawn a background loop that keeps the token fresh.
    #[must_use]
    pub fn spawn_refresh_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.refresh_if_needed().await {
                    Ok(RefreshOutcome::NotConfigured) => return,
                    Ok(_) => {},
                    Err(e) => {
                        warn!(prefix = %self.prefix, error = %e, "OAuth refresh failed; will retry");
                    },
                }
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir, contents: &str) -> Arc<SecretStore> {
        let path = dir.path().join(".env");
        std::fs::write(&path, contents).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        }
        Arc::new(SecretStore::load(&path).unwrap())
    }

    #[tokio::test]
    async fn test_not_configured_without_refresh_token() {
        let dir = TempDir::new().unwrap();
        let refresher = OAuthRefresher::new(
            store(&dir, "UNRELATED=1\n"),
            "VENDOR_OAUTH",
            "http://127.0.0.1:1/token",
            "cid",
        );
        assert_eq!(
            refresher.refresh_if_needed().await.unwrap(),
            RefreshOutcome::NotConfigured
        );
    }

    #[tokio::test]
    async fn test_fresh_token_untouched() {
        let dir = TempDir::new().unwrap();
        let far_future = Utc::now().timestamp() + 3600;
        let refresher = OAuthRefresher::new(
            store(
                &dir,
                &format!(
                    "VENDOR_OAUTH_ACCESS_TOKEN=a\nVENDOR_OAUTH_REFRESH_TOKEN=r\nVENDOR_OAUTH_EXPIRES_AT={far_future}\n"
                ),
            ),
            "VENDOR_OAUTH",
            "http://127.0.0.1:1/token",
            "cid",
        );
        assert_eq!(
            refresher.refresh_if_needed().await.unwrap(),
            RefreshOutcome::StillValid
        );
    }

    #[tokio::test]
    async fn test_expiring_token_hits_endpoint_and_fails_closed() {
        // Token expires inside the margin; the (unreachable) endpoint makes
        // the refresh fail, which must surface as an error, not a panic.
        let dir = TempDir::new().unwrap();
        let soon = Utc::now().timestamp() + 10;
        let refresher = OAuthRefresher::new(
            store(
                &dir,
                &format!(
                    "VENDOR_OAUTH_REFRESH_TOKEN=r\nVENDOR_OAUTH_EXPIRES_AT={soon}\n"
                ),
            ),
            "VENDOR_OAUTH",
            "http://127.0.0.1:1/token",
            "cid",
        );
        assert!(refresher.refresh_if_needed().await.is_err());
    }
}
