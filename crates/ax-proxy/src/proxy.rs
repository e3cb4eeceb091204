//! The credential-injecting forward proxy.
//!
//! An HTTP server on a host-local Unix socket. Policy lives entirely here:
//! path allowlisting, auth stripping, credential injection, hop-by-hop
//! header removal. The agent side (the bridge) is a dumb pipe.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio::net::UnixListener;
use tracing::{debug, info, warn};

use ax_audit::{AuditSink, AuditStatus};
use ax_core::SessionId;

use crate::error::ProxyResult;
use crate::secrets::SecretStore;

/// Request headers never forwarded upstream: anything the agent could use
/// to smuggle or spoof auth, plus hop-by-hop headers.
const STRIPPED_REQUEST_HEADERS: &[&str] = &[
    "authorization",
    "x-api-key",
    "api-key",
    "openai-organization",
    "anthropic-auth",
    "cookie",
    "host",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "upgrade",
    "proxy-authorization",
    "content-length",
];

/// Response headers never forwarded back: hop-by-hop and encoding headers
/// (reqwest already decoded the body, so the advertised encoding would lie).
const STRIPPED_RESPONSE_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "proxy-authenticate",
    "content-encoding",
    "content-length",
];

/// How a vendor path is routed and authenticated.
#[derive(Debug, Clone)]
pub struct VendorRoute {
    /// Vendor name (audit detail and config key).
    pub vendor: String,
    /// Allowed request path.
    pub path: String,
    /// Real upstream base URL.
    pub upstream_base: String,
    /// Env key holding the credential.
    pub credential_key: String,
    /// Header the credential is injected into.
    pub auth_header: String,
    /// Prefix prepended to the credential value (e.g. `Bearer `).
    pub auth_prefix: String,
}

impl VendorRoute {
    /// The standard Anthropic Messages route.
    #[must_use]
    pub fn anthropic(credential_key: impl Into<String>) -> Self {
        Self {
            vendor: "anthropic".to_string(),
            path: "/v1/messages".to_string(),
            upstream_base: "https://api.anthropic.com".to_string(),
            credential_key: credential_key.into(),
            auth_header: "x-api-key".to_string(),
            auth_prefix: String::new(),
        }
    }

    /// The standard OpenAI-compatible chat completions route.
    #[must_use]
    pub fn openai(credential_key: impl Into<String>) -> Self {
        Self {
            vendor: "openai".to_string(),
            path: "/v1/chat/completions".to_string(),
            upstream_base: "https://api.openai.com".to_string(),
            credential_key: credential_key.into(),
            auth_header: "authorization".to_string(),
            auth_prefix: "Bearer ".to_string(),
        }
    }
}

struct ProxyState {
    routes: Vec<VendorRoute>,
    secrets: Arc<SecretStore>,
    audit: Arc<dyn AuditSink>,
    session_id: SessionId,
    client: reqwest::Client,
}

/// The host-side credential proxy, one per agent run.
pub struct CredentialProxy {
    socket_path: PathBuf,
    state: Arc<ProxyState>,
}

impl CredentialProxy {
    /// Create a proxy serving the given vendor routes.
    #[must_use]
    pub fn new(
        socket_path: PathBuf,
        routes: Vec<VendorRoute>,
        secrets: Arc<SecretStore>,
        audit: Arc<dyn AuditSink>,
        session_id: SessionId,
    ) -> Self {
        Self {
            socket_path,
            state: Arc::new(ProxyState {
                routes,
                secrets,
                audit,
                session_id,
                client: reqwest::Client::new(),
            }),
        }
    }

    /// Path of the proxy's Unix socket.
    #[must_use]
    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    /// Bind the socket and serve until aborted.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub fn spawn(&self) -> ProxyResult<tokio::task::JoinHandle<()>> {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        info!(path = %self.socket_path.display(), "Credential proxy listening");

        let app = Router::new()
            .fallback(forward)
            .with_state(Arc::clone(&self.state));

        Ok(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!(error = %e, "Credential proxy exited");
            }
        }))
    }
}

/// Forward one request to its vendor, or refuse it.
async fn forward(State(state): State<Arc<ProxyState>>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(ToString::to_string);
    let method = request.method().clone();

    let Some(route) = state.routes.iter().find(|r| r.path == path) else {
        audit_proxy(&state, "proxy_forward", AuditStatus::Blocked, format!("path not allowed: {path}"));
        return (StatusCode::FORBIDDEN, "path not allowed").into_response();
    };

    let Some(credential) = state.secrets.get(&route.credential_key) else {
        audit_proxy(
            &state,
            "proxy_forward",
            AuditStatus::Error,
            format!("no credential for vendor {}", route.vendor),
        );
        return (StatusCode::BAD_GATEWAY, "vendor credential unavailable").into_response();
    };

    let mut url = format!("{}{path}", route.upstream_base.trim_end_matches('/'));
    if let Some(query) = query {
        url.push('?');
        url.push_str(&query);
    }

    // Copy headers minus anything stripped, then inject the credential.
    let mut upstream_headers = reqwest::header::HeaderMap::new();
    for (name, value) in request.headers() {
        if STRIPPED_REQUEST_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let Ok(name) = reqwest::header::HeaderName::try_from(name.as_str())
            && let Ok(value) = reqwest::header::HeaderValue::from_bytes(value.as_bytes())
        {
            upstream_headers.insert(name, value);
        }
    }
    let auth_value = format!("{}{credential}", route.auth_prefix);
    if let Ok(name) = reqwest::header::HeaderName::try_from(route.auth_header.as_str())
        && let Ok(value) = reqwest::header::HeaderValue::from_str(&auth_value)
    {
        upstream_headers.insert(name, value);
    }

    let body = match axum::body::to_bytes(request.into_body(), 32 * 1024 * 1024).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response();
        },
    };

    debug!(vendor = %route.vendor, %path, "Forwarding to vendor");
    let upstream = state
        .client
        .request(
            reqwest::Method::from_bytes(method.as_str().as_bytes())
                .unwrap_or(reqwest::Method::POST),
            &url,
        )
        .headers(upstream_headers)
        .body(body)
        .send()
        .await;

    let upstream = match upstream {
        Ok(response) => response,
        Err(e) => {
            audit_proxy(
                &state,
                "proxy_forward",
                AuditStatus::Error,
                format!("upstream {}: {e}", route.vendor),
            );
            return (StatusCode::BAD_GATEWAY, "upstream unreachable").into_response();
        },
    };

    // Non-2xx vendor responses pass through unchanged.
    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut headers = HeaderMap::new();
    for (name, value) in upstream.headers() {
        if STRIPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let Ok(name) = header::HeaderName::try_from(name.as_str())
            && let Ok(value) = header::HeaderValue::from_bytes(value.as_bytes())
        {
            headers.insert(name, value);
        }
    }

    let body = Body::from_stream(upstream.bytes_stream());
    (status, headers, body).into_response()
}

fn audit_proxy(state: &ProxyState, action: &str, status: AuditStatus, detail: String) {
    if let Err(e) = state.audit.append(
        state.session_id.clone(),
        action,
        "",
        status,
        Some(detail),
        0,
        None,
    ) {
        warn!(error = %e, "Proxy audit append failed");
    }
}
