//! The OpenAI-compatible local HTTP API.
//!
//! Served over a Unix domain socket. Policy blocks are 200 completions
//! whose content explains the block; HTTP errors are reserved for
//! transport and validation problems.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use ax_core::{AgentId, SessionId};
use ax_taint::estimate_tokens;

use crate::error::HostResult;
use crate::router::RequestRouter;

/// Shared state for the HTTP handlers.
pub struct HttpState {
    /// The router behind the API.
    pub router: Arc<RequestRouter>,
    /// Agent the API routes to.
    pub agent_id: AgentId,
    /// Model name echoed in responses.
    pub model_name: String,
}

/// Build the API router.
#[must_use]
pub fn app(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(models))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind the Unix socket and serve until aborted.
///
/// # Errors
///
/// Returns an error if the socket cannot be bound.
pub fn serve(
    socket_path: PathBuf,
    state: Arc<HttpState>,
) -> HostResult<tokio::task::JoinHandle<()>> {
    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(&socket_path)?;
    info!(path = %socket_path.display(), "HTTP API listening");

    let router = app(state);
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::warn!(error = %e, "HTTP API exited");
        }
    }))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    model: Option<String>,
    messages: Vec<WireMessage>,
    #[serde(default)]
    stream: bool,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

async fn health() -> &'static str {
    "ok"
}

async fn models(State(state): State<Arc<HttpState>>) -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [{
            "id": state.model_name.clone(),
            "object": "model",
            "owned_by": "ax",
        }],
    }))
}

async fn chat_completions(
    State(state): State<Arc<HttpState>>,
    Json(request): Json<ChatRequest>,
) -> Response {
    // Strict session validation: anything non-UUIDv4 is a 400.
    let session_id = match request.session_id.as_deref() {
        None => None,
        Some(raw) => match SessionId::parse(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "invalid session_id"})),
                )
                    .into_response();
            },
        },
    };

    let Some(message) = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "no user message"})),
        )
            .into_response();
    };

    let model = request
        .model
        .unwrap_or_else(|| state.model_name.clone());

    // Request-scoped cancellation: the turn runs in its own task holding a
    // token whose drop guard lives in this handler future. When hyper drops
    // the handler (client disconnect), the guard cancels the token and the
    // launcher kills the in-flight agent process instead of letting the
    // detached task run to completion.
    let cancel = CancellationToken::new();
    let _disconnect_guard = cancel.clone().drop_guard();

    let turn = {
        let router = Arc::clone(&state.router);
        let agent_id = state.agent_id.clone();
        let message = message.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            router
                .handle_turn(&agent_id, session_id, None, &message, None, None, cancel)
                .await
        })
    };

    let reply = match turn.await {
        Ok(Ok(reply)) => reply,
        Ok(Err(e @ crate::error::HostError::InvalidRequest(_))) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": e.to_string()})),
            )
                .into_response();
        },
        Ok(Err(e)) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response();
        },
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("turn task failed: {e}")})),
            )
                .into_response();
        },
    };

    let prompt_tokens = estimate_tokens(&message);
    let completion_tokens = estimate_tokens(&reply.text);

    if request.stream {
        return Sse::new(completion_stream(model, reply.text))
            .keep_alive(KeepAlive::default())
            .into_response();
    }

    Json(json!({
        "id": format!("chatcmpl-{}", reply.session_id),
        "object": "chat.completion",
        "created": chrono::Utc::now().timestamp(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": reply.text},
            "finish_reason": "stop",
        }],
        "usage": {
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": prompt_tokens.saturating_add(completion_tokens),
        },
        "session_id": reply.session_id.to_string(),
    }))
    .into_response()
}

/// SSE chunk sequence: a role delta, content deltas, a finish chunk, then
/// the `[DONE]` sentinel. The text is already outbound-scanned; chunking
/// here is purely presentational.
fn completion_stream(
    model: String,
    text: String,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    let chunk_id = format!("chatcmpl-{}", uuid::Uuid::new_v4().simple());
    let created = chrono::Utc::now().timestamp();

    let frame = move |delta: Value, finish: Option<&str>| {
        json!({
            "id": chunk_id,
            "object": "chat.completion.chunk",
            "created": created,
            "model": model,
            "choices": [{
                "index": 0,
                "delta": delta,
                "finish_reason": finish,
            }],
        })
        .to_string()
    };

    async_stream::stream! {
        yield Ok(Event::default().data(frame(json!({"role": "assistant"}), None)));

        // Word-grouped content deltas.
        let words: Vec<&str> = text.split_inclusive(' ').collect();
        for group in words.chunks(8) {
            let piece: String = group.concat();
            if !piece.is_empty() {
                yield Ok(Event::default().data(frame(json!({"content": piece}), None)));
            }
        }

        yield Ok(Event::default().data(frame(json!({}), Some("stop"))));
        yield Ok(Event::default().data("[DONE]"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_shape() {
        let request: ChatRequest = serde_json::from_str(
            r#"{"model":"m","messages":[{"role":"user","content":"hi"}],"stream":true}"#,
        )
        .unwrap();
        assert!(request.stream);
        assert_eq!(request.messages[0].content, "hi");
        assert!(request.session_id.is_none());
    }

    #[test]
    fn test_session_id_validation_shape() {
        // The handler wiring is exercised in the integration tests; here we
        // pin the parse behavior the 400 path depends on.
        assert!(SessionId::parse("../../../etc/passwd").is_err());
        assert!(SessionId::parse(&SessionId::new().to_string()).is_ok());
    }
}
