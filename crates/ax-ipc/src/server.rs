//! The IPC server.
//!
//! One server instance exists per agent run, bound to a host-created Unix
//! socket whose path is handed to the sandbox at spawn. The session context
//! is fixed at construction (derived from the spawn handshake, never from
//! payloads) and stamped onto every dispatched call.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use ax_audit::{AuditSink, AuditStatus};
use ax_core::{AgentId, PolicyDenial, SessionId};
use ax_taint::{SessionTaintTracker, TaintBudget};

use crate::error::IpcResult;
use crate::frame::{read_frame, write_frame};
use crate::request::{IpcRequest, is_query_action};
use crate::response::IpcResponse;

/// Context injected into every call, derived from the spawn handshake.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// The session this connection belongs to.
    pub session_id: SessionId,
    /// The agent this connection belongs to.
    pub agent_id: AgentId,
}

/// Externally-sourced content produced by a successful action.
///
/// The server records each ingest into the taint budget before the response
/// for the producing call is written back.
#[derive(Debug, Clone)]
pub struct TaintIngest {
    /// The content that entered the session.
    pub content: String,
    /// Action (or derived source) that produced it.
    pub source: String,
    /// Optional detail for the tracker record.
    pub detail: Option<String>,
    /// Whether to record a session taint source (true for the enumerated
    /// taint-producing actions and for external memory reads).
    pub record_source: bool,
}

/// Result of dispatching one validated request.
#[derive(Debug)]
pub struct DispatchOutcome {
    /// The response to frame back.
    pub response: IpcResponse,
    /// Content that entered the session from outside.
    pub ingest: Vec<TaintIngest>,
}

impl DispatchOutcome {
    /// A plain response with no taint ingest.
    #[must_use]
    pub fn plain(response: IpcResponse) -> Self {
        Self {
            response,
            ingest: Vec::new(),
        }
    }
}

/// Executes validated requests. Implemented host-side where the stores live.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Execute a request. Failures are returned as error responses, never as
    /// panics; only genuine bugs propagate.
    async fn dispatch(&self, ctx: &CallContext, request: IpcRequest) -> DispatchOutcome;
}

/// Policy knobs for the server.
#[derive(Debug, Clone)]
pub struct ServerPolicy {
    /// Actions gated by the taint budget.
    pub sensitive_actions: HashSet<String>,
    /// Taint ratio threshold from the active profile.
    pub taint_threshold: f64,
}

impl ServerPolicy {
    /// Build a policy from a sensitive action list and threshold.
    #[must_use]
    pub fn new(sensitive_actions: impl IntoIterator<Item = String>, taint_threshold: f64) -> Self {
        Self {
            sensitive_actions: sensitive_actions.into_iter().collect(),
            taint_threshold,
        }
    }

    fn is_sensitive(&self, action: &str) -> bool {
        self.sensitive_actions.contains(action)
    }
}

/// The per-session IPC server.
pub struct IpcServer {
    socket_path: PathBuf,
    ctx: CallContext,
    dispatcher: Arc<dyn ActionDispatcher>,
    budget: Arc<TaintBudget>,
    tracker: Arc<SessionTaintTracker>,
    audit: Arc<dyn AuditSink>,
    policy: ServerPolicy,
}

impl IpcServer {
    /// Create a server for one agent run.
    #[must_use]
    pub fn new(
        socket_path: PathBuf,
        ctx: CallContext,
        dispatcher: Arc<dyn ActionDispatcher>,
        budget: Arc<TaintBudget>,
        tracker: Arc<SessionTaintTracker>,
        audit: Arc<dyn AuditSink>,
        policy: ServerPolicy,
    ) -> Self {
        Self {
            socket_path,
            ctx,
            dispatcher,
            budget,
            tracker,
            audit,
            policy,
        }
    }

    /// Bind the socket and serve connections until the task is aborted.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub fn spawn(self: Arc<Self>) -> IpcResult<tokio::task::JoinHandle<()>> {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        info!(path = %self.socket_path.display(), session = %self.ctx.session_id, "IPC server listening");

        Ok(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        let server = Arc::clone(&self);
                        tokio::spawn(async move {
                            server.serve_connection(stream).await;
                        });
                    },
                    Err(e) => {
                        warn!(error = %e, "IPC accept failed");
                    },
                }
            }
        }))
    }

    /// Serve one connection: requests execute in arrival order.
    async fn serve_connection(&self, stream: UnixStream) {
        let (mut reader, mut writer) = stream.into_split();

        loop {
            let frame = match read_frame(&mut reader).await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "IPC connection terminated on framing error");
                    break;
                },
            };

            let request = match IpcRequest::parse(&frame) {
                Ok(request) => request,
                Err(e) => {
                    // Schema failures answer once, then drop the connection.
                    let response = IpcResponse::err(e.to_string());
                    let _ = write_frame(&mut writer, &response.to_bytes()).await;
                    break;
                },
            };

            let response = self.handle_request(request).await;
            if let Err(e) = write_frame(&mut writer, &response.to_bytes()).await {
                debug!(error = %e, "IPC write failed, closing connection");
                break;
            }
        }
    }

    /// Gate, dispatch, record taint, audit. Taint records for a call take
    /// effect before its response is written.
    async fn handle_request(&self, request: IpcRequest) -> IpcResponse {
        let action = request.action();
        let args_summary = request.args_summary();
        let start = Instant::now();

        if self.policy.is_sensitive(action)
            && self
                .budget
                .blocks_sensitive(&self.ctx.session_id, self.policy.taint_threshold)
        {
            let snapshot = self.budget.snapshot(&self.ctx.session_id);
            self.audit_call(
                action,
                &args_summary,
                AuditStatus::Blocked,
                Some(format!(
                    "taint ratio {:.3} exceeds threshold {:.2}",
                    snapshot.ratio, self.policy.taint_threshold
                )),
                start,
            );
            return IpcResponse::err(format!(
                "blocked by security policy ({})",
                PolicyDenial::TaintBudget
            ));
        }

        let outcome = self.dispatcher.dispatch(&self.ctx, request).await;

        if outcome.response.is_ok() {
            for ingest in &outcome.ingest {
                self.budget
                    .record_content(&self.ctx.session_id, &ingest.content, true);
                if ingest.record_source {
                    self.tracker.record_taint_source(
                        &self.ctx.session_id,
                        &ingest.source,
                        ingest.detail.clone(),
                    );
                }
            }
        }

        if !is_query_action(action) {
            let status = if outcome.response.is_ok() {
                AuditStatus::Success
            } else {
                AuditStatus::Error
            };
            let detail = outcome.response.error().map(ToString::to_string);
            self.audit_call(action, &args_summary, status, detail, start);
        }

        outcome.response
    }

    fn audit_call(
        &self,
        action: &str,
        args_summary: &str,
        status: AuditStatus,
        detail: Option<String>,
        start: Instant,
    ) {
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;
        let taint = self.tracker.get_taint_tag(&self.ctx.session_id);
        if let Err(e) = self.audit.append(
            self.ctx.session_id.clone(),
            action,
            args_summary,
            status,
            detail,
            duration_ms,
            taint,
        ) {
            error!(error = %e, action, "Audit append failed");
        }
    }
}
