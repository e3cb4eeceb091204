//! The request router.
//!
//! One turn = scan in, run sandboxed, scan out. The router owns the
//! per-session canaries, the dedup window, and the lifecycle of the IPC
//! server + credential proxy + agent process trio for each run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ax_audit::{AuditSink, AuditStatus};
use ax_config::Config;
use ax_core::{AgentId, PolicyDenial, SessionAddress, SessionId};
use ax_ipc::{CallContext, IpcServer, ServerPolicy};
use ax_llm::LlmProvider;
use ax_memory::MemoryStore;
use ax_proxy::{CredentialProxy, SecretStore, VendorRoute};
use ax_sandbox::{SandboxKind, SandboxLauncher, SpawnSpec};
use ax_scheduler::{FiredJob, JobStore, ResolvedDelivery, resolve_delivery};
use ax_taint::{SessionTaintTracker, TaintBudget};

use crate::bootstrap::{BOOTSTRAP_REPLY, BootstrapGate};
use crate::canary::CanaryRegistry;
use crate::channels::{ChannelRegistry, SessionStore};
use crate::conversation::ConversationStore;
use crate::dedup::DedupWindow;
use crate::dispatcher::HostDispatcher;
use crate::error::{HostError, HostResult};
use crate::scanner::{
    CANARY_REDACTION, InboundScanner, OutboundResult, OutboundScanner, ScanVerdict,
};
use crate::skills::{SkillScreening, SkillStore};
use crate::web::{BrowserProvider, WebProvider};
use crate::workspace::WorkspaceManager;

/// Message shown when the inbound scanner blocks a message.
const INBOUND_BLOCK_REPLY: &str =
    "That message was blocked by security policy and was not processed.";

/// Dependencies handed to the router at construction. Process-wide
/// singletons (budget, tracker, audit, secrets) are created in `main` and
/// threaded in; the router holds no hidden globals.
pub struct RouterDeps {
    /// Loaded configuration.
    pub config: Config,
    /// State root (`~/.ax`).
    pub state_root: PathBuf,
    /// Taint budget singleton.
    pub budget: Arc<TaintBudget>,
    /// Taint tracker singleton.
    pub tracker: Arc<SessionTaintTracker>,
    /// Audit sink singleton.
    pub audit: Arc<dyn AuditSink>,
    /// Secret store singleton.
    pub secrets: Arc<SecretStore>,
    /// Memory store.
    pub memory: Arc<dyn MemoryStore>,
    /// Scheduler job store.
    pub jobs: Arc<dyn JobStore>,
    /// Web provider.
    pub web: Arc<dyn WebProvider>,
    /// Browser provider.
    pub browser: Arc<dyn BrowserProvider>,
    /// Skill store.
    pub skills: Arc<SkillStore>,
    /// Host-side LLM provider (for `llm_call` and delegation).
    pub llm: Arc<dyn LlmProvider>,
    /// Session store (last channel addresses).
    pub session_store: Arc<SessionStore>,
    /// Channel adapter registry.
    pub channels: Arc<ChannelRegistry>,
    /// Path to the agent binary.
    pub agent_bin: PathBuf,
}

/// The reply for one routed turn.
#[derive(Debug, Clone)]
pub struct RouterReply {
    /// Session the turn ran under.
    pub session_id: SessionId,
    /// Assistant text (possibly a policy block notice or redaction).
    pub text: String,
    /// Whether policy prevented a model run or withheld its output.
    pub blocked: bool,
}

/// Identifies an inbound channel event for dedup and session-store updates.
#[derive(Debug, Clone)]
pub struct ChannelEvent {
    /// Provider name.
    pub provider: String,
    /// Platform message ID.
    pub message_id: String,
    /// Where the message was seen.
    pub address: SessionAddress,
}

/// The host request router.
pub struct RequestRouter {
    deps: RouterDeps,
    inbound: InboundScanner,
    outbound: OutboundScanner,
    canaries: CanaryRegistry,
    dedup: DedupWindow,
    workspaces: WorkspaceManager,
    launcher: SandboxLauncher,
}

impl RequestRouter {
    /// Create a router from its dependencies.
    #[must_use]
    pub fn new(deps: RouterDeps) -> Self {
        let dedup = DedupWindow::new(Duration::from_secs(deps.config.channels.dedup_ttl_secs));
        let workspaces =
            WorkspaceManager::new(deps.state_root.join("data/workspaces"), true);
        let kind = SandboxKind::parse(&deps.config.providers.sandbox)
            .unwrap_or(SandboxKind::Subprocess);
        let launcher =
            SandboxLauncher::new(kind, Duration::from_secs(deps.config.sandbox.timeout_secs));
        Self {
            deps,
            inbound: InboundScanner::new(),
            outbound: OutboundScanner::new(),
            canaries: CanaryRegistry::new(),
            dedup,
            workspaces,
            launcher,
        }
    }

    /// Route one turn.
    ///
    /// `session_id = None` mints a fresh session. `channel` enables dedup
    /// and updates the agent's last-address record. `stream_tx` receives
    /// assistant stdout lines as they arrive (pre-outbound-scan preview;
    /// the returned text is authoritative). Cancelling `cancel` kills the
    /// in-flight agent process; callers scope the token to the request
    /// (the HTTP surface cancels it when the client disconnects).
    ///
    /// # Errors
    ///
    /// Returns an error for invalid input, infrastructure failure, or
    /// cancellation. Policy blocks are not errors: they come back as a
    /// blocked reply.
    #[allow(clippy::too_many_lines)]
    #[allow(clippy::too_many_arguments)]
    pub async fn handle_turn(
        &self,
        agent_id: &AgentId,
        session_id: Option<SessionId>,
        user_id: Option<&str>,
        message: &str,
        channel: Option<&ChannelEvent>,
        stream_tx: Option<mpsc::Sender<String>>,
        cancel: CancellationToken,
    ) -> HostResult<RouterReply> {
        let session_id = session_id.unwrap_or_default();
        let agent_dir = self.deps.state_root.join("agents").join(agent_id.as_str());

        // Duplicate channel deliveries are no-ops.
        if let Some(event) = channel {
            if self.dedup.is_duplicate(&event.provider, &event.message_id) {
                return Ok(RouterReply {
                    session_id,
                    text: String::new(),
                    blocked: false,
                });
            }
            self.deps
                .session_store
                .record_interaction(agent_id, event.address.clone());
        }

        // Bootstrap gate: admins only until SOUL.md exists.
        let gate = BootstrapGate::new(&agent_dir);
        if !gate.allows(user_id) {
            self.audit_policy(&session_id, "bootstrap_gate", "non-admin during bootstrap");
            return Ok(RouterReply {
                session_id,
                text: BOOTSTRAP_REPLY.to_string(),
                blocked: true,
            });
        }

        // Inbound scan. Blocked messages never reach the model.
        match self.inbound.scan(message, &[]) {
            ScanVerdict::Block => {
                self.audit_policy(&session_id, "inbound_scan", "blocking pattern matched");
                return Ok(RouterReply {
                    session_id,
                    text: format!(
                        "{INBOUND_BLOCK_REPLY} ({})",
                        PolicyDenial::InboundScan
                    ),
                    blocked: true,
                });
            },
            ScanVerdict::Flag => {
                self.audit_policy(&session_id, "inbound_scan", "flag pattern matched");
            },
            ScanVerdict::Pass => {},
        }

        // Canary for this session: router-only, never sent anywhere.
        let canary = self.canaries.canary(&session_id);

        // The user message enters the budget as clean content.
        self.deps.budget.record_content(&session_id, message, false);

        // Context prep: bounded history for persistent sessions, plus a
        // bounded thread backfill on first participation in a thread.
        let conversations =
            ConversationStore::new(self.deps.state_root.join("data/conversations"));
        let mut history = conversations
            .load_history(&session_id, self.deps.config.history.max_turns)
            .await?;
        if history.is_empty()
            && let Some(event) = channel
            && event.address.scope == ax_core::AddressScope::Thread
            && let Some(adapter) = self.deps.channels.get(&event.provider)
        {
            let limit = self.deps.config.history.thread_context_turns;
            match adapter.thread_history(&event.address, limit).await {
                Ok(prior) => {
                    for (role, content) in prior {
                        history.push(crate::conversation::StoredTurn {
                            role,
                            content,
                            taint: None,
                            at: ax_core::Timestamp::now(),
                        });
                    }
                },
                Err(e) => warn!(error = %e, "Thread backfill failed"),
            }
        }

        // Workspace prep (skills re-copied, sidecar pre-seeded).
        let workspace = self.workspaces.prepare(
            &session_id,
            self.deps.skills.dir(),
            &agent_dir,
            &self.deps.budget,
        )?;

        // Per-run sockets.
        let run_dir = self.deps.state_root.join("run").join(session_id.to_string());
        std::fs::create_dir_all(&run_dir)?;
        let ipc_socket = run_dir.join("ipc.sock");
        let proxy_socket = run_dir.join("proxy.sock");

        let ipc_server = Arc::new(IpcServer::new(
            ipc_socket.clone(),
            CallContext {
                session_id: session_id.clone(),
                agent_id: agent_id.clone(),
            },
            Arc::new(self.dispatcher()),
            Arc::clone(&self.deps.budget),
            Arc::clone(&self.deps.tracker),
            Arc::clone(&self.deps.audit),
            ServerPolicy::new(
                self.deps.config.sensitive_actions(),
                self.deps.config.profile.taint_threshold(),
            ),
        ));
        let ipc_task = ipc_server
            .spawn()
            .map_err(|e| HostError::Provider(format!("ipc server: {e}")))?;

        let proxy = CredentialProxy::new(
            proxy_socket.clone(),
            self.vendor_routes(),
            Arc::clone(&self.deps.secrets),
            Arc::clone(&self.deps.audit),
            session_id.clone(),
        );
        let proxy_task = proxy
            .spawn()
            .map_err(|e| HostError::Provider(format!("credential proxy: {e}")))?;

        // Agent spawn.
        let payload = json!({
            "message": message,
            "history": history
                .iter()
                .map(|t| json!({"role": t.role, "content": t.content}))
                .collect::<Vec<_>>(),
            "taint_state": {
                "ratio": self.deps.budget.ratio(&session_id),
                "threshold": self.deps.config.profile.taint_threshold(),
            },
        });
        let spec = SpawnSpec {
            program: self.deps.agent_bin.clone(),
            args: vec![
                "--ipc-socket".to_string(),
                ipc_socket.display().to_string(),
                "--proxy-socket".to_string(),
                proxy_socket.display().to_string(),
                "--workspace".to_string(),
                workspace.display().to_string(),
                "--skills-dir".to_string(),
                workspace.join("skills").display().to_string(),
                "--provider".to_string(),
                self.deps.config.providers.llm.clone(),
                "--model".to_string(),
                self.deps.config.model.model.clone(),
                "--profile".to_string(),
                profile_name(&self.deps.config),
                "--sandbox-kind".to_string(),
                self.launcher.kind().to_string(),
            ],
            workspace: workspace.clone(),
            socket_dir: run_dir.clone(),
            env: Vec::new(),
            memory_mb: self.deps.config.sandbox.memory_mb,
            docker_image: "ax-agent:latest".to_string(),
        };

        let agent_start = SystemTime::now();
        let run = self
            .launcher
            .run(&spec, payload.to_string().as_bytes(), stream_tx, cancel)
            .await;

        ipc_task.abort();
        proxy_task.abort();
        let _ = std::fs::remove_dir_all(&run_dir);

        let output = run?;
        if output.timed_out {
            warn!(session = %session_id, "Agent timed out");
        }
        if !output.stderr.trim().is_empty() {
            tracing::debug!(stderr = %output.stderr, "Agent diagnostics");
        }

        // Outbound scan runs strictly after the full turn is collected.
        let assistant_text = output.stdout.trim().to_string();
        let (text, blocked) = match self.outbound.scan(&assistant_text, &canary) {
            OutboundResult::Clean(text) => (text, false),
            OutboundResult::Redacted(text) => {
                self.audit_policy(&session_id, "outbound_scan", "sensitive pattern redacted");
                (text, false)
            },
            OutboundResult::CanaryLeak => {
                self.canaries.mark_compromised(&session_id);
                self.audit_policy(&session_id, "canary_leak", "canary token in model output");
                (CANARY_REDACTION.to_string(), true)
            },
        };

        // Persistence: turns are appended post-scan; assistant turns from a
        // tainted session carry the tag.
        conversations
            .append(&session_id, "user", message, None)
            .await?;
        let taint = self.deps.tracker.get_taint_tag(&session_id);
        conversations
            .append(&session_id, "assistant", &text, taint)
            .await?;
        self.deps.budget.record_content(&session_id, &text, false);

        // Post-run workspace taint scan.
        self.workspaces
            .finalize(&session_id, &workspace, agent_start, &self.deps.tracker)?;

        info!(session = %session_id, blocked, chars = text.len(), "Turn complete");
        Ok(RouterReply {
            session_id,
            text,
            blocked,
        })
    }

    /// Run a scheduler-fired job and deliver its output.
    ///
    /// The job's prompt is host-authored (stored at job creation), so the
    /// inbound scanner still runs but a block is unexpected. Delivery is
    /// resolved at fire time; unresolvable targets drop the output. A job
    /// whose recorded spend exceeds its token ceiling (its own
    /// `max_token_budget`, or the scheduler default) has its delivery
    /// withheld and the overrun audited.
    ///
    /// # Errors
    ///
    /// Returns an error if the turn itself fails; delivery failures are
    /// logged and swallowed.
    pub async fn handle_fired_job(&self, fired: &FiredJob) -> HostResult<RouterReply> {
        let reply = self
            .handle_turn(
                &fired.job.agent_id,
                None,
                None,
                &fired.job.prompt,
                None,
                None,
                CancellationToken::new(),
            )
            .await?;

        if reply.blocked || reply.text.is_empty() {
            return Ok(reply);
        }

        let ceiling = fired
            .job
            .max_token_budget
            .or(self.deps.config.scheduler.max_token_budget);
        if let Some(ceiling) = ceiling {
            let spent = u64::try_from(self.deps.budget.snapshot(&reply.session_id).total_tokens)
                .unwrap_or(u64::MAX);
            if spent > ceiling {
                self.audit_policy(
                    &reply.session_id,
                    "scheduler_budget",
                    &format!(
                        "job {} spent {spent} tokens, ceiling {ceiling}; delivery withheld",
                        fired.job.id
                    ),
                );
                return Ok(RouterReply {
                    blocked: true,
                    ..reply
                });
            }
        }

        let resolved = resolve_delivery(
            fired.job.delivery.as_ref(),
            &fired.job.agent_id,
            self.deps.session_store.as_ref(),
            |provider| self.deps.channels.is_registered(provider),
        );
        match resolved {
            ResolvedDelivery::None => {},
            ResolvedDelivery::Channel(address) => {
                if let Some(adapter) = self.deps.channels.get(&address.provider) {
                    if let Err(e) = adapter.send(&address, &reply.text).await {
                        warn!(error = %e, "Scheduled delivery failed");
                    }
                }
            },
        }
        Ok(reply)
    }

    /// Whether a session has leaked its canary.
    #[must_use]
    pub fn is_compromised(&self, session_id: &SessionId) -> bool {
        self.canaries.is_compromised(session_id)
    }

    fn dispatcher(&self) -> HostDispatcher {
        HostDispatcher {
            memory: Arc::clone(&self.deps.memory),
            web: Arc::clone(&self.deps.web),
            browser: Arc::clone(&self.deps.browser),
            jobs: Arc::clone(&self.deps.jobs),
            screening: SkillScreening::new(),
            skills: Arc::clone(&self.deps.skills),
            audit: Arc::clone(&self.deps.audit),
            llm: Arc::clone(&self.deps.llm),
            tracker: Arc::clone(&self.deps.tracker),
        }
    }

    fn vendor_routes(&self) -> Vec<VendorRoute> {
        let mut routes = Vec::new();
        for (vendor, env_key) in &self.deps.config.model.credential_env {
            match vendor.as_str() {
                "anthropic" => routes.push(VendorRoute::anthropic(env_key.as_str())),
                "openai" => routes.push(VendorRoute::openai(env_key.as_str())),
                other => warn!(vendor = other, "No proxy route template for vendor"),
            }
        }
        routes
    }

    fn audit_policy(&self, session_id: &SessionId, action: &str, detail: &str) {
        let taint = self.deps.tracker.get_taint_tag(session_id);
        if let Err(e) = self.deps.audit.append(
            session_id.clone(),
            action,
            "",
            AuditStatus::Blocked,
            Some(detail.to_string()),
            0,
            taint,
        ) {
            warn!(error = %e, "Policy audit append failed");
        }
    }
}

fn profile_name(config: &Config) -> String {
    match config.profile {
        ax_config::SecurityProfile::Paranoid => "paranoid".to_string(),
        ax_config::SecurityProfile::Standard => "standard".to_string(),
        ax_config::SecurityProfile::PowerUser => "power-user".to_string(),
    }
}

