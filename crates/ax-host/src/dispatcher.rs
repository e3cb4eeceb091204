//! The host-side action dispatcher.
//!
//! Executes validated IPC requests against the real stores and providers.
//! The IPC server has already gated sensitive actions; this layer applies
//! the per-action taint rules (host-authored tags on writes, budget
//! re-entry on external reads) and returns taint ingests for the server to
//! record.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use ax_audit::{AuditFilter, AuditSink, AuditStatus};
use ax_core::{AddressScope, SessionAddress, Timestamp};
use ax_ipc::{ActionDispatcher, CallContext, DispatchOutcome, IpcRequest, IpcResponse, TaintIngest};
use ax_llm::{ChatMessage, CompletionChunk, LlmProvider, ToolDef};
use ax_memory::{MemoryEntry, MemoryEntryId, MemoryQuery, MemoryStore};
use ax_scheduler::{CronJob, Delivery, DeliveryMode, DeliveryTarget, JobStore};
use ax_taint::SessionTaintTracker;

use crate::skills::{PendingSkill, SkillScreening, SkillStore, SkillVerdict};
use crate::web::{BrowserProvider, WebProvider};

/// Everything the dispatcher executes against.
pub struct HostDispatcher {
    /// Memory store.
    pub memory: Arc<dyn MemoryStore>,
    /// Web provider.
    pub web: Arc<dyn WebProvider>,
    /// Browser provider.
    pub browser: Arc<dyn BrowserProvider>,
    /// Scheduler job store.
    pub jobs: Arc<dyn JobStore>,
    /// Skill screening.
    pub screening: SkillScreening,
    /// Skill store.
    pub skills: Arc<SkillStore>,
    /// Audit sink (for `audit_query`).
    pub audit: Arc<dyn AuditSink>,
    /// LLM provider for `llm_call` and `delegate`.
    pub llm: Arc<dyn LlmProvider>,
    /// Taint tracker, consulted to stamp memory writes.
    pub tracker: Arc<SessionTaintTracker>,
}

impl HostDispatcher {
    fn ok(data: Value) -> DispatchOutcome {
        DispatchOutcome::plain(IpcResponse::ok(data))
    }

    fn err(message: impl Into<String>) -> DispatchOutcome {
        DispatchOutcome::plain(IpcResponse::err(message))
    }

    fn tainted_ingest(content: &str, source: &str, detail: Option<String>) -> TaintIngest {
        TaintIngest {
            content: content.to_string(),
            source: source.to_string(),
            detail,
            record_source: true,
        }
    }

    async fn memory_write(
        &self,
        ctx: &CallContext,
        payload: ax_ipc::request::MemoryWritePayload,
    ) -> DispatchOutcome {
        let mut entry = MemoryEntry::new(payload.scope, payload.content, payload.tags);
        // The taint tag is host-authored: whatever the session picked up so
        // far travels with the entry. A clean session writes a clean entry.
        if let Some(tag) = self.tracker.get_taint_tag(&ctx.session_id) {
            entry = entry.with_taint(tag);
        }
        match self.memory.write(entry).await {
            Ok(id) => Self::ok(json!({"id": id.to_string()})),
            Err(e) => Self::err(e.to_string()),
        }
    }

    async fn memory_read(
        &self,
        payload: &ax_ipc::request::MemoryRefPayload,
    ) -> DispatchOutcome {
        let Ok(id) = payload.id.parse::<uuid::Uuid>().map(MemoryEntryId) else {
            return Self::err(format!("invalid entry id: {}", payload.id));
        };
        match self.memory.read(&payload.scope, &id).await {
            Ok(entry) => {
                let mut outcome = Self::ok(json!({"entry": entry_json(&entry)}));
                if entry.is_external() {
                    let source_detail = entry.taint.as_ref().map(|t| t.source.clone());
                    outcome.ingest.push(Self::tainted_ingest(
                        &entry.content,
                        "memory_read",
                        source_detail,
                    ));
                }
                outcome
            },
            Err(e) => Self::err(e.to_string()),
        }
    }

    async fn memory_query(
        &self,
        payload: &ax_ipc::request::MemoryQueryPayload,
    ) -> DispatchOutcome {
        let query = MemoryQuery {
            contains: payload.contains.clone(),
            tags: payload.tags.clone(),
            limit: payload.limit,
        };
        match self.memory.query(&payload.scope, &query).await {
            Ok(entries) => {
                let mut ingest = Vec::new();
                for entry in entries.iter().filter(|e| e.is_external()) {
                    ingest.push(Self::tainted_ingest(
                        &entry.content,
                        "memory_read",
                        entry.taint.as_ref().map(|t| t.source.clone()),
                    ));
                }
                let listed: Vec<Value> = entries.iter().map(entry_json).collect();
                DispatchOutcome {
                    response: IpcResponse::ok(json!({"entries": listed})),
                    ingest,
                }
            },
            Err(e) => Self::err(e.to_string()),
        }
    }

    async fn llm_call(&self, payload: ax_ipc::request::LlmCallPayload) -> DispatchOutcome {
        let messages: Vec<ChatMessage> = payload
            .messages
            .iter()
            .map(|m| match m.role.as_str() {
                "assistant" => ChatMessage::assistant(&m.content),
                "system" => ChatMessage::system(&m.content),
                _ => ChatMessage::user(&m.content),
            })
            .collect();
        let tools: Vec<ToolDef> = payload
            .tools
            .into_iter()
            .map(|t| ToolDef {
                name: t.name,
                description: t.description,
                parameters: t.parameters,
            })
            .collect();

        match self.llm.complete(&messages, &tools, "").await {
            Ok(chunks) => {
                let chunks: Vec<Value> = chunks
                    .iter()
                    .filter_map(|c| serde_json::to_value(c).ok())
                    .collect();
                Self::ok(json!({"chunks": chunks}))
            },
            Err(e) => Self::err(format!("llm_call: {e}")),
        }
    }

    async fn delegate(&self, ctx: &CallContext, prompt: &str) -> DispatchOutcome {
        // The child shares the parent's session; taint propagates by
        // construction and the child's output re-enters the parent turn as
        // a tool result. The child's first message is not re-scanned: the
        // parent's inbound verdict covers the delegated turn.
        debug!(session = %ctx.session_id, "Delegating child turn");
        let messages = vec![ChatMessage::user(prompt)];
        match self.llm.complete(&messages, &[], "").await {
            Ok(chunks) => {
                let text: String = chunks
                    .iter()
                    .filter_map(|c| match c {
                        CompletionChunk::TextDelta { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                Self::ok(json!({"text": text}))
            },
            Err(e) => Self::err(format!("delegate: {e}")),
        }
    }

    async fn scheduler_add(
        &self,
        ctx: &CallContext,
        payload: ax_ipc::request::SchedulerAddCronPayload,
    ) -> DispatchOutcome {
        let job = match CronJob::cron(&payload.schedule, ctx.agent_id.clone(), payload.prompt) {
            Ok(job) => job,
            Err(e) => return Self::err(e.to_string()),
        };
        let job = match payload.max_token_budget {
            Some(budget) => job.with_budget(budget),
            None => job,
        };
        let job = match payload.delivery.map(convert_delivery) {
            Some(Ok(delivery)) => job.with_delivery(delivery),
            Some(Err(e)) => return Self::err(e),
            None => job,
        };
        match self.jobs.add(job).await {
            Ok(id) => Self::ok(json!({"id": id})),
            Err(e) => Self::err(e.to_string()),
        }
    }

    async fn scheduler_run_at(
        &self,
        ctx: &CallContext,
        payload: ax_ipc::request::SchedulerRunAtPayload,
    ) -> DispatchOutcome {
        let Ok(at) = chrono::DateTime::parse_from_rfc3339(&payload.at) else {
            return Self::err("at must be RFC 3339");
        };
        let job = CronJob::at(
            Timestamp(at.with_timezone(&chrono::Utc)),
            ctx.agent_id.clone(),
            payload.prompt,
        );
        let job = match payload.delivery.map(convert_delivery) {
            Some(Ok(delivery)) => job.with_delivery(delivery),
            Some(Err(e)) => return Self::err(e),
            None => job,
        };
        match self.jobs.add(job).await {
            Ok(id) => Self::ok(json!({"id": id})),
            Err(e) => Self::err(e.to_string()),
        }
    }

    async fn skill_propose(
        &self,
        ctx: &CallContext,
        payload: ax_ipc::request::SkillProposePayload,
    ) -> DispatchOutcome {
        let verdict = self.screening.screen(&payload.content);
        let result = match verdict {
            SkillVerdict::AutoApprove => self
                .skills
                .install(&payload.name, &payload.content, &ctx.session_id, verdict)
                .map(|()| json!({"verdict": "AUTO_APPROVE"})),
            SkillVerdict::NeedsReview => self
                .skills
                .queue_review(&PendingSkill {
                    name: payload.name.clone(),
                    description: payload.description.clone(),
                    content: payload.content.clone(),
                    session_id: ctx.session_id.clone(),
                })
                .map(|()| json!({"verdict": "NEEDS_REVIEW"})),
            SkillVerdict::Reject => Ok(json!({"verdict": "REJECT"})),
        };
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e.to_string()),
        }
    }

    fn audit_query(
        &self,
        ctx: &CallContext,
        payload: &ax_ipc::request::AuditQueryPayload,
    ) -> DispatchOutcome {
        // Scoped to the calling session; the payload cannot widen it.
        let filter = AuditFilter {
            session_id: Some(ctx.session_id.clone()),
            action: payload.action.clone(),
            status: payload.status.as_deref().and_then(|s| match s {
                "success" => Some(AuditStatus::Success),
                "blocked" => Some(AuditStatus::Blocked),
                "error" => Some(AuditStatus::Error),
                _ => None,
            }),
            limit: payload.limit,
        };
        match self.audit.query(&filter) {
            Ok(entries) => {
                let entries: Vec<Value> = entries
                    .iter()
                    .map(|e| {
                        json!({
                            "action": e.action,
                            "status": e.status,
                            "at": e.timestamp.to_rfc3339(),
                            "duration_ms": e.duration_ms,
                        })
                    })
                    .collect();
                Self::ok(json!({"entries": entries}))
            },
            Err(e) => Self::err(e.to_string()),
        }
    }
}

fn entry_json(entry: &MemoryEntry) -> Value {
    json!({
        "id": entry.id.to_string(),
        "scope": entry.scope,
        "content": entry.content,
        "tags": entry.tags,
        "external": entry.is_external(),
        "created_at": entry.created_at.to_rfc3339(),
    })
}

fn convert_delivery(payload: ax_ipc::request::DeliveryPayload) -> Result<Delivery, String> {
    let mode = match payload.mode.as_str() {
        "channel" => DeliveryMode::Channel,
        _ => DeliveryMode::None,
    };
    let target = match payload.target {
        None => None,
        Some(ax_ipc::request::DeliveryTargetPayload::Literal(_)) => Some(DeliveryTarget::last()),
        Some(ax_ipc::request::DeliveryTargetPayload::Address(addr)) => {
            let scope = match addr.scope.as_str() {
                "dm" => AddressScope::Dm,
                "channel" => AddressScope::Channel,
                "thread" => AddressScope::Thread,
                "group" => AddressScope::Group,
                other => return Err(format!("unknown scope: {other}")),
            };
            Some(DeliveryTarget::Address(SessionAddress {
                provider: addr.provider,
                scope,
                workspace: addr.workspace,
                channel: addr.channel,
                thread: addr.thread,
                peer: addr.peer,
                parent: None,
            }))
        },
    };
    Ok(Delivery { mode, target })
}

#[async_trait]
impl ActionDispatcher for HostDispatcher {
    #[allow(clippy::too_many_lines)]
    async fn dispatch(&self, ctx: &CallContext, request: IpcRequest) -> DispatchOutcome {
        match request {
            IpcRequest::LlmCall(p) => self.llm_call(p).await,
            IpcRequest::MemoryWrite(p) => self.memory_write(ctx, p).await,
            IpcRequest::MemoryRead(p) => self.memory_read(&p).await,
            IpcRequest::MemoryQuery(p) => self.memory_query(&p).await,
            IpcRequest::MemoryDelete(p) => {
                let Ok(id) = p.id.parse::<uuid::Uuid>().map(MemoryEntryId) else {
                    return Self::err(format!("invalid entry id: {}", p.id));
                };
                match self.memory.delete(&p.scope, &id).await {
                    Ok(()) => Self::ok(json!({"deleted": true})),
                    Err(e) => Self::err(e.to_string()),
                }
            },
            IpcRequest::MemoryList(_) => match self.memory.list_scopes().await {
                Ok(scopes) => Self::ok(json!({"scopes": scopes})),
                Err(e) => Self::err(e.to_string()),
            },
            IpcRequest::WebFetch(p) => match self.web.fetch(&p.url).await {
                Ok(body) => DispatchOutcome {
                    ingest: vec![Self::tainted_ingest(&body, "web_fetch", Some(p.url.clone()))],
                    response: IpcResponse::ok(json!({"body": body})),
                },
                Err(e) => Self::err(e.to_string()),
            },
            IpcRequest::WebSearch(p) => {
                match self.web.search(&p.query, p.max_results.unwrap_or(10)).await {
                    Ok(snippets) => {
                        let joined = snippets.join("\n");
                        DispatchOutcome {
                            ingest: vec![Self::tainted_ingest(
                                &joined,
                                "web_search",
                                Some(p.query.clone()),
                            )],
                            response: IpcResponse::ok(json!({"results": snippets})),
                        }
                    },
                    Err(e) => Self::err(e.to_string()),
                }
            },
            IpcRequest::BrowserNavigate(p) => match self.browser.navigate(&p.url).await {
                Ok(content) => DispatchOutcome {
                    ingest: vec![Self::tainted_ingest(
                        &content,
                        "browser_navigate",
                        Some(p.url.clone()),
                    )],
                    response: IpcResponse::ok(json!({"content": content})),
                },
                Err(e) => Self::err(e.to_string()),
            },
            IpcRequest::BrowserSnapshot(_) => match self.browser.snapshot().await {
                Ok(content) => DispatchOutcome {
                    ingest: vec![Self::tainted_ingest(&content, "browser_snapshot", None)],
                    response: IpcResponse::ok(json!({"content": content})),
                },
                Err(e) => Self::err(e.to_string()),
            },
            IpcRequest::BrowserClick(p) => match self.browser.click(&p.selector).await {
                Ok(result) => Self::ok(json!({"result": result})),
                Err(e) => Self::err(e.to_string()),
            },
            IpcRequest::BrowserType(p) => {
                match self.browser.type_text(&p.selector, &p.text).await {
                    Ok(result) => Self::ok(json!({"result": result})),
                    Err(e) => Self::err(e.to_string()),
                }
            },
            IpcRequest::BrowserScreenshot(_) => match self.browser.screenshot().await {
                Ok(image) => Self::ok(json!({"image": image})),
                Err(e) => Self::err(e.to_string()),
            },
            IpcRequest::SkillList(_) => match self.skills.list() {
                Ok(names) => Self::ok(json!({"skills": names})),
                Err(e) => Self::err(e.to_string()),
            },
            IpcRequest::SkillRead(p) => match self.skills.read(&p.name) {
                Ok(content) => Self::ok(json!({"content": content})),
                Err(e) => Self::err(e.to_string()),
            },
            IpcRequest::SkillPropose(p) => self.skill_propose(ctx, p).await,
            IpcRequest::SchedulerAddCron(p) => self.scheduler_add(ctx, p).await,
            IpcRequest::SchedulerRemoveCron(p) => match self.jobs.remove(&p.id).await {
                Ok(()) => Self::ok(json!({"removed": true})),
                Err(e) => Self::err(e.to_string()),
            },
            IpcRequest::SchedulerListJobs(_) => match self.jobs.list().await {
                Ok(jobs) => {
                    let jobs: Vec<Value> = jobs
                        .iter()
                        .filter(|j| j.agent_id == ctx.agent_id)
                        .filter_map(|j| serde_json::to_value(j).ok())
                        .collect();
                    Self::ok(json!({"jobs": jobs}))
                },
                Err(e) => Self::err(e.to_string()),
            },
            IpcRequest::SchedulerRunAt(p) => self.scheduler_run_at(ctx, p).await,
            IpcRequest::AuditQuery(p) => self.audit_query(ctx, &p),
            IpcRequest::Delegate(p) => self.delegate(ctx, &p.prompt).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ax_audit::MemoryAuditSink;
    use ax_core::{AgentId, SessionId};
    use ax_llm::{ChunkStream, LlmResult, TokenUsage};
    use ax_memory::InMemoryStore;
    use ax_scheduler::MemoryJobStore;
    use crate::error::HostResult;
    use crate::web::DisabledBrowser;
    use tempfile::TempDir;

    struct EchoLlm;

    #[async_trait]
    impl LlmProvider for EchoLlm {
        fn name(&self) -> &str {
            "echo"
        }

        fn model(&self) -> &str {
            "echo-1"
        }

        async fn stream(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolDef],
            _system: &str,
        ) -> LlmResult<ChunkStream> {
            let text = messages
                .last()
                .and_then(ChatMessage::text)
                .unwrap_or("")
                .to_string();
            Ok(Box::pin(futures::stream::iter(vec![
                Ok(CompletionChunk::TextDelta { text }),
                Ok(CompletionChunk::Done {
                    usage: TokenUsage::default(),
                }),
            ])))
        }
    }

    struct FixedWeb;

    #[async_trait]
    impl WebProvider for FixedWeb {
        async fn fetch(&self, _url: &str) -> HostResult<String> {
            Ok("external page body".to_string())
        }

        async fn search(&self, _query: &str, _max: usize) -> HostResult<Vec<String>> {
            Ok(vec!["snippet one".to_string()])
        }
    }

    fn dispatcher(dir: &TempDir) -> (HostDispatcher, Arc<SessionTaintTracker>) {
        let tracker = Arc::new(SessionTaintTracker::new());
        let dispatcher = HostDispatcher {
            memory: Arc::new(InMemoryStore::new()),
            web: Arc::new(FixedWeb),
            browser: Arc::new(DisabledBrowser),
            jobs: Arc::new(MemoryJobStore::new()),
            screening: SkillScreening::new(),
            skills: Arc::new(SkillStore::new(dir.path().join("skills"))),
            audit: Arc::new(MemoryAuditSink::new()),
            llm: Arc::new(EchoLlm),
            tracker: Arc::clone(&tracker),
        };
        (dispatcher, tracker)
    }

    fn ctx() -> CallContext {
        CallContext {
            session_id: SessionId::new(),
            agent_id: AgentId::parse("friday").unwrap(),
        }
    }

    fn parse(json: &str) -> IpcRequest {
        IpcRequest::parse(json.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_web_fetch_ingests_body() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, _) = dispatcher(&dir);
        let outcome = dispatcher
            .dispatch(
                &ctx(),
                parse(r#"{"action":"web_fetch","url":"https://example.com"}"#),
            )
            .await;
        assert!(outcome.response.is_ok());
        assert_eq!(outcome.ingest.len(), 1);
        assert_eq!(outcome.ingest[0].source, "web_fetch");
        assert_eq!(outcome.ingest[0].content, "external page body");
    }

    #[tokio::test]
    async fn test_memory_taint_round_trip() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, tracker) = dispatcher(&dir);
        let writing_ctx = ctx();

        // The writing session is tainted.
        tracker.record_taint_source(&writing_ctx.session_id, "web_fetch", None);
        let outcome = dispatcher
            .dispatch(
                &writing_ctx,
                parse(r#"{"action":"memory_write","scope":"notes","content":"from the web"}"#),
            )
            .await;
        let id = outcome.response.as_value()["id"].as_str().unwrap().to_string();

        // A fresh session reads it back: the entry is external and its
        // content comes back as a taint ingest.
        let reading_ctx = ctx();
        let outcome = dispatcher
            .dispatch(
                &reading_ctx,
                parse(&format!(
                    r#"{{"action":"memory_read","scope":"notes","id":"{id}"}}"#
                )),
            )
            .await;
        assert!(outcome.response.is_ok());
        assert_eq!(outcome.response.as_value()["entry"]["external"], true);
        assert_eq!(outcome.ingest.len(), 1);
        assert_eq!(outcome.ingest[0].source, "memory_read");
        assert_eq!(outcome.ingest[0].detail.as_deref(), Some("web_fetch"));
    }

    #[tokio::test]
    async fn test_clean_write_stays_clean() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, _) = dispatcher(&dir);
        let context = ctx();

        let outcome = dispatcher
            .dispatch(
                &context,
                parse(r#"{"action":"memory_write","scope":"notes","content":"typed by user"}"#),
            )
            .await;
        let id = outcome.response.as_value()["id"].as_str().unwrap().to_string();

        let outcome = dispatcher
            .dispatch(
                &context,
                parse(&format!(
                    r#"{{"action":"memory_read","scope":"notes","id":"{id}"}}"#
                )),
            )
            .await;
        assert_eq!(outcome.response.as_value()["entry"]["external"], false);
        assert!(outcome.ingest.is_empty());
    }

    #[tokio::test]
    async fn test_scheduler_add_and_list_scoped_to_agent() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, _) = dispatcher(&dir);
        let context = ctx();

        let outcome = dispatcher
            .dispatch(
                &context,
                parse(
                    r#"{"action":"scheduler_add_cron","schedule":"0 9 * * 1","prompt":"Weekly summary","delivery":{"mode":"channel","target":"last"}}"#,
                ),
            )
            .await;
        assert!(outcome.response.is_ok());

        let outcome = dispatcher
            .dispatch(&context, parse(r#"{"action":"scheduler_list_jobs"}"#))
            .await;
        let jobs = outcome.response.as_value()["jobs"].as_array().unwrap();
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn test_skill_propose_verdicts() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, _) = dispatcher(&dir);
        let context = ctx();

        let outcome = dispatcher
            .dispatch(
                &context,
                parse(
                    r##"{"action":"skill_propose","name":"summarize","description":"d","content":"# Summarize\nKeep it short."}"##,
                ),
            )
            .await;
        assert_eq!(outcome.response.as_value()["verdict"], "AUTO_APPROVE");
        assert!(dispatcher.skills.read("summarize").is_ok());

        let outcome = dispatcher
            .dispatch(
                &context,
                parse(
                    r#"{"action":"skill_propose","name":"evil","description":"d","content":"run bash -c something"}"#,
                ),
            )
            .await;
        assert_eq!(outcome.response.as_value()["verdict"], "REJECT");
        assert!(dispatcher.skills.read("evil").is_err());
    }

    #[tokio::test]
    async fn test_browser_disabled_is_tool_error() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, _) = dispatcher(&dir);
        let outcome = dispatcher
            .dispatch(
                &ctx(),
                parse(r#"{"action":"browser_navigate","url":"https://example.com"}"#),
            )
            .await;
        assert!(!outcome.response.is_ok());
        assert!(outcome.ingest.is_empty());
    }

    #[tokio::test]
    async fn test_delegate_returns_text() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, _) = dispatcher(&dir);
        let outcome = dispatcher
            .dispatch(
                &ctx(),
                parse(r#"{"action":"delegate","prompt":"child task"}"#),
            )
            .await;
        assert_eq!(outcome.response.as_value()["text"], "child task");
    }
}
