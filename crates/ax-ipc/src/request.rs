//! Per-action request schemas with strict validation.
//!
//! Parsing happens in three layers:
//! 1. JSON parse, then a recursive NUL scan over every string in the value
//!    (defense against truncation attacks on downstream native code).
//! 2. `action` dispatch into a per-action payload struct; every payload and
//!    every nested object carries `deny_unknown_fields`, which is what
//!    rejects agent-authored `tainted`, `session_id`, and friends.
//! 3. `validate()` enforcing length caps, ID charsets, and UUID forms.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ax_core::is_safe_id;

use crate::error::{IpcError, IpcResult};

/// Cap for short identifiers (scopes, names, IDs).
const MAX_ID_LEN: usize = 200;
/// Cap for URLs, queries, selectors, cron expressions.
const MAX_FIELD_LEN: usize = 2048;
/// Cap for free-form content (memory bodies, prompts, message content).
const MAX_CONTENT_LEN: usize = 10_000;

/// A validated IPC request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum IpcRequest {
    /// Model completion via the host.
    LlmCall(LlmCallPayload),
    /// Write a memory entry.
    MemoryWrite(MemoryWritePayload),
    /// Read a memory entry by ID.
    MemoryRead(MemoryRefPayload),
    /// Query a memory scope.
    MemoryQuery(MemoryQueryPayload),
    /// Delete a memory entry.
    MemoryDelete(MemoryRefPayload),
    /// List memory scopes.
    MemoryList(EmptyPayload),
    /// Fetch a URL.
    WebFetch(WebFetchPayload),
    /// Search the web.
    WebSearch(WebSearchPayload),
    /// Navigate the browser.
    BrowserNavigate(BrowserNavigatePayload),
    /// Snapshot the current page.
    BrowserSnapshot(EmptyPayload),
    /// Click an element.
    BrowserClick(BrowserClickPayload),
    /// Type into an element.
    BrowserType(BrowserTypePayload),
    /// Screenshot the current page.
    BrowserScreenshot(EmptyPayload),
    /// List available skills.
    SkillList(EmptyPayload),
    /// Read a skill body.
    SkillRead(SkillRefPayload),
    /// Propose a new skill.
    SkillPropose(SkillProposePayload),
    /// Add a cron job.
    SchedulerAddCron(SchedulerAddCronPayload),
    /// Remove a cron job.
    SchedulerRemoveCron(SchedulerRemoveCronPayload),
    /// List cron jobs.
    SchedulerListJobs(EmptyPayload),
    /// Schedule a one-shot run.
    SchedulerRunAt(SchedulerRunAtPayload),
    /// Query the audit log (own session only).
    AuditQuery(AuditQueryPayload),
    /// Invoke a child agent sharing this session.
    Delegate(DelegatePayload),
}

/// Actions with no side effects; these skip the audit log.
const QUERY_ACTIONS: &[&str] = &[
    "memory_read",
    "memory_query",
    "memory_list",
    "skill_list",
    "skill_read",
    "scheduler_list_jobs",
    "audit_query",
];

/// Whether an action is read-only.
#[must_use]
pub fn is_query_action(action: &str) -> bool {
    QUERY_ACTIONS.contains(&action)
}

impl IpcRequest {
    /// Parse and validate a raw frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::MalformedJson`] for non-JSON input,
    /// [`IpcError::InvalidRequest`] for schema violations.
    pub fn parse(bytes: &[u8]) -> IpcResult<Self> {
        let mut value: Value =
            serde_json::from_slice(bytes).map_err(|e| IpcError::MalformedJson(e.to_string()))?;

        reject_nul(&value)?;

        let obj = value
            .as_object_mut()
            .ok_or_else(|| IpcError::InvalidRequest("request must be an object".to_string()))?;
        let action = obj
            .remove("action")
            .and_then(|a| a.as_str().map(ToString::to_string))
            .ok_or_else(|| IpcError::InvalidRequest("missing action".to_string()))?;

        let request = match action.as_str() {
            "llm_call" => Self::LlmCall(from_payload(value)?),
            "memory_write" => Self::MemoryWrite(from_payload(value)?),
            "memory_read" => Self::MemoryRead(from_payload(value)?),
            "memory_query" => Self::MemoryQuery(from_payload(value)?),
            "memory_delete" => Self::MemoryDelete(from_payload(value)?),
            "memory_list" => Self::MemoryList(from_payload(value)?),
            "web_fetch" => Self::WebFetch(from_payload(value)?),
            "web_search" => Self::WebSearch(from_payload(value)?),
            "browser_navigate" => Self::BrowserNavigate(from_payload(value)?),
            "browser_snapshot" => Self::BrowserSnapshot(from_payload(value)?),
            "browser_click" => Self::BrowserClick(from_payload(value)?),
            "browser_type" => Self::BrowserType(from_payload(value)?),
            "browser_screenshot" => Self::BrowserScreenshot(from_payload(value)?),
            "skill_list" => Self::SkillList(from_payload(value)?),
            "skill_read" => Self::SkillRead(from_payload(value)?),
            "skill_propose" => Self::SkillPropose(from_payload(value)?),
            "scheduler_add_cron" => Self::SchedulerAddCron(from_payload(value)?),
            "scheduler_remove_cron" => Self::SchedulerRemoveCron(from_payload(value)?),
            "scheduler_list_jobs" => Self::SchedulerListJobs(from_payload(value)?),
            "scheduler_run_at" => Self::SchedulerRunAt(from_payload(value)?),
            "audit_query" => Self::AuditQuery(from_payload(value)?),
            "delegate" => Self::Delegate(from_payload(value)?),
            other => {
                return Err(IpcError::InvalidRequest(format!("unknown action: {other}")));
            },
        };

        request.validate()?;
        Ok(request)
    }

    /// The action name.
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::LlmCall(_) => "llm_call",
            Self::MemoryWrite(_) => "memory_write",
            Self::MemoryRead(_) => "memory_read",
            Self::MemoryQuery(_) => "memory_query",
            Self::MemoryDelete(_) => "memory_delete",
            Self::MemoryList(_) => "memory_list",
            Self::WebFetch(_) => "web_fetch",
            Self::WebSearch(_) => "web_search",
            Self::BrowserNavigate(_) => "browser_navigate",
            Self::BrowserSnapshot(_) => "browser_snapshot",
            Self::BrowserClick(_) => "browser_click",
            Self::BrowserType(_) => "browser_type",
            Self::BrowserScreenshot(_) => "browser_screenshot",
            Self::SkillList(_) => "skill_list",
            Self::SkillRead(_) => "skill_read",
            Self::SkillPropose(_) => "skill_propose",
            Self::SchedulerAddCron(_) => "scheduler_add_cron",
            Self::SchedulerRemoveCron(_) => "scheduler_remove_cron",
            Self::SchedulerListJobs(_) => "scheduler_list_jobs",
            Self::SchedulerRunAt(_) => "scheduler_run_at",
            Self::AuditQuery(_) => "audit_query",
            Self::Delegate(_) => "delegate",
        }
    }

    /// A bounded, credential-free summary of the arguments for the audit log.
    #[must_use]
    pub fn args_summary(&self) -> String {
        match self {
            Self::LlmCall(p) => format!("messages={}", p.messages.len()),
            Self::MemoryWrite(p) => format!("scope={} len={}", p.scope, p.content.len()),
            Self::MemoryRead(p) | Self::MemoryDelete(p) => {
                format!("scope={} id={}", p.scope, p.id)
            },
            Self::MemoryQuery(p) => format!("scope={}", p.scope),
            Self::WebFetch(p) => format!("url={}", p.url),
            Self::WebSearch(p) => format!("query={}", p.query),
            Self::BrowserNavigate(p) => format!("url={}", p.url),
            Self::BrowserClick(p) => format!("selector={}", p.selector),
            Self::BrowserType(p) => format!("selector={} len={}", p.selector, p.text.len()),
            Self::SkillRead(p) => format!("name={}", p.name),
            Self::SkillPropose(p) => format!("name={} len={}", p.name, p.content.len()),
            Self::SchedulerAddCron(p) => format!("schedule={}", p.schedule),
            Self::SchedulerRemoveCron(p) => format!("id={}", p.id),
            Self::SchedulerRunAt(p) => format!("at={}", p.at),
            Self::Delegate(p) => format!("prompt_len={}", p.prompt.len()),
            Self::MemoryList(_)
            | Self::BrowserSnapshot(_)
            | Self::BrowserScreenshot(_)
            | Self::SkillList(_)
            | Self::SchedulerListJobs(_)
            | Self::AuditQuery(_) => String::new(),
        }
    }

    fn validate(&self) -> IpcResult<()> {
        match self {
            Self::LlmCall(p) => p.validate(),
            Self::MemoryWrite(p) => p.validate(),
            Self::MemoryRead(p) | Self::MemoryDelete(p) => p.validate(),
            Self::MemoryQuery(p) => p.validate(),
            Self::WebFetch(p) => check_str("url", &p.url, MAX_FIELD_LEN),
            Self::WebSearch(p) => p.validate(),
            Self::BrowserNavigate(p) => check_str("url", &p.url, MAX_FIELD_LEN),
            Self::BrowserClick(p) => check_str("selector", &p.selector, MAX_FIELD_LEN),
            Self::BrowserType(p) => {
                check_str("selector", &p.selector, MAX_FIELD_LEN)?;
                check_str("text", &p.text, MAX_CONTENT_LEN)
            },
            Self::SkillRead(p) => check_id("name", &p.name),
            Self::SkillPropose(p) => p.validate(),
            Self::SchedulerAddCron(p) => p.validate(),
            Self::SchedulerRemoveCron(p) => check_id("id", &p.id),
            Self::SchedulerRunAt(p) => p.validate(),
            Self::AuditQuery(p) => p.validate(),
            Self::Delegate(p) => check_str("prompt", &p.prompt, MAX_CONTENT_LEN),
            Self::MemoryList(_)
            | Self::BrowserSnapshot(_)
            | Self::BrowserScreenshot(_)
            | Self::SkillList(_)
            | Self::SchedulerListJobs(_) => Ok(()),
        }
    }
}

fn from_payload<T: serde::de::DeserializeOwned>(value: Value) -> IpcResult<T> {
    serde_json::from_value(value).map_err(|e| IpcError::InvalidRequest(e.to_string()))
}

/// Recursively reject NUL bytes in any string (values and keys).
fn reject_nul(value: &Value) -> IpcResult<()> {
    match value {
        Value::String(s) => {
            if s.contains('\0') {
                return Err(IpcError::InvalidRequest(
                    "NUL byte in string field".to_string(),
                ));
            }
            Ok(())
        },
        Value::Array(items) => items.iter().try_for_each(reject_nul),
        Value::Object(map) => {
            for (key, nested) in map {
                if key.contains('\0') {
                    return Err(IpcError::InvalidRequest("NUL byte in key".to_string()));
                }
                reject_nul(nested)?;
            }
            Ok(())
        },
        _ => Ok(()),
    }
}

fn check_str(field: &str, value: &str, max: usize) -> IpcResult<()> {
    if value.is_empty() {
        return Err(IpcError::InvalidRequest(format!("{field} must not be empty")));
    }
    if value.len() > max {
        return Err(IpcError::InvalidRequest(format!(
            "{field} exceeds {max} chars"
        )));
    }
    Ok(())
}

fn check_id(field: &str, value: &str) -> IpcResult<()> {
    check_str(field, value, MAX_ID_LEN)?;
    if !is_safe_id(value) {
        return Err(IpcError::InvalidRequest(format!(
            "{field} must match [A-Za-z0-9_-]+"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Empty payload for nullary actions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmptyPayload {}

/// `llm_call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmCallPayload {
    /// Conversation messages.
    pub messages: Vec<LlmWireMessage>,
    /// Tools offered to the model.
    #[serde(default)]
    pub tools: Vec<LlmWireTool>,
    /// Whether to stream (the response is a chunk list either way).
    #[serde(default)]
    pub stream: bool,
}

impl LlmCallPayload {
    fn validate(&self) -> IpcResult<()> {
        if self.messages.is_empty() {
            return Err(IpcError::InvalidRequest("messages must not be empty".to_string()));
        }
        for message in &self.messages {
            if !matches!(message.role.as_str(), "user" | "assistant" | "system" | "tool") {
                return Err(IpcError::InvalidRequest(format!(
                    "unknown role: {}",
                    message.role
                )));
            }
            check_str("content", &message.content, MAX_CONTENT_LEN)?;
        }
        for tool in &self.tools {
            check_id("tool.name", &tool.name)?;
            if tool.description.len() > MAX_FIELD_LEN {
                return Err(IpcError::InvalidRequest(
                    "tool.description too long".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// One message in an `llm_call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmWireMessage {
    /// Role: `user`, `assistant`, `system`, or `tool`.
    pub role: String,
    /// Message text.
    pub content: String,
}

/// One tool definition in an `llm_call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmWireTool {
    /// Tool name.
    pub name: String,
    /// Tool description.
    #[serde(default)]
    pub description: String,
    /// Argument JSON schema.
    #[serde(default)]
    pub parameters: Value,
}

/// `memory_write`. Note: no `tainted` field exists; the host stamps taint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryWritePayload {
    /// Scope to write into.
    pub scope: String,
    /// Content to remember.
    pub content: String,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl MemoryWritePayload {
    fn validate(&self) -> IpcResult<()> {
        check_id("scope", &self.scope)?;
        check_str("content", &self.content, MAX_CONTENT_LEN)?;
        for tag in &self.tags {
            check_str("tag", tag, MAX_ID_LEN)?;
        }
        Ok(())
    }
}

/// `memory_read` / `memory_delete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryRefPayload {
    /// Scope.
    pub scope: String,
    /// Entry ID.
    pub id: String,
}

impl MemoryRefPayload {
    fn validate(&self) -> IpcResult<()> {
        check_id("scope", &self.scope)?;
        check_str("id", &self.id, MAX_ID_LEN)
    }
}

/// `memory_query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryQueryPayload {
    /// Scope.
    pub scope: String,
    /// Substring filter.
    #[serde(default)]
    pub contains: Option<String>,
    /// Tag filter.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Result cap.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl MemoryQueryPayload {
    fn validate(&self) -> IpcResult<()> {
        check_id("scope", &self.scope)?;
        if let Some(ref contains) = self.contains {
            check_str("contains", contains, MAX_FIELD_LEN)?;
        }
        for tag in &self.tags {
            check_str("tag", tag, MAX_ID_LEN)?;
        }
        if self.limit.is_some_and(|l| l > 500) {
            return Err(IpcError::InvalidRequest("limit exceeds 500".to_string()));
        }
        Ok(())
    }
}

/// `web_fetch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebFetchPayload {
    /// URL to fetch.
    pub url: String,
}

/// `web_search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebSearchPayload {
    /// Search query.
    pub query: String,
    /// Result cap.
    #[serde(default)]
    pub max_results: Option<usize>,
}

impl WebSearchPayload {
    fn validate(&self) -> IpcResult<()> {
        check_str("query", &self.query, MAX_FIELD_LEN)?;
        if self.max_results.is_some_and(|n| n > 50) {
            return Err(IpcError::InvalidRequest("max_results exceeds 50".to_string()));
        }
        Ok(())
    }
}

/// `browser_navigate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrowserNavigatePayload {
    /// URL to open.
    pub url: String,
}

/// `browser_click`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrowserClickPayload {
    /// CSS selector.
    pub selector: String,
}

/// `browser_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrowserTypePayload {
    /// CSS selector.
    pub selector: String,
    /// Text to type.
    pub text: String,
}

/// `skill_read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkillRefPayload {
    /// Skill name.
    pub name: String,
}

/// `skill_propose`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkillProposePayload {
    /// Skill name (becomes a file name).
    pub name: String,
    /// Short description.
    pub description: String,
    /// Skill body (markdown).
    pub content: String,
}

impl SkillProposePayload {
    fn validate(&self) -> IpcResult<()> {
        check_id("name", &self.name)?;
        check_str("description", &self.description, MAX_FIELD_LEN)?;
        check_str("content", &self.content, MAX_CONTENT_LEN)
    }
}

/// Delivery spec inside scheduler payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeliveryPayload {
    /// `channel` or `none`.
    pub mode: String,
    /// A session address literal or the string `"last"`.
    #[serde(default)]
    pub target: Option<DeliveryTargetPayload>,
}

impl DeliveryPayload {
    fn validate(&self) -> IpcResult<()> {
        if !matches!(self.mode.as_str(), "channel" | "none") {
            return Err(IpcError::InvalidRequest(format!(
                "unknown delivery mode: {}",
                self.mode
            )));
        }
        if let Some(ref target) = self.target {
            target.validate()?;
        }
        Ok(())
    }
}

/// Delivery target: the literal string `"last"` or an address object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeliveryTargetPayload {
    /// The literal `"last"`, resolved at fire time against the session store.
    Literal(String),
    /// An explicit session address.
    Address(AddressPayload),
}

impl DeliveryTargetPayload {
    fn validate(&self) -> IpcResult<()> {
        match self {
            Self::Literal(s) if s == "last" => Ok(()),
            Self::Literal(other) => Err(IpcError::InvalidRequest(format!(
                "target literal must be \"last\", got {other:?}"
            ))),
            Self::Address(addr) => addr.validate(),
        }
    }
}

/// Flat session address in a scheduler payload. The agent cannot set a
/// parent; the host reconstructs hierarchy from the identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddressPayload {
    /// Channel adapter ID.
    pub provider: String,
    /// `dm`, `channel`, `thread`, or `group`.
    pub scope: String,
    /// Platform workspace.
    #[serde(default)]
    pub workspace: Option<String>,
    /// Channel ID.
    #[serde(default)]
    pub channel: Option<String>,
    /// Thread ID.
    #[serde(default)]
    pub thread: Option<String>,
    /// Peer ID.
    #[serde(default)]
    pub peer: Option<String>,
}

impl AddressPayload {
    fn validate(&self) -> IpcResult<()> {
        check_id("provider", &self.provider)?;
        if !matches!(self.scope.as_str(), "dm" | "channel" | "thread" | "group") {
            return Err(IpcError::InvalidRequest(format!(
                "unknown address scope: {}",
                self.scope
            )));
        }
        for (field, value) in [
            ("workspace", &self.workspace),
            ("channel", &self.channel),
            ("thread", &self.thread),
            ("peer", &self.peer),
        ] {
            if let Some(v) = value {
                check_str(field, v, MAX_ID_LEN)?;
            }
        }
        Ok(())
    }
}

/// `scheduler_add_cron`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerAddCronPayload {
    /// Cron expression.
    pub schedule: String,
    /// Prompt fed to the agent at fire time.
    pub prompt: String,
    /// Per-job token ceiling.
    #[serde(default)]
    pub max_token_budget: Option<u64>,
    /// Where the output goes.
    #[serde(default)]
    pub delivery: Option<DeliveryPayload>,
}

impl SchedulerAddCronPayload {
    fn validate(&self) -> IpcResult<()> {
        check_str("schedule", &self.schedule, 100)?;
        check_str("prompt", &self.prompt, MAX_CONTENT_LEN)?;
        if let Some(ref delivery) = self.delivery {
            delivery.validate()?;
        }
        Ok(())
    }
}

/// `scheduler_remove_cron`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerRemoveCronPayload {
    /// Job ID.
    pub id: String,
}

/// `scheduler_run_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerRunAtPayload {
    /// RFC 3339 time to run at.
    pub at: String,
    /// Prompt fed to the agent.
    pub prompt: String,
    /// Where the output goes.
    #[serde(default)]
    pub delivery: Option<DeliveryPayload>,
}

impl SchedulerRunAtPayload {
    fn validate(&self) -> IpcResult<()> {
        check_str("at", &self.at, MAX_ID_LEN)?;
        if chrono::DateTime::parse_from_rfc3339(&self.at).is_err() {
            return Err(IpcError::InvalidRequest("at must be RFC 3339".to_string()));
        }
        check_str("prompt", &self.prompt, MAX_CONTENT_LEN)?;
        if let Some(ref delivery) = self.delivery {
            delivery.validate()?;
        }
        Ok(())
    }
}

/// `audit_query`. Scoped by the server to the calling session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditQueryPayload {
    /// Action filter.
    #[serde(default)]
    pub action: Option<String>,
    /// Status filter: `success`, `blocked`, or `error`.
    #[serde(default)]
    pub status: Option<String>,
    /// Result cap.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl AuditQueryPayload {
    fn validate(&self) -> IpcResult<()> {
        if let Some(ref action) = self.action {
            check_str("action", action, MAX_ID_LEN)?;
        }
        if let Some(ref status) = self.status
            && !matches!(status.as_str(), "success" | "blocked" | "error")
        {
            return Err(IpcError::InvalidRequest(format!("unknown status: {status}")));
        }
        if self.limit.is_some_and(|l| l > 1000) {
            return Err(IpcError::InvalidRequest("limit exceeds 1000".to_string()));
        }
        Ok(())
    }
}

/// `delegate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelegatePayload {
    /// Prompt for the child agent.
    pub prompt: String,
}
