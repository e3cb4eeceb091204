//! Remote tools: everything routed over IPC to the host.
//!
//! The agent never validates these itself beyond shaping the request; the
//! host's schema layer is authoritative and its refusals come back as tool
//! errors for the model to read.

use ax_ipc::IpcClient;
use ax_llm::ToolDef;
use serde_json::{Value, json};

use crate::error::AgentResult;

/// The remote action names exposed as tools, with descriptions.
const REMOTE_TOOLS: &[(&str, &str)] = &[
    ("memory_write", "Persist a durable memory entry in a scope."),
    ("memory_read", "Read one memory entry by scope and id."),
    ("memory_query", "Query a memory scope by substring and tags."),
    ("memory_delete", "Delete a memory entry."),
    ("memory_list", "List memory scopes."),
    ("web_fetch", "Fetch a URL and return its textual content."),
    ("web_search", "Search the web and return result snippets."),
    ("browser_navigate", "Open a URL in the managed browser."),
    ("browser_snapshot", "Capture the current page as text."),
    ("browser_click", "Click an element by CSS selector."),
    ("browser_type", "Type text into an element by CSS selector."),
    ("browser_screenshot", "Capture the current page as an image."),
    ("skill_list", "List available skills."),
    ("skill_read", "Read a skill body by name."),
    (
        "skill_propose",
        "Propose a new skill for host screening; approved skills appear next turn.",
    ),
    (
        "scheduler_add_cron",
        "Add a recurring job (5-field cron expression, local time).",
    ),
    ("scheduler_remove_cron", "Remove a scheduled job by id."),
    ("scheduler_list_jobs", "List scheduled jobs."),
    (
        "scheduler_run_at",
        "Schedule a one-shot run at an RFC 3339 time.",
    ),
    ("audit_query", "Query this session's audit entries."),
    (
        "delegate",
        "Delegate a sub-task to a child agent sharing this session.",
    ),
];

/// Tools routed to the host.
pub struct RemoteTools {
    client: IpcClient,
}

impl RemoteTools {
    /// Create remote tools over an IPC client.
    #[must_use]
    pub fn new(client: IpcClient) -> Self {
        Self { client }
    }

    /// Tool definitions exposed to the model. Schemas are permissive here;
    /// the host's strict validation is the real contract.
    #[must_use]
    pub fn definitions() -> Vec<ToolDef> {
        REMOTE_TOOLS
            .iter()
            .map(|(name, description)| ToolDef {
                name: (*name).to_string(),
                description: (*description).to_string(),
                parameters: json!({"type": "object", "additionalProperties": true}),
            })
            .collect()
    }

    /// Whether a tool name is routed remotely.
    #[must_use]
    pub fn handles(name: &str) -> bool {
        REMOTE_TOOLS.iter().any(|(n, _)| *n == name)
    }

    /// Execute a remote tool. The host's response (success or refusal) is
    /// returned verbatim as JSON text for the model.
    ///
    /// # Errors
    ///
    /// Returns an error only for transport failures; host-side refusals are
    /// part of the returned value.
    pub async fn execute(&self, name: &str, args: &Value) -> AgentResult<String> {
        let fields = if args.is_object() {
            args.clone()
        } else {
            json!({})
        };
        let response = self.client.call_action(name, fields).await?;
        Ok(response.to_string())
    }
}
