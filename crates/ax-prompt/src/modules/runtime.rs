//! Runtime module: agent type, sandbox, profile, workspace, time.

use crate::context::PromptContext;
use crate::module::PromptModule;

/// Renders runtime facts. The workspace path is sanitized to a generic
/// label; the host user's home directory must never reach the model.
pub struct RuntimeModule;

impl PromptModule for RuntimeModule {
    fn name(&self) -> &'static str {
        "runtime"
    }

    fn priority(&self) -> u8 {
        60
    }

    fn should_include(&self, ctx: &PromptContext) -> bool {
        !ctx.is_bootstrap()
    }

    fn render(&self, ctx: &PromptContext) -> Vec<String> {
        vec![
            "## Runtime".to_string(),
            format!("- Agent type: {}", ctx.agent_type),
            format!("- Sandbox: {}", ctx.sandbox_kind),
            format!("- Security profile: {}", ctx.profile),
            format!("- Workspace: {}", ctx.workspace_label()),
            format!("- Current time: {}", ctx.now),
        ]
    }

    fn render_minimal(&self, ctx: &PromptContext) -> Option<Vec<String>> {
        Some(vec![format!(
            "Runtime: {} agent, {} sandbox, {} profile, time {}.",
            ctx.agent_type, ctx.sandbox_kind, ctx.profile, ctx.now
        )])
    }

    fn optional(&self) -> bool {
        true
    }
}
