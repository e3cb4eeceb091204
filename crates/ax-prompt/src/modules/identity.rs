//! Identity module: who the agent is, from its identity files.

use crate::context::PromptContext;
use crate::module::PromptModule;

/// Renders the agent's identity files. In bootstrap mode the operator's
/// bootstrap instructions replace the (not yet written) soul.
pub struct IdentityModule;

impl PromptModule for IdentityModule {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn priority(&self) -> u8 {
        10
    }

    fn should_include(&self, _ctx: &PromptContext) -> bool {
        true
    }

    fn render(&self, ctx: &PromptContext) -> Vec<String> {
        let mut lines = Vec::new();

        if !ctx.identity.agents_md.is_empty() {
            lines.push(ctx.identity.agents_md.trim().to_string());
        }

        if ctx.is_bootstrap() {
            lines.push(String::new());
            lines.push("## First-run setup".to_string());
            lines.push(ctx.identity.bootstrap_md.trim().to_string());
        } else {
            if !ctx.identity.soul_md.is_empty() {
                lines.push(String::new());
                lines.push(ctx.identity.soul_md.trim().to_string());
            }
            if !ctx.identity.identity_md.is_empty() {
                lines.push(String::new());
                lines.push(ctx.identity.identity_md.trim().to_string());
            }
        }

        if lines.is_empty() {
            lines.push("You are a personal assistant agent.".to_string());
        }
        lines
    }
}
