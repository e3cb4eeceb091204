//! Reply-gate module: when to speak in multi-party channels.

use crate::context::PromptContext;
use crate::module::PromptModule;

/// Renders reply discipline for shared channels.
pub struct ReplyGateModule;

impl PromptModule for ReplyGateModule {
    fn name(&self) -> &'static str {
        "reply-gate"
    }

    fn priority(&self) -> u8 {
        80
    }

    fn should_include(&self, ctx: &PromptContext) -> bool {
        !ctx.is_bootstrap() && ctx.reply_gate_enabled
    }

    fn render(&self, _ctx: &PromptContext) -> Vec<String> {
        vec![
            "## Shared channels".to_string(),
            "In channels with multiple people, reply only when addressed, when you \
             were mentioned, or when you have material information. Otherwise stay \
             silent."
                .to_string(),
        ]
    }

    fn optional(&self) -> bool {
        true
    }
}
