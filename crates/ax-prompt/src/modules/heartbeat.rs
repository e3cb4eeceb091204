//! Heartbeat module: behavior for scheduler-initiated turns.

use crate::context::PromptContext;
use crate::module::PromptModule;

/// Renders heartbeat guidance when the agent runs on a schedule.
pub struct HeartbeatModule;

impl PromptModule for HeartbeatModule {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    fn priority(&self) -> u8 {
        70
    }

    fn should_include(&self, ctx: &PromptContext) -> bool {
        !ctx.is_bootstrap() && ctx.heartbeat_enabled
    }

    fn render(&self, _ctx: &PromptContext) -> Vec<String> {
        vec![
            "## Scheduled turns".to_string(),
            "Some turns are initiated by your scheduler, not a human. Keep scheduled \
             output short and high-signal. If there is nothing worth saying, say \
             nothing; an empty reply suppresses delivery."
                .to_string(),
        ]
    }

    fn optional(&self) -> bool {
        true
    }
}
