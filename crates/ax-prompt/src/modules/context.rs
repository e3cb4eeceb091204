//! Context module: how to use memory and conversation context.

use crate::context::PromptContext;
use crate::module::PromptModule;

/// Renders guidance on memory and context usage.
pub struct ContextModule;

impl PromptModule for ContextModule {
    fn name(&self) -> &'static str {
        "context"
    }

    fn priority(&self) -> u8 {
        40
    }

    fn should_include(&self, ctx: &PromptContext) -> bool {
        !ctx.is_bootstrap()
    }

    fn render(&self, _ctx: &PromptContext) -> Vec<String> {
        vec![
            "## Memory".to_string(),
            "Use memory_write to persist durable facts the user would expect you to \
             remember, and memory_query before asking the user something you may \
             already know. Keep entries short and scoped; memory is not a scratchpad."
                .to_string(),
        ]
    }

    fn render_minimal(&self, _ctx: &PromptContext) -> Option<Vec<String>> {
        Some(vec![
            "## Memory".to_string(),
            "Persist durable facts with memory_write; check memory_query first.".to_string(),
        ])
    }

    fn optional(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::IdentityFiles;

    #[test]
    fn test_dropped_in_bootstrap() {
        let ctx = PromptContext {
            identity: IdentityFiles {
                bootstrap_md: "setup".to_string(),
                ..IdentityFiles::default()
            },
            ..PromptContext::default()
        };
        assert!(!ContextModule.should_include(&ctx));
        assert!(ContextModule.should_include(&PromptContext::default()));
    }
}
