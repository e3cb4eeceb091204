//! Security-boundaries module: what the agent may and may not touch.

use crate::context::PromptContext;
use crate::module::PromptModule;

/// Renders the hard security boundaries of the sandbox.
pub struct BoundariesModule;

impl PromptModule for BoundariesModule {
    fn name(&self) -> &'static str {
        "security-boundaries"
    }

    fn priority(&self) -> u8 {
        30
    }

    fn should_include(&self, _ctx: &PromptContext) -> bool {
        true
    }

    fn render(&self, ctx: &PromptContext) -> Vec<String> {
        vec![
            "## Boundaries".to_string(),
            format!(
                "- Your file access is limited to {}. Paths outside it are rejected.",
                ctx.workspace_label()
            ),
            "- You hold no credentials. Model and tool access is brokered by the host."
                .to_string(),
            "- Memory writes, scheduling, and web access go through host-validated calls; \
             malformed or out-of-policy calls fail closed."
                .to_string(),
            "- Sensitive actions may be refused by policy. A refusal is final for this \
             turn; explain it to the user instead of retrying."
                .to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mentions_workspace_label() {
        let text = BoundariesModule.render(&PromptContext::default()).join("\n");
        assert!(text.contains("./workspace"));
        assert!(text.contains("fail closed"));
    }
}
