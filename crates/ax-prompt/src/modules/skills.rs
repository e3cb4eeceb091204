//! Skills module: the skill bodies available this turn.

use crate::context::PromptContext;
use crate::module::PromptModule;

/// Renders the skills copied into the workspace.
pub struct SkillsModule;

impl PromptModule for SkillsModule {
    fn name(&self) -> &'static str {
        "skills"
    }

    fn priority(&self) -> u8 {
        50
    }

    fn should_include(&self, ctx: &PromptContext) -> bool {
        !ctx.is_bootstrap() && !ctx.skills.is_empty()
    }

    fn render(&self, ctx: &PromptContext) -> Vec<String> {
        let mut lines = vec!["## Skills".to_string()];
        for skill in &ctx.skills {
            lines.push(String::new());
            lines.push(format!("### {}", skill.name));
            lines.push(skill.content.trim().to_string());
        }
        lines
    }

    fn render_minimal(&self, ctx: &PromptContext) -> Option<Vec<String>> {
        let names: Vec<&str> = ctx.skills.iter().map(|s| s.name.as_str()).collect();
        Some(vec![
            "## Skills".to_string(),
            format!(
                "Available (read with skill_read before use): {}",
                names.join(", ")
            ),
        ])
    }

    fn optional(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SkillSummary;

    fn ctx_with_skill() -> PromptContext {
        PromptContext {
            skills: vec![SkillSummary {
                name: "summarize".to_string(),
                content: "# Summarize\nBody.".to_string(),
            }],
            ..PromptContext::default()
        }
    }

    #[test]
    fn test_full_render_includes_bodies() {
        let text = SkillsModule.render(&ctx_with_skill()).join("\n");
        assert!(text.contains("### summarize"));
        assert!(text.contains("Body."));
    }

    #[test]
    fn test_minimal_render_names_only() {
        let text = SkillsModule
            .render_minimal(&ctx_with_skill())
            .unwrap()
            .join("\n");
        assert!(text.contains("summarize"));
        assert!(!text.contains("Body."));
    }

    #[test]
    fn test_skipped_without_skills() {
        assert!(!SkillsModule.should_include(&PromptContext::default()));
    }
}
