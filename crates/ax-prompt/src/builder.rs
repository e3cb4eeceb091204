//! The prompt builder: priority ordering and token budgeting.

use std::time::Instant;
use tracing::debug;

use ax_taint::estimate_tokens;

use crate::context::PromptContext;
use crate::module::PromptModule;

/// Tokens reserved for model output.
const OUTPUT_RESERVE: usize = 4096;

/// Metadata for one included module.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ModuleMeta {
    /// Module name.
    pub name: &'static str,
    /// Estimated tokens of the rendered section.
    pub estimated_tokens: usize,
    /// Whether the minimal rendering was used.
    pub minimal: bool,
}

/// A finished prompt build.
#[derive(Debug, Clone)]
pub struct BuiltPrompt {
    /// The assembled prompt.
    pub text: String,
    /// Included modules, in render order.
    pub modules: Vec<ModuleMeta>,
    /// Total estimated tokens.
    pub estimated_tokens: usize,
    /// Build wall time in milliseconds.
    pub build_ms: u64,
}

/// Assembles prompts from a registered module set.
pub struct PromptBuilder {
    modules: Vec<Box<dyn PromptModule>>,
}

impl PromptBuilder {
    /// Create a builder; modules are sorted by ascending priority once.
    #[must_use]
    pub fn new(mut modules: Vec<Box<dyn PromptModule>>) -> Self {
        modules.sort_by_key(|m| (m.priority(), m.name()));
        Self { modules }
    }

    /// A builder with the standard module set.
    #[must_use]
    pub fn standard() -> Self {
        use crate::modules::{
            boundaries::BoundariesModule, context::ContextModule, defense::DefenseModule,
            heartbeat::HeartbeatModule, identity::IdentityModule, reply_gate::ReplyGateModule,
            runtime::RuntimeModule, skills::SkillsModule,
        };
        Self::new(vec![
            Box::new(IdentityModule),
            Box::new(DefenseModule),
            Box::new(BoundariesModule),
            Box::new(ContextModule),
            Box::new(SkillsModule),
            Box::new(RuntimeModule),
            Box::new(HeartbeatModule),
            Box::new(ReplyGateModule),
        ])
    }

    /// Registered module names in render order.
    #[must_use]
    pub fn module_names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Assemble the prompt for one turn.
    ///
    /// Required modules render unconditionally. Optional modules are added
    /// in priority order while they fit the remaining budget, degrading to
    /// their minimal rendering before being dropped.
    #[must_use]
    pub fn build(&self, ctx: &PromptContext) -> BuiltPrompt {
        let start = Instant::now();
        let budget = ctx
            .context_window
            .saturating_sub(ctx.history_tokens)
            .saturating_sub(OUTPUT_RESERVE);

        let mut sections: Vec<(ModuleMeta, String)> = Vec::new();
        let mut used = 0usize;

        // Required modules first, regardless of budget.
        for module in self.modules.iter().filter(|m| !m.optional()) {
            if !module.should_include(ctx) {
                continue;
            }
            let text = module.render(ctx).join("\n");
            let tokens = estimate_tokens(&text);
            used = used.saturating_add(tokens);
            sections.push((
                ModuleMeta {
                    name: module.name(),
                    estimated_tokens: tokens,
                    minimal: false,
                },
                text,
            ));
        }

        // Optional modules while they fit.
        for module in self.modules.iter().filter(|m| m.optional()) {
            if !module.should_include(ctx) {
                continue;
            }
            let text = module.render(ctx).join("\n");
            let tokens = estimate_tokens(&text);
            if used.saturating_add(tokens) <= budget {
                used = used.saturating_add(tokens);
                sections.push((
                    ModuleMeta {
                        name: module.name(),
                        estimated_tokens: tokens,
                        minimal: false,
                    },
                    text,
                ));
                continue;
            }

            if let Some(minimal_lines) = module.render_minimal(ctx) {
                let minimal = minimal_lines.join("\n");
                let minimal_tokens = estimate_tokens(&minimal);
                if used.saturating_add(minimal_tokens) <= budget {
                    used = used.saturating_add(minimal_tokens);
                    sections.push((
                        ModuleMeta {
                            name: module.name(),
                            estimated_tokens: minimal_tokens,
                            minimal: true,
                        },
                        minimal,
                    ));
                    continue;
                }
            }

            debug!(module = module.name(), "Dropped for budget");
        }

        // Sections were collected required-first; restore priority order.
        let priority = |name: &'static str| {
            self.modules
                .iter()
                .position(|m| m.name() == name)
                .unwrap_or(usize::MAX)
        };
        sections.sort_by_key(|(meta, _)| priority(meta.name));

        let text = sections
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        #[allow(clippy::cast_possible_truncation)]
        let build_ms = start.elapsed().as_millis() as u64;
        BuiltPrompt {
            estimated_tokens: used,
            modules: sections.into_iter().map(|(meta, _)| meta).collect(),
            text,
            build_ms,
        }
    }
}
