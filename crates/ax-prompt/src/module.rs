//! The prompt module contract.

use ax_taint::estimate_tokens;

use crate::context::PromptContext;

/// One composable section of the system prompt.
///
/// Modules are registered at builder construction and live for the process
/// lifetime; they hold no per-session state.
pub trait PromptModule: Send + Sync {
    /// Module name, used in build metadata.
    fn name(&self) -> &'static str;

    /// Ordering priority, 0..100, lower renders earlier.
    fn priority(&self) -> u8;

    /// Declarative gate. Modules that return false are skipped entirely.
    fn should_include(&self, ctx: &PromptContext) -> bool;

    /// Render the section as lines (joined with newlines by the builder).
    fn render(&self, ctx: &PromptContext) -> Vec<String>;

    /// Compact rendering used when the full section does not fit.
    fn render_minimal(&self, _ctx: &PromptContext) -> Option<Vec<String>> {
        None
    }

    /// Whether the module may be dropped whole under budget pressure.
    /// Required modules (false) always render.
    fn optional(&self) -> bool {
        false
    }

    /// Estimated token cost of the full rendering.
    fn estimate(&self, ctx: &PromptContext) -> usize {
        estimate_tokens(&self.render(ctx).join("\n"))
    }
}
