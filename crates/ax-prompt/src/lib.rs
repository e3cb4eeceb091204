//! Modular system-prompt assembly.
//!
//! A prompt is composed from registered modules ordered by priority and
//! fitted into a per-turn token budget. Builds are deterministic: identical
//! context in, byte-identical prompt out.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod builder;
pub mod context;
pub mod module;
pub mod modules;

pub use builder::{BuiltPrompt, ModuleMeta, PromptBuilder};
pub use context::{IdentityFiles, PromptContext, SkillSummary};
pub use module::PromptModule;
