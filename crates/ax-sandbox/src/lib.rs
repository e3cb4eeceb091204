//! Sandbox backends.
//!
//! The agent runs as a separate OS process under one of four isolation
//! backends. The backend universe is closed, so it is a tagged enum rather
//! than a trait object; each variant only changes how the command line is
//! built. Supervision (stdin feed, stdout streaming, timeout, kill) is
//! shared.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod kind;
pub mod spawn;

pub use error::{SandboxError, SandboxResult};
pub use kind::SandboxKind;
pub use spawn::{RunOutput, SandboxLauncher, SpawnSpec};
