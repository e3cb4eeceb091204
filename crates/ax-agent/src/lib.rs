//! The sandboxed agent runner.
//!
//! Runs inside the sandbox: reads the turn payload from stdin, assembles
//! the system prompt, drives the model through the credential bridge, and
//! dispatches tools: local ones inside the workspace, remote ones over
//! IPC. Assistant text streams to stdout as it arrives.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod guard;
pub mod input;
pub mod runner;
pub mod tools;

pub use error::{AgentError, AgentResult};
pub use guard::scheduling_claim_without_call;
pub use input::{AgentInput, HistoryTurn, TaintState};
pub use runner::{AgentRunner, RunnerConfig};
