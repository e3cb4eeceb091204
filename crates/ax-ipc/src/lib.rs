//! IPC between host and sandbox.
//!
//! The sandboxed agent talks to the host over a Unix socket carrying
//! length-prefixed JSON frames. Every request is validated against a strict
//! per-action schema before it reaches a handler; the server injects the
//! session context, consults the taint budget before sensitive actions, and
//! audits every side-effectful call.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod client;
pub mod error;
pub mod frame;
pub mod request;
pub mod response;
pub mod server;

pub use client::IpcClient;
pub use error::{IpcError, IpcResult};
pub use frame::{MAX_FRAME_LEN, read_frame, write_frame};
pub use request::{IpcRequest, is_query_action};
pub use response::IpcResponse;
pub use server::{
    ActionDispatcher, CallContext, DispatchOutcome, IpcServer, ServerPolicy, TaintIngest,
};
