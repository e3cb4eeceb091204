//! The trusted host.
//!
//! Owns credentials, state, and policy. Accepts inbound messages from the
//! HTTP API and channel adapters, scans them, runs the sandboxed agent, and
//! scans what comes back before anyone else sees it.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod bootstrap;
pub mod canary;
pub mod channels;
pub mod conversation;
pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod router;
pub mod scanner;
pub mod skills;
pub mod web;
pub mod workspace;

pub use bootstrap::BootstrapGate;
pub use canary::CanaryRegistry;
pub use channels::{ChannelAdapter, ChannelRegistry, SessionStore};
pub use conversation::{ConversationStore, StoredTurn};
pub use dedup::DedupWindow;
pub use dispatcher::HostDispatcher;
pub use error::{HostError, HostResult};
pub use http::HttpState;
pub use router::{ChannelEvent, RequestRouter, RouterDeps, RouterReply};
pub use scanner::{
    CANARY_REDACTION, InboundScanner, OutboundResult, OutboundScanner, ScanVerdict,
};
pub use skills::{PendingSkill, SkillScreening, SkillStore, SkillVerdict};
pub use web::{BrowserProvider, DisabledBrowser, HttpWebProvider, WebProvider};
pub use workspace::WorkspaceManager;
