//! Credential-injecting proxy and TCP bridge.
//!
//! The sandboxed agent talks to model vendors through two hops: a TCP
//! listener inside the sandbox (the bridge, a pure byte forwarder) and an
//! HTTP server on a host-local Unix socket (the proxy, where all policy
//! lives). The proxy validates paths, strips any auth the agent sent, and
//! injects credentials from the host's secret store. API keys never cross
//! into the sandbox.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod bridge;
pub mod error;
pub mod oauth;
pub mod proxy;
pub mod secrets;

pub use bridge::TcpBridge;
pub use error::{ProxyError, ProxyResult};
pub use oauth::{OAuthRefresher, RefreshOutcome};
pub use proxy::{CredentialProxy, VendorRoute};
pub use secrets::{EnvFile, SecretStore};
