//! Configuration for the AX host.
//!
//! Loaded from `ax.yaml` under the state root (default `~/.ax`). Every
//! section defaults to safe production values so a bare file works.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod loader;
pub mod types;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{default_state_root, load, load_from};
pub use types::{
    ChannelsSection, Config, HistorySection, ProvidersSection, SandboxLimits, SchedulerSection,
    SecurityProfile,
};
pub use validate::validate;
