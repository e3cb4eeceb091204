//! Agent memory.
//!
//! Entries are scoped key-value records with tags. The taint tag on an
//! entry is set by the host at write time, never taken from the agent's
//! payload; reading an `external` entry re-enters the reading session's
//! taint budget (that rule is owned by the caller, the IPC server).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod entry;
pub mod error;
pub mod store;

pub use entry::{MemoryEntry, MemoryEntryId};
pub use error::{MemoryError, MemoryResult};
pub use store::{FileMemoryStore, MemoryQuery, MemoryStore, MemoryStoreHandle, InMemoryStore};
