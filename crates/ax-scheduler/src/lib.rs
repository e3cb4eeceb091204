//! Cron scheduling.
//!
//! Jobs are created over IPC, persisted in a job store, and fired by a
//! ticker that matches cron expressions once per minute. Delivery targets
//! are resolved at fire time against the session store, never derived from
//! agent output.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod delivery;
pub mod error;
pub mod job;
pub mod store;
pub mod ticker;

pub use delivery::{DeliveryLookup, ResolvedDelivery, resolve_delivery};
pub use error::{SchedulerError, SchedulerResult};
pub use job::{CronJob, Delivery, DeliveryMode, DeliveryTarget, JobSchedule};
pub use store::{FileJobStore, JobStore, MemoryJobStore};
pub use ticker::{CronTicker, FiredJob, in_active_hours};
