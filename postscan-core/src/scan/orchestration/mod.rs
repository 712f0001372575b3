//! Resumable, page-at-a-time scans over a content host.
//!
//! A scan is a durable [`ScanState`] advanced one page per deferred task
//! invocation. The pieces are split along their seams: the [`JobStore`]
//! persists state and leases, the [`ContentHost`] serves and stamps items,
//! the [`DeferredScheduler`] delivers batches, and the [`ScanOrchestrator`]
//! ties them together.

pub mod config;
pub mod host;
pub mod lease;
pub mod orchestrator;
pub mod scheduler;
pub mod state;
pub mod store;

pub use config::*;
pub use host::{ContentHost, InMemoryContentHost, PUBLISHED_STATUS};
#[cfg(feature = "database")]
pub use host::PostgresContentHost;
pub use lease::*;
pub use orchestrator::*;
pub use scheduler::*;
pub use state::*;
pub use store::{InMemoryJobStore, JobStore};
#[cfg(feature = "database")]
pub use store::PostgresJobStore;
