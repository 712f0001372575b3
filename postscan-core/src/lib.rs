//! # postscan core
//!
//! Resumable, batched maintenance scans over a site's published content.
//!
//! A scan snapshots how many published items of the requested kinds exist,
//! then walks them one page per deferred task invocation, stamping each item
//! with a "last scanned" time. Progress lives entirely in the job store, so a
//! scan survives restarts, duplicate deliveries and skipped invocations.
//!
//! ## Feature Flags
//!
//! - `database`: Postgres job store and content host (SQLx) plus the bundled
//!   migrations in [`MIGRATOR`]
//!
//! ## Modules
//!
//! - [`scan`]: state model, job store, content host, scheduler and orchestrator
//! - [`api_types`]: HTTP payloads shared by the server and the CLI
//! - [`api_routes`]: HTTP paths
//! - [`error`]: error type shared by every layer

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod api_routes;
pub mod api_types;
pub mod error;
pub mod scan;
pub mod types;

pub use error::{Result, ScanError};
pub use types::{ContentItemId, LeaseId, ScanId};

/// Schema for the Postgres job store and content host.
#[cfg(feature = "database")]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
