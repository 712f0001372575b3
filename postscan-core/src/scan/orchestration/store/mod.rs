//! Durable job store seam.
//!
//! The store persists one [`ScanState`] per scan, the bounded creation
//! history, and per-scan batch leases. It holds no orchestration logic; the
//! only invariants it enforces are revision-checked updates and lease
//! exclusivity, both of which must be atomic in every implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::scan::orchestration::{
    lease::{LeaseAcquisition, ScanLease},
    state::{ScanHistoryEntry, ScanState},
};
use crate::types::ScanId;

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use memory::InMemoryJobStore;
#[cfg(feature = "database")]
pub use postgres::PostgresJobStore;

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get_scan(&self, id: &ScanId) -> Result<Option<ScanState>>;

    /// Persist a freshly created scan. Fails if the id is already taken.
    async fn insert_scan(&self, state: &ScanState) -> Result<()>;

    /// Replace the stored scan if its revision still equals
    /// `state.revision`. Returns the stored copy with the bumped revision,
    /// or [`ScanError::StaleWrite`](crate::error::ScanError::StaleWrite).
    /// A missing scan yields [`ScanError::NotFound`](crate::error::ScanError::NotFound).
    async fn update_scan(&self, state: &ScanState) -> Result<ScanState>;

    /// Remove a scan. Returns whether anything was deleted.
    async fn delete_scan(&self, id: &ScanId) -> Result<bool>;

    /// Every scan whose phase is not terminal.
    async fn list_unfinished(&self) -> Result<Vec<ScanState>>;

    /// Front-insert a history entry and keep at most `capacity` entries.
    async fn push_history(
        &self,
        entry: ScanHistoryEntry,
        capacity: usize,
    ) -> Result<()>;

    /// History, most recent first.
    async fn history(&self) -> Result<Vec<ScanHistoryEntry>>;

    /// Take the batch lease for `scan_id` unless an unexpired one is held.
    async fn acquire_lease(
        &self,
        scan_id: &ScanId,
        owner: &str,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Result<LeaseAcquisition>;

    /// Drop a lease. Releasing a lease that was already replaced is a no-op.
    async fn release_lease(&self, lease: &ScanLease) -> Result<()>;
}
