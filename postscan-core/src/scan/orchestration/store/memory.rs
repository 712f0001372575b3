use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::RwLock;

use super::JobStore;
use crate::error::{Result, ScanError};
use crate::scan::orchestration::{
    lease::{LeaseAcquisition, ScanLease},
    state::{ScanHistoryEntry, ScanState},
};
use crate::types::ScanId;

/// Process-local job store. State does not survive a restart; use it for
/// tests, demos and single-process embeddings.
#[derive(Default)]
pub struct InMemoryJobStore {
    scans: DashMap<ScanId, ScanState>,
    leases: DashMap<ScanId, ScanLease>,
    history: RwLock<VecDeque<ScanHistoryEntry>>,
}

impl fmt::Debug for InMemoryJobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryJobStore")
            .field("scan_count", &self.scans.len())
            .field("lease_count", &self.leases.len())
            .finish_non_exhaustive()
    }
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan_count(&self) -> usize {
        self.scans.len()
    }

    /// Current lease for a scan, expired or not.
    pub fn lease_for(&self, scan_id: &ScanId) -> Option<ScanLease> {
        self.leases.get(scan_id).map(|lease| lease.clone())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get_scan(&self, id: &ScanId) -> Result<Option<ScanState>> {
        Ok(self.scans.get(id).map(|state| state.clone()))
    }

    async fn insert_scan(&self, state: &ScanState) -> Result<()> {
        match self.scans.entry(state.id.clone()) {
            Entry::Occupied(_) => Err(ScanError::Internal(format!(
                "scan id collision: {}",
                state.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(state.clone());
                Ok(())
            }
        }
    }

    async fn update_scan(&self, state: &ScanState) -> Result<ScanState> {
        let mut stored = self
            .scans
            .get_mut(&state.id)
            .ok_or_else(|| ScanError::NotFound(state.id.to_string()))?;

        if stored.revision != state.revision {
            return Err(ScanError::StaleWrite {
                scan_id: state.id.to_string(),
                expected: state.revision,
                found: stored.revision,
            });
        }

        let mut next = state.clone();
        next.revision = stored.revision + 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn delete_scan(&self, id: &ScanId) -> Result<bool> {
        self.leases.remove(id);
        Ok(self.scans.remove(id).is_some())
    }

    async fn list_unfinished(&self) -> Result<Vec<ScanState>> {
        let mut unfinished: Vec<ScanState> = self
            .scans
            .iter()
            .filter(|entry| !entry.is_terminal())
            .map(|entry| entry.value().clone())
            .collect();
        unfinished.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(unfinished)
    }

    async fn push_history(
        &self,
        entry: ScanHistoryEntry,
        capacity: usize,
    ) -> Result<()> {
        let mut history = self.history.write().await;
        history.push_front(entry);
        history.truncate(capacity);
        Ok(())
    }

    async fn history(&self) -> Result<Vec<ScanHistoryEntry>> {
        let history = self.history.read().await;
        Ok(history.iter().cloned().collect())
    }

    async fn acquire_lease(
        &self,
        scan_id: &ScanId,
        owner: &str,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Result<LeaseAcquisition> {
        let lease = ScanLease::new(scan_id.clone(), owner, now, ttl);
        match self.leases.entry(scan_id.clone()) {
            Entry::Occupied(mut existing) => {
                if existing.get().is_expired(now) {
                    existing.insert(lease.clone());
                    Ok(LeaseAcquisition::Acquired(lease))
                } else {
                    Ok(LeaseAcquisition::Held {
                        owner: existing.get().owner.clone(),
                        expires_at: existing.get().expires_at,
                    })
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(lease.clone());
                Ok(LeaseAcquisition::Acquired(lease))
            }
        }
    }

    async fn release_lease(&self, lease: &ScanLease) -> Result<()> {
        self.leases
            .remove_if(&lease.scan_id, |_, held| held.lease_id == lease.lease_id);
        Ok(())
    }
}
