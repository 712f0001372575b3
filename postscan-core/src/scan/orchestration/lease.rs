use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{LeaseId, ScanId};

/// Exclusive right to run a batch for one scan until `expires_at`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanLease {
    pub lease_id: LeaseId,
    pub scan_id: ScanId,
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

impl ScanLease {
    pub fn new(
        scan_id: ScanId,
        owner: impl Into<String>,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            lease_id: LeaseId::new(),
            scan_id,
            owner: owner.into(),
            expires_at: now
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Result of asking the store for a batch lease.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeaseAcquisition {
    Acquired(ScanLease),
    /// Another unexpired lease exists; the caller must not touch the scan.
    Held { owner: String, expires_at: DateTime<Utc> },
}
