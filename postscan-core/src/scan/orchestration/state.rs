use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ScanId;

/// Lifecycle of a scan. `Completed` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Queued,
    Running,
    Completed,
    Failed,
}

impl ScanPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanPhase::Completed | ScanPhase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Queued => "queued",
            ScanPhase::Running => "running",
            ScanPhase::Completed => "completed",
            ScanPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one scan. Only the batch runner mutates it after
/// creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanState {
    pub id: ScanId,
    pub target_kinds: Vec<String>,
    /// Eligible items when the scan was created. Never recomputed.
    pub total: u64,
    pub processed: u64,
    pub page_size: u32,
    /// 1-based page number of the next page to fetch.
    pub cursor: u64,
    pub phase: ScanPhase,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_batch_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: String,
    /// Optimistic version, bumped by the store on every update.
    #[serde(default)]
    pub revision: u64,
    /// Consecutive failed attempts at the current page.
    #[serde(default)]
    pub attempts: u16,
}

impl ScanState {
    pub fn new(
        id: ScanId,
        target_kinds: Vec<String>,
        total: u64,
        page_size: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            target_kinds,
            total,
            processed: 0,
            page_size,
            cursor: 1,
            phase: ScanPhase::Queued,
            created_at,
            last_batch_at: None,
            completed_at: None,
            message: String::new(),
            revision: 0,
            attempts: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Most recent sign of life: the last batch, or creation before any batch ran.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_batch_at.unwrap_or(self.created_at)
    }

    /// A non-terminal scan whose last activity is older than `threshold`.
    /// Slow and stuck scans look identical otherwise.
    pub fn is_stalled(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        !self.is_terminal() && now - self.last_activity() > threshold
    }

    pub fn progress_message(&self) -> String {
        format!("Processed {} of {}", self.processed, self.total)
    }
}

/// Creation-time snapshot of a scan kept in the bounded history list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanHistoryEntry {
    pub id: ScanId,
    pub created_at: DateTime<Utc>,
    pub target_kinds: Vec<String>,
    pub total: u64,
}

impl From<&ScanState> for ScanHistoryEntry {
    fn from(state: &ScanState) -> Self {
        Self {
            id: state.id.clone(),
            created_at: state.created_at,
            target_kinds: state.target_kinds.clone(),
            total: state.total,
        }
    }
}
