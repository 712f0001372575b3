//! Scan orchestration: start, batch-advance, status, list and cancel.
//!
//! The orchestrator keeps nothing in memory between invocations. Every batch
//! reloads the scan from the [`JobStore`], processes one page under a lease,
//! writes the result back with a revision check and re-arms itself through
//! the [`DeferredScheduler`]. A crashed or skipped batch therefore only costs
//! pacing, never progress.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    config::ScanConfig,
    host::ContentHost,
    lease::LeaseAcquisition,
    scheduler::{DeferredScheduler, TaskHandler, TaskRegistry},
    state::{ScanHistoryEntry, ScanPhase, ScanState},
    store::JobStore,
};
use crate::error::{Result, ScanError};
use crate::types::ScanId;

/// Task name under which the batch handler is registered.
pub const SCAN_BATCH_TASK: &str = "posts_scan.batch";

pub const COMPLETED_MESSAGE: &str = "Scan completed";

/// Arguments of a start request. `None` fields fall back to configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartScanRequest {
    pub kinds: Option<Vec<String>>,
    pub page_size: Option<i64>,
}

/// What a single batch-advance invocation did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    /// No scan with that id; nothing written, nothing armed.
    Missing,
    /// The scan already reached a terminal phase.
    Finished(ScanPhase),
    /// Another invocation holds the lease; a follow-up was armed if idle.
    LeaseHeld,
    /// One page was processed and a follow-up batch armed.
    Advanced { processed: u64, cursor: u64 },
    /// The scan reached `completed` in this invocation.
    Completed { processed: u64 },
    /// The host failed; the same page is retried after `delay`.
    Retrying { attempts: u16, delay: Duration },
    /// Retries are exhausted; the scan is now `failed`.
    Failed { attempts: u16 },
    /// Another writer changed the scan underneath this batch.
    Superseded,
}

/// Status view of a scan: the stored record plus derived staleness.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanStatus {
    pub state: ScanState,
    pub stalled: bool,
}

#[derive(Clone)]
pub struct ScanOrchestrator {
    store: Arc<dyn JobStore>,
    host: Arc<dyn ContentHost>,
    scheduler: Arc<dyn DeferredScheduler>,
    config: ScanConfig,
    owner: String,
}

impl fmt::Debug for ScanOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanOrchestrator")
            .field("owner", &self.owner)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ScanOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        host: Arc<dyn ContentHost>,
        scheduler: Arc<dyn DeferredScheduler>,
        config: ScanConfig,
    ) -> Self {
        Self {
            store,
            host,
            scheduler,
            config,
            owner: format!("postscan-{}", Uuid::now_v7()),
        }
    }

    /// Register the batch handler under [`SCAN_BATCH_TASK`].
    pub fn register(self: &Arc<Self>, registry: &TaskRegistry) {
        registry.register(SCAN_BATCH_TASK, Arc::clone(self) as Arc<dyn TaskHandler>);
    }

    /// Create a scan and arm its first batch.
    #[instrument(target = "scan::start", skip(self), err)]
    pub async fn start(&self, request: StartScanRequest) -> Result<ScanId> {
        let requested = request
            .kinds
            .unwrap_or_else(|| self.config.default_kinds.clone());
        let allowed = self.host.public_kinds().await?;
        let kinds: Vec<String> = allowed
            .into_iter()
            .filter(|kind| requested.iter().any(|r| r.trim() == kind))
            .collect();
        if kinds.is_empty() {
            return Err(ScanError::InvalidArgument(
                "No valid public post types provided".into(),
            ));
        }

        let page_size = self.config.clamp_page_size(request.page_size);
        let mut total = 0u64;
        for kind in &kinds {
            total = total.saturating_add(self.host.count_published(kind).await?);
        }

        let now = Utc::now();
        let state = ScanState::new(ScanId::generate(now), kinds, total, page_size, now);
        self.store.insert_scan(&state).await?;
        self.store
            .push_history(ScanHistoryEntry::from(&state), self.config.history_capacity)
            .await?;
        self.arm_if_idle(&state.id, self.config.rearm_delay()).await?;

        info!(
            target: "scan::start",
            scan_id = %state.id,
            kinds = ?state.target_kinds,
            total,
            page_size,
            "scan queued"
        );
        Ok(state.id)
    }

    /// Process the next page of `scan_id`.
    #[instrument(target = "scan::batch", skip(self, scan_id), fields(scan_id = %scan_id))]
    pub async fn advance_batch(&self, scan_id: &ScanId) -> Result<BatchOutcome> {
        let Some(state) = self.store.get_scan(scan_id).await? else {
            debug!(target: "scan::batch", "scan missing; nothing to do");
            return Ok(BatchOutcome::Missing);
        };
        if state.is_terminal() {
            debug!(target: "scan::batch", phase = %state.phase, "scan already finished");
            return Ok(BatchOutcome::Finished(state.phase));
        }

        let now = Utc::now();
        let lease = match self
            .store
            .acquire_lease(scan_id, &self.owner, now, self.config.lease.ttl())
            .await?
        {
            LeaseAcquisition::Acquired(lease) => lease,
            LeaseAcquisition::Held { owner, expires_at } => {
                info!(
                    target: "scan::batch",
                    holder = %owner,
                    %expires_at,
                    "batch already in flight; deferring"
                );
                self.arm_if_idle(scan_id, self.config.rearm_delay()).await?;
                return Ok(BatchOutcome::LeaseHeld);
            }
        };

        let outcome = self.run_locked(state, now).await;
        if let Err(err) = self.store.release_lease(&lease).await {
            warn!(target: "scan::batch", error = %err, "failed to release batch lease");
        }

        match outcome {
            Err(ScanError::StaleWrite { expected, found, .. }) => {
                warn!(
                    target: "scan::batch",
                    expected,
                    found,
                    "scan changed by another writer; dropping batch"
                );
                Ok(BatchOutcome::Superseded)
            }
            // Cancelled while the batch was running.
            Err(ScanError::NotFound(_)) => Ok(BatchOutcome::Missing),
            other => other,
        }
    }

    async fn run_locked(
        &self,
        mut state: ScanState,
        now: DateTime<Utc>,
    ) -> Result<BatchOutcome> {
        state.phase = ScanPhase::Running;
        state.last_batch_at = Some(now);
        let mut state = self.store.update_scan(&state).await?;

        if state.total == 0 {
            state.cursor = state.cursor.saturating_add(1);
            return self.complete(state, now).await;
        }

        let stamped = match self.process_page(&state, now).await {
            Ok(stamped) => stamped,
            Err(err) if err.is_host_failure() => {
                return self.record_failure(state, err).await;
            }
            Err(err) => return Err(err),
        };

        state.processed = state.processed.saturating_add(stamped);
        state.cursor = state.cursor.saturating_add(1);
        state.attempts = 0;

        // A shrunk eligible set never reaches `total`; an empty page ends it.
        if state.processed >= state.total || stamped == 0 {
            return self.complete(state, now).await;
        }

        state.message = state.progress_message();
        let state = self.store.update_scan(&state).await?;
        self.arm_if_idle(&state.id, self.config.rearm_delay()).await?;

        info!(
            target: "scan::batch",
            processed = state.processed,
            total = state.total,
            cursor = state.cursor,
            "batch processed"
        );
        Ok(BatchOutcome::Advanced {
            processed: state.processed,
            cursor: state.cursor,
        })
    }

    /// Fetch the page at `state.cursor` and stamp every item in it. Either
    /// the whole page is stamped or the error is returned.
    async fn process_page(&self, state: &ScanState, now: DateTime<Utc>) -> Result<u64> {
        let items = self
            .host
            .published_page(&state.target_kinds, state.cursor, state.page_size)
            .await?;
        let mut stamped = 0u64;
        for item in items {
            self.host.stamp_scanned(item, now).await?;
            stamped += 1;
        }
        Ok(stamped)
    }

    async fn complete(&self, mut state: ScanState, now: DateTime<Utc>) -> Result<BatchOutcome> {
        state.phase = ScanPhase::Completed;
        state.completed_at = Some(now);
        state.message = COMPLETED_MESSAGE.to_string();
        let state = self.store.update_scan(&state).await?;
        info!(
            target: "scan::batch",
            processed = state.processed,
            total = state.total,
            "scan completed"
        );
        Ok(BatchOutcome::Completed {
            processed: state.processed,
        })
    }

    async fn record_failure(&self, mut state: ScanState, err: ScanError) -> Result<BatchOutcome> {
        state.attempts = state.attempts.saturating_add(1);
        let attempts = state.attempts;

        if attempts >= self.config.retry.max_attempts.max(1) {
            state.phase = ScanPhase::Failed;
            state.completed_at = Some(Utc::now());
            state.message = format!("Scan failed after {attempts} attempts: {err}");
            self.store.update_scan(&state).await?;
            warn!(target: "scan::batch", attempts, error = %err, "scan failed");
            return Ok(BatchOutcome::Failed { attempts });
        }

        let delay = self.config.retry.backoff_for(attempts);
        state.message = format!(
            "Batch attempt {attempts} failed: {err}; retrying in {}ms",
            delay.as_millis()
        );
        let state = self.store.update_scan(&state).await?;
        if !self.arm_if_idle(&state.id, delay).await? {
            // A follow-up armed elsewhere must still wait out the backoff.
            self.scheduler
                .defer(SCAN_BATCH_TASK, state.id.as_str(), not_before(delay))
                .await?;
        }
        warn!(
            target: "scan::batch",
            attempts,
            retry_in_ms = delay.as_millis() as u64,
            error = %err,
            "batch failed; retrying"
        );
        Ok(BatchOutcome::Retrying { attempts, delay })
    }

    /// Arm one batch for `scan_id` unless one is already armed.
    async fn arm_if_idle(&self, scan_id: &ScanId, delay: Duration) -> Result<bool> {
        if self
            .scheduler
            .is_scheduled(SCAN_BATCH_TASK, scan_id.as_str())
            .await?
        {
            debug!(target: "scan::scheduler", scan_id = %scan_id, "batch already armed");
            return Ok(false);
        }
        self.scheduler
            .schedule(SCAN_BATCH_TASK, scan_id.as_str(), not_before(delay))
            .await?;
        Ok(true)
    }

    pub async fn status(&self, scan_id: &str) -> Result<ScanStatus> {
        let id = ScanId::parse(scan_id)?;
        let state = self
            .store
            .get_scan(&id)
            .await?
            .ok_or_else(|| ScanError::NotFound(format!("scan {id} not found")))?;
        let stalled = state.is_stalled(Utc::now(), self.config.stall_after());
        Ok(ScanStatus { state, stalled })
    }

    pub async fn list(&self) -> Result<Vec<ScanHistoryEntry>> {
        self.store.history().await
    }

    /// Stop a scan by deleting its record. An armed batch then finds
    /// nothing and exits.
    #[instrument(target = "scan::start", skip(self), err)]
    pub async fn cancel(&self, scan_id: &str) -> Result<ScanId> {
        let id = ScanId::parse(scan_id)?;
        if !self.store.delete_scan(&id).await? {
            return Err(ScanError::NotFound(format!("scan {id} not found")));
        }
        info!(target: "scan::start", scan_id = %id, "scan cancelled");
        Ok(id)
    }

    /// Re-arm every unfinished scan. Armed tasks do not outlive the
    /// process, so this runs once at startup.
    pub async fn resume_unfinished(&self) -> Result<usize> {
        let unfinished = self.store.list_unfinished().await?;
        let mut armed = 0;
        for state in &unfinished {
            if self.arm_if_idle(&state.id, self.config.rearm_delay()).await? {
                armed += 1;
            }
        }
        if !unfinished.is_empty() {
            info!(
                target: "scan::start",
                unfinished = unfinished.len(),
                armed,
                "resumed unfinished scans"
            );
        }
        Ok(armed)
    }

    /// Lease holder name used by this orchestrator instance.
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

#[async_trait]
impl TaskHandler for ScanOrchestrator {
    async fn run(&self, args: &str) -> Result<()> {
        let scan_id = ScanId::parse(args)?;
        self.advance_batch(&scan_id).await.map(|_| ())
    }
}

fn not_before(delay: Duration) -> DateTime<Utc> {
    let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
    Utc::now()
        .checked_add_signed(delay)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
