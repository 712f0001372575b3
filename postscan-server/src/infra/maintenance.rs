//! Recurring maintenance scan with default arguments.

use std::sync::Arc;

use postscan_core::scan::{MaintenanceConfig, ScanOrchestrator, StartScanRequest};
use postscan_core::types::ScanId;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Start one scan with the configured default kinds and page size.
pub async fn run_maintenance_scan(orchestrator: &ScanOrchestrator) -> Option<ScanId> {
    match orchestrator.start(StartScanRequest::default()).await {
        Ok(scan_id) => {
            info!(target: "scan::maintenance", %scan_id, "maintenance scan started");
            Some(scan_id)
        }
        Err(err) => {
            warn!(target: "scan::maintenance", error = %err, "maintenance scan could not start");
            None
        }
    }
}

/// Trigger [`run_maintenance_scan`] every `config.interval()`, first one
/// interval after startup. Returns `None` when maintenance is disabled.
pub fn spawn_maintenance(
    orchestrator: Arc<ScanOrchestrator>,
    config: &MaintenanceConfig,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    if !config.enabled {
        info!(target: "scan::maintenance", "maintenance scans disabled");
        return None;
    }

    let period = config.interval();
    info!(
        target: "scan::maintenance",
        interval_secs = period.as_secs(),
        "maintenance scans scheduled"
    );

    Some(tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    run_maintenance_scan(&orchestrator).await;
                }
            }
        }
    }))
}
