use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use postscan_core::error::{Result, ScanError};
use postscan_core::scan::{
    BatchOutcome, COMPLETED_MESSAGE, ContentHost, DeferredScheduler, InMemoryContentHost,
    InMemoryJobStore, JobStore, LeaseAcquisition, ManualScheduler,
    SCAN_BATCH_TASK, ScanConfig, ScanHistoryEntry, ScanLease, ScanOrchestrator,
    ScanPhase, ScanState, StartScanRequest, TaskRegistry, TokioTaskScheduler,
};
use postscan_core::types::ScanId;

struct Harness {
    store: Arc<InMemoryJobStore>,
    host: Arc<InMemoryContentHost>,
    scheduler: Arc<ManualScheduler>,
    orchestrator: Arc<ScanOrchestrator>,
}

fn harness_with(config: ScanConfig) -> Harness {
    let store = Arc::new(InMemoryJobStore::new());
    let host = Arc::new(InMemoryContentHost::new(["post", "page"]));
    let scheduler = Arc::new(ManualScheduler::new());
    let orchestrator = Arc::new(ScanOrchestrator::new(
        store.clone(),
        host.clone(),
        scheduler.clone(),
        config,
    ));
    Harness {
        store,
        host,
        scheduler,
        orchestrator,
    }
}

fn harness() -> Harness {
    harness_with(ScanConfig::default())
}

fn request(kinds: &[&str], page_size: i64) -> StartScanRequest {
    StartScanRequest {
        kinds: Some(kinds.iter().map(|k| k.to_string()).collect()),
        page_size: Some(page_size),
    }
}

impl Harness {
    async fn state(&self, id: &ScanId) -> ScanState {
        self.store
            .get_scan(id)
            .await
            .expect("store read")
            .expect("scan exists")
    }

    /// Deliver the next armed batch, asserting it belongs to `id`.
    async fn deliver(&self, id: &ScanId) -> BatchOutcome {
        let task = self.scheduler.pop_next().await.expect("a batch is armed");
        assert_eq!(task.key.task, SCAN_BATCH_TASK);
        assert_eq!(task.key.args, id.as_str());
        self.orchestrator
            .advance_batch(id)
            .await
            .expect("batch runs")
    }

    /// Deliver batches until none are armed; returns the invocation count.
    async fn drain(&self, id: &ScanId) -> usize {
        let mut invocations = 0;
        while self.scheduler.pending_len().await > 0 {
            self.deliver(id).await;
            invocations += 1;
            assert!(invocations < 10_000, "scan never terminated");
        }
        invocations
    }
}

#[tokio::test]
async fn hundred_twenty_items_in_pages_of_fifty() {
    let h = harness();
    h.host.publish_many("post", 120).await;

    let id = h.orchestrator.start(request(&["post"], 50)).await.unwrap();
    let state = h.state(&id).await;
    assert_eq!(state.total, 120);
    assert_eq!(state.phase, ScanPhase::Queued);
    assert_eq!(h.scheduler.pending_len().await, 1);

    assert_eq!(
        h.deliver(&id).await,
        BatchOutcome::Advanced {
            processed: 50,
            cursor: 2
        }
    );
    let state = h.state(&id).await;
    assert_eq!(state.phase, ScanPhase::Running);
    assert_eq!(state.message, "Processed 50 of 120");

    assert_eq!(
        h.deliver(&id).await,
        BatchOutcome::Advanced {
            processed: 100,
            cursor: 3
        }
    );
    assert_eq!(
        h.deliver(&id).await,
        BatchOutcome::Completed { processed: 120 }
    );

    let state = h.state(&id).await;
    assert_eq!(state.phase, ScanPhase::Completed);
    assert_eq!(state.cursor, 4);
    assert_eq!(state.processed, 120);
    assert_eq!(state.message, COMPLETED_MESSAGE);
    assert!(state.completed_at.is_some());
    assert_eq!(h.scheduler.pending_len().await, 0, "no fourth batch armed");

    let items = h.host.items().await;
    assert!(items.iter().all(|item| item.last_scanned_at.is_some()));
}

#[tokio::test]
async fn batch_count_is_ceil_of_total_over_page_size() {
    for (total, page_size) in [(1usize, 1i64), (7, 3), (10, 5), (11, 500), (501, 500)] {
        let h = harness();
        h.host.publish_many("page", total).await;
        let id = h
            .orchestrator
            .start(request(&["page"], page_size))
            .await
            .unwrap();

        let invocations = h.drain(&id).await;
        let expected = total.div_ceil(page_size as usize);
        assert_eq!(invocations, expected, "total={total} page_size={page_size}");

        let state = h.state(&id).await;
        assert_eq!(state.phase, ScanPhase::Completed);
        assert_eq!(state.processed, total as u64);
    }
}

#[tokio::test]
async fn processed_and_cursor_never_decrease() {
    let h = harness();
    h.host.publish_many("post", 23).await;
    h.host.publish_many("page", 14).await;
    let id = h
        .orchestrator
        .start(request(&["post", "page"], 4))
        .await
        .unwrap();

    let mut last = (0u64, 1u64);
    while h.scheduler.pending_len().await > 0 {
        h.deliver(&id).await;
        let state = h.state(&id).await;
        assert!(state.processed >= last.0);
        assert!(state.cursor >= last.1);
        last = (state.processed, state.cursor);
    }
    assert_eq!(last.0, 37);
}

#[tokio::test]
async fn unknown_scan_is_a_silent_no_op() {
    let h = harness();
    let id = ScanId::parse("scan_0_nothere").unwrap();

    let outcome = h.orchestrator.advance_batch(&id).await.unwrap();

    assert_eq!(outcome, BatchOutcome::Missing);
    assert_eq!(h.store.scan_count(), 0);
    assert_eq!(h.scheduler.pending_len().await, 0);
}

#[tokio::test]
async fn zero_total_completes_on_first_batch() {
    let h = harness();
    h.host.insert_many("post", "draft", 5).await;

    let id = h
        .orchestrator
        .start(StartScanRequest::default())
        .await
        .unwrap();
    assert_eq!(h.state(&id).await.total, 0);

    assert_eq!(
        h.deliver(&id).await,
        BatchOutcome::Completed { processed: 0 }
    );
    let state = h.state(&id).await;
    assert_eq!(state.phase, ScanPhase::Completed);
    assert_eq!(state.cursor, 2);
    assert_eq!(h.scheduler.pending_len().await, 0);
}

#[tokio::test]
async fn history_keeps_the_ten_most_recent_starts() {
    let h = harness();
    let mut ids = Vec::new();
    for _ in 0..11 {
        ids.push(h.orchestrator.start(StartScanRequest::default()).await.unwrap());
    }

    let history = h.orchestrator.list().await.unwrap();
    assert_eq!(history.len(), 10);
    assert!(!history.iter().any(|entry| entry.id == ids[0]));
    assert_eq!(history[0].id, ids[10]);
    assert_eq!(history[9].id, ids[1]);
}

#[tokio::test]
async fn unknown_kinds_are_rejected_without_creating_state() {
    let h = harness();

    let err = h
        .orchestrator
        .start(request(&["bogus_type"], 50))
        .await
        .unwrap_err();

    assert!(matches!(err, ScanError::InvalidArgument(_)));
    assert_eq!(h.store.scan_count(), 0);
    assert!(h.orchestrator.list().await.unwrap().is_empty());
    assert_eq!(h.scheduler.pending_len().await, 0);
}

#[tokio::test]
async fn selected_kinds_follow_allow_list_order() {
    let h = harness();
    h.host.publish_many("post", 2).await;
    h.host.publish_many("page", 3).await;

    let id = h
        .orchestrator
        .start(request(&["page", "attachment", "post"], 50))
        .await
        .unwrap();

    let state = h.state(&id).await;
    assert_eq!(state.target_kinds, vec!["post".to_string(), "page".to_string()]);
    assert_eq!(state.total, 5);
}

#[tokio::test]
async fn page_size_is_clamped_and_defaulted() {
    let h = harness();
    for (requested, expected) in [(Some(0), 1), (Some(-7), 7), (Some(10_000), 500), (None, 50)] {
        let id = h
            .orchestrator
            .start(StartScanRequest {
                kinds: None,
                page_size: requested,
            })
            .await
            .unwrap();
        assert_eq!(h.state(&id).await.page_size, expected);
    }
}

#[tokio::test]
async fn start_arms_one_delayed_batch() {
    let h = harness();
    let before = Utc::now();
    let id = h
        .orchestrator
        .start(StartScanRequest::default())
        .await
        .unwrap();

    let pending = h.scheduler.pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].key.args, id.as_str());
    assert!(pending[0].not_before >= before + chrono::Duration::milliseconds(1_000));
}

#[tokio::test]
async fn empty_page_ends_a_shrunk_scan() {
    let h = harness();
    let ids = h.host.publish_many("post", 10).await;
    let id = h.orchestrator.start(request(&["post"], 5)).await.unwrap();

    for item in &ids[..6] {
        h.host.remove(*item).await;
    }

    assert_eq!(
        h.deliver(&id).await,
        BatchOutcome::Advanced {
            processed: 4,
            cursor: 2
        }
    );
    assert_eq!(
        h.deliver(&id).await,
        BatchOutcome::Completed { processed: 4 }
    );
    let state = h.state(&id).await;
    assert_eq!(state.total, 10);
    assert_eq!(state.phase, ScanPhase::Completed);
    assert_eq!(h.scheduler.pending_len().await, 0);
}

#[tokio::test]
async fn host_failures_retry_then_fail() {
    let h = harness();
    h.host.publish_many("post", 3).await;
    let id = h.orchestrator.start(request(&["post"], 2)).await.unwrap();
    h.host.fail_next_pages(3);

    assert_eq!(
        h.deliver(&id).await,
        BatchOutcome::Retrying {
            attempts: 1,
            delay: Duration::from_millis(2_000)
        }
    );
    let state = h.state(&id).await;
    assert_eq!(state.cursor, 1);
    assert_eq!(state.processed, 0);
    assert_eq!(state.attempts, 1);
    assert_eq!(state.phase, ScanPhase::Running);

    assert_eq!(
        h.deliver(&id).await,
        BatchOutcome::Retrying {
            attempts: 2,
            delay: Duration::from_millis(4_000)
        }
    );
    assert_eq!(h.deliver(&id).await, BatchOutcome::Failed { attempts: 3 });

    let state = h.state(&id).await;
    assert_eq!(state.phase, ScanPhase::Failed);
    assert!(state.message.contains("page 1 fetch failed"));
    assert_eq!(h.scheduler.pending_len().await, 0);

    let again = h.orchestrator.advance_batch(&id).await.unwrap();
    assert_eq!(again, BatchOutcome::Finished(ScanPhase::Failed));
}

#[tokio::test]
async fn retry_pushes_back_an_already_armed_follow_up() {
    let h = harness();
    h.host.publish_many("post", 3).await;
    let id = h.orchestrator.start(request(&["post"], 2)).await.unwrap();
    h.scheduler.pop_next().await.expect("initial batch");

    // A follow-up armed while another worker held the lease.
    h.scheduler
        .schedule(SCAN_BATCH_TASK, id.as_str(), Utc::now())
        .await
        .unwrap();
    h.host.fail_next_pages(1);

    let before = Utc::now();
    assert_eq!(
        h.orchestrator.advance_batch(&id).await.unwrap(),
        BatchOutcome::Retrying {
            attempts: 1,
            delay: Duration::from_millis(2_000)
        }
    );
    assert_eq!(h.scheduler.pending_len().await, 1);
    let task = h.scheduler.pop_next().await.expect("follow-up still armed");
    assert_eq!(task.key.args, id.as_str());
    assert!(task.not_before >= before + chrono::Duration::seconds(2));
}

#[tokio::test]
async fn transient_failure_recovers_and_resets_attempts() {
    let h = harness();
    h.host.publish_many("post", 4).await;
    let id = h.orchestrator.start(request(&["post"], 2)).await.unwrap();
    h.host.fail_next_pages(1);

    assert!(matches!(
        h.deliver(&id).await,
        BatchOutcome::Retrying { attempts: 1, .. }
    ));
    assert_eq!(
        h.deliver(&id).await,
        BatchOutcome::Advanced {
            processed: 2,
            cursor: 2
        }
    );
    assert_eq!(h.state(&id).await.attempts, 0);
}

#[tokio::test]
async fn failed_stamp_retries_the_whole_page_without_double_counting() {
    let h = harness();
    let items = h.host.publish_many("post", 4).await;
    let id = h.orchestrator.start(request(&["post"], 4)).await.unwrap();
    h.host.fail_stamp(items[2], true).await;

    assert!(matches!(
        h.deliver(&id).await,
        BatchOutcome::Retrying { attempts: 1, .. }
    ));
    assert_eq!(h.state(&id).await.processed, 0);

    h.host.fail_stamp(items[2], false).await;
    assert_eq!(
        h.deliver(&id).await,
        BatchOutcome::Completed { processed: 4 }
    );
}

#[tokio::test]
async fn duplicate_delivery_under_held_lease_does_not_advance() {
    let h = harness();
    h.host.publish_many("post", 6).await;
    let id = h.orchestrator.start(request(&["post"], 3)).await.unwrap();

    let held = match h
        .store
        .acquire_lease(&id, "other-worker", Utc::now(), chrono::Duration::seconds(30))
        .await
        .unwrap()
    {
        LeaseAcquisition::Acquired(lease) => lease,
        other => panic!("expected lease, got {other:?}"),
    };

    assert_eq!(h.deliver(&id).await, BatchOutcome::LeaseHeld);
    let state = h.state(&id).await;
    assert_eq!(state.processed, 0);
    assert_eq!(state.phase, ScanPhase::Queued);
    assert_eq!(h.scheduler.pending_len().await, 1, "follow-up armed");

    h.store.release_lease(&held).await.unwrap();
    assert_eq!(
        h.deliver(&id).await,
        BatchOutcome::Advanced {
            processed: 3,
            cursor: 2
        }
    );
}

#[tokio::test]
async fn expired_lease_is_taken_over() {
    let h = harness();
    h.host.publish_many("post", 2).await;
    let id = h.orchestrator.start(request(&["post"], 5)).await.unwrap();

    let long_ago = Utc::now() - chrono::Duration::minutes(10);
    h.store
        .acquire_lease(&id, "crashed-worker", long_ago, chrono::Duration::seconds(30))
        .await
        .unwrap();

    assert_eq!(
        h.deliver(&id).await,
        BatchOutcome::Completed { processed: 2 }
    );
    assert!(h.store.lease_for(&id).is_none(), "lease released after batch");
}

/// Job store that lets another writer slip in before the batch's first write.
struct RacingStore {
    inner: InMemoryJobStore,
    raced: AtomicBool,
}

#[async_trait]
impl JobStore for RacingStore {
    async fn get_scan(&self, id: &ScanId) -> Result<Option<ScanState>> {
        self.inner.get_scan(id).await
    }

    async fn insert_scan(&self, state: &ScanState) -> Result<()> {
        self.inner.insert_scan(state).await
    }

    async fn update_scan(&self, state: &ScanState) -> Result<ScanState> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let mut rival = state.clone();
            rival.message = "rival writer".into();
            self.inner.update_scan(&rival).await?;
        }
        self.inner.update_scan(state).await
    }

    async fn delete_scan(&self, id: &ScanId) -> Result<bool> {
        self.inner.delete_scan(id).await
    }

    async fn list_unfinished(&self) -> Result<Vec<ScanState>> {
        self.inner.list_unfinished().await
    }

    async fn push_history(&self, entry: ScanHistoryEntry, capacity: usize) -> Result<()> {
        self.inner.push_history(entry, capacity).await
    }

    async fn history(&self) -> Result<Vec<ScanHistoryEntry>> {
        self.inner.history().await
    }

    async fn acquire_lease(
        &self,
        scan_id: &ScanId,
        owner: &str,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Result<LeaseAcquisition> {
        self.inner.acquire_lease(scan_id, owner, now, ttl).await
    }

    async fn release_lease(&self, lease: &ScanLease) -> Result<()> {
        self.inner.release_lease(lease).await
    }
}

#[tokio::test]
async fn stale_write_drops_the_batch() {
    let store = Arc::new(RacingStore {
        inner: InMemoryJobStore::new(),
        raced: AtomicBool::new(false),
    });
    let host = Arc::new(InMemoryContentHost::new(["post"]));
    host.publish_many("post", 5).await;
    let scheduler = Arc::new(ManualScheduler::new());
    let orchestrator = ScanOrchestrator::new(
        store.clone(),
        host.clone(),
        scheduler.clone(),
        ScanConfig::default(),
    );

    let id = orchestrator.start(request(&["post"], 2)).await.unwrap();
    scheduler.pop_next().await.expect("first batch armed");

    assert_eq!(
        orchestrator.advance_batch(&id).await.unwrap(),
        BatchOutcome::Superseded
    );
    let state = store.get_scan(&id).await.unwrap().unwrap();
    assert_eq!(state.message, "rival writer");
    assert_eq!(state.processed, 0);
    assert_eq!(scheduler.pending_len().await, 0);
    assert!(host.items().await.iter().all(|i| i.last_scanned_at.is_none()));
}

#[tokio::test]
async fn cancel_deletes_state_and_next_batch_no_ops() {
    let h = harness();
    h.host.publish_many("post", 10).await;
    let id = h.orchestrator.start(request(&["post"], 2)).await.unwrap();

    let cancelled = h.orchestrator.cancel(id.as_str()).await.unwrap();
    assert_eq!(cancelled, id);
    assert!(matches!(
        h.orchestrator.status(id.as_str()).await,
        Err(ScanError::NotFound(_))
    ));

    assert_eq!(h.deliver(&id).await, BatchOutcome::Missing);
    assert_eq!(h.scheduler.pending_len().await, 0);
    assert_eq!(h.orchestrator.list().await.unwrap().len(), 1);

    assert!(matches!(
        h.orchestrator.cancel(id.as_str()).await,
        Err(ScanError::NotFound(_))
    ));
    assert!(matches!(
        h.orchestrator.cancel("  ").await,
        Err(ScanError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn status_validates_and_reports_stalls() {
    let h = harness_with(ScanConfig {
        rearm_delay_ms: 10,
        stall_multiplier: 1,
        ..ScanConfig::default()
    });
    h.host.publish_many("post", 1).await;

    assert!(matches!(
        h.orchestrator.status("").await,
        Err(ScanError::InvalidArgument(_))
    ));
    assert!(matches!(
        h.orchestrator.status("scan_1_unknown").await,
        Err(ScanError::NotFound(_))
    ));

    let id = h.orchestrator.start(request(&["post"], 5)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let status = h.orchestrator.status(id.as_str()).await.unwrap();
    assert!(status.stalled);
    assert_eq!(status.state.id, id);

    h.drain(&id).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let status = h.orchestrator.status(id.as_str()).await.unwrap();
    assert_eq!(status.state.phase, ScanPhase::Completed);
    assert!(!status.stalled, "finished scans are never stalled");
}

#[tokio::test]
async fn restart_rearms_unfinished_scans() {
    let h = harness();
    h.host.publish_many("post", 4).await;
    let finished = h.orchestrator.start(request(&["post"], 10)).await.unwrap();
    h.drain(&finished).await;
    let unfinished = h.orchestrator.start(request(&["post"], 2)).await.unwrap();
    h.deliver(&unfinished).await;

    // New process: same store and host, fresh scheduler with nothing armed.
    let scheduler = Arc::new(ManualScheduler::new());
    let orchestrator = Arc::new(ScanOrchestrator::new(
        h.store.clone(),
        h.host.clone(),
        scheduler.clone(),
        ScanConfig::default(),
    ));

    assert_eq!(orchestrator.resume_unfinished().await.unwrap(), 1);
    let pending = scheduler.pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].key.args, unfinished.as_str());
    assert_eq!(orchestrator.resume_unfinished().await.unwrap(), 0);

    let registry = TaskRegistry::new();
    orchestrator.register(&registry);
    scheduler.run_until_idle(&registry, 10).await;
    let state = h.state(&unfinished).await;
    assert_eq!(state.phase, ScanPhase::Completed);
    assert_eq!(state.processed, 4);
}

#[tokio::test]
async fn registry_dispatch_drives_scan_to_completion() {
    let h = harness();
    h.host.publish_many("page", 9).await;
    let registry = TaskRegistry::new();
    h.orchestrator.register(&registry);

    let id = h.orchestrator.start(request(&["page"], 4)).await.unwrap();
    assert_eq!(h.scheduler.run_until_idle(&registry, 100).await, 3);

    let state = h.state(&id).await;
    assert_eq!(state.phase, ScanPhase::Completed);
    assert_eq!(state.processed, 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tokio_scheduler_runs_scan_end_to_end() {
    let store = Arc::new(InMemoryJobStore::new());
    let host = Arc::new(InMemoryContentHost::new(["post", "page"]));
    host.publish_many("post", 25).await;

    let registry = TaskRegistry::new();
    let scheduler = Arc::new(TokioTaskScheduler::new(registry.clone()));
    let orchestrator = Arc::new(ScanOrchestrator::new(
        store.clone(),
        host.clone(),
        scheduler.clone(),
        ScanConfig {
            rearm_delay_ms: 5,
            ..ScanConfig::default()
        },
    ));
    orchestrator.register(&registry);

    let id = orchestrator.start(request(&["post"], 10)).await.unwrap();

    let finished = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let status = orchestrator.status(id.as_str()).await.unwrap();
            if status.state.is_terminal() {
                break status.state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("scan finishes");

    assert_eq!(finished.phase, ScanPhase::Completed);
    assert_eq!(finished.processed, 25);
    assert_eq!(finished.cursor, 4);
    scheduler.shutdown().await;
    assert_eq!(host.count_published("post").await.unwrap(), 25);
}
