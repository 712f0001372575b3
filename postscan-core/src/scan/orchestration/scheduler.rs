//! Deferred task scheduling.
//!
//! A scheduler accepts "run task `name` with `args` no earlier than T" and
//! later hands the invocation to the handler registered under `name`.
//! Delivery is at-least-once and not-before; distinct tasks are not ordered
//! relative to each other.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Identity of an armed task: its name plus its argument.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub task: String,
    pub args: String,
}

impl TaskKey {
    pub fn new(task: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            args: args.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.task, self.args)
    }
}

#[async_trait]
pub trait DeferredScheduler: Send + Sync {
    async fn schedule(
        &self,
        task: &str,
        args: &str,
        not_before: DateTime<Utc>,
    ) -> Result<()>;

    /// Whether an invocation of `task` with `args` is armed and not yet
    /// handed to its handler.
    async fn is_scheduled(&self, task: &str, args: &str) -> Result<bool>;

    /// Push armed invocations of `task` with `args` back so none runs before
    /// `not_before`. Earlier times never move a task forward. Returns whether
    /// anything was armed.
    async fn defer(&self, task: &str, args: &str, not_before: DateTime<Utc>) -> Result<bool>;
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, args: &str) -> Result<()>;
}

/// Mapping from task name to handler, shared by scheduler implementations.
#[derive(Default, Clone)]
pub struct TaskRegistry {
    handlers: Arc<DashMap<String, Arc<dyn TaskHandler>>>,
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> =
            self.handlers.iter().map(|entry| entry.key().clone()).collect();
        f.debug_struct("TaskRegistry").field("tasks", &names).finish()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, task: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task.into(), handler);
    }

    pub fn handler(&self, task: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task).map(|entry| Arc::clone(entry.value()))
    }

    /// Hand one invocation to its handler. Failures are logged and dropped;
    /// retrying is the handler's own business.
    pub async fn dispatch(&self, key: &TaskKey) {
        let Some(handler) = self.handler(&key.task) else {
            warn!(target: "scan::scheduler", task = %key.task, "no handler registered; dropping task");
            return;
        };
        if let Err(err) = handler.run(&key.args).await {
            warn!(
                target: "scan::scheduler",
                task = %key.task,
                args = %key.args,
                error = %err,
                "deferred task failed"
            );
        }
    }
}

/// Armed timers for one key and the earliest time any of them may fire.
#[derive(Debug)]
struct ArmedTask {
    count: usize,
    not_before: DateTime<Utc>,
}

struct TokioSchedulerInner {
    registry: TaskRegistry,
    armed: DashMap<TaskKey, ArmedTask>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl TokioSchedulerInner {
    fn arm(&self, key: &TaskKey, not_before: DateTime<Utc>) {
        let mut entry = self.armed.entry(key.clone()).or_insert(ArmedTask {
            count: 0,
            not_before,
        });
        entry.count += 1;
        entry.not_before = entry.not_before.max(not_before);
    }

    fn disarm(&self, key: &TaskKey) {
        self.armed.remove_if_mut(key, |_, armed| {
            armed.count = armed.count.saturating_sub(1);
            armed.count == 0
        });
    }

    /// Time left until `key` may fire, or `None` once it is due.
    fn remaining(&self, key: &TaskKey) -> Option<std::time::Duration> {
        let not_before = self.armed.get(key)?.not_before;
        (not_before - Utc::now())
            .to_std()
            .ok()
            .filter(|left| !left.is_zero())
    }
}

/// In-process scheduler: each armed task is a tokio timer. Armed tasks are
/// lost when the process exits; callers re-arm unfinished work at startup.
#[derive(Clone)]
pub struct TokioTaskScheduler {
    inner: Arc<TokioSchedulerInner>,
}

impl fmt::Debug for TokioTaskScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioTaskScheduler")
            .field("armed", &self.inner.armed.len())
            .field("in_flight", &self.inner.tracker.len())
            .field("shutdown", &self.inner.shutdown.is_cancelled())
            .finish()
    }
}

impl TokioTaskScheduler {
    pub fn new(registry: TaskRegistry) -> Self {
        Self::with_shutdown(registry, CancellationToken::new())
    }

    pub fn with_shutdown(registry: TaskRegistry, shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(TokioSchedulerInner {
                registry,
                armed: DashMap::new(),
                shutdown,
                tracker: TaskTracker::new(),
            }),
        }
    }

    pub fn armed_count(&self) -> usize {
        self.inner.armed.len()
    }

    /// Stop firing timers and wait for running handlers to return.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        info!(target: "scan::scheduler", "deferred task scheduler stopped");
    }
}

#[async_trait]
impl DeferredScheduler for TokioTaskScheduler {
    async fn schedule(
        &self,
        task: &str,
        args: &str,
        not_before: DateTime<Utc>,
    ) -> Result<()> {
        let key = TaskKey::new(task, args);
        let delay = (not_before - Utc::now()).to_std().unwrap_or_default();
        self.inner.arm(&key, not_before);
        debug!(target: "scan::scheduler", task = %key, delay_ms = delay.as_millis() as u64, "armed deferred task");

        let inner = Arc::clone(&self.inner);
        self.inner.tracker.spawn(async move {
            let mut delay = delay;
            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => {
                        inner.disarm(&key);
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                // `defer` may have pushed the deadline while this timer slept.
                match inner.remaining(&key) {
                    Some(left) => delay = left,
                    None => break,
                }
            }
            // Disarm before running so the handler may re-arm itself.
            inner.disarm(&key);
            inner.registry.dispatch(&key).await;
        });
        Ok(())
    }

    async fn is_scheduled(&self, task: &str, args: &str) -> Result<bool> {
        Ok(self.inner.armed.contains_key(&TaskKey::new(task, args)))
    }

    async fn defer(&self, task: &str, args: &str, not_before: DateTime<Utc>) -> Result<bool> {
        let key = TaskKey::new(task, args);
        let Some(mut armed) = self.inner.armed.get_mut(&key) else {
            return Ok(false);
        };
        armed.not_before = armed.not_before.max(not_before);
        debug!(target: "scan::scheduler", task = %key, not_before = %armed.not_before, "deferred armed task");
        Ok(true)
    }
}

/// A scheduled invocation recorded by [`ManualScheduler`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledTask {
    pub key: TaskKey,
    pub not_before: DateTime<Utc>,
}

/// Scheduler that only records requests. The embedding drives delivery by
/// popping tasks and dispatching them, which makes batch pacing explicit
/// (foreground CLI runs, deterministic tests).
#[derive(Debug, Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<ScheduledTask>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn pending(&self) -> Vec<ScheduledTask> {
        self.queue.lock().await.iter().cloned().collect()
    }

    pub async fn pending_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Remove and return the earliest armed task, ignoring its not-before time.
    pub async fn pop_next(&self) -> Option<ScheduledTask> {
        let mut queue = self.queue.lock().await;
        let index = queue
            .iter()
            .enumerate()
            .min_by_key(|(_, task)| task.not_before)
            .map(|(index, _)| index)?;
        queue.remove(index)
    }

    /// Dispatch tasks through `registry` until none are armed or `limit`
    /// dispatches happened. Returns the number of dispatches.
    pub async fn run_until_idle(&self, registry: &TaskRegistry, limit: usize) -> usize {
        let mut dispatched = 0;
        while dispatched < limit {
            let Some(task) = self.pop_next().await else {
                break;
            };
            registry.dispatch(&task.key).await;
            dispatched += 1;
        }
        dispatched
    }
}

#[async_trait]
impl DeferredScheduler for ManualScheduler {
    async fn schedule(
        &self,
        task: &str,
        args: &str,
        not_before: DateTime<Utc>,
    ) -> Result<()> {
        self.queue.lock().await.push_back(ScheduledTask {
            key: TaskKey::new(task, args),
            not_before,
        });
        Ok(())
    }

    async fn is_scheduled(&self, task: &str, args: &str) -> Result<bool> {
        Ok(self
            .queue
            .lock()
            .await
            .iter()
            .any(|scheduled| scheduled.key.task == task && scheduled.key.args == args))
    }

    async fn defer(&self, task: &str, args: &str, not_before: DateTime<Utc>) -> Result<bool> {
        let mut queue = self.queue.lock().await;
        let mut found = false;
        for scheduled in queue
            .iter_mut()
            .filter(|scheduled| scheduled.key.task == task && scheduled.key.args == args)
        {
            scheduled.not_before = scheduled.not_before.max(not_before);
            found = true;
        }
        Ok(found)
    }
}
