use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{ContentHost, PUBLISHED_STATUS, page_offset};
use crate::error::{Result, ScanError};
use crate::types::ContentItemId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentItem {
    pub id: ContentItemId,
    pub kind: String,
    pub status: String,
    pub last_scanned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct HostState {
    items: BTreeMap<ContentItemId, ContentItem>,
    next_id: i64,
    failing_items: HashSet<ContentItemId>,
}

/// In-process content host. Items are ordered by id, which is assigned
/// monotonically on insert.
pub struct InMemoryContentHost {
    public_kinds: Vec<String>,
    state: RwLock<HostState>,
    page_failures: AtomicU32,
}

impl fmt::Debug for InMemoryContentHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryContentHost")
            .field("public_kinds", &self.public_kinds)
            .field("page_failures", &self.page_failures.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl InMemoryContentHost {
    pub fn new<I, S>(public_kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            public_kinds: public_kinds.into_iter().map(Into::into).collect(),
            state: RwLock::new(HostState {
                next_id: 1,
                ..HostState::default()
            }),
            page_failures: AtomicU32::new(0),
        }
    }

    /// Add `count` items of `kind` with `status`; returns their ids.
    pub async fn insert_many(
        &self,
        kind: &str,
        status: &str,
        count: usize,
    ) -> Vec<ContentItemId> {
        let mut state = self.state.write().await;
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = ContentItemId(state.next_id);
            state.next_id += 1;
            state.items.insert(
                id,
                ContentItem {
                    id,
                    kind: kind.to_string(),
                    status: status.to_string(),
                    last_scanned_at: None,
                },
            );
            ids.push(id);
        }
        ids
    }

    pub async fn publish_many(&self, kind: &str, count: usize) -> Vec<ContentItemId> {
        self.insert_many(kind, PUBLISHED_STATUS, count).await
    }

    pub async fn remove(&self, id: ContentItemId) -> bool {
        self.state.write().await.items.remove(&id).is_some()
    }

    pub async fn items(&self) -> Vec<ContentItem> {
        self.state.read().await.items.values().cloned().collect()
    }

    /// Make the next `count` page fetches fail.
    pub fn fail_next_pages(&self, count: u32) {
        self.page_failures.store(count, Ordering::SeqCst);
    }

    /// Make stamping `id` fail until cleared.
    pub async fn fail_stamp(&self, id: ContentItemId, failing: bool) {
        let mut state = self.state.write().await;
        if failing {
            state.failing_items.insert(id);
        } else {
            state.failing_items.remove(&id);
        }
    }

    fn take_page_failure(&self) -> bool {
        self.page_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl ContentHost for InMemoryContentHost {
    async fn public_kinds(&self) -> Result<Vec<String>> {
        Ok(self.public_kinds.clone())
    }

    async fn count_published(&self, kind: &str) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state
            .items
            .values()
            .filter(|item| item.kind == kind && item.status == PUBLISHED_STATUS)
            .count() as u64)
    }

    async fn published_page(
        &self,
        kinds: &[String],
        page: u64,
        page_size: u32,
    ) -> Result<Vec<ContentItemId>> {
        if self.take_page_failure() {
            return Err(ScanError::HostFailure(format!(
                "page {page} fetch failed"
            )));
        }

        let offset = page_offset(page, page_size);
        let state = self.state.read().await;
        Ok(state
            .items
            .values()
            .filter(|item| {
                item.status == PUBLISHED_STATUS && kinds.iter().any(|k| *k == item.kind)
            })
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(page_size as usize)
            .map(|item| item.id)
            .collect())
    }

    async fn stamp_scanned(&self, item: ContentItemId, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        if state.failing_items.contains(&item) {
            return Err(ScanError::HostFailure(format!("failed to stamp item {item}")));
        }
        match state.items.get_mut(&item) {
            Some(entry) => {
                entry.last_scanned_at = Some(at);
                Ok(())
            }
            // Deleted since the page was fetched; nothing left to stamp.
            None => Ok(()),
        }
    }
}
