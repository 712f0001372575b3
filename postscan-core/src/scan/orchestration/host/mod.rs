//! Content host seam: the site whose published items a scan walks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::ContentItemId;

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use memory::InMemoryContentHost;
#[cfg(feature = "database")]
pub use postgres::PostgresContentHost;

/// The only status a scan visits.
pub const PUBLISHED_STATUS: &str = "publish";

/// Offset of the first item of 1-based `page`.
pub fn page_offset(page: u64, page_size: u32) -> u64 {
    page.saturating_sub(1).saturating_mul(u64::from(page_size))
}

#[async_trait]
pub trait ContentHost: Send + Sync {
    /// Allow-list of public content kinds, in host order.
    async fn public_kinds(&self) -> Result<Vec<String>>;

    /// Published items of one kind.
    async fn count_published(&self, kind: &str) -> Result<u64>;

    /// One page of published item ids across `kinds`, ordered by ascending
    /// id. `page` is 1-based. The ordering must be stable between calls or
    /// scans skip and repeat items.
    async fn published_page(
        &self,
        kinds: &[String],
        page: u64,
        page_size: u32,
    ) -> Result<Vec<ContentItemId>>;

    /// Record that `item` was scanned at `at`. Must be idempotent.
    async fn stamp_scanned(&self, item: ContentItemId, at: DateTime<Utc>) -> Result<()>;
}
