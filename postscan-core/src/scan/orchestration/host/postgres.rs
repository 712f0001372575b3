use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{ContentHost, PUBLISHED_STATUS, page_offset};
use crate::error::{Result, ScanError};
use crate::types::ContentItemId;

/// Content host over the `content_items` table. Public kinds come from
/// configuration because the table carries no kind registry.
#[derive(Clone)]
pub struct PostgresContentHost {
    pool: PgPool,
    public_kinds: Vec<String>,
}

impl fmt::Debug for PostgresContentHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresContentHost")
            .field("public_kinds", &self.public_kinds)
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

fn host_failure(context: &str) -> impl FnOnce(sqlx::Error) -> ScanError + '_ {
    move |err| ScanError::HostFailure(format!("{context}: {err}"))
}

impl PostgresContentHost {
    pub fn new(pool: PgPool, public_kinds: Vec<String>) -> Self {
        Self { pool, public_kinds }
    }
}

#[async_trait]
impl ContentHost for PostgresContentHost {
    async fn public_kinds(&self) -> Result<Vec<String>> {
        Ok(self.public_kinds.clone())
    }

    async fn count_published(&self, kind: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)::bigint FROM content_items WHERE kind = $1 AND status = $2",
        )
        .bind(kind)
        .bind(PUBLISHED_STATUS)
        .fetch_one(&self.pool)
        .await
        .map_err(host_failure("count published items"))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn published_page(
        &self,
        kinds: &[String],
        page: u64,
        page_size: u32,
    ) -> Result<Vec<ContentItemId>> {
        let offset = i64::try_from(page_offset(page, page_size))
            .map_err(|_| ScanError::InvalidArgument(format!("page {page} out of range")))?;

        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM content_items
            WHERE kind = ANY($1) AND status = $2
            ORDER BY id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(kinds)
        .bind(PUBLISHED_STATUS)
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(host_failure("fetch published page"))?;

        Ok(ids.into_iter().map(ContentItemId).collect())
    }

    async fn stamp_scanned(&self, item: ContentItemId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE content_items SET last_scanned_at = $2 WHERE id = $1")
            .bind(item.0)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(host_failure("stamp scanned item"))?;
        Ok(())
    }
}
