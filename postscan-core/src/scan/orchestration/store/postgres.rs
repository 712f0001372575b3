//! Postgres-backed job store.
//!
//! Scan records are kept as JSONB next to a `revision` column that guards
//! updates; leases live in their own table so lease churn never rewrites the
//! scan document.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, types::Json};
use tracing::{debug, info};

use super::JobStore;
use crate::error::{Result, ScanError};
use crate::scan::orchestration::{
    lease::{LeaseAcquisition, ScanLease},
    state::{ScanHistoryEntry, ScanState},
};
use crate::types::{LeaseId, ScanId};

#[derive(Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl fmt::Debug for PostgresJobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresJobStore")
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .finish()
    }
}

fn revision_to_db(revision: u64) -> Result<i64> {
    i64::try_from(revision)
        .map_err(|_| ScanError::Internal(format!("revision {revision} out of range")))
}

fn revision_from_db(revision: i64) -> u64 {
    u64::try_from(revision).unwrap_or_default()
}

impl PostgresJobStore {
    /// Wrap a pool after a connectivity check. Migrations are applied by the
    /// caller through [`crate::MIGRATOR`].
    pub async fn new(pool: PgPool) -> Result<Self> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| {
                ScanError::Storage(format!(
                    "job store failed Postgres health check: {e}"
                ))
            })?;
        info!("Job store connected to Postgres");
        Ok(Self { pool })
    }

    fn decode_state(row: &sqlx::postgres::PgRow) -> Result<ScanState> {
        let Json(mut state): Json<ScanState> = row.try_get("state")?;
        let revision: i64 = row.try_get("revision")?;
        state.revision = revision_from_db(revision);
        Ok(state)
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn get_scan(&self, id: &ScanId) -> Result<Option<ScanState>> {
        let row = sqlx::query(
            "SELECT state, revision FROM scan_states WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::decode_state).transpose()
    }

    async fn insert_scan(&self, state: &ScanState) -> Result<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO scan_states (id, phase, state, revision, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(state.id.as_str())
        .bind(state.phase.as_str())
        .bind(Json(state))
        .bind(revision_to_db(state.revision)?)
        .bind(state.created_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(ScanError::Internal(format!(
                "scan id collision: {}",
                state.id
            )));
        }
        Ok(())
    }

    async fn update_scan(&self, state: &ScanState) -> Result<ScanState> {
        let expected = revision_to_db(state.revision)?;
        let mut next = state.clone();
        next.revision = state.revision + 1;

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE scan_states
            SET state = $2,
                phase = $3,
                revision = revision + 1,
                updated_at = NOW()
            WHERE id = $1 AND revision = $4
            RETURNING revision
            "#,
        )
        .bind(state.id.as_str())
        .bind(Json(&next))
        .bind(state.phase.as_str())
        .bind(expected)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(revision) = updated {
            next.revision = revision_from_db(revision);
            return Ok(next);
        }

        let found: Option<i64> = sqlx::query_scalar(
            "SELECT revision FROM scan_states WHERE id = $1",
        )
        .bind(state.id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match found {
            None => Err(ScanError::NotFound(state.id.to_string())),
            Some(found) => Err(ScanError::StaleWrite {
                scan_id: state.id.to_string(),
                expected: state.revision,
                found: revision_from_db(found),
            }),
        }
    }

    async fn delete_scan(&self, id: &ScanId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM scan_leases WHERE scan_id = $1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM scan_states WHERE id = $1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted > 0)
    }

    async fn list_unfinished(&self) -> Result<Vec<ScanState>> {
        let rows = sqlx::query(
            r#"
            SELECT state, revision
            FROM scan_states
            WHERE phase IN ('queued', 'running')
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::decode_state).collect()
    }

    async fn push_history(
        &self,
        entry: ScanHistoryEntry,
        capacity: usize,
    ) -> Result<()> {
        let capacity = i64::try_from(capacity).unwrap_or(i64::MAX);
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO scan_history (id, entry, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(entry.id.as_str())
        .bind(Json(&entry))
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;

        let evicted = sqlx::query(
            r#"
            DELETE FROM scan_history
            WHERE id NOT IN (
                SELECT id FROM scan_history ORDER BY seq DESC LIMIT $1
            )
            "#,
        )
        .bind(capacity)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;

        if evicted > 0 {
            debug!(target: "scan::store", evicted, "trimmed scan history");
        }
        Ok(())
    }

    async fn history(&self) -> Result<Vec<ScanHistoryEntry>> {
        let rows = sqlx::query("SELECT entry FROM scan_history ORDER BY seq DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let Json(entry): Json<ScanHistoryEntry> = row.try_get("entry")?;
                Ok(entry)
            })
            .collect()
    }

    async fn acquire_lease(
        &self,
        scan_id: &ScanId,
        owner: &str,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Result<LeaseAcquisition> {
        let lease = ScanLease::new(scan_id.clone(), owner, now, ttl);

        let acquired: Option<uuid::Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO scan_leases (scan_id, lease_id, owner, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (scan_id) DO UPDATE
            SET lease_id = EXCLUDED.lease_id,
                owner = EXCLUDED.owner,
                expires_at = EXCLUDED.expires_at
            WHERE scan_leases.expires_at <= $5
            RETURNING lease_id
            "#,
        )
        .bind(scan_id.as_str())
        .bind(lease.lease_id.0)
        .bind(&lease.owner)
        .bind(lease.expires_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if acquired.map(LeaseId) == Some(lease.lease_id) {
            return Ok(LeaseAcquisition::Acquired(lease));
        }

        let holder = sqlx::query(
            "SELECT owner, expires_at FROM scan_leases WHERE scan_id = $1",
        )
        .bind(scan_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match holder {
            Some(row) => Ok(LeaseAcquisition::Held {
                owner: row.try_get("owner")?,
                expires_at: row.try_get("expires_at")?,
            }),
            // Released between the two statements; report it as held so the
            // caller backs off and retries through the scheduler.
            None => Ok(LeaseAcquisition::Held {
                owner: String::new(),
                expires_at: now,
            }),
        }
    }

    async fn release_lease(&self, lease: &ScanLease) -> Result<()> {
        sqlx::query("DELETE FROM scan_leases WHERE scan_id = $1 AND lease_id = $2")
            .bind(lease.scan_id.as_str())
            .bind(lease.lease_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
