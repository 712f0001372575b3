//! Wiring of the job store, content host, scheduler and orchestrator for
//! the configured storage backend.

use std::{fmt, sync::Arc};

use anyhow::Context;
use postscan_core::{
    MIGRATOR,
    scan::{
        ContentHost, InMemoryContentHost, InMemoryJobStore, JobStore,
        PostgresContentHost, PostgresJobStore, ScanOrchestrator, TaskRegistry,
        TokioTaskScheduler,
    },
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::infra::config::{Config, StorageBackend};

const MAX_DB_CONNECTIONS: u32 = 10;

/// Long-lived scan machinery owned by the server process.
pub struct ScanRuntime {
    pub orchestrator: Arc<ScanOrchestrator>,
    pub scheduler: TokioTaskScheduler,
    pub pool: Option<PgPool>,
}

impl fmt::Debug for ScanRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanRuntime")
            .field("orchestrator", &self.orchestrator)
            .field("scheduler", &self.scheduler)
            .field("postgres", &self.pool.is_some())
            .finish()
    }
}

impl ScanRuntime {
    /// Stop armed batches and wait for running ones.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

pub async fn connect_postgres(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_DB_CONNECTIONS)
        .connect(database_url)
        .await
        .context("failed to connect to PostgreSQL")?;
    MIGRATOR
        .run(&pool)
        .await
        .context("failed to apply database migrations")?;
    info!("Database schema initialized successfully");
    Ok(pool)
}

pub async fn build_runtime(
    config: &Config,
    shutdown: CancellationToken,
) -> anyhow::Result<ScanRuntime> {
    let kinds = config.storage.public_kinds.clone();

    let (store, host, pool): (Arc<dyn JobStore>, Arc<dyn ContentHost>, Option<PgPool>) =
        match config.storage.backend {
            StorageBackend::Memory => {
                let host = InMemoryContentHost::new(kinds);
                for (kind, count) in &config.storage.seed {
                    host.publish_many(kind, *count).await;
                }
                if !config.storage.seed.is_empty() {
                    info!(seed = ?config.storage.seed, "seeded in-memory content host");
                }
                let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
                let host: Arc<dyn ContentHost> = Arc::new(host);
                (store, host, None)
            }
            StorageBackend::Postgres => {
                let url = config
                    .storage
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL is required for the postgres backend")?;
                let pool = connect_postgres(url).await?;
                let store = PostgresJobStore::new(pool.clone())
                    .await
                    .context("failed to initialise job store")?;
                let store: Arc<dyn JobStore> = Arc::new(store);
                let host: Arc<dyn ContentHost> =
                    Arc::new(PostgresContentHost::new(pool.clone(), kinds));
                (store, host, Some(pool))
            }
        };

    let registry = TaskRegistry::new();
    let scheduler = TokioTaskScheduler::with_shutdown(registry.clone(), shutdown);
    let orchestrator = Arc::new(ScanOrchestrator::new(
        store,
        host,
        Arc::new(scheduler.clone()),
        config.scanner.clone(),
    ));
    orchestrator.register(&registry);

    info!(
        backend = %config.storage.backend,
        public_kinds = ?config.storage.public_kinds,
        owner = orchestrator.owner(),
        "scan runtime ready"
    );

    Ok(ScanRuntime {
        orchestrator,
        scheduler,
        pool,
    })
}
