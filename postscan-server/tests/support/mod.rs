#![allow(dead_code)]

use std::sync::Arc;

use axum_test::TestServer;
use postscan_core::scan::{
    InMemoryContentHost, InMemoryJobStore, ManualScheduler, ScanConfig, ScanOrchestrator,
    TaskRegistry,
};
use postscan_server::{
    AppState, create_app,
    infra::config::{Config, StorageConfig},
};

/// Server over in-memory storage. Batches only run when a test pumps the
/// manual scheduler.
pub struct TestApp {
    pub server: TestServer,
    pub orchestrator: Arc<ScanOrchestrator>,
    pub store: Arc<InMemoryJobStore>,
    pub host: Arc<InMemoryContentHost>,
    pub scheduler: Arc<ManualScheduler>,
    pub registry: TaskRegistry,
}

impl TestApp {
    pub async fn run_batches(&self) -> usize {
        self.scheduler.run_until_idle(&self.registry, 1_000).await
    }
}

pub async fn build_test_app(seed: &[(&str, usize)]) -> TestApp {
    let config = Config {
        storage: StorageConfig {
            public_kinds: vec!["post".into(), "page".into()],
            ..StorageConfig::default()
        },
        scanner: ScanConfig::default(),
        ..Config::default()
    };

    let store = Arc::new(InMemoryJobStore::new());
    let host = Arc::new(InMemoryContentHost::new(config.storage.public_kinds.clone()));
    for (kind, count) in seed {
        host.publish_many(kind, *count).await;
    }
    let scheduler = Arc::new(ManualScheduler::new());
    let registry = TaskRegistry::new();
    let orchestrator = Arc::new(ScanOrchestrator::new(
        store.clone(),
        host.clone(),
        scheduler.clone(),
        config.scanner.clone(),
    ));
    orchestrator.register(&registry);

    let state = AppState::new(Arc::new(config), orchestrator.clone());
    let server = TestServer::new(create_app(state)).expect("test server");

    TestApp {
        server,
        orchestrator,
        store,
        host,
        scheduler,
        registry,
    }
}
