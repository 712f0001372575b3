use std::{fmt, sync::Arc};

use postscan_core::scan::ScanOrchestrator;

use crate::infra::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<ScanOrchestrator>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("backend", &self.config.storage.backend)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(config: Arc<Config>, orchestrator: Arc<ScanOrchestrator>) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &ScanOrchestrator {
        &self.orchestrator
    }
}
