use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use postscan_core::scan::ScanConfig;
use serde::{Deserialize, Serialize};

/// Where scan state and content items live.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process memory. Scans do not survive a restart.
    #[default]
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(format!(
                "unknown storage backend '{other}' (expected memory or postgres)"
            )),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Postgres => f.write_str("postgres"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: Option<String>,
    /// Content kinds a scan may target, in the order scans visit them.
    pub public_kinds: Vec<String>,
    /// Published items created per kind at startup (memory backend only).
    pub seed: BTreeMap<String, usize>,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("backend", &self.backend)
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("public_kinds", &self.public_kinds)
            .field("seed", &self.seed)
            .finish()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database_url: None,
            public_kinds: vec!["post".to_string(), "page".to_string()],
            seed: BTreeMap::new(),
        }
    }
}

/// Where the scanner tuning came from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ScannerConfigSource {
    #[default]
    Default,
    File(PathBuf),
    EnvInline,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
    pub scanner_source: ScannerConfigSource,
}

#[derive(Clone, Debug, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub scanner: ScanConfig,
    pub dev_mode: bool,
    pub metadata: ConfigMetadata,
}
