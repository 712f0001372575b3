use std::collections::BTreeMap;
use std::path::PathBuf;

use postscan_core::scan::ScanConfig;
use serde::{Deserialize, Serialize};

use super::models::StorageBackend;

/// Raw configuration as written in `postscan.toml`.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub storage: FileStorageConfig,
    pub scanner: Option<ScanConfig>,
    pub dev_mode: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileStorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<StorageBackend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_kinds: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub seed: BTreeMap<String, usize>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub database_url: Option<String>,
    pub storage_backend: Option<String>,
    pub public_kinds: Option<Vec<String>>,
    pub seed: Option<String>,
    pub maintenance_enabled: Option<bool>,
    pub dev_mode: Option<bool>,
    pub config_path: Option<PathBuf>,
    pub scanner_config_json: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            server_host: std::env::var("SERVER_HOST").ok(),
            server_port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
            database_url: std::env::var("DATABASE_URL").ok(),
            storage_backend: std::env::var("POSTSCAN_STORAGE").ok(),
            public_kinds: parse_csv_var("POSTSCAN_PUBLIC_KINDS"),
            seed: std::env::var("POSTSCAN_SEED").ok(),
            maintenance_enabled: parse_bool_var("POSTSCAN_MAINTENANCE"),
            dev_mode: parse_bool_var("DEV_MODE"),
            config_path: std::env::var("POSTSCAN_CONFIG_PATH")
                .ok()
                .map(PathBuf::from),
            scanner_config_json: std::env::var("POSTSCAN_CONFIG_JSON")
                .ok()
                .filter(|raw| !raw.trim().is_empty()),
        }
    }
}

/// Parse `post=120,page=30` into per-kind counts.
pub fn parse_seed(raw: &str) -> Result<BTreeMap<String, usize>, String> {
    let mut seed = BTreeMap::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (kind, count) = part
            .split_once('=')
            .ok_or_else(|| format!("seed entry '{part}' is not kind=count"))?;
        let count = count
            .trim()
            .parse::<usize>()
            .map_err(|err| format!("seed count for '{}': {err}", kind.trim()))?;
        seed.insert(kind.trim().to_string(), count);
    }
    Ok(seed)
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|part| {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

fn parse_csv_var(name: &str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|raw| parse_csv(&raw))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_bool_var(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|raw| parse_bool(&raw))
}
