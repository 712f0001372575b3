use std::{
    fs,
    path::{Path, PathBuf},
};

use postscan_core::scan::ScanConfig;
use thiserror::Error;

use super::{
    models::{
        Config, ConfigMetadata, ScannerConfigSource, ServerConfig, StorageBackend,
        StorageConfig,
    },
    sources::{EnvConfig, FileConfig, parse_seed},
};

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] = ["postscan.toml", "config/postscan.toml"];

#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

/// Non-fatal observation made while composing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: Vec<ConfigWarning>,
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("configuration file {path} does not exist")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("POSTSCAN_CONFIG_JSON is not a valid scanner configuration: {0}")]
    ScannerJson(#[source] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(
        "the postgres storage backend needs DATABASE_URL or [storage].database_url"
    )]
    MissingDatabaseUrl,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Load `.env`, read the process environment and compose the result
    /// with the configuration file.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = dotenvy::dotenv().map(|_| true).or_else(|err| match err {
            dotenvy::Error::Io(_) => Ok(false),
            _ => Err(err),
        })?;

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Compose configuration from an already gathered environment.
    pub fn load_with_env(&self, env: EnvConfig) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        self.compose_config(file_config.unwrap_or_default(), env, config_path)
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .config_path
            .clone()
            .or_else(|| env.config_path.clone());

        let path = match explicit {
            Some(path) if !path.exists() => {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            Some(path) => path,
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists())
            {
                Some(path) => path,
                None => return Ok((None, None)),
            },
        };

        let contents = fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io {
            path: path.clone(),
            source,
        })?;
        let file_config = parse_file(&path, &contents)?;
        Ok((Some(file_config), Some(path)))
    }

    fn compose_config(
        &self,
        file: FileConfig,
        env: EnvConfig,
        config_path: Option<PathBuf>,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let mut warnings = Vec::new();

        let defaults = ServerConfig::default();
        let server = ServerConfig {
            host: env
                .server_host
                .or(file.server.host)
                .unwrap_or(defaults.host),
            port: env.server_port.or(file.server.port).unwrap_or(defaults.port),
        };

        let backend = match env.storage_backend.as_deref() {
            Some(raw) => raw.parse().map_err(ConfigLoadError::Invalid)?,
            None => file.storage.backend.unwrap_or_default(),
        };
        let seed = match env.seed.as_deref() {
            Some(raw) => parse_seed(raw).map_err(ConfigLoadError::Invalid)?,
            None => file.storage.seed,
        };
        let public_kinds = env
            .public_kinds
            .or(file.storage.public_kinds)
            .unwrap_or_else(|| StorageConfig::default().public_kinds);
        if public_kinds.is_empty() {
            return Err(ConfigLoadError::Invalid(
                "at least one public content kind is required".into(),
            ));
        }

        let storage = StorageConfig {
            backend,
            database_url: env.database_url.or(file.storage.database_url),
            public_kinds,
            seed,
        };

        match storage.backend {
            StorageBackend::Postgres if storage.database_url.is_none() => {
                return Err(ConfigLoadError::MissingDatabaseUrl);
            }
            StorageBackend::Postgres if !storage.seed.is_empty() => {
                warnings.push(ConfigWarning {
                    message: "seed counts are ignored by the postgres backend".into(),
                    hint: Some("insert rows into content_items instead".into()),
                });
            }
            StorageBackend::Memory => warnings.push(ConfigWarning {
                message: "scan state is kept in memory and lost on restart".into(),
                hint: Some("set POSTSCAN_STORAGE=postgres and DATABASE_URL".into()),
            }),
            StorageBackend::Postgres => {}
        }

        let (mut scanner, scanner_source) = match (env.scanner_config_json, file.scanner) {
            (Some(raw), _) => (
                serde_json::from_str::<ScanConfig>(&raw)
                    .map_err(ConfigLoadError::ScannerJson)?,
                ScannerConfigSource::EnvInline,
            ),
            (None, Some(scanner)) => {
                let source = config_path
                    .clone()
                    .map(ScannerConfigSource::File)
                    .unwrap_or_default();
                (scanner, source)
            }
            (None, None) => (ScanConfig::default(), ScannerConfigSource::Default),
        };
        if let Some(enabled) = env.maintenance_enabled {
            scanner.maintenance.enabled = enabled;
        }

        if !scanner
            .default_kinds
            .iter()
            .any(|kind| storage.public_kinds.contains(kind))
        {
            warnings.push(ConfigWarning {
                message: format!(
                    "none of the default scan kinds {:?} are public",
                    scanner.default_kinds
                ),
                hint: Some(
                    "scans started without post_types and maintenance scans will be rejected"
                        .into(),
                ),
            });
        }

        let config = Config {
            server,
            storage,
            scanner,
            dev_mode: env.dev_mode.or(file.dev_mode).unwrap_or(false),
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded: false,
                scanner_source,
            },
        };

        Ok(ConfigLoad { config, warnings })
    }
}

fn parse_file(path: &Path, contents: &str) -> Result<FileConfig, ConfigLoadError> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(contents).map_err(|err| ConfigLoadError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    } else {
        toml::from_str(contents).map_err(|err| ConfigLoadError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }
}
