//! Runtime configuration: `.env`, environment variables and an optional
//! TOML (or JSON) file, composed in that order of precedence.

pub mod loader;
pub mod models;
pub mod sources;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigWarning};
pub use models::{
    Config, ConfigMetadata, ScannerConfigSource, ServerConfig, StorageBackend,
    StorageConfig,
};
