use std::fs;

use postscan_server::infra::config::{
    ConfigLoadError, ConfigLoader, ScannerConfigSource, StorageBackend,
};
use postscan_server::infra::config::sources::EnvConfig;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write config file");
    path
}

#[test]
fn toml_file_supplies_server_storage_and_scanner() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "postscan.toml",
        r#"
dev_mode = true

[server]
port = 9100

[storage]
public_kinds = ["post", "page", "product"]
seed = { post = 40 }

[scanner]
default_kinds = ["product"]
default_page_size = 25
rearm_delay_ms = 250

[scanner.maintenance]
enabled = false
"#,
    );

    let load = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())
        .expect("config loads");
    let config = load.config;

    assert_eq!(config.server.port, 9100);
    assert_eq!(config.server.host, "0.0.0.0");
    assert!(config.dev_mode);
    assert_eq!(config.storage.backend, StorageBackend::Memory);
    assert_eq!(config.storage.public_kinds, vec!["post", "page", "product"]);
    assert_eq!(config.storage.seed.get("post"), Some(&40));
    assert_eq!(config.scanner.default_kinds, vec!["product"]);
    assert_eq!(config.scanner.default_page_size, 25);
    assert_eq!(config.scanner.rearm_delay_ms, 250);
    assert!(!config.scanner.maintenance.enabled);
    assert_eq!(config.metadata.scanner_source, ScannerConfigSource::File(path.clone()));
    assert_eq!(config.metadata.config_path, Some(path));
}

#[test]
fn json_file_is_parsed_by_extension() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "postscan.json",
        r#"{ "server": { "host": "127.0.0.1" }, "storage": { "public_kinds": ["post"] } }"#,
    );

    let config = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())
        .unwrap()
        .config;

    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.storage.public_kinds, vec!["post"]);
    assert_eq!(config.metadata.scanner_source, ScannerConfigSource::Default);
}

#[test]
fn environment_overrides_file_values() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "postscan.toml",
        "[server]\nport = 9100\n\n[storage]\npublic_kinds = [\"post\"]\n",
    );
    let env = EnvConfig {
        server_port: Some(7000),
        public_kinds: Some(vec!["page".into(), "post".into()]),
        seed: Some("page=3".into()),
        maintenance_enabled: Some(false),
        scanner_config_json: Some(r#"{ "default_page_size": 10 }"#.into()),
        ..EnvConfig::default()
    };

    let config = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(env)
        .unwrap()
        .config;

    assert_eq!(config.server.port, 7000);
    assert_eq!(config.storage.public_kinds, vec!["page", "post"]);
    assert_eq!(config.storage.seed.get("page"), Some(&3));
    assert_eq!(config.scanner.default_page_size, 10);
    assert!(!config.scanner.maintenance.enabled);
    assert_eq!(config.metadata.scanner_source, ScannerConfigSource::EnvInline);
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = ConfigLoader::new()
        .with_config_path(dir.path().join("absent.toml"))
        .load_with_env(EnvConfig::default())
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
}

#[test]
fn postgres_backend_requires_database_url() {
    let env = EnvConfig {
        storage_backend: Some("postgres".into()),
        config_path: None,
        ..EnvConfig::default()
    };
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "empty.toml", "");

    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(env)
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::MissingDatabaseUrl));
}

#[test]
fn memory_backend_warns_about_volatility() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "empty.toml", "");
    let load = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())
        .unwrap();
    assert!(
        load.warnings
            .iter()
            .any(|warning| warning.message.contains("in memory"))
    );
}

#[test]
fn malformed_file_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "broken.toml", "[server\nport = ");
    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())
        .unwrap_err();
    match err {
        ConfigLoadError::Parse { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error: {other}"),
    }
}
