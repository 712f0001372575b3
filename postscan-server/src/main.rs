//! # postscan-server
//!
//! Runs the posts-scan HTTP API and the background batch scheduler.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use postscan_server::{
    AppState, create_app,
    infra::{
        config::{Config, ConfigLoad, ConfigLoader, ScannerConfigSource},
        maintenance::spawn_maintenance,
        startup::{build_runtime, connect_postgres},
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "postscan-server")]
#[command(about = "Resumable posts-maintenance scan service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Configuration file (TOML, or JSON by extension)
    #[arg(short, long, env = "POSTSCAN_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Disable the recurring maintenance scan
    #[arg(long, default_value_t = false)]
    no_maintenance: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_runtime_config(&cli.serve)?;

    match cli.command {
        Some(Command::Db(DbCommand::Migrate)) => run_db_migrate(&config).await,
        None => run_server(config).await,
    }
}

fn load_runtime_config(args: &ServeArgs) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_config_path(path);
    }
    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }
    if args.no_maintenance {
        config.scanner.maintenance.enabled = false;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Quieter defaults with per-batch summaries. Override via RUST_LOG.
                "info,scan::batch=info,scan::scheduler=info,tower_http=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "loaded configuration file");
    }
    match &config.metadata.scanner_source {
        ScannerConfigSource::Default => info!("using default scanner configuration"),
        ScannerConfigSource::File(path) => {
            info!(path = %path.display(), "scanner configuration loaded from file")
        }
        ScannerConfigSource::EnvInline => {
            info!("scanner configuration loaded from POSTSCAN_CONFIG_JSON")
        }
    }
    for warning in warnings {
        match warning.hint {
            Some(hint) => warn!(hint = %hint, "{}", warning.message),
            None => warn!("{}", warning.message),
        }
    }

    Ok(config)
}

async fn run_db_migrate(config: &Config) -> anyhow::Result<()> {
    let url = config
        .storage
        .database_url
        .as_deref()
        .context("DATABASE_URL is required to run migrations")?;
    let pool = connect_postgres(url).await?;
    pool.close().await;
    info!("Database migrations applied successfully");
    Ok(())
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let shutdown = CancellationToken::new();

    let runtime = build_runtime(&config, shutdown.child_token()).await?;
    let resumed = runtime
        .orchestrator
        .resume_unfinished()
        .await
        .context("failed to resume unfinished scans")?;
    if resumed > 0 {
        info!(resumed, "re-armed unfinished scans");
    }

    let maintenance = spawn_maintenance(
        Arc::clone(&runtime.orchestrator),
        &config.scanner.maintenance,
        shutdown.child_token(),
    );

    let state = AppState::new(Arc::clone(&config), Arc::clone(&runtime.orchestrator));
    let router = create_app(state);

    let addr = (config.server.host.as_str(), config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}:{}", addr.0, addr.1))?;
    info!(
        "Starting posts-scan server on {}:{}",
        config.server.host, config.server.port
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Some(handle) = maintenance
        && let Err(err) = handle.await
    {
        warn!(error = %err, "maintenance task ended abnormally");
    }
    runtime.shutdown().await;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => {},
    }
    info!("shutdown signal received");
}
