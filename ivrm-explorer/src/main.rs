//! ivrm-explorer - IVR menu exploration service
//!
//! Runs the reconciliation passes in the background and serves the operator
//! API. Stops accepting requests on Ctrl+C / SIGTERM, then lets running
//! passes finish before exiting.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ivrm_common::config::{RootFolderInitializer, RootFolderResolver};
use ivrm_common::db::init_database_with;
use ivrm_explorer::config::{ExplorerConfig, MODULE_NAME};
use ivrm_explorer::services::{
    HttpCallExecutor, HttpMenuAnalyzer, PassContext, RecordingStore, Scheduler,
};
use ivrm_explorer::AppState;

/// Command-line arguments for ivrm-explorer
#[derive(Parser, Debug)]
#[command(name = "ivrm-explorer")]
#[command(about = "IVR menu exploration service")]
#[command(version)]
struct Args {
    /// Root folder holding the database and recordings
    #[arg(short, long, env = "IVRM_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file (defaults to <root>/ivrm-explorer.toml)
    #[arg(short, long, env = "IVRM_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "IVRM_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides config)
    #[arg(long, env = "IVRM_BIND")]
    bind: Option<String>,

    /// Log level when RUST_LOG is unset (overrides config)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config file location depends on the root folder, which the config
    // file may itself name; CLI/env take precedence either way.
    let initial_root = RootFolderResolver::new(MODULE_NAME)
        .with_cli_override(args.root_folder.clone())
        .resolve();
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| RootFolderInitializer::new(initial_root).config_path(MODULE_NAME));
    let mut config = ExplorerConfig::load(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(bind) = args.bind.clone() {
        config.http.bind_address = bind;
    }
    if let Some(level) = args.log_level.clone() {
        config.logging.level = level;
    }

    let default_filter = format!(
        "ivrm_explorer={level},ivrm_common={level},tower_http=info",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ivrm-explorer v{}", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", config_path.display());

    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_override(args.root_folder)
        .with_toml_value(config.root_folder.clone())
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", initializer.root_folder().display());

    let db_path = initializer.database_path();
    let pool = init_database_with(
        &db_path,
        config.database.max_connections,
        std::time::Duration::from_millis(config.database.busy_timeout_ms),
    )
    .await
    .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let executor = HttpCallExecutor::new(&config.executor.base_url, config.executor.timeout())
        .context("Failed to build call executor client")?;
    let analyzer = HttpMenuAnalyzer::new(
        &config.analysis.base_url,
        config.analysis.timeout(),
        config.analysis.api_token.clone(),
    )
    .context("Failed to build menu analysis client")?;
    if config.analysis.api_token.is_none() {
        tracing::warn!("No analysis token configured, requests will be unauthenticated");
    }

    let recordings = config.recordings.resolve(initializer.root_folder());
    info!(
        source = %recordings.source_dir.display(),
        serve = %recordings.serve_dir.display(),
        "Recording directories"
    );
    let store = RecordingStore::new(recordings.source_dir, recordings.serve_dir);

    let passes = PassContext::new(pool, Arc::new(executor), Arc::new(analyzer), store, &config);
    let last_error = Arc::new(RwLock::new(None));

    let cancel = CancellationToken::new();
    let mut tasks = Scheduler::new(passes.clone(), config.schedule.clone(), Arc::clone(&last_error))
        .spawn(cancel.clone());

    let app = ivrm_explorer::build_router(AppState::new(passes, last_error));

    let addr: SocketAddr = format!("{}:{}", config.http.bind_address, config.http.port)
        .parse()
        .context("Invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Waiting for running passes to finish");
    cancel.cancel();
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Pass task panicked");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
