//! rollcall-server - attendance ingestion and live presence service
//!
//! Accepts face detections from recognizers, stores them with a per-person
//! debounce and pushes presence events to classroom dashboards.

use anyhow::{Context, Result};
use clap::Parser;
use rollcall_common::config::{ServerConfig, TomlConfig};
use rollcall_common::db::init_database;
use rollcall_server::cli::Args;
use rollcall_server::{build_router, start_relay, AppState};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (file, config_source) =
        TomlConfig::discover(args.config.as_deref()).context("Failed to load config file")?;
    let config = ServerConfig::resolve(args.overrides(), file).context("Invalid configuration")?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        "Starting rollcall-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_source {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => info!("No config file found, using defaults"),
    }

    match &config.api_key {
        Some(key) => info!("API key configured (fingerprint {})", key.fingerprint()),
        None => warn!("No API key configured: attendance ingestion will reject every request"),
    }
    info!(
        "Debounce window: {}s, default classroom: {}",
        config.debounce_window.as_secs(),
        config.default_classroom_code.as_deref().unwrap_or("none")
    );

    info!("Database path: {}", config.database_path.display());
    let pool = init_database(&config.database_path)
        .await
        .context("Failed to open database")?;
    info!("✓ Database ready");

    std::fs::create_dir_all(&config.uploads_dir).with_context(|| {
        format!(
            "Failed to create uploads directory {}",
            config.uploads_dir.display()
        )
    })?;
    info!("Serving uploads from {}", config.uploads_dir.display());

    let addr = config.socket_addr();
    let state = AppState::new(pool.clone(), config);
    let _relay = start_relay(&state);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("rollcall-server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    pool.close().await;
    info!("rollcall-server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
