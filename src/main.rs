//! Marquee server - single-host deployment
//!
//! Wires up:
//! - SQLite catalog and ffmpeg supervisor (local adapters)
//! - Stream service with its session registry
//! - HTTP layer serving playlist URLs and HLS output

use marquee::adapters::local::{http, FfmpegSupervisor, SqliteCatalog};
use marquee::application::registry::spawn_idle_sweeper;
use marquee::{StreamConfig, StreamService};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = StreamConfig::from_env();

    // 1. Adapters (Local implementations)
    let catalog = match SqliteCatalog::open(&config.catalog_db) {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::error!(path = %config.catalog_db.display(), error = %e, "Failed to open catalog");
            std::process::exit(1);
        }
    };
    let encoder = FfmpegSupervisor::new(&config.ffmpeg_bin);

    if let Err(e) = tokio::fs::create_dir_all(&config.hls_dir).await {
        tracing::error!(path = %config.hls_dir.display(), error = %e, "Failed to create HLS directory");
        std::process::exit(1);
    }

    // 2. Application Services
    let service = Arc::new(StreamService::new(catalog, encoder, config.stream_settings()));

    // 3. Idle eviction
    let shutdown = CancellationToken::new();
    let sweeper = config.idle_eviction().map(|max_idle| {
        tracing::info!(idle_secs = max_idle.as_secs(), "Idle eviction enabled");
        let every = (max_idle / 4).max(Duration::from_secs(1));
        spawn_idle_sweeper(service.registry().clone(), max_idle, every, shutdown.clone())
    });

    // 4. HTTP Layer
    let app = http::router(service.clone());

    // 5. Start Server
    let listener = match tokio::net::TcpListener::bind(&config.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(bind = %config.bind, error = %e, "Failed to bind TCP listener");
            std::process::exit(1);
        }
    };
    tracing::info!(
        bind = %config.bind,
        hls_dir = %config.hls_dir.display(),
        backend = %config.backend,
        "Listening"
    );

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server failed");
    }

    // 6. Stop encoders
    shutdown.cancel();
    if let Some(sweeper) = sweeper {
        let _ = sweeper.await;
    }
    let cancelled = service.shutdown();
    tracing::info!(sessions = cancelled, "Shut down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
