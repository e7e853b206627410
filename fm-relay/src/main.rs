//! fm-relay - Main entry point

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fm_relay::api::{self, AppContext};
use fm_relay::cli::Args;
use fm_relay::playback::PlaybackEngine;
use fm_relay::sse::SseBroadcaster;

/// How long open connections may linger after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_file = args
        .config_file()
        .context("Failed to locate config file")?;
    let settings = args
        .resolve_settings(config_file.as_deref())
        .context("Invalid configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "fm_relay={level},fm_common={level},tower_http={level}",
                    level = settings.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting fm-relay v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_file {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("No config file, using defaults"),
    }
    info!("Media directory: {}", settings.media_dir.display());

    settings
        .ensure_media_dir()
        .context("Failed to prepare media directory")?;

    let engine = Arc::new(PlaybackEngine::new(&settings, SseBroadcaster::default()));
    engine.start();

    let listener = api::bind(&settings.bind_addr())
        .await
        .context("Failed to bind HTTP listener")?;

    let (stop_tx, stop_rx) = watch::channel(false);
    {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            shutdown_signal().await;
            engine.shutdown();
            let _ = stop_tx.send(true);
        });
    }

    let graceful = {
        let mut stop_rx = stop_rx.clone();
        async move {
            let _ = stop_rx.changed().await;
        }
    };
    let deadline = {
        let mut stop_rx = stop_rx;
        async move {
            let _ = stop_rx.changed().await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        }
    };

    let ctx = AppContext {
        engine: Arc::clone(&engine),
    };
    tokio::select! {
        result = api::serve(listener, ctx, graceful) => result.context("Server error")?,
        _ = deadline => warn!("Connections still open after {:?}, exiting", SHUTDOWN_GRACE),
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
