//! HTTP server setup and routing

use crate::error::{Error, Result};
use crate::playback::engine::PlaybackEngine;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{handlers, stream};

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub engine: Arc<PlaybackEngine>,
}

/// Build the full router: listener stream plus control API
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        // Listener stream
        .route("/", get(stream::listen))
        .route("/stream", get(stream::listen))

        .route("/health", get(handlers::health))
        .route("/api/build_info", get(handlers::build_info))

        // Playback control
        .route("/api/playback/status", get(handlers::playback_status))
        .route("/api/playback/next", post(handlers::skip_next))
        .route("/api/playback/mute", post(handlers::toggle_mute))
        .route("/api/playback/play/:ordinal", post(handlers::play_ordinal))

        // Media directory
        .route("/api/media", get(handlers::list_media))
        .route("/api/media/:ordinal", delete(handlers::remove_media))

        .route("/api/events", get(handlers::event_stream))

        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, ctx: AppContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("HTTP server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, build_router(ctx))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))
}

/// Bind `addr` for [`serve`]
pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))
}
