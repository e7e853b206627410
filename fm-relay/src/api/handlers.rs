//! HTTP request handlers for the control API

use crate::api::server::AppContext;
use crate::error::Error;
use crate::playback::engine::PlaybackStatus;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use fm_common::media::parse_ordinal;
use futures::stream::Stream;
use serde::Serialize;
use std::convert::Infallible;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    listeners: usize,
}

#[derive(Debug, Serialize)]
pub struct BuildInfoResponse {
    version: String,
    git_hash: String,
    build_timestamp: String,
    build_profile: String,
}

#[derive(Debug, Serialize)]
pub struct SkipResponse {
    skipped: bool,
}

#[derive(Debug, Serialize)]
pub struct MuteResponse {
    muted: bool,
}

#[derive(Debug, Serialize)]
pub struct MediaEntry {
    ordinal: usize,
    filename: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
}

// ============================================================================
// Error Mapping
// ============================================================================

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Resolution(_) | Error::Common(fm_common::Error::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, Error>;

// ============================================================================
// Health and Build Info
// ============================================================================

pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "fm-relay".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        listeners: ctx.engine.bus().listener_count(),
    })
}

pub async fn build_info() -> Json<BuildInfoResponse> {
    Json(BuildInfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
    })
}

// ============================================================================
// Playback Control
// ============================================================================

/// GET /api/playback/status
pub async fn playback_status(State(ctx): State<AppContext>) -> Json<PlaybackStatus> {
    Json(ctx.engine.status())
}

/// POST /api/playback/next
pub async fn skip_next(State(ctx): State<AppContext>) -> Json<SkipResponse> {
    info!("Skip requested over HTTP");
    Json(SkipResponse {
        skipped: ctx.engine.skip(),
    })
}

/// POST /api/playback/mute
pub async fn toggle_mute(State(ctx): State<AppContext>) -> Json<MuteResponse> {
    Json(MuteResponse {
        muted: ctx.engine.toggle_mute(),
    })
}

/// POST /api/playback/play/:ordinal
pub async fn play_ordinal(
    State(ctx): State<AppContext>,
    Path(ordinal): Path<String>,
) -> ApiResult<MediaEntry> {
    let ordinal = parse_ordinal(&ordinal)?;
    let item = ctx.engine.play_ordinal(ordinal).await?;
    Ok(Json(MediaEntry {
        ordinal: item.ordinal,
        filename: item.filename,
    }))
}

// ============================================================================
// Media Directory
// ============================================================================

/// GET /api/media
pub async fn list_media(State(ctx): State<AppContext>) -> ApiResult<Vec<MediaEntry>> {
    let items = ctx.engine.library().list_media().await?;
    Ok(Json(
        items
            .into_iter()
            .map(|item| MediaEntry {
                ordinal: item.ordinal,
                filename: item.filename,
            })
            .collect(),
    ))
}

/// DELETE /api/media/:ordinal
pub async fn remove_media(
    State(ctx): State<AppContext>,
    Path(ordinal): Path<String>,
) -> ApiResult<MediaEntry> {
    let ordinal = parse_ordinal(&ordinal)?;
    let item = ctx.engine.library().remove(ordinal).await?;
    Ok(Json(MediaEntry {
        ordinal: item.ordinal,
        filename: item.filename,
    }))
}

// ============================================================================
// Events
// ============================================================================

/// GET /api/events
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    ctx.engine.events().handle_sse_connection()
}
