//! Integration tests for the HTTP surface
//!
//! The engine is built but not started, so no transcoder runs; audio is
//! injected straight into the arbiter where a test needs it.

mod helpers;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use bytes::Bytes;
use fm_relay::api::{build_router, AppContext};
use fm_relay::playback::{PlaybackEngine, Source};
use helpers::{sh_transcoder, test_engine, test_settings, write_media, QUIET_SILENCE, WAIT};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

/// Test helper: engine over a temp media directory holding `files`
fn setup(files: &[&str]) -> (TempDir, Arc<PlaybackEngine>) {
    let dir = TempDir::new().unwrap();
    for name in files {
        write_media(dir.path(), name, name.as_bytes());
    }
    let settings = test_settings(dir.path(), sh_transcoder("cat \"$1\"", QUIET_SILENCE));
    let engine = test_engine(&settings);
    (dir, engine)
}

fn app(engine: &Arc<PlaybackEngine>) -> axum::Router {
    build_router(AppContext {
        engine: Arc::clone(engine),
    })
}

fn test_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

// =============================================================================
// Health and Build Info
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, engine) = setup(&[]);

    let response = app(&engine)
        .oneshot(test_request("GET", "/health"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["module"], "fm-relay");
    assert_eq!(body["listeners"], 0);
}

#[tokio::test]
async fn test_build_info_endpoint() {
    let (_dir, engine) = setup(&[]);

    let response = app(&engine)
        .oneshot(test_request("GET", "/api/build_info"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert!(body["git_hash"].is_string());
    assert!(body["build_timestamp"].is_string());
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// Playback Control
// =============================================================================

#[tokio::test]
async fn test_status_of_idle_engine() {
    let (_dir, engine) = setup(&["a.mp3"]);

    let response = app(&engine)
        .oneshot(test_request("GET", "/api/playback/status"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["active_source"], "silence");
    assert_eq!(body["muted"], false);
    assert_eq!(body["selection_order"], "sequential");
    assert!(body["now_playing"].is_null());
}

#[tokio::test]
async fn test_mute_toggles() {
    let (_dir, engine) = setup(&[]);

    let response = app(&engine)
        .oneshot(test_request("POST", "/api/playback/mute"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(extract_json(response.into_body()).await["muted"], true);
    assert!(engine.arbiter().is_muted());

    let response = app(&engine)
        .oneshot(test_request("POST", "/api/playback/mute"))
        .await
        .unwrap();
    assert_eq!(extract_json(response.into_body()).await["muted"], false);
    assert!(!engine.arbiter().is_muted());
}

#[tokio::test]
async fn test_next_with_nothing_playing() {
    let (_dir, engine) = setup(&["a.mp3"]);

    let response = app(&engine)
        .oneshot(test_request("POST", "/api/playback/next"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(extract_json(response.into_body()).await["skipped"], false);
}

#[tokio::test]
async fn test_play_sets_override() {
    let (_dir, engine) = setup(&["a.mp3", "b.mp3", "c.mp3"]);
    let listing = engine.library().names().await.unwrap();

    let response = app(&engine)
        .oneshot(test_request("POST", "/api/playback/play/2"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["ordinal"], 2);
    assert_eq!(body["filename"], listing[1].as_str());
    assert_eq!(engine.cursor().pending_override(), Some(1));
}

#[tokio::test]
async fn test_play_unknown_ordinal_is_not_found() {
    let (_dir, engine) = setup(&["a.mp3", "b.mp3"]);

    for uri in [
        "/api/playback/play/5",
        "/api/playback/play/0",
        "/api/playback/play/abc",
    ] {
        let response = app(&engine).oneshot(test_request("POST", uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        let body = extract_json(response.into_body()).await;
        assert!(body["error"].is_string());
    }
    assert_eq!(engine.cursor().pending_override(), None);
}

// =============================================================================
// Media Directory
// =============================================================================

#[tokio::test]
async fn test_list_media() {
    let (_dir, engine) = setup(&["a.mp3", "b.mp3"]);
    let listing = engine.library().names().await.unwrap();

    let response = app(&engine)
        .oneshot(test_request("GET", "/api/media"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry["ordinal"], i + 1);
        assert_eq!(entry["filename"], listing[i].as_str());
    }
}

#[tokio::test]
async fn test_remove_media() {
    let (dir, engine) = setup(&["a.mp3", "b.mp3"]);
    let listing = engine.library().names().await.unwrap();

    let response = app(&engine)
        .oneshot(test_request("DELETE", "/api/media/1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["filename"], listing[0].as_str());
    assert!(!dir.path().join(&listing[0]).exists());
    assert_eq!(engine.library().names().await.unwrap(), vec![listing[1].clone()]);
}

#[tokio::test]
async fn test_remove_unknown_media_is_not_found() {
    let (_dir, engine) = setup(&["a.mp3"]);

    let response = app(&engine)
        .oneshot(test_request("DELETE", "/api/media/3"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(engine.library().names().await.unwrap().len(), 1);
}

// =============================================================================
// Listener Stream
// =============================================================================

#[tokio::test]
async fn test_stream_headers_and_bytes() {
    let (_dir, engine) = setup(&[]);

    let response = app(&engine)
        .oneshot(test_request("GET", "/stream"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    assert_eq!(engine.bus().listener_count(), 1);

    assert!(engine
        .arbiter()
        .tag(Source::Silence, Bytes::from_static(b"quiet")));

    let mut body = response.into_body();
    let frame = tokio::time::timeout(WAIT, body.frame())
        .await
        .expect("timed out waiting for stream data")
        .expect("stream ended")
        .expect("stream error");
    assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"quiet"));

    // Disconnecting frees the listener
    drop(body);
    assert_eq!(engine.bus().listener_count(), 0);
}

#[tokio::test]
async fn test_root_path_is_also_a_stream() {
    let (_dir, engine) = setup(&[]);

    let response = app(&engine)
        .oneshot(test_request("GET", "/"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(engine.bus().listener_count(), 1);
}

#[tokio::test]
async fn test_events_endpoint_is_sse() {
    let (_dir, engine) = setup(&[]);

    let response = app(&engine)
        .oneshot(test_request("GET", "/api/events"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
}
