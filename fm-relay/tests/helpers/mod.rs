//! Shared fixtures for fm-relay integration tests
//!
//! Transcoders are stood in for by `/bin/sh` scripts so the tests do not
//! need ffmpeg. File scripts receive the media path as `$1`.

#![allow(dead_code)]

use fm_common::config::{Overrides, Settings, TranscoderConfig, INPUT_PLACEHOLDER};
use fm_relay::playback::PlaybackEngine;
use fm_relay::sse::{RelayEvent, SseBroadcaster};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(10);

/// Silence producer that never emits a byte
pub const QUIET_SILENCE: &str = "exec sleep 30";

/// `sh -c <script> sh <input>`, so the script sees the file as `$1`
pub fn sh_file(script: &str) -> Vec<String> {
    vec![
        "-c".to_string(),
        script.to_string(),
        "sh".to_string(),
        INPUT_PLACEHOLDER.to_string(),
    ]
}

pub fn sh_silence(script: &str) -> Vec<String> {
    vec!["-c".to_string(), script.to_string()]
}

pub fn sh_transcoder(file_script: &str, silence_script: &str) -> TranscoderConfig {
    TranscoderConfig {
        program: "sh".to_string(),
        file_args: sh_file(file_script),
        silence_args: sh_silence(silence_script),
    }
}

/// Sequential settings over `dir` with short timings
pub fn test_settings(dir: &Path, transcoder: TranscoderConfig) -> Settings {
    let overrides = Overrides {
        media_dir: Some(dir.to_path_buf()),
        random_order: Some(false),
        stall_timeout_ms: Some(2000),
        backoff_ms: Some(50),
        ..Default::default()
    };
    let mut settings = Settings::resolve(None, overrides).expect("test settings resolve");
    settings.kill_grace = Duration::from_millis(500);
    settings.transcoder = transcoder;
    settings
}

pub fn test_engine(settings: &Settings) -> Arc<PlaybackEngine> {
    Arc::new(PlaybackEngine::new(settings, SseBroadcaster::new(1024)))
}

pub fn write_media(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write media file");
    path
}

/// Wait for the first event matching `pred`
pub async fn next_event<F>(rx: &mut broadcast::Receiver<RelayEvent>, mut pred: F) -> RelayEvent
where
    F: FnMut(&RelayEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    panic!("event receiver lagged by {}", n)
                }
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Filename carried by a `TrackStarted` event
pub fn started_filename(event: &RelayEvent) -> Option<&str> {
    match event {
        RelayEvent::TrackStarted { filename, .. } => Some(filename),
        _ => None,
    }
}
