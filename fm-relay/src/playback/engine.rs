//! Playback engine
//!
//! Drives the relay: select a file, transcode it in real time, gate its bytes
//! through the arbiter onto the bus, repeat. A silence producer runs beside
//! the loop for the whole process lifetime so listeners always receive a
//! valid stream.
//!
//! Per-track failures never end the loop. Spawn errors, stalls and bad exits
//! are logged and followed by a backoff sleep; a kill requested by skip moves
//! straight on to the next selection.

use crate::error::{Error, Result};
use crate::playback::arbiter::{FileFeed, GateStats, Source, SourceArbiter};
use crate::playback::bus::BroadcastBus;
use crate::playback::cursor::LibraryCursor;
use crate::playback::transcoder::{
    SourceDescriptor, TranscodeHandle, TranscodeObserver, TranscodeOutcome, Transcoder,
};
use crate::sse::{RelayEvent, SseBroadcaster, TrackOutcome};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use fm_common::config::Settings;
use fm_common::time;
use fm_common::{MediaItem, MediaLibrary};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Track currently being transcoded
#[derive(Debug)]
struct CurrentTrack {
    item: MediaItem,
    started_at: DateTime<Utc>,
    /// Arbiter feed of this attempt
    feed: FileFeed,
    /// Set once the transcoder process is up
    handle: Option<TranscodeHandle>,
    /// Skip arrived before the handle existed
    skip_requested: bool,
}

/// Public view of the current track
#[derive(Debug, Clone, Serialize)]
pub struct NowPlaying {
    pub ordinal: usize,
    pub filename: String,
    pub started_at: DateTime<Utc>,
}

/// Snapshot returned by `GET /api/playback/status`
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackStatus {
    pub now_playing: Option<NowPlaying>,
    pub active_source: Source,
    pub muted: bool,
    pub listeners: usize,
    pub selection_order: &'static str,
    pub auto_remove: bool,
    pub gate: GateStats,
}

/// Result of one pass through the loop that did not fail
enum Attempt {
    Played,
    Idle,
}

/// Playback engine - owns every playback component
pub struct PlaybackEngine {
    library: MediaLibrary,
    cursor: LibraryCursor,
    bus: Arc<BroadcastBus>,
    arbiter: Arc<SourceArbiter>,
    transcoder: Transcoder,
    auto_remove: bool,
    backoff: Duration,
    current: Mutex<Option<CurrentTrack>>,
    /// Cuts a backoff or idle sleep short
    wake: Notify,
    events: SseBroadcaster,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PlaybackEngine {
    pub fn new(settings: &Settings, events: SseBroadcaster) -> Self {
        Self::with_cursor(
            settings,
            LibraryCursor::new(settings.selection_order),
            events,
        )
    }

    /// Engine with a caller-provided cursor, e.g. a seeded one
    pub fn with_cursor(settings: &Settings, cursor: LibraryCursor, events: SseBroadcaster) -> Self {
        let bus = Arc::new(BroadcastBus::new(settings.listener_buffer_chunks));
        let arbiter = Arc::new(SourceArbiter::new(Arc::clone(&bus)));

        Self {
            library: MediaLibrary::new(settings.media_dir.clone()),
            cursor,
            bus,
            arbiter,
            transcoder: Transcoder::new(
                settings.transcoder.clone(),
                settings.stall_timeout,
                settings.kill_grace,
            ),
            auto_remove: settings.auto_remove,
            backoff: settings.backoff,
            current: Mutex::new(None),
            wake: Notify::new(),
            events,
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn bus(&self) -> &Arc<BroadcastBus> {
        &self.bus
    }

    pub fn arbiter(&self) -> &Arc<SourceArbiter> {
        &self.arbiter
    }

    pub fn library(&self) -> &MediaLibrary {
        &self.library
    }

    pub fn cursor(&self) -> &LibraryCursor {
        &self.cursor
    }

    pub fn events(&self) -> &SseBroadcaster {
        &self.events
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<CurrentTrack>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn the silence producer and the playback loop
    ///
    /// Calling it again is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Playback engine already started");
            return;
        }

        info!(
            "Starting playback engine ({} order, auto-remove {})",
            self.cursor.order().as_str(),
            self.auto_remove
        );

        let silence = tokio::spawn(Arc::clone(self).silence_loop());
        let playback = tokio::spawn(Arc::clone(self).playback_loop());

        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        tasks.push(silence);
        tasks.push(playback);
    }

    /// Stop both loops and end every listener stream
    ///
    /// Running transcoders die with their tasks.
    pub fn shutdown(&self) {
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();
        if !tasks.is_empty() {
            info!("Stopping playback engine");
        }
        for task in tasks {
            task.abort();
        }
        self.reset_to_silence();
        self.bus.close_all();
    }

    // ========================================================================
    // Operator commands
    // ========================================================================

    /// Terminate the current track; the loop selects the next one
    ///
    /// Returns false if no track was playing. The track's feed is retired
    /// before the kill so nothing more of it reaches listeners; the feed of
    /// any later track is left alone. Also cuts a pending backoff short,
    /// including one the loop has not started waiting on yet.
    pub fn skip(&self) -> bool {
        let skipped = {
            let mut current = self.lock_current();
            current.as_mut().map(|track| {
                info!("Skipping {}", track.item.filename);
                track.skip_requested = true;
                let silenced = self.arbiter.end_file(&track.feed);
                (track.handle.clone(), silenced)
            })
        };

        let playing = skipped.is_some();
        if let Some((handle, silenced)) = skipped {
            if silenced {
                self.announce_silence();
            }
            if let Some(handle) = handle {
                handle.kill();
            }
        }
        self.wake.notify_one();
        playing
    }

    /// Flip mute and return the new state
    pub fn toggle_mute(&self) -> bool {
        let muted = self.arbiter.toggle_mute();
        info!("Stream {}", if muted { "muted" } else { "unmuted" });
        self.events.broadcast_lossy(RelayEvent::MuteChanged {
            muted,
            timestamp: time::now(),
        });
        muted
    }

    /// Play the item at 1-based `ordinal` next, skipping the current track
    pub async fn play_ordinal(&self, ordinal: usize) -> Result<MediaItem> {
        let item = self
            .library
            .resolve_by_ordinal(ordinal)
            .await
            .map_err(|e| match e {
                fm_common::Error::NotFound(msg) => Error::Resolution(msg),
                other => Error::Common(other),
            })?;

        self.cursor.set_override(item.ordinal)?;
        info!("Queued #{} {} to play next", item.ordinal, item.filename);
        self.skip();
        Ok(item)
    }

    pub fn status(&self) -> PlaybackStatus {
        let now_playing = self.lock_current().as_ref().map(|track| NowPlaying {
            ordinal: track.item.ordinal,
            filename: track.item.filename.clone(),
            started_at: track.started_at,
        });

        PlaybackStatus {
            now_playing,
            active_source: self.arbiter.active_source(),
            muted: self.arbiter.is_muted(),
            listeners: self.bus.listener_count(),
            selection_order: self.cursor.order().as_str(),
            auto_remove: self.auto_remove,
            gate: self.arbiter.stats(),
        }
    }

    // ========================================================================
    // Loops
    // ========================================================================

    async fn silence_loop(self: Arc<Self>) {
        loop {
            let mut observer = SilenceObserver {
                arbiter: &self.arbiter,
            };
            match self
                .transcoder
                .run(&SourceDescriptor::Silence, &mut observer)
                .await
            {
                Ok(outcome) => warn!("Silence generator ended ({:?}), restarting", outcome),
                Err(e) => error!("Silence generator failed: {}", e),
            }
            tokio::time::sleep(self.backoff).await;
        }
    }

    async fn playback_loop(self: Arc<Self>) {
        info!("Playback loop started");
        loop {
            self.reset_to_silence();
            match self.play_next().await {
                Ok(Attempt::Played) => {}
                Ok(Attempt::Idle) => self.pause().await,
                Err(e) => {
                    error!("Playback attempt failed: {}", e);
                    self.pause().await;
                }
            }
        }
    }

    /// Sleep for the backoff period unless woken by skip or play
    ///
    /// A wake issued while the loop was busy is stored and ends the next
    /// pause at once.
    async fn pause(&self) {
        tokio::select! {
            _ = tokio::time::sleep(self.backoff) => {}
            _ = self.wake.notified() => debug!("Backoff interrupted"),
        }
    }

    /// Select and play a single track
    async fn play_next(&self) -> Result<Attempt> {
        let items = self.library.list_media().await?;
        if items.is_empty() {
            // Keep any pending override for when files show up
            debug!("Media directory {} is empty", self.library.dir().display());
            return Ok(Attempt::Idle);
        }

        let index = self.cursor.select_next(items.len());
        let Some(item) = items.get(index).cloned() else {
            warn!(
                "Selected index {} but the library has only {} items",
                index,
                items.len()
            );
            return Ok(Attempt::Idle);
        };

        info!("Now playing #{} {}", item.ordinal, item.filename);
        let feed = {
            let mut current = self.lock_current();
            let feed = self.arbiter.begin_file();
            *current = Some(CurrentTrack {
                item: item.clone(),
                started_at: time::now(),
                feed,
                handle: None,
                skip_requested: false,
            });
            feed
        };
        self.events.broadcast_lossy(RelayEvent::TrackStarted {
            ordinal: item.ordinal,
            filename: item.filename.clone(),
            timestamp: time::now(),
        });

        let mut observer = FileObserver { engine: self, feed };
        let result = self
            .transcoder
            .run(&SourceDescriptor::File(item.path.clone()), &mut observer)
            .await;

        // Silence must be live again before anything else can be selected
        self.end_feed(&feed);
        self.lock_current().take();

        let outcome = match &result {
            Ok(TranscodeOutcome::Completed) => TrackOutcome::Completed,
            Ok(TranscodeOutcome::Killed) => TrackOutcome::Skipped,
            Err(_) => TrackOutcome::Failed,
        };
        self.events.broadcast_lossy(RelayEvent::TrackEnded {
            filename: item.filename.clone(),
            outcome,
            timestamp: time::now(),
        });

        match result? {
            TranscodeOutcome::Completed => {
                info!("Finished {}", item.filename);
                if self.auto_remove {
                    self.remove_played(&item).await;
                }
            }
            TranscodeOutcome::Killed => info!("Stopped {}", item.filename),
        }
        Ok(Attempt::Played)
    }

    async fn remove_played(&self, item: &MediaItem) {
        match self.library.remove_item(item).await {
            Ok(()) => info!("Removed played file {}", item.filename),
            Err(e) => warn!("Failed to remove {}: {}", item.filename, e),
        }
    }

    fn reset_to_silence(&self) {
        if self.arbiter.set_active(Source::Silence) {
            self.announce_silence();
        }
    }

    /// Reset to silence only if `feed` is still the live attempt
    fn end_feed(&self, feed: &FileFeed) {
        if self.arbiter.end_file(feed) {
            self.announce_silence();
        }
    }

    fn announce_silence(&self) {
        debug!("Active source -> silence");
        self.announce_source(Source::Silence);
    }

    fn announce_source(&self, source: Source) {
        self.events.broadcast_lossy(RelayEvent::SourceChanged {
            source,
            timestamp: time::now(),
        });
    }
}

/// Feeds file transcoder output through the arbiter
struct FileObserver<'a> {
    engine: &'a PlaybackEngine,
    feed: FileFeed,
}

impl TranscodeObserver for FileObserver<'_> {
    fn on_started(&mut self, handle: TranscodeHandle) {
        let mut current = self.engine.lock_current();
        if let Some(track) = current.as_mut() {
            if track.skip_requested {
                handle.kill();
            }
            track.handle = Some(handle);
        }
    }

    fn on_chunk(&mut self, chunk: Bytes) {
        if self.engine.arbiter.feed_file(&self.feed, chunk).activated {
            debug!("Active source -> file");
            self.engine.announce_source(Source::File);
        }
    }

    fn on_stopping(&mut self) {
        self.engine.end_feed(&self.feed);
    }
}

struct SilenceObserver<'a> {
    arbiter: &'a SourceArbiter,
}

impl TranscodeObserver for SilenceObserver<'_> {
    fn on_chunk(&mut self, chunk: Bytes) {
        self.arbiter.tag(Source::Silence, chunk);
    }
}
