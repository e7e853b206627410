//! Source arbiter: decides which tagged bytes reach the listeners
//!
//! Two producers run side by side, the file transcoder and the silence
//! generator. Every chunk is tagged with its [`Source`]; a chunk passes only
//! if its tag equals the effective source (`Silence` while muted, otherwise
//! the active source). Everything else is dropped, never queued.
//!
//! File playback is tracked per attempt with a [`FileFeed`]. The first chunk
//! fed through the current feed switches the active source to `File`. A reset
//! to `Silence` retires the feed, so stray chunks from a transcoder that is
//! being torn down are discarded and cannot switch the source back.

use crate::playback::bus::BroadcastBus;
use bytes::Bytes;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Origin of a chunk of audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    File,
    Silence,
}

/// Token for one file playback attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFeed {
    epoch: u64,
}

/// Result of feeding one file chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedResult {
    /// This chunk switched the active source to `File`
    pub activated: bool,
    /// The chunk was handed to the bus
    pub delivered: bool,
}

/// Gate counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub delivered_chunks: u64,
    pub discarded_chunks: u64,
}

#[derive(Debug)]
struct GateState {
    active: Source,
    muted: bool,
    /// Bumped on every reset to silence; feeds from older epochs are stale
    epoch: u64,
}

impl GateState {
    fn passes(&self, source: Source) -> bool {
        let effective = if self.muted { Source::Silence } else { self.active };
        source == effective
    }
}

/// Gatekeeper between the two producers and the broadcast bus
pub struct SourceArbiter {
    state: Mutex<GateState>,
    bus: Arc<BroadcastBus>,
    delivered: AtomicU64,
    discarded: AtomicU64,
}

impl SourceArbiter {
    pub fn new(bus: Arc<BroadcastBus>) -> Self {
        Self {
            state: Mutex::new(GateState {
                active: Source::Silence,
                muted: false,
                epoch: 0,
            }),
            bus,
            delivered: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Gate a chunk against the current state; caller holds the lock
    ///
    /// Publishing under the lock keeps the decision and the fan-out atomic
    /// with respect to source switches.
    fn gate(&self, state: &GateState, source: Source, chunk: Bytes) -> bool {
        if state.passes(source) {
            self.bus.publish(chunk);
            self.delivered.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Offer a tagged chunk; returns whether it was delivered
    pub fn tag(&self, source: Source, chunk: Bytes) -> bool {
        let state = self.lock();
        self.gate(&state, source, chunk)
    }

    /// Set the active source; returns true if it changed
    ///
    /// Switching to `Silence` (even when already silent) retires the current
    /// file feed.
    pub fn set_active(&self, source: Source) -> bool {
        let mut state = self.lock();
        let changed = state.active != source;
        state.active = source;
        if source == Source::Silence {
            state.epoch += 1;
        }
        changed
    }

    /// Start a new file playback attempt
    ///
    /// The source stays `Silence` until the first chunk arrives.
    pub fn begin_file(&self) -> FileFeed {
        let mut state = self.lock();
        state.active = Source::Silence;
        state.epoch += 1;
        FileFeed { epoch: state.epoch }
    }

    /// End `feed`'s attempt; returns true if the source changed
    ///
    /// No-op when a newer attempt (or a reset) has already superseded `feed`,
    /// so a late stop for one track cannot silence the next.
    pub fn end_file(&self, feed: &FileFeed) -> bool {
        let mut state = self.lock();
        if feed.epoch != state.epoch {
            return false;
        }
        let changed = state.active != Source::Silence;
        state.active = Source::Silence;
        state.epoch += 1;
        changed
    }

    /// Feed a chunk produced by the file transcoder of `feed`'s attempt
    pub fn feed_file(&self, feed: &FileFeed, chunk: Bytes) -> FeedResult {
        let mut state = self.lock();
        if feed.epoch != state.epoch {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return FeedResult {
                activated: false,
                delivered: false,
            };
        }
        let activated = state.active != Source::File;
        state.active = Source::File;
        let delivered = self.gate(&state, Source::File, chunk);
        FeedResult {
            activated,
            delivered,
        }
    }

    pub fn set_muted(&self, muted: bool) {
        self.lock().muted = muted;
    }

    /// Flip the mute flag and return the new value
    pub fn toggle_mute(&self) -> bool {
        let mut state = self.lock();
        state.muted = !state.muted;
        state.muted
    }

    pub fn is_muted(&self) -> bool {
        self.lock().muted
    }

    pub fn active_source(&self) -> Source {
        self.lock().active
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            delivered_chunks: self.delivered.load(Ordering::Relaxed),
            discarded_chunks: self.discarded.load(Ordering::Relaxed),
        }
    }
}
