//! Relay events pushed to control clients

use crate::playback::arbiter::Source;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// How a track stopped playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackOutcome {
    Completed,
    Skipped,
    Failed,
}

/// Event data sent over `/api/events`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    /// A file transcode was started
    TrackStarted {
        ordinal: usize,
        filename: String,
        timestamp: DateTime<Utc>,
    },

    /// The file transcode ended, for whatever reason
    TrackEnded {
        filename: String,
        outcome: TrackOutcome,
        timestamp: DateTime<Utc>,
    },

    /// Active source switched between file and silence
    SourceChanged {
        source: Source,
        timestamp: DateTime<Utc>,
    },

    MuteChanged {
        muted: bool,
        timestamp: DateTime<Utc>,
    },
}

impl RelayEvent {
    /// SSE `event:` field for this event
    pub fn event_type(&self) -> &'static str {
        match self {
            RelayEvent::TrackStarted { .. } => "TrackStarted",
            RelayEvent::TrackEnded { .. } => "TrackEnded",
            RelayEvent::SourceChanged { .. } => "SourceChanged",
            RelayEvent::MuteChanged { .. } => "MuteChanged",
        }
    }
}
