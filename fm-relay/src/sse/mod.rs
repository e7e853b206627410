//! Server-Sent Events for control clients

pub mod broadcaster;
pub mod events;

pub use broadcaster::SseBroadcaster;
pub use events::{RelayEvent, TrackOutcome};
