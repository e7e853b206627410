//! # fm-relay
//!
//! Unattended internet radio relay. Plays the files of one media directory
//! back to back, transcoding each to MP3 in real time, and fans the single
//! live stream out to every connected HTTP listener. A silence generator
//! fills the gaps so listeners never see the stream end.
//!
//! Control happens over a small JSON API (skip, mute, play by ordinal,
//! media listing) with lifecycle events on an SSE stream.

pub mod api;
pub mod cli;
pub mod error;
pub mod playback;
pub mod sse;

pub use error::{Error, Result};
