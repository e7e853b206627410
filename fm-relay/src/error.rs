//! Error types for fm-relay
//!
//! Per-attempt errors (spawn, stall, bad exit) never escape the playback
//! loop; they are logged and followed by a backoff. Resolution errors are
//! returned to whoever asked for the lookup.

use std::time::Duration;
use thiserror::Error;

/// Main error type for fm-relay
#[derive(Error, Debug)]
pub enum Error {
    /// Transcoder subprocess could not be started
    #[error("Failed to spawn transcoder '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// File transcode produced no output within the stall window
    #[error("Transcoder stalled: no output for {timeout:?}")]
    StallTimeout { timeout: Duration },

    /// Transcoder exited unsuccessfully without being killed
    #[error("Transcoder exited with {status}")]
    TranscoderExit { status: std::process::ExitStatus },

    /// Requested ordinal or index does not exist
    #[error("Not found: {0}")]
    Resolution(String),

    /// Shared library errors (media directory, configuration)
    #[error(transparent)]
    Common(#[from] fm_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid startup configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),
}

/// Convenience Result type using fm-relay Error
pub type Result<T> = std::result::Result<T, Error>;
