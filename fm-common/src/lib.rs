//! # FM Common Library
//!
//! Shared code for the fm-relay radio service:
//! - Error types
//! - Configuration model and layered resolution
//! - Media directory service (listing, ordinal lookup, removal)
//! - Time utilities

pub mod config;
pub mod error;
pub mod media;
pub mod time;

pub use error::{Error, Result};
pub use media::{MediaItem, MediaLibrary};
