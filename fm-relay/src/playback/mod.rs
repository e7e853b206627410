//! Playback: transcoding, source arbitration and listener fan-out

pub mod arbiter;
pub mod bus;
pub mod cursor;
pub mod engine;
pub mod transcoder;

pub use arbiter::{Source, SourceArbiter};
pub use bus::{BroadcastBus, Subscription};
pub use cursor::LibraryCursor;
pub use engine::{PlaybackEngine, PlaybackStatus};
pub use transcoder::{SourceDescriptor, TranscodeOutcome, Transcoder};
