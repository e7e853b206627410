//! Configuration model and layered resolution
//!
//! Settings are resolved once at startup, highest priority first:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default
//!
//! Levels 1 and 2 arrive pre-merged as [`Overrides`] (clap handles both).
//! The resolved [`Settings`] are immutable for the lifetime of the process.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Name of the directory holding the config file under the platform config dir
const CONFIG_DIR_NAME: &str = "fm-relay";

/// Name of the TOML config file
const CONFIG_FILE_NAME: &str = "config.toml";

/// Token replaced by the source path in transcoder argument templates
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Order in which the library is walked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOrder {
    Sequential,
    Random,
}

impl SelectionOrder {
    pub fn from_random_flag(random: bool) -> Self {
        if random {
            SelectionOrder::Random
        } else {
            SelectionOrder::Sequential
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionOrder::Sequential => "sequential",
            SelectionOrder::Random => "random",
        }
    }
}

/// Bootstrap configuration loaded from a TOML file
///
/// Every field has a built-in default, so an empty file is valid.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Address the HTTP server binds to
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding the media library (relative paths resolve against cwd)
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,

    /// Pick tracks uniformly at random instead of walking the directory in order
    #[serde(default = "default_random_order")]
    pub random_order: bool,

    /// Delete a track from disk after it played through
    #[serde(default)]
    pub auto_remove: bool,

    /// Kill a file transcode that produces no output for this long
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,

    /// Pause before retrying after a failed attempt or an empty library
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Grace period between the first forced kill and the re-kill
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,

    /// Per-listener queue depth, in chunks, before a listener is dropped as too slow
    #[serde(default = "default_listener_buffer_chunks")]
    pub listener_buffer_chunks: usize,

    /// External transcoder command templates
    #[serde(default)]
    pub transcoder: TranscoderConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// External transcoder command templates
///
/// `{input}` inside `file_args` is replaced with the track path.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TranscoderConfig {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_file_args")]
    pub file_args: Vec<String>,

    #[serde(default = "default_silence_args")]
    pub silence_args: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7080
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("./media")
}

fn default_random_order() -> bool {
    true
}

fn default_stall_timeout_ms() -> u64 {
    3000
}

fn default_backoff_ms() -> u64 {
    2000
}

fn default_kill_grace_ms() -> u64 {
    1000
}

fn default_listener_buffer_chunks() -> usize {
    256
}

fn default_program() -> String {
    "ffmpeg".to_string()
}

fn default_file_args() -> Vec<String> {
    [
        "-nostdin", "-v", "quiet", "-re", "-i", INPUT_PLACEHOLDER, "-vn", "-map_metadata", "-1",
        "-ar", "44100", "-ac", "2", "-f", "mp3", "-c:a", "mp3", "pipe:1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_silence_args() -> Vec<String> {
    [
        "-nostdin", "-v", "quiet", "-re", "-f", "lavfi", "-i", "anullsrc=r=44100:cl=stereo",
        "-tune", "zerolatency", "-f", "mp3", "-c:a", "mp3", "pipe:1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            file_args: default_file_args(),
            silence_args: default_silence_args(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            media_dir: default_media_dir(),
            random_order: default_random_order(),
            auto_remove: false,
            stall_timeout_ms: default_stall_timeout_ms(),
            backoff_ms: default_backoff_ms(),
            kill_grace_ms: default_kill_grace_ms(),
            listener_buffer_chunks: default_listener_buffer_chunks(),
            transcoder: TranscoderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load and parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }
}

/// Values supplied on the command line or through the environment
///
/// `None` means "not given", letting the TOML file or the default win.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub media_dir: Option<PathBuf>,
    pub random_order: Option<bool>,
    pub auto_remove: Option<bool>,
    pub stall_timeout_ms: Option<u64>,
    pub backoff_ms: Option<u64>,
    pub transcoder_program: Option<String>,
    pub log_level: Option<String>,
}

/// Fully resolved, validated settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Absolute path of the media directory
    pub media_dir: PathBuf,
    pub selection_order: SelectionOrder,
    pub auto_remove: bool,
    pub stall_timeout: Duration,
    pub backoff: Duration,
    pub kill_grace: Duration,
    pub listener_buffer_chunks: usize,
    pub transcoder: TranscoderConfig,
    pub log_level: String,
}

impl Settings {
    /// Merge overrides onto the file config (or defaults) and validate
    pub fn resolve(file: Option<TomlConfig>, overrides: Overrides) -> Result<Self> {
        let file = file.unwrap_or_default();

        let mut transcoder = file.transcoder;
        if let Some(program) = overrides.transcoder_program {
            transcoder.program = program;
        }

        let media_dir = absolutize(overrides.media_dir.unwrap_or(file.media_dir))?;

        let settings = Self {
            host: overrides.host.unwrap_or(file.host),
            port: overrides.port.unwrap_or(file.port),
            media_dir,
            selection_order: SelectionOrder::from_random_flag(
                overrides.random_order.unwrap_or(file.random_order),
            ),
            auto_remove: overrides.auto_remove.unwrap_or(file.auto_remove),
            stall_timeout: crate::time::millis_to_duration(
                overrides.stall_timeout_ms.unwrap_or(file.stall_timeout_ms),
            ),
            backoff: crate::time::millis_to_duration(
                overrides.backoff_ms.unwrap_or(file.backoff_ms),
            ),
            kill_grace: crate::time::millis_to_duration(file.kill_grace_ms),
            listener_buffer_chunks: file.listener_buffer_chunks,
            transcoder,
            log_level: overrides.log_level.unwrap_or(file.logging.level),
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.stall_timeout.is_zero() {
            return Err(Error::Config("stall_timeout_ms must be greater than 0".to_string()));
        }
        if self.backoff.is_zero() {
            return Err(Error::Config("backoff_ms must be greater than 0".to_string()));
        }
        if self.kill_grace.is_zero() {
            return Err(Error::Config("kill_grace_ms must be greater than 0".to_string()));
        }
        if self.listener_buffer_chunks == 0 {
            return Err(Error::Config(
                "listener_buffer_chunks must be greater than 0".to_string(),
            ));
        }
        if self.transcoder.program.trim().is_empty() {
            return Err(Error::Config("transcoder.program must not be empty".to_string()));
        }
        if !self
            .transcoder
            .file_args
            .iter()
            .any(|arg| arg.contains(INPUT_PLACEHOLDER))
        {
            return Err(Error::Config(format!(
                "transcoder.file_args must contain the {} placeholder",
                INPUT_PLACEHOLDER
            )));
        }
        Ok(())
    }

    /// Create the media directory if it does not exist yet
    pub fn ensure_media_dir(&self) -> Result<()> {
        if !self.media_dir.exists() {
            info!("Creating media directory: {}", self.media_dir.display());
        }
        std::fs::create_dir_all(&self.media_dir)?;
        Ok(())
    }

    /// `host:port` string for binding the HTTP server
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Pick the config file to read
///
/// An explicitly named file must exist. Otherwise the platform location
/// (e.g. `~/.config/fm-relay/config.toml`) is used when present.
pub fn locate_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }

    let candidate = dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
    match candidate {
        Some(path) if path.exists() => Ok(Some(path)),
        Some(path) => {
            debug!("No config file at {}, using defaults", path.display());
            Ok(None)
        }
        None => Ok(None),
    }
}

fn absolutize(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
