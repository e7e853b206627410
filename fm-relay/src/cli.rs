//! Command-line arguments and settings resolution
//!
//! Flags and `FM_*` environment variables sit above the TOML file, which sits
//! above compiled defaults.

use crate::error::{Error, Result};
use clap::Parser;
use fm_common::config::{locate_config_file, Overrides, Settings, TomlConfig};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for fm-relay
#[derive(Parser, Debug, Default)]
#[command(name = "fm-relay")]
#[command(about = "Unattended internet radio relay")]
#[command(version)]
pub struct Args {
    /// TOML config file (default: <config dir>/fm-relay/config.toml)
    #[arg(short, long, env = "FM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "FM_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "FM_PORT")]
    pub port: Option<u16>,

    /// Directory holding the media files
    #[arg(short = 'd', long, env = "FM_AUDIO_DIR")]
    pub media_dir: Option<PathBuf>,

    /// Pick tracks at random (true) or in directory order (false)
    #[arg(long, env = "FM_RANDOM_ORDER")]
    pub random_order: Option<bool>,

    /// Delete each file after it played to the end
    #[arg(long, env = "FM_AUTO_REMOVE")]
    pub auto_remove: Option<bool>,

    /// Kill a file transcode that produces no output for this long
    #[arg(long, env = "FM_STALL_TIMEOUT_MS")]
    pub stall_timeout_ms: Option<u64>,

    /// Wait between failed playback attempts
    #[arg(long, env = "FM_BACKOFF_MS")]
    pub backoff_ms: Option<u64>,

    /// Transcoder executable
    #[arg(long, env = "FM_FFMPEG")]
    pub ffmpeg: Option<String>,

    /// Log filter, e.g. "info" or "fm_relay=debug"
    #[arg(long, env = "FM_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl Args {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host.clone(),
            port: self.port,
            media_dir: self.media_dir.clone(),
            random_order: self.random_order,
            auto_remove: self.auto_remove,
            stall_timeout_ms: self.stall_timeout_ms,
            backoff_ms: self.backoff_ms,
            transcoder_program: self.ffmpeg.clone(),
            log_level: self.log_level.clone(),
        }
    }

    /// Config file that will be read, if any
    pub fn config_file(&self) -> Result<Option<PathBuf>> {
        Ok(locate_config_file(self.config.as_deref())?)
    }

    /// Load `config_file` (if any) and merge these arguments on top
    pub fn resolve_settings(&self, config_file: Option<&Path>) -> Result<Settings> {
        let file = config_file.map(TomlConfig::load).transpose()?;
        let settings = Settings::resolve(file, self.overrides())?;

        EnvFilter::try_new(&settings.log_level).map_err(|e| {
            Error::Config(format!("Invalid log level '{}': {}", settings.log_level, e))
        })?;

        Ok(settings)
    }
}
