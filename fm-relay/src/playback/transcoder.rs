//! Transcoder supervisor
//!
//! Runs one external transcoder process per playback attempt and streams its
//! stdout in chunks to a [`TranscodeObserver`]. File sources are watched for
//! stalls: if a read produces nothing within the stall window the process is
//! killed and the attempt fails. Silence sources run until killed.
//!
//! Teardown is best effort: kill, wait for the grace period, kill again, wait
//! again, then give up and let the OS reap the process.

use crate::error::{Error, Result};
use bytes::Bytes;
use fm_common::config::{TranscoderConfig, INPUT_PLACEHOLDER};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Bytes requested per stdout read
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// What the transcoder should produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// Transcode a media file in real time
    File(PathBuf),
    /// Generate an endless silent stream
    Silence,
}

impl SourceDescriptor {
    fn label(&self) -> String {
        match self {
            SourceDescriptor::File(path) => path.display().to_string(),
            SourceDescriptor::Silence => "silence".to_string(),
        }
    }
}

/// How a transcode that did not fail came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeOutcome {
    /// Output ended and the process exited cleanly
    Completed,
    /// Stopped through its [`TranscodeHandle`]
    Killed,
}

/// Control handle for a running transcode
///
/// Cloneable; `kill` is idempotent and safe to call after the process is gone.
#[derive(Debug, Clone)]
pub struct TranscodeHandle {
    kill_tx: Arc<watch::Sender<bool>>,
    pid: Option<u32>,
}

impl TranscodeHandle {
    /// Ask the supervisor to tear the process down
    pub fn kill(&self) {
        self.kill_tx.send_replace(true);
    }

    pub fn is_killed(&self) -> bool {
        *self.kill_tx.borrow()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// Receives lifecycle callbacks from a running transcode
pub trait TranscodeObserver: Send {
    /// Process spawned; the handle can stop it
    fn on_started(&mut self, _handle: TranscodeHandle) {}

    /// One non-empty chunk of stdout, in order
    fn on_chunk(&mut self, chunk: Bytes);

    /// Called before a kill or stall teardown, ahead of the process exiting
    fn on_stopping(&mut self) {}
}

/// Why the read loop stopped
enum Ending {
    Eof,
    Killed,
    Stalled(Duration),
    ReadFailed(std::io::Error),
}

enum ReadEvent {
    Data(usize),
    Ended(Ending),
}

/// Spawns and supervises transcoder processes
#[derive(Debug, Clone)]
pub struct Transcoder {
    config: TranscoderConfig,
    stall_timeout: Duration,
    kill_grace: Duration,
}

impl Transcoder {
    pub fn new(config: TranscoderConfig, stall_timeout: Duration, kill_grace: Duration) -> Self {
        Self {
            config,
            stall_timeout,
            kill_grace,
        }
    }

    pub fn program(&self) -> &str {
        &self.config.program
    }

    /// Command-line arguments for `source`, placeholder substituted
    pub fn args_for(&self, source: &SourceDescriptor) -> Vec<String> {
        match source {
            SourceDescriptor::File(path) => {
                let input = path.to_string_lossy();
                self.config
                    .file_args
                    .iter()
                    .map(|arg| arg.replace(INPUT_PLACEHOLDER, &input))
                    .collect()
            }
            SourceDescriptor::Silence => self.config.silence_args.clone(),
        }
    }

    /// Run one transcode to completion, kill, or failure
    ///
    /// Returns `Ok(Completed)` only when stdout reached EOF and the process
    /// exited with success. A kill through the handle yields `Ok(Killed)`
    /// whatever the exit status.
    pub async fn run<O: TranscodeObserver>(
        &self,
        source: &SourceDescriptor,
        observer: &mut O,
    ) -> Result<TranscodeOutcome> {
        let args = self.args_for(source);
        debug!("Spawning {} {:?}", self.config.program, args);

        let mut child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        let mut stdout = child.stdout.take().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "transcoder stdout was not captured",
            ))
        })?;

        let (kill_tx, kill_rx) = watch::channel(false);
        let handle = TranscodeHandle {
            kill_tx: Arc::new(kill_tx),
            pid: child.id(),
        };
        info!(
            "Transcoder started for {} (pid {:?})",
            source.label(),
            handle.pid()
        );
        observer.on_started(handle.clone());

        let stall = match source {
            SourceDescriptor::File(_) => Some(self.stall_timeout),
            SourceDescriptor::Silence => None,
        };

        let ending = self.pump(&mut stdout, kill_rx, stall, observer).await;
        drop(stdout);

        match ending {
            Ending::Eof => self.finish(&mut child, &handle, source).await,
            Ending::Killed => {
                debug!("Kill requested for {}", source.label());
                observer.on_stopping();
                self.force_kill(&mut child).await;
                Ok(TranscodeOutcome::Killed)
            }
            Ending::Stalled(window) => {
                warn!(
                    "No output from transcoder for {:?}, killing {}",
                    window,
                    source.label()
                );
                observer.on_stopping();
                self.force_kill(&mut child).await;
                Err(Error::StallTimeout { timeout: window })
            }
            Ending::ReadFailed(e) => {
                observer.on_stopping();
                self.force_kill(&mut child).await;
                Err(Error::Io(e))
            }
        }
    }

    /// Copy stdout to the observer until EOF, kill, stall, or read error
    async fn pump<O: TranscodeObserver>(
        &self,
        stdout: &mut ChildStdout,
        mut kill_rx: watch::Receiver<bool>,
        stall: Option<Duration>,
        observer: &mut O,
    ) -> Ending {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];

        loop {
            let event = tokio::select! {
                biased;

                _ = kill_requested(&mut kill_rx) => ReadEvent::Ended(Ending::Killed),

                read = read_with_deadline(stdout, &mut buf, stall) => match read {
                    Ok(Ok(0)) => ReadEvent::Ended(Ending::Eof),
                    Ok(Ok(n)) => ReadEvent::Data(n),
                    Ok(Err(e)) => ReadEvent::Ended(Ending::ReadFailed(e)),
                    Err(window) => ReadEvent::Ended(Ending::Stalled(window)),
                },
            };

            match event {
                ReadEvent::Data(n) => observer.on_chunk(Bytes::copy_from_slice(&buf[..n])),
                ReadEvent::Ended(ending) => return ending,
            }
        }
    }

    /// Reap a process whose stdout reached EOF
    async fn finish(
        &self,
        child: &mut Child,
        handle: &TranscodeHandle,
        source: &SourceDescriptor,
    ) -> Result<TranscodeOutcome> {
        let status = match timeout(self.kill_grace, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                // Output is complete; only the exit is missing
                warn!(
                    "Transcoder for {} closed its output but did not exit",
                    source.label()
                );
                self.force_kill(child).await;
                return Ok(TranscodeOutcome::Completed);
            }
        };

        if handle.is_killed() {
            return Ok(TranscodeOutcome::Killed);
        }
        if status.success() {
            info!("Transcode finished for {}", source.label());
            Ok(TranscodeOutcome::Completed)
        } else {
            Err(Error::TranscoderExit { status })
        }
    }

    async fn force_kill(&self, child: &mut Child) {
        let pid = child.id();
        for attempt in 1..=2 {
            if let Err(e) = child.start_kill() {
                debug!("Kill attempt {} on {:?}: {}", attempt, pid, e);
            }
            match timeout(self.kill_grace, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!("Transcoder {:?} exited with {}", pid, status);
                    return;
                }
                Ok(Err(e)) => {
                    warn!("Failed to reap transcoder {:?}: {}", pid, e);
                    return;
                }
                Err(_) => warn!(
                    "Transcoder {:?} still running {:?} after kill attempt {}",
                    pid, self.kill_grace, attempt
                ),
            }
        }
        error!("Giving up on transcoder {:?}, it ignored repeated kills", pid);
    }
}

/// Resolves once the kill flag is set; never if every handle is gone
async fn kill_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// One read, bounded by the stall window when there is one
async fn read_with_deadline(
    stdout: &mut ChildStdout,
    buf: &mut [u8],
    stall: Option<Duration>,
) -> std::result::Result<std::io::Result<usize>, Duration> {
    match stall {
        Some(window) => timeout(window, stdout.read(buf)).await.map_err(|_| window),
        None => Ok(stdout.read(buf).await),
    }
}
