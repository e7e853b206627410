//! Media directory service
//!
//! The library is simply the set of regular files in one directory. Nothing
//! is cached: every call re-reads the directory, so ordinals reflect the
//! listing at the moment of the call and shift when files come and go.

use crate::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One playable file from a directory listing snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaItem {
    /// File name as stored on disk
    pub filename: String,
    /// Absolute path to the file
    pub path: PathBuf,
    /// 1-based position in the listing this item came from
    pub ordinal: usize,
}

/// Lookup service over the media directory
#[derive(Debug, Clone)]
pub struct MediaLibrary {
    dir: PathBuf,
}

impl MediaLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List the library in directory read order
    pub async fn list_media(&self) -> Result<Vec<MediaItem>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut items = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            items.push(MediaItem {
                filename,
                path: entry.path(),
                ordinal: items.len() + 1,
            });
        }

        debug!("Listed {} media items in {}", items.len(), self.dir.display());
        Ok(items)
    }

    /// File names only, in listing order
    pub async fn names(&self) -> Result<Vec<String>> {
        Ok(self
            .list_media()
            .await?
            .into_iter()
            .map(|item| item.filename)
            .collect())
    }

    /// Look up an item by its 1-based ordinal
    pub async fn resolve_by_ordinal(&self, ordinal: usize) -> Result<MediaItem> {
        let items = self.list_media().await?;
        if ordinal < 1 || ordinal > items.len() {
            return Err(Error::NotFound(format!(
                "No media item #{} (library has {} items)",
                ordinal,
                items.len()
            )));
        }
        Ok(items[ordinal - 1].clone())
    }

    /// Delete the file at `ordinal` and return what was removed
    pub async fn remove(&self, ordinal: usize) -> Result<MediaItem> {
        let item = self.resolve_by_ordinal(ordinal).await?;
        tokio::fs::remove_file(&item.path).await?;
        info!("Removed media file: {}", item.filename);
        Ok(item)
    }

    /// Delete a file previously returned by a listing
    pub async fn remove_item(&self, item: &MediaItem) -> Result<()> {
        tokio::fs::remove_file(&item.path).await?;
        info!("Removed media file: {}", item.filename);
        Ok(())
    }
}

/// Parse a positive 1-based ordinal
///
/// Anything that is not a positive integer is treated as a missing item,
/// matching the "no such track" answer an operator gets for `#0` or `#99`.
pub fn parse_ordinal(text: &str) -> Result<usize> {
    match text.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(Error::NotFound(format!("Invalid media ordinal: {:?}", text))),
    }
}
