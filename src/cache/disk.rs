//! Disk cache backend.
//!
//! Bytes live under a configured cache root, with the stored name mapped
//! through the fan-out function so one flat directory never accumulates
//! every entry. Freshness is the file's last-write time. Writes go to a
//! temp file in the destination directory and are renamed into place, so a
//! write either completes fully or leaves nothing visible.

use super::{ensure_live, CacheEntry, CacheError, CacheResult, ContentAccessor, ImageCache};
use crate::cache::key::{cache_file_name, fan_out_relative_path};
use crate::options::TransformOptions;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::debug;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, options: &TransformOptions) -> PathBuf {
        self.root.join(fan_out_relative_path(&cache_file_name(options)))
    }
}

struct FileContent {
    path: PathBuf,
}

#[async_trait]
impl ContentAccessor for FileContent {
    async fn read(&self, cancel: &CancellationToken) -> CacheResult<Bytes> {
        ensure_live(cancel)?;
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CacheError::Missing(self.path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ImageCache for DiskCache {
    async fn add(&self, entry: &CacheEntry, cancel: &CancellationToken) -> CacheResult<()> {
        ensure_live(cancel)?;
        let path = self.path_for(entry.options());
        let bytes = entry.content(cancel).await?;

        ensure_live(cancel)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Concurrent writers for the same key each get a distinct temp file;
        // rename makes whichever finishes last the visible copy.
        let tmp = temp_sibling(&path);
        ensure_live(cancel)?;
        fs::write(&tmp, &bytes).await?;
        ensure_live(cancel)?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(path = %path.display(), len = bytes.len(), "stored entry on disk");
        Ok(())
    }

    async fn get(
        &self,
        options: &TransformOptions,
        source_last_modified: OffsetDateTime,
        cancel: &CancellationToken,
    ) -> CacheResult<Option<CacheEntry>> {
        ensure_live(cancel)?;
        let path = self.path_for(options);
        let meta = match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let last_modified = OffsetDateTime::from(meta.modified()?);
        if last_modified < source_last_modified {
            debug!(path = %path.display(), "disk cache entry is stale");
            return Ok(None);
        }

        Ok(Some(CacheEntry::deferred(
            options.clone(),
            last_modified,
            meta.len(),
            Arc::new(FileContent { path }),
        )))
    }

    async fn remove(&self, options: &TransformOptions, cancel: &CancellationToken) -> CacheResult<()> {
        ensure_live(cancel)?;
        let path = self.path_for(options);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let serial = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        serial
    ))
}
