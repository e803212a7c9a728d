//! Cache backend contract and entry model.
//!
//! All backends share one identity rule: the canonical cache key derived
//! from [`TransformOptions`] (see [`key`]) plus the target extension is the
//! sole name of an entry. Freshness is enforced on read, not write: `get`
//! reports a physically present but stale entry as absent and leaves it for
//! the next `add` to overwrite.

pub mod blob;
pub mod disk;
pub mod key;
pub mod memory;

pub use blob::BlobCache;
pub use disk::DiskCache;
pub use memory::{MemoryCache, MemoryCacheConfig};

use crate::options::TransformOptions;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

/// Backend-local failures. The orchestrator wraps these into the crate-level
/// cache failure so callers can distinguish them from transformation errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache i/o failure")]
    Io(#[from] std::io::Error),
    #[error("object store failure")]
    Store(#[from] crate::store::StoreError),
    #[error("cache entry vanished before its content was read: {0}")]
    Missing(String),
    #[error("operation cancelled")]
    Cancelled,
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

pub(crate) fn ensure_live(cancel: &CancellationToken) -> CacheResult<()> {
    if cancel.is_cancelled() {
        Err(CacheError::Cancelled)
    } else {
        Ok(())
    }
}

/// Deferred byte payload of a cache entry.
///
/// Disk and blob backends answer `get` from metadata alone; the payload is
/// fetched through this accessor only when actually read.
#[async_trait]
pub trait ContentAccessor: Send + Sync {
    async fn read(&self, cancel: &CancellationToken) -> CacheResult<Bytes>;
}

#[derive(Clone)]
enum EntryContent {
    Loaded(Bytes),
    Deferred(Arc<dyn ContentAccessor>),
}

/// One cached transformed image.
///
/// Entries are immutable; a later `add` for the same key fully replaces the
/// stored copy rather than mutating it.
#[derive(Clone)]
pub struct CacheEntry {
    options: TransformOptions,
    last_modified: OffsetDateTime,
    length: u64,
    content: EntryContent,
}

impl CacheEntry {
    /// Entry with its payload already in memory (freshly generated, or read
    /// from a memory backend).
    pub fn from_bytes(options: TransformOptions, last_modified: OffsetDateTime, bytes: Bytes) -> Self {
        Self {
            options,
            last_modified,
            length: bytes.len() as u64,
            content: EntryContent::Loaded(bytes),
        }
    }

    /// Entry whose payload is fetched lazily through `accessor`.
    pub fn deferred(
        options: TransformOptions,
        last_modified: OffsetDateTime,
        length: u64,
        accessor: Arc<dyn ContentAccessor>,
    ) -> Self {
        Self {
            options,
            last_modified,
            length,
            content: EntryContent::Deferred(accessor),
        }
    }

    pub fn options(&self) -> &TransformOptions {
        &self.options
    }

    pub fn last_modified(&self) -> OffsetDateTime {
        self.last_modified
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// The payload bytes, fetching them if the entry is deferred.
    pub async fn content(&self, cancel: &CancellationToken) -> CacheResult<Bytes> {
        ensure_live(cancel)?;
        match &self.content {
            EntryContent::Loaded(bytes) => Ok(bytes.clone()),
            EntryContent::Deferred(accessor) => accessor.read(cancel).await,
        }
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("options", &self.options)
            .field("last_modified", &self.last_modified)
            .field("length", &self.length)
            .field(
                "content",
                &match self.content {
                    EntryContent::Loaded(_) => "loaded",
                    EntryContent::Deferred(_) => "deferred",
                },
            )
            .finish()
    }
}

/// Shared contract of the three cache backends.
///
/// Implementations must be safe for concurrent use without external locking;
/// every write is a full atomic replacement of one key, so concurrent
/// identical writes are safe (last one wins).
#[async_trait]
pub trait ImageCache: Send + Sync {
    /// Store `entry` under its canonical name, unconditionally overwriting
    /// any prior entry at that key.
    async fn add(&self, entry: &CacheEntry, cancel: &CancellationToken) -> CacheResult<()>;

    /// Look up an entry for `options`. Returns `Some` only if an entry
    /// physically exists and its stored timestamp is at least
    /// `source_last_modified`. Stale entries are reported absent but are
    /// not deleted.
    async fn get(
        &self,
        options: &TransformOptions,
        source_last_modified: OffsetDateTime,
        cancel: &CancellationToken,
    ) -> CacheResult<Option<CacheEntry>>;

    /// Delete the entry for `options`; no-op when absent.
    async fn remove(&self, options: &TransformOptions, cancel: &CancellationToken) -> CacheResult<()>;
}
