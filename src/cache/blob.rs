//! Blob-store cache backend.
//!
//! One implementation covers every remote object store through the
//! [`ObjectStore`] capability trait. `get` probes existence and freshness
//! metadata only; the byte payload is downloaded lazily the first time the
//! returned entry's content is actually read.

use super::{CacheEntry, CacheError, CacheResult, ContentAccessor, ImageCache};
use crate::cache::key::{cache_file_name, fan_out_relative_path};
use crate::options::TransformOptions;
use crate::store::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct BlobCache<S> {
    store: Arc<S>,
}

impl<S: ObjectStore + 'static> BlobCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn from_shared(store: Arc<S>) -> Self {
        Self { store }
    }

    fn object_name(options: &TransformOptions) -> String {
        fan_out_relative_path(&cache_file_name(options))
    }
}

struct BlobContent<S> {
    store: Arc<S>,
    name: String,
}

#[async_trait]
impl<S: ObjectStore> ContentAccessor for BlobContent<S> {
    async fn read(&self, cancel: &CancellationToken) -> CacheResult<Bytes> {
        match self.store.get(&self.name, cancel).await? {
            Some(bytes) => Ok(bytes),
            // Existed at probe time, gone at read time.
            None => Err(CacheError::Missing(self.name.clone())),
        }
    }
}

#[async_trait]
impl<S: ObjectStore + 'static> ImageCache for BlobCache<S> {
    async fn add(&self, entry: &CacheEntry, cancel: &CancellationToken) -> CacheResult<()> {
        let name = Self::object_name(entry.options());
        let bytes = entry.content(cancel).await?;
        debug!(name = %name, len = bytes.len(), "storing entry in blob store");
        self.store
            .put(&name, bytes, entry.options().format.media_type(), cancel)
            .await?;
        Ok(())
    }

    async fn get(
        &self,
        options: &TransformOptions,
        source_last_modified: OffsetDateTime,
        cancel: &CancellationToken,
    ) -> CacheResult<Option<CacheEntry>> {
        let name = Self::object_name(options);
        let Some(meta) = self.store.head(&name, cancel).await? else {
            return Ok(None);
        };
        if meta.last_modified < source_last_modified {
            debug!(name = %name, "blob cache entry is stale");
            return Ok(None);
        }

        Ok(Some(CacheEntry::deferred(
            options.clone(),
            meta.last_modified,
            meta.length,
            Arc::new(BlobContent {
                store: Arc::clone(&self.store),
                name,
            }),
        )))
    }

    async fn remove(&self, options: &TransformOptions, cancel: &CancellationToken) -> CacheResult<()> {
        let name = Self::object_name(options);
        self.store.delete(&name, cancel).await?;
        Ok(())
    }
}
