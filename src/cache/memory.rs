//! Process-local cache backend.
//!
//! Entries live in a moka cache with byte-weighted capacity and a sliding
//! (time-to-idle) expiration, so frequently served transforms stay resident
//! while cold ones age out. Contents are lost on restart.

use super::{ensure_live, CacheEntry, CacheResult, ImageCache};
use crate::cache::key::cache_file_name;
use crate::options::TransformOptions;
use async_trait::async_trait;
use bytes::Bytes;
use moka::future::Cache;
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Eviction policy parameters for [`MemoryCache`].
#[derive(Debug, Clone, Copy)]
pub struct MemoryCacheConfig {
    /// Upper bound on the total size of cached payload bytes.
    pub max_capacity_bytes: u64,
    /// Sliding expiration: entries not read for this long are evicted.
    pub time_to_idle: Duration,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity_bytes: 256 * 1024 * 1024,
            time_to_idle: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Clone)]
struct StoredImage {
    bytes: Bytes,
    last_modified: OffsetDateTime,
    options: TransformOptions,
}

pub struct MemoryCache {
    entries: Cache<String, StoredImage>,
}

impl MemoryCache {
    pub fn new(config: MemoryCacheConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_capacity_bytes)
            .time_to_idle(config.time_to_idle)
            .weigher(|_name: &String, stored: &StoredImage| {
                stored.bytes.len().min(u32::MAX as usize) as u32
            })
            .build();
        Self { entries }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(MemoryCacheConfig::default())
    }
}

#[async_trait]
impl ImageCache for MemoryCache {
    async fn add(&self, entry: &CacheEntry, cancel: &CancellationToken) -> CacheResult<()> {
        ensure_live(cancel)?;
        let name = cache_file_name(entry.options());
        let bytes = entry.content(cancel).await?;
        debug!(name = %name, len = bytes.len(), "storing entry in memory cache");
        self.entries
            .insert(
                name,
                StoredImage {
                    bytes,
                    last_modified: entry.last_modified(),
                    options: entry.options().clone(),
                },
            )
            .await;
        Ok(())
    }

    async fn get(
        &self,
        options: &TransformOptions,
        source_last_modified: OffsetDateTime,
        cancel: &CancellationToken,
    ) -> CacheResult<Option<CacheEntry>> {
        ensure_live(cancel)?;
        let name = cache_file_name(options);
        let Some(stored) = self.entries.get(&name).await else {
            return Ok(None);
        };
        if stored.last_modified < source_last_modified {
            debug!(name = %name, "memory cache entry is stale");
            return Ok(None);
        }
        Ok(Some(CacheEntry::from_bytes(
            stored.options,
            stored.last_modified,
            stored.bytes,
        )))
    }

    async fn remove(&self, options: &TransformOptions, cancel: &CancellationToken) -> CacheResult<()> {
        ensure_live(cancel)?;
        let name = cache_file_name(options);
        self.entries.invalidate(&name).await;
        Ok(())
    }
}
