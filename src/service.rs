//! Cache-aside orchestration.
//!
//! [`ImageService`] ties the pieces together: allow-list check, canonical
//! key, freshness-aware cache lookup, and on a miss the resolve → resize →
//! store sequence. Concurrent misses for the same key are coalesced through
//! a per-key in-flight lock; followers re-check the cache once the leader
//! finishes and usually return its freshly written entry.

use crate::cache::key::cache_key;
use crate::cache::{CacheEntry, ImageCache};
use crate::mapping::{validate_mapping, MappingEnforcement, MappingSet};
use crate::options::TransformOptions;
use crate::resize::ImageResizer;
use crate::source::ContentResolver;
use crate::{DynamicImageError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type FlightLock = Arc<Mutex<()>>;

pub struct ImageService<C> {
    cache: C,
    resolver: Arc<dyn ContentResolver>,
    resizer: Arc<dyn ImageResizer>,
    mappings: MappingSet,
    enforcement: MappingEnforcement,
    in_flight: Mutex<HashMap<String, FlightLock>>,
}

impl<C: ImageCache> ImageService<C> {
    pub fn new(cache: C, resolver: Arc<dyn ContentResolver>, resizer: Arc<dyn ImageResizer>) -> Self {
        Self {
            cache,
            resolver,
            resizer,
            mappings: MappingSet::new(),
            enforcement: MappingEnforcement::Disabled,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_mappings(mut self, mappings: MappingSet, enforcement: MappingEnforcement) -> Self {
        self.mappings = mappings;
        self.enforcement = enforcement;
        self
    }

    /// Serve the transformed image for `options`, generating and caching it
    /// on a miss.
    ///
    /// Returns `Ok(None)` when the source asset does not exist or the
    /// options fail an enforced allow-list, so callers can answer not-found
    /// without leaking which of the two happened.
    pub async fn get_image(
        &self,
        options: &TransformOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<CacheEntry>> {
        ensure_live(cancel)?;

        if !validate_mapping(options, &self.mappings, self.enforcement) {
            warn!(%options, "rejected by mapping allow-list");
            return Ok(None);
        }

        let key = cache_key(options);

        let Some(source_last_modified) = self
            .resolver
            .last_modified(&options.source_path, cancel)
            .await
            .map_err(|source| DynamicImageError::Transformation {
                options: options.clone(),
                source,
            })?
        else {
            debug!(source = %options.source_path, "source asset not found");
            return Ok(None);
        };

        ensure_live(cancel)?;
        if let Some(entry) = self
            .cache
            .get(options, source_last_modified, cancel)
            .await
            .map_err(|source| DynamicImageError::Cache {
                key: key.clone(),
                source,
            })?
        {
            debug!(key = %key, "cache hit");
            return Ok(Some(entry));
        }
        debug!(key = %key, "cache miss");

        // Single-flight: one generation per key at a time; followers queue
        // on the lock and re-check the cache once the leader has written.
        let lock = self.flight_lock(&key).await;
        let result = {
            let _guard = lock.lock().await;
            self.generate(options, &key, source_last_modified, cancel).await
        };
        self.release_flight(&key, &lock).await;
        result
    }

    async fn generate(
        &self,
        options: &TransformOptions,
        key: &str,
        source_last_modified: OffsetDateTime,
        cancel: &CancellationToken,
    ) -> Result<Option<CacheEntry>> {
        ensure_live(cancel)?;

        // A leader may have written the entry while this request queued.
        if let Some(entry) = self
            .cache
            .get(options, source_last_modified, cancel)
            .await
            .map_err(|source| DynamicImageError::Cache {
                key: key.to_string(),
                source,
            })?
        {
            debug!(key = %key, "coalesced onto concurrent generation");
            return Ok(Some(entry));
        }

        ensure_live(cancel)?;
        let Some(source) = self
            .resolver
            .resolve(&options.source_path, cancel)
            .await
            .map_err(|source| DynamicImageError::Transformation {
                options: options.clone(),
                source,
            })?
        else {
            // Source vanished between the freshness probe and the fetch.
            debug!(source = %options.source_path, "source asset disappeared");
            return Ok(None);
        };

        ensure_live(cancel)?;
        let transformed = self
            .resizer
            .resize(&source.bytes, options, cancel)
            .await
            .map_err(|source| DynamicImageError::Transformation {
                options: options.clone(),
                source,
            })?;

        let entry = CacheEntry::from_bytes(options.clone(), OffsetDateTime::now_utc(), transformed);

        ensure_live(cancel)?;
        self.cache
            .add(&entry, cancel)
            .await
            .map_err(|source| DynamicImageError::Cache {
                key: key.to_string(),
                source,
            })?;

        info!(key = %key, len = entry.length(), "generated and cached transformed image");
        Ok(Some(entry))
    }

    /// Evict the cached entry for `options`, e.g. after the source asset was
    /// replaced.
    pub async fn invalidate(
        &self,
        options: &TransformOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_live(cancel)?;
        let key = cache_key(options);
        self.cache
            .remove(options, cancel)
            .await
            .map_err(|source| DynamicImageError::Cache { key, source })
    }

    async fn flight_lock(&self, key: &str) -> FlightLock {
        let mut flights = self.in_flight.lock().await;
        Arc::clone(flights.entry(key.to_string()).or_default())
    }

    async fn release_flight(&self, key: &str, lock: &FlightLock) {
        let mut flights = self.in_flight.lock().await;
        if let Some(current) = flights.get(key) {
            // Drop the map entry once no other request still holds it.
            if Arc::ptr_eq(current, lock) && Arc::strong_count(current) <= 2 {
                flights.remove(key);
            }
        }
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(DynamicImageError::Cancelled)
    } else {
        Ok(())
    }
}
