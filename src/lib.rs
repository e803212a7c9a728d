//! On-demand image transformation with self-describing virtual paths and
//! pluggable result caching.
//!
//! The crate has three layers:
//!
//! - [`url`] encodes a [`TransformOptions`] into a virtual path like
//!   `/dynamicimage/50/50/crop/png/images/logo.jpg` and decodes it back,
//!   including `@Nx` pixel-density handling.
//! - [`cache`] defines the backend contract plus the in-memory, disk, and
//!   blob-store implementations, all keyed by one canonical cache key and
//!   invalidated by source freshness.
//! - [`service`] runs the cache-aside flow: check the cache, on a miss
//!   resolve the original, invoke the resize operation, store and return
//!   the result.
//!
//! Pixel work and HTTP routing stay outside; they plug in through the
//! [`resize::ImageResizer`] and [`source::ContentResolver`] traits.

pub mod cache;
pub mod config;
pub mod mapping;
pub mod options;
pub mod resize;
pub mod service;
pub mod source;
pub mod store;
pub mod url;

pub use cache::{BlobCache, CacheEntry, CacheError, DiskCache, ImageCache, MemoryCache};
pub use config::{BlobStoreConfig, ConfigError, DynamicImageConfig};
pub use mapping::{Mapping, MappingEnforcement, MappingSet};
pub use options::{FilterQuality, FocalPoint, ImageFormat, ResizeMode, TransformOptions};
pub use resize::ImageResizer;
pub use service::ImageService;
pub use source::{ContentResolver, FileResolver, HttpResolver, SourceImage};
pub use url::{decode, encode, DecodeOutcome};

use thiserror::Error;

/// Boxed error type used at the resolver/resizer collaboration boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures surfaced by the orchestration layer.
///
/// Transformation and cache failures are deliberately distinct variants so
/// a caller can serve an uncached result when only the cache is unhealthy.
#[derive(Debug, Error)]
pub enum DynamicImageError {
    /// The resolve or resize step failed; carries the offending options and
    /// the underlying cause.
    #[error("transformation failed for {options}")]
    Transformation {
        options: TransformOptions,
        #[source]
        source: BoxError,
    },
    /// A cache backend failed; carries the canonical key it failed on.
    #[error("cache failure for key '{key}'")]
    Cache {
        key: String,
        #[source]
        source: CacheError,
    },
    /// The request's cancellation signal fired.
    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, DynamicImageError>;
