//! Generic object-store capability used by the blob cache backend.
//!
//! The blob cache needs only four primitives: put, get, delete, and an
//! existence probe that returns freshness metadata. Anything providing
//! those (an HTTP object endpoint, an in-process map, a cloud SDK wrapper)
//! can back it.

pub mod http;
pub mod memory;

pub use http::HttpObjectStore;
pub use memory::InMemoryObjectStore;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transport failure")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {status} for object '{name}'")]
    UnexpectedStatus { status: u16, name: String },
    #[error("invalid object metadata: {0}")]
    Metadata(String),
    #[error("operation cancelled")]
    Cancelled,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Existence probe result: what the blob cache needs to decide freshness
/// without downloading the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub length: u64,
    pub last_modified: OffsetDateTime,
}

/// Minimal object-store contract: full-object put/get/delete plus a
/// metadata-only existence check. Writes replace the whole object
/// atomically; partial writes must never become visible.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        name: &str,
        bytes: Bytes,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<()>;

    /// `None` when the object does not exist.
    async fn get(&self, name: &str, cancel: &CancellationToken) -> StoreResult<Option<Bytes>>;

    /// Idempotent; deleting a missing object is not an error.
    async fn delete(&self, name: &str, cancel: &CancellationToken) -> StoreResult<()>;

    /// Existence plus freshness metadata, without fetching the payload.
    async fn head(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<ObjectMetadata>>;
}

pub(crate) fn ensure_live(cancel: &CancellationToken) -> StoreResult<()> {
    if cancel.is_cancelled() {
        Err(StoreError::Cancelled)
    } else {
        Ok(())
    }
}
