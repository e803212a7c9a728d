//! In-process object store.
//!
//! Backs the blob cache in tests and small single-node deployments where a
//! remote store is not available. A `tokio` RwLock over a plain map is
//! enough: operations are whole-object and short-lived.

use super::{ensure_live, ObjectMetadata, ObjectStore, StoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Bytes,
    content_type: String,
    last_modified: OffsetDateTime,
}

#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Stored content type of an object, if present.
    pub async fn content_type(&self, name: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(name)
            .map(|o| o.content_type.clone())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(
        &self,
        name: &str,
        bytes: Bytes,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        ensure_live(cancel)?;
        let object = StoredObject {
            bytes,
            content_type: content_type.to_string(),
            last_modified: OffsetDateTime::now_utc(),
        };
        self.objects.write().await.insert(name.to_string(), object);
        Ok(())
    }

    async fn get(&self, name: &str, cancel: &CancellationToken) -> StoreResult<Option<Bytes>> {
        ensure_live(cancel)?;
        Ok(self.objects.read().await.get(name).map(|o| o.bytes.clone()))
    }

    async fn delete(&self, name: &str, cancel: &CancellationToken) -> StoreResult<()> {
        ensure_live(cancel)?;
        self.objects.write().await.remove(name);
        Ok(())
    }

    async fn head(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<ObjectMetadata>> {
        ensure_live(cancel)?;
        Ok(self.objects.read().await.get(name).map(|o| ObjectMetadata {
            length: o.bytes.len() as u64,
            last_modified: o.last_modified,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let store = InMemoryObjectStore::new();
        let cancel = CancellationToken::new();

        assert!(store.get("a/b/x.jpg", &cancel).await.unwrap().is_none());
        assert!(store.head("a/b/x.jpg", &cancel).await.unwrap().is_none());

        store
            .put("a/b/x.jpg", Bytes::from_static(b"abc"), "image/jpeg", &cancel)
            .await
            .unwrap();

        let meta = store.head("a/b/x.jpg", &cancel).await.unwrap().unwrap();
        assert_eq!(meta.length, 3);
        assert_eq!(
            store.get("a/b/x.jpg", &cancel).await.unwrap().unwrap(),
            Bytes::from_static(b"abc")
        );

        store.delete("a/b/x.jpg", &cancel).await.unwrap();
        assert!(store.get("a/b/x.jpg", &cancel).await.unwrap().is_none());
        // idempotent
        store.delete("a/b/x.jpg", &cancel).await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_token_aborts() {
        let store = InMemoryObjectStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(store.get("x", &cancel).await.is_err());
    }
}
