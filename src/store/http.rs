//! HTTP-backed object store.
//!
//! Talks plain object semantics to any HTTP endpoint that maps PUT/GET/
//! DELETE/HEAD onto object upload, download, removal, and metadata: S3-style
//! gateways, WebDAV shares, or a purpose-built origin. Freshness comes from
//! the standard `Last-Modified` response header.

use super::{ensure_live, ObjectMetadata, ObjectStore, StoreError, StoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED};
use reqwest::{Client, StatusCode, Url};
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

pub struct HttpObjectStore {
    client: Client,
    base_url: Url,
    bearer_token: Option<String>,
}

impl HttpObjectStore {
    /// `base_url` is the container/prefix under which object names are
    /// resolved; a trailing slash is added if missing so joins stay inside
    /// the container.
    pub fn new(mut base_url: Url, bearer_token: Option<String>) -> Self {
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        Self {
            client: Client::new(),
            base_url,
            bearer_token,
        }
    }

    /// Build from the blob section of the crate configuration.
    pub fn from_config(
        config: &crate::config::BlobStoreConfig,
    ) -> Result<Self, crate::config::ConfigError> {
        Ok(Self::new(config.parse_base_url()?, config.bearer_token.clone()))
    }

    fn object_url(&self, name: &str) -> StoreResult<Url> {
        self.base_url
            .join(name)
            .map_err(|e| StoreError::Metadata(format!("invalid object name '{}': {}", name, e)))
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(
        &self,
        name: &str,
        bytes: Bytes,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        ensure_live(cancel)?;
        let url = self.object_url(name)?;
        let response = self
            .request(self.client.put(url))
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StoreError::UnexpectedStatus {
                status: response.status().as_u16(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    async fn get(&self, name: &str, cancel: &CancellationToken) -> StoreResult<Option<Bytes>> {
        ensure_live(cancel)?;
        let url = self.object_url(name)?;
        let response = self.request(self.client.get(url)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.bytes().await?)),
            status => Err(StoreError::UnexpectedStatus {
                status: status.as_u16(),
                name: name.to_string(),
            }),
        }
    }

    async fn delete(&self, name: &str, cancel: &CancellationToken) -> StoreResult<()> {
        ensure_live(cancel)?;
        let url = self.object_url(name)?;
        let response = self.request(self.client.delete(url)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(StoreError::UnexpectedStatus {
                status: status.as_u16(),
                name: name.to_string(),
            }),
        }
    }

    async fn head(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<ObjectMetadata>> {
        ensure_live(cancel)?;
        let url = self.object_url(name)?;
        let response = self.request(self.client.head(url)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let last_modified = response
                    .headers()
                    .get(LAST_MODIFIED)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        StoreError::Metadata(format!("object '{}' has no Last-Modified", name))
                    })
                    .and_then(|raw| {
                        OffsetDateTime::parse(raw, &Rfc2822).map_err(|e| {
                            StoreError::Metadata(format!(
                                "object '{}' has unparseable Last-Modified '{}': {}",
                                name, raw, e
                            ))
                        })
                    })?;
                let length = response
                    .headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(0);
                Ok(Some(ObjectMetadata {
                    length,
                    last_modified,
                }))
            }
            status => Err(StoreError::UnexpectedStatus {
                status: status.as_u16(),
                name: name.to_string(),
            }),
        }
    }
}
