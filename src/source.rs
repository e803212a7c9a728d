//! Source asset resolution boundary.
//!
//! The orchestrator needs two things from wherever originals live: a cheap
//! freshness probe (so cache hits never download the source) and the actual
//! bytes on a miss. Two resolvers ship with the crate; anything else can
//! implement [`ContentResolver`].

use crate::BoxError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use mime::Mime;
use reqwest::header::{CONTENT_TYPE, LAST_MODIFIED};
use reqwest::{Client, StatusCode, Url};
use std::path::{Component, Path, PathBuf};
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Resolved original asset: its bytes plus when it last changed.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub bytes: Bytes,
    pub last_modified: OffsetDateTime,
}

/// Where original assets come from.
#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// Freshness probe without fetching content. `None` means the source
    /// does not exist.
    async fn last_modified(
        &self,
        source_path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<OffsetDateTime>, BoxError>;

    /// Fetch the source bytes. `None` means the source does not exist.
    async fn resolve(
        &self,
        source_path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<SourceImage>, BoxError>;
}

fn cancelled() -> BoxError {
    Box::new(std::io::Error::new(
        std::io::ErrorKind::Interrupted,
        "operation cancelled",
    ))
}

/// Resolver for originals stored on the local filesystem under one root.
pub struct FileResolver {
    root: PathBuf,
}

impl FileResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map the logical path under the root, rejecting any traversal out of
    /// it. A rejected path behaves like a missing source.
    fn physical_path(&self, source_path: &str) -> Option<PathBuf> {
        let relative = source_path.trim_start_matches('/');
        let candidate = Path::new(relative);
        if candidate
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            debug!(source = source_path, "rejecting non-normal source path");
            return None;
        }
        Some(self.root.join(candidate))
    }
}

#[async_trait]
impl ContentResolver for FileResolver {
    async fn last_modified(
        &self,
        source_path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<OffsetDateTime>, BoxError> {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let Some(path) = self.physical_path(source_path) else {
            return Ok(None);
        };
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(OffsetDateTime::from(meta.modified()?))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve(
        &self,
        source_path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<SourceImage>, BoxError> {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let Some(path) = self.physical_path(source_path) else {
            return Ok(None);
        };
        let meta = match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let bytes = match fs::read(&path).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(SourceImage {
            bytes,
            last_modified: OffsetDateTime::from(meta.modified()?),
        }))
    }
}

/// Default input-size ceiling for remote sources.
pub const DEFAULT_MAX_SOURCE_SIZE: usize = 8 * 1024 * 1024;

/// Resolver for originals served by a remote HTTP origin.
///
/// Downloads are streamed with the size limit enforced on the wire, so a
/// spoofed `Content-Length` cannot exhaust memory. Responses without a
/// `Last-Modified` header are treated as epoch-aged: cached transforms of
/// them are never invalidated by freshness, only by explicit removal.
pub struct HttpResolver {
    client: Client,
    base_url: Url,
    max_size: usize,
}

impl HttpResolver {
    pub fn new(mut base_url: Url) -> Self {
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        Self {
            client: Client::new(),
            base_url,
            max_size: DEFAULT_MAX_SOURCE_SIZE,
        }
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    fn source_url(&self, source_path: &str) -> Result<Url, BoxError> {
        Ok(self.base_url.join(source_path.trim_start_matches('/'))?)
    }
}

fn header_last_modified(response: &reqwest::Response) -> OffsetDateTime {
    response
        .headers()
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| OffsetDateTime::parse(raw, &Rfc2822).ok())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[async_trait]
impl ContentResolver for HttpResolver {
    async fn last_modified(
        &self,
        source_path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<OffsetDateTime>, BoxError> {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let url = self.source_url(source_path)?;
        let response = self.client.head(url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(header_last_modified(&response))),
            status => Err(format!("upstream status {} for {}", status, source_path).into()),
        }
    }

    async fn resolve(
        &self,
        source_path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<SourceImage>, BoxError> {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let url = self.source_url(source_path)?;
        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if status.is_success() => {}
            status => {
                return Err(format!("upstream status {} for {}", status, source_path).into());
            }
        }

        // Validate the declared content type when it parses; unknown types
        // fall through to the resize operation, which decodes for real.
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if let Ok(m) = content_type.parse::<Mime>() {
            if m.type_() != mime::IMAGE {
                return Err(format!("source '{}' is not an image", source_path).into());
            }
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_size {
                return Err(format!("source '{}' exceeds size limit", source_path).into());
            }
        }

        let last_modified = header_last_modified(&response);

        let mut buf = BytesMut::with_capacity(8192);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await.transpose()? {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }
            if buf.len() + chunk.len() > self.max_size {
                return Err(format!("source '{}' exceeds size limit", source_path).into());
            }
            buf.extend_from_slice(&chunk);
        }

        Ok(Some(SourceImage {
            bytes: buf.freeze(),
            last_modified,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_resolver_rejects_traversal() {
        let resolver = FileResolver::new("/srv/media");
        assert!(resolver.physical_path("/../etc/passwd").is_none());
        assert!(resolver.physical_path("/images/../../x.png").is_none());
        assert_eq!(
            resolver.physical_path("/images/logo.png"),
            Some(PathBuf::from("/srv/media/images/logo.png"))
        );
    }
}
