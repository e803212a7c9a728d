//! Resize operation boundary.
//!
//! Pixel work (decoding, resampling, re-encoding) is deliberately outside
//! this crate; the orchestrator only needs something that turns source bytes
//! plus [`TransformOptions`] into transformed bytes.

use crate::options::TransformOptions;
use crate::BoxError;
use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

/// External resize/encode operation invoked on a cache miss.
#[async_trait]
pub trait ImageResizer: Send + Sync {
    /// Produce the transformed image for `options` from `source` bytes.
    /// Errors surface to callers as transformation failures with the
    /// offending options attached.
    async fn resize(
        &self,
        source: &[u8],
        options: &TransformOptions,
        cancel: &CancellationToken,
    ) -> Result<Bytes, BoxError>;
}
