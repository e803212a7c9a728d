use crate::cache::MemoryCacheConfig;
use crate::mapping::{MappingEnforcement, MappingSet};
use reqwest::Url;
use std::path::PathBuf;
use thiserror::Error;

/// Remote object store identity for the blob cache backend.
#[derive(Debug, Clone)]
pub struct BlobStoreConfig {
    /// Container/prefix URL under which cache objects are stored.
    pub base_url: String,
    pub bearer_token: Option<String>,
}

impl BlobStoreConfig {
    pub fn parse_base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidBlobUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct DynamicImageConfig {
    /// Virtual-path prefix owned by this handler, possibly multi-segment.
    pub url_prefix: String,
    /// Root directory for the disk cache backend.
    pub cache_root: PathBuf,
    /// Eviction policy for the in-memory backend.
    pub memory: MemoryCacheConfig,
    /// Remote store identity, when the blob backend is used.
    pub blob_store: Option<BlobStoreConfig>,
    /// Allow-listed transformation tuples.
    pub mappings: MappingSet,
    /// Whether the allow-list is enforced before generation.
    pub mapping_enforcement: MappingEnforcement,
}

impl Default for DynamicImageConfig {
    fn default() -> Self {
        Self {
            url_prefix: "dynamicimage".into(),
            cache_root: PathBuf::from("./cache"),
            memory: MemoryCacheConfig::default(),
            blob_store: None,
            mappings: MappingSet::new(),
            mapping_enforcement: MappingEnforcement::Disabled,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("url prefix cannot be empty")]
    EmptyPrefix,
    #[error("cache root cannot be empty")]
    EmptyCacheRoot,
    #[error("memory cache capacity must be > 0")]
    ZeroMemoryCapacity,
    #[error("mapping enforcement is enabled but the mapping set is empty")]
    EmptyMappingSet,
    #[error("invalid blob store url '{url}': {reason}")]
    InvalidBlobUrl { url: String, reason: String },
}

impl DynamicImageConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url_prefix.trim_matches('/').trim().is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        if self.cache_root.as_os_str().is_empty() {
            return Err(ConfigError::EmptyCacheRoot);
        }
        if self.memory.max_capacity_bytes == 0 {
            return Err(ConfigError::ZeroMemoryCapacity);
        }
        if self.mapping_enforcement == MappingEnforcement::Enforce && self.mappings.is_empty() {
            return Err(ConfigError::EmptyMappingSet);
        }
        if let Some(blob) = &self.blob_store {
            blob.parse_base_url()?;
        }
        Ok(())
    }
}
