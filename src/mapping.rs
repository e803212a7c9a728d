//! Optional allow-list of transformation tuples.
//!
//! When enforcement is enabled only exact (width, height, resize mode,
//! format) matches may be served, which stops clients from minting arbitrary
//! resize work by editing the virtual path.

use crate::options::{ImageFormat, ResizeMode, TransformOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One allow-listed transformation tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mapping {
    pub width: u32,
    pub height: u32,
    pub resize_mode: ResizeMode,
    pub format: ImageFormat,
}

impl Mapping {
    pub fn new(width: u32, height: u32, resize_mode: ResizeMode, format: ImageFormat) -> Self {
        Self {
            width,
            height,
            resize_mode,
            format,
        }
    }
}

impl From<&TransformOptions> for Mapping {
    fn from(options: &TransformOptions) -> Self {
        Self {
            width: options.width,
            height: options.height,
            resize_mode: options.resize_mode,
            format: options.format,
        }
    }
}

/// Whether the allow-list is consulted before generating an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingEnforcement {
    /// The set is advisory only; every decoded request is served.
    #[default]
    Disabled,
    /// Requests outside the set are rejected before any resolver or resize
    /// work happens.
    Enforce,
}

/// Set of allow-listed tuples.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingSet(HashSet<Mapping>);

impl MappingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mapping: Mapping) {
        self.0.insert(mapping);
    }

    pub fn contains(&self, mapping: &Mapping) -> bool {
        self.0.contains(mapping)
    }

    /// Exact tuple match for the given options.
    pub fn allows(&self, options: &TransformOptions) -> bool {
        self.0.contains(&Mapping::from(options))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<Mapping> for MappingSet {
    fn from_iter<I: IntoIterator<Item = Mapping>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Allow-list check as used by the orchestrator: pass when enforcement is
/// off, otherwise require an exact tuple match.
pub fn validate_mapping(
    options: &TransformOptions,
    mappings: &MappingSet,
    enforcement: MappingEnforcement,
) -> bool {
    match enforcement {
        MappingEnforcement::Disabled => true,
        MappingEnforcement::Enforce => mappings.allows(options),
    }
}
