//! Shape image intake and per-size mask building.
//!
//! A shape that fails to load is still "resolved": it turns into an all-zero
//! mask so composition carries on without that feature.

use std::collections::BTreeMap;
use std::path::Path;

use image::{DynamicImage, ImageReader};
use log::{debug, warn};

use crate::config::MaskConfig;
use crate::mask::{dilate, to_alpha_mask, AlphaMask};
use crate::regions::{ShapeKind, ShapeMasks};

#[derive(Debug, Clone)]
pub enum ShapeSource {
    Image(DynamicImage),
    /// Fetch or decode failed; contributes nothing.
    Missing { reason: String },
}

impl ShapeSource {
    pub fn from_path(path: &Path) -> Self {
        let decoded = ImageReader::open(path)
            .map_err(|error| error.to_string())
            .and_then(|reader| reader.with_guessed_format().map_err(|error| error.to_string()))
            .and_then(|reader| reader.decode().map_err(|error| error.to_string()));
        match decoded {
            Ok(image) => Self::Image(image),
            Err(reason) => {
                warn!("shape image {} unavailable: {reason}", path.display());
                Self::Missing { reason }
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        match image::load_from_memory(bytes) {
            Ok(image) => Self::Image(image),
            Err(error) => {
                warn!("shape image bytes undecodable: {error}");
                Self::Missing {
                    reason: error.to_string(),
                }
            }
        }
    }

    pub fn missing(reason: impl Into<String>) -> Self {
        Self::Missing {
            reason: reason.into(),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }

    pub fn to_mask(&self, width: u32, height: u32, threshold: u8) -> AlphaMask {
        match self {
            Self::Image(image) => to_alpha_mask(image, width, height, threshold),
            Self::Missing { .. } => AlphaMask::empty(width, height),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MaskCacheKey {
    width: u32,
    height: u32,
    generation: u64,
}

/// Shape sources keyed by kind, with masks cached per plan size.
#[derive(Debug, Default)]
pub struct ShapeLibrary {
    sources: BTreeMap<ShapeKind, ShapeSource>,
    generation: u64,
    cached: Option<(MaskCacheKey, ShapeMasks)>,
}

impl ShapeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every shape from `dir/<kind>.png`.
    pub fn load_dir(dir: &Path) -> Self {
        let mut library = Self::new();
        for kind in ShapeKind::ALL {
            library.insert(kind, ShapeSource::from_path(&dir.join(kind.file_name())));
        }
        library
    }

    /// Add or replace a shape; invalidates cached masks.
    pub fn insert(&mut self, kind: ShapeKind, source: ShapeSource) {
        self.sources.insert(kind, source);
        self.generation += 1;
        self.cached = None;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, kind: ShapeKind) -> Option<&ShapeSource> {
        self.sources.get(&kind)
    }

    pub fn is_resolved(&self, kind: ShapeKind) -> bool {
        self.sources.contains_key(&kind)
    }

    /// Every required shape has arrived (possibly as missing).
    pub fn required_resolved(&self) -> bool {
        ShapeKind::ALL
            .iter()
            .filter(|kind| kind.is_required())
            .all(|kind| self.is_resolved(*kind))
    }

    pub fn pending(&self) -> Vec<ShapeKind> {
        ShapeKind::ALL
            .iter()
            .copied()
            .filter(|kind| kind.is_required() && !self.is_resolved(*kind))
            .collect()
    }

    /// A single undilated mask, `None` while `kind` has not arrived.
    pub fn mask(
        &self,
        kind: ShapeKind,
        width: u32,
        height: u32,
        threshold: u8,
    ) -> Option<AlphaMask> {
        self.get(kind)
            .map(|source| source.to_mask(width, height, threshold))
    }

    /// Masks at `width`x`height`, built once per size and shape generation.
    ///
    /// `None` until every required shape is resolved.
    pub fn masks_for(
        &mut self,
        width: u32,
        height: u32,
        config: &MaskConfig,
    ) -> Option<&ShapeMasks> {
        if !self.required_resolved() {
            return None;
        }
        let key = MaskCacheKey {
            width,
            height,
            generation: self.generation,
        };
        let stale = self.cached.as_ref().map_or(true, |(cached, _)| *cached != key);
        if stale {
            debug!("building shape masks at {width}x{height}");
            let masks = self.build_masks(width, height, config);
            self.cached = Some((key, masks));
        }
        self.cached.as_ref().map(|(_, masks)| masks)
    }

    fn build_masks(&self, width: u32, height: u32, config: &MaskConfig) -> ShapeMasks {
        let raw = |kind: ShapeKind| -> AlphaMask {
            self.get(kind)
                .map(|source| source.to_mask(width, height, config.threshold))
                .unwrap_or_else(|| AlphaMask::empty(width, height))
        };
        let feature = |kind: ShapeKind| dilate(&raw(kind), config.feature_dilation);

        let headband = if config.headband_enabled {
            self.get(ShapeKind::Headband)
                .filter(|source| !source.is_missing())
                .map(|_| feature(ShapeKind::Headband))
        } else {
            None
        };

        ShapeMasks {
            silhouette: raw(ShapeKind::Silhouette),
            hair: feature(ShapeKind::Hair),
            headband,
            beak: feature(ShapeKind::Beak),
            feet: feature(ShapeKind::Feet),
            eyes: raw(ShapeKind::Eyes),
            pupils: raw(ShapeKind::Pupils),
            nostrils: raw(ShapeKind::Nostrils),
            outline: raw(ShapeKind::Outline),
        }
    }
}
