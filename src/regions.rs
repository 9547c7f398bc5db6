//! Named shape masks and the tile → region classifier.

use std::fmt;

use log::debug;

use crate::mask::{dilate, AlphaMask};
use crate::plan::Tile;

/// Source images the renderer consumes, one mask each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShapeKind {
    Silhouette,
    Hair,
    Headband,
    Beak,
    Feet,
    Eyes,
    Pupils,
    Nostrils,
    Outline,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 9] = [
        Self::Silhouette,
        Self::Hair,
        Self::Headband,
        Self::Beak,
        Self::Feet,
        Self::Eyes,
        Self::Pupils,
        Self::Nostrils,
        Self::Outline,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Silhouette => "silhouette",
            Self::Hair => "hair",
            Self::Headband => "headband",
            Self::Beak => "beak",
            Self::Feet => "feet",
            Self::Eyes => "eyes",
            Self::Pupils => "pupils",
            Self::Nostrils => "nostrils",
            Self::Outline => "outline",
        }
    }

    /// Final composition waits for every required shape.
    pub fn is_required(self) -> bool {
        !matches!(self, Self::Headband)
    }

    pub fn file_name(self) -> String {
        format!("{}.png", self.name())
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Region a text tile is drawn into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Body,
    Beak,
    Feet,
    Headband,
    Hair,
}

impl Region {
    /// Glow composition order, back to front.
    pub const GLOW_ORDER: [Region; 5] = [
        Self::Body,
        Self::Beak,
        Self::Feet,
        Self::Headband,
        Self::Hair,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Beak => "beak",
            Self::Feet => "feet",
            Self::Headband => "headband",
            Self::Hair => "hair",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegionSet {
    pub silhouette: AlphaMask,
    pub hair: AlphaMask,
    pub headband: Option<AlphaMask>,
    pub beak: AlphaMask,
    pub feet: AlphaMask,
    pub eyes: AlphaMask,
    pub pupils: AlphaMask,
    pub nostrils: AlphaMask,
    pub outline: AlphaMask,
    /// Silhouette minus every feature region and the dilated eyes.
    pub body: AlphaMask,
}

/// Masks for every shape, before the body is derived.
#[derive(Debug, Clone)]
pub struct ShapeMasks {
    pub silhouette: AlphaMask,
    pub hair: AlphaMask,
    pub headband: Option<AlphaMask>,
    pub beak: AlphaMask,
    pub feet: AlphaMask,
    pub eyes: AlphaMask,
    pub pupils: AlphaMask,
    pub nostrils: AlphaMask,
    pub outline: AlphaMask,
}

impl RegionSet {
    /// Derive the body mask; an all-zero headband counts as inactive.
    pub fn build(masks: ShapeMasks, eye_dilation: u32) -> Self {
        let headband = masks.headband.filter(|mask| {
            let active = !mask.is_empty();
            if !active {
                debug!("headband mask is empty, region disabled");
            }
            active
        });

        let mut carve = masks.hair.union(&masks.beak).union(&masks.feet);
        if let Some(headband) = &headband {
            carve = carve.union(headband);
        }
        carve = carve.union(&dilate(&masks.eyes, eye_dilation));
        let body = masks.silhouette.subtract(&carve);

        Self {
            silhouette: masks.silhouette,
            hair: masks.hair,
            headband,
            beak: masks.beak,
            feet: masks.feet,
            eyes: masks.eyes,
            pupils: masks.pupils,
            nostrils: masks.nostrils,
            outline: masks.outline,
            body,
        }
    }

    pub fn headband_active(&self) -> bool {
        self.headband.is_some()
    }

    pub fn region_mask(&self, region: Region) -> Option<&AlphaMask> {
        match region {
            Region::Body => Some(&self.body),
            Region::Beak => Some(&self.beak),
            Region::Feet => Some(&self.feet),
            Region::Headband => self.headband.as_ref(),
            Region::Hair => Some(&self.hair),
        }
    }

    /// First matching feature in priority order, else body.
    pub fn classify_point(&self, x: f32, y: f32) -> Region {
        if self.hair.sample_nearest(x, y) > 0 {
            return Region::Hair;
        }
        if let Some(headband) = &self.headband {
            if headband.sample_nearest(x, y) > 0 {
                return Region::Headband;
            }
        }
        if self.beak.sample_nearest(x, y) > 0 {
            return Region::Beak;
        }
        if self.feet.sample_nearest(x, y) > 0 {
            return Region::Feet;
        }
        Region::Body
    }

    pub fn classify(&self, tile: &Tile) -> Region {
        self.classify_point(tile.x, tile.y)
    }
}
