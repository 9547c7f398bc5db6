//! Tile layouts received from the data source.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::MosaicError;

pub const DEFAULT_TILE_RGB: [u8; 3] = [0, 0, 0];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub items: Vec<Tile>,
    #[serde(default)]
    pub subscriber_count: u64,
    #[serde(default)]
    pub is_preview: bool,
    #[serde(default)]
    pub names_requested: u64,
    #[serde(default)]
    pub names_placed: u64,
}

impl Plan {
    pub fn validate(&self) -> Result<(), MosaicError> {
        if self.width == 0 || self.height == 0 {
            return Err(MosaicError::PlanInvalid(format!(
                "plan size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Tiles that actually render.
    pub fn text_tiles(&self) -> impl Iterator<Item = &Tile> {
        self.items.iter().filter(|tile| tile.is_text())
    }

    pub fn text_tile_count(&self) -> usize {
        self.text_tiles().count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub full_text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

fn default_kind() -> String {
    "text".to_owned()
}

impl Tile {
    pub fn is_text(&self) -> bool {
        self.kind == "text"
    }

    /// Tile color as straight RGB; unparseable or absent colors are black.
    pub fn rgb(&self) -> [u8; 3] {
        match self.color.as_deref() {
            None => DEFAULT_TILE_RGB,
            Some(raw) => parse_rgb(raw).unwrap_or_else(|| {
                debug!("tile color '{raw}' not understood, using black");
                DEFAULT_TILE_RGB
            }),
        }
    }
}

fn rgb_function_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^rgba?\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*(?:,\s*[\d.]+\s*)?\)$")
            .expect("static color pattern is valid")
    })
}

/// Parses `#rgb`, `#rrggbb`, `rgb(r, g, b)` and `rgba(r, g, b, a)`.
pub fn parse_rgb(raw: &str) -> Option<[u8; 3]> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix('#') {
        return parse_hex(hex);
    }
    let captures = rgb_function_pattern().captures(raw)?;
    let mut out = [0u8; 3];
    for (slot, index) in out.iter_mut().zip(1..=3) {
        let value: u16 = captures.get(index)?.as_str().parse().ok()?;
        *slot = u8::try_from(value).ok()?;
    }
    Some(out)
}

fn parse_hex(hex: &str) -> Option<[u8; 3]> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        3 => {
            let mut out = [0u8; 3];
            for (slot, c) in out.iter_mut().zip(hex.chars()) {
                let nibble = c.to_digit(16)? as u8;
                *slot = nibble * 17;
            }
            Some(out)
        }
        6 => {
            let mut out = [0u8; 3];
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
            }
            Some(out)
        }
        _ => None,
    }
}

pub fn parse_plan(json: &str) -> Result<Plan, MosaicError> {
    let plan: Plan =
        serde_json::from_str(json).map_err(|error| MosaicError::PlanInvalid(error.to_string()))?;
    plan.validate()?;
    Ok(plan)
}

pub fn load_plan(path: &Path) -> Result<Plan, MosaicError> {
    let contents = fs::read_to_string(path).map_err(|error| MosaicError::PlanLoad {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })?;
    parse_plan(&contents).map_err(|error| MosaicError::PlanLoad {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })
}
