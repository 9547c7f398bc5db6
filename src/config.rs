//! Render configuration, loaded from YAML.
//!
//! Every field has a default so an empty document is a valid config.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::energy::{EnergyParams, DEFAULT_WORKING_CAP};
use crate::error::MosaicError;
use crate::turbulence::TurbulenceParams;

pub type Rgb = [u8; 3];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    pub energy: EnergyConfig,
    pub glow: GlowConfig,
    pub palette: Palette,
    pub phases: PhaseConfig,
    pub masks: MaskConfig,
    pub font: FontConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnergyConfig {
    /// Population at which the animated outline takes over.
    pub activation_threshold: u64,
    /// Long-edge cap of the energy working buffer.
    pub working_cap: u32,
    pub turbulence: TurbulenceParams,
    pub mask: EnergyParams,
    /// Opacity of the tinted bloom under the white energy core.
    pub bloom_opacity: f32,
    pub core_opacity: f32,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            activation_threshold: 3500,
            working_cap: DEFAULT_WORKING_CAP,
            turbulence: TurbulenceParams::default(),
            mask: EnergyParams::default(),
            bloom_opacity: 0.85,
            core_opacity: 0.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegionIntensity {
    pub body: f32,
    pub beak: f32,
    pub feet: f32,
    pub headband: f32,
    pub hair: f32,
}

impl Default for RegionIntensity {
    fn default() -> Self {
        Self {
            body: 1.15,
            beak: 1.0,
            feet: 1.0,
            headband: 1.05,
            hair: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GlowConfig {
    pub intensity: RegionIntensity,
    pub outline_intensity: f32,
    pub outer_opacity: f32,
    pub mid_opacity: f32,
    pub inner_opacity: f32,
    pub core_boost_opacity: f32,
}

impl Default for GlowConfig {
    fn default() -> Self {
        Self {
            intensity: RegionIntensity::default(),
            outline_intensity: 1.0,
            outer_opacity: 0.22,
            mid_opacity: 0.34,
            inner_opacity: 0.55,
            core_boost_opacity: 0.12,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Palette {
    pub silhouette_fill: Rgb,
    pub silhouette_alpha: f32,
    pub preview_text: Rgb,
    pub outline_glow: Rgb,
    pub eye_white: Rgb,
    pub pupil: Rgb,
    pub headband_glow: Rgb,
    pub headband_glow_alpha: f32,
    pub energy_tint: Rgb,
    pub error_backdrop: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            silhouette_fill: [24, 28, 48],
            silhouette_alpha: 0.35,
            preview_text: [205, 220, 255],
            outline_glow: [90, 200, 255],
            eye_white: [250, 250, 250],
            pupil: [12, 12, 16],
            headband_glow: [255, 70, 120],
            headband_glow_alpha: 0.45,
            energy_tint: [110, 210, 255],
            error_backdrop: [20, 8, 8],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhaseConfig {
    pub crossfade_ms: u64,
    pub preview_batch_min: usize,
    /// Preview batch is `max(preview_batch_min, tiles / preview_batch_divisor)`.
    pub preview_batch_divisor: usize,
    pub reduced_motion: bool,
    /// Surface size used before the host reports a viewport.
    pub surface_width: u32,
    pub surface_height: u32,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            crossfade_ms: 380,
            preview_batch_min: 120,
            preview_batch_divisor: 10,
            reduced_motion: false,
            surface_width: 1024,
            surface_height: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MaskConfig {
    pub threshold: u8,
    pub eye_dilation: u32,
    pub feature_dilation: u32,
    pub outline_dilation: u32,
    pub headband_enabled: bool,
    /// Population at which pupils and nostrils reach full opacity.
    pub detail_full_population: u64,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            threshold: 0,
            eye_dilation: 2,
            feature_dilation: 1,
            outline_dilation: 1,
            headband_enabled: true,
            detail_full_population: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FontConfig {
    pub path: Option<PathBuf>,
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), MosaicError> {
        let invalid = |message: String| Err(MosaicError::ConfigInvalid(message));

        if self.energy.working_cap < 16 {
            return invalid(format!(
                "energy.working_cap must be >= 16, got {}",
                self.energy.working_cap
            ));
        }
        if self.phases.preview_batch_min == 0 || self.phases.preview_batch_divisor == 0 {
            return invalid("phases.preview_batch_min and preview_batch_divisor must be > 0".into());
        }
        if self.phases.surface_width == 0 || self.phases.surface_height == 0 {
            return invalid("phases.surface_width/height must be > 0".into());
        }
        if self.masks.detail_full_population == 0 {
            return invalid("masks.detail_full_population must be > 0".into());
        }
        for (name, value) in [
            ("palette.silhouette_alpha", self.palette.silhouette_alpha),
            ("palette.headband_glow_alpha", self.palette.headband_glow_alpha),
            ("energy.bloom_opacity", self.energy.bloom_opacity),
            ("energy.core_opacity", self.energy.core_opacity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} must be within [0, 1], got {value}"));
            }
        }
        let turbulence = &self.energy.turbulence;
        if turbulence.flicker_period_seconds <= 0.0 {
            return invalid("energy.turbulence.flicker_period_seconds must be > 0".into());
        }
        if turbulence.disp_scale <= 0.0 || turbulence.fil_scale <= 0.0 {
            return invalid("energy.turbulence scales must be > 0".into());
        }
        Ok(())
    }
}

pub fn parse_config(yaml: &str) -> Result<RenderConfig> {
    if yaml.trim().is_empty() {
        return Ok(RenderConfig::default());
    }
    let config: RenderConfig = serde_yaml::from_str(yaml).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!("failed to parse config yaml at {}: {}", location, error)
    })?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<RenderConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("invalid config {}", path.display()))
}
