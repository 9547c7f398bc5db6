//! Per-frame energy mask: the outline stencil, displaced by the turbulence
//! field and lit by its filaments.
//!
//! Everything here runs at a working resolution capped independently of the
//! plan size, so the per-frame cost stays bounded for very large mosaics.

use std::f32::consts::TAU;

use log::debug;
use serde::Deserialize;
use tiny_skia::{Pixmap, PremultipliedColorU8};

use crate::error::MosaicError;
use crate::mask::AlphaMask;
use crate::pixels::new_pixmap;
use crate::turbulence::{field_resolution, TurbulenceField, TurbulenceParams};

pub const DEFAULT_WORKING_CAP: u32 = 520;
const FILAMENT_BOOST: f32 = 1.35;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnergyParams {
    /// Displacement in full-resolution pixels.
    pub amplitude: f32,
    pub wave_amplitude: f32,
    pub wave_frequency: f32,
    pub wave_speed: f32,
    pub cut: f32,
    pub sharp_pow: f32,
    pub filament_weight: f32,
    pub spark_weight: f32,
    pub gain: f32,
    pub flicker_amplitude: f32,
    pub flicker_spatial: f32,
    pub flicker_speed: f32,
}

impl Default for EnergyParams {
    fn default() -> Self {
        Self {
            amplitude: 3.75,
            wave_amplitude: 1.2,
            wave_frequency: 1.3,
            wave_speed: 0.9,
            cut: 0.15,
            sharp_pow: 1.92,
            filament_weight: 1.0,
            spark_weight: 0.65,
            gain: 1.6,
            flicker_amplitude: 0.18,
            flicker_spatial: 0.7,
            flicker_speed: 23.0,
        }
    }
}

/// Working size for a full-resolution frame, long edge at most `cap`.
pub fn working_size(full_width: u32, full_height: u32, cap: u32) -> (u32, u32) {
    let long_edge = full_width.max(full_height).max(1);
    let cap = cap.max(1);
    if long_edge <= cap {
        return (full_width.max(1), full_height.max(1));
    }
    let scale = cap as f32 / long_edge as f32;
    let w = ((full_width as f32 * scale).round() as u32).clamp(1, cap);
    let h = ((full_height as f32 * scale).round() as u32).clamp(1, cap);
    (w, h)
}

/// Write one frame of the energy mask into `buffer`.
///
/// Output is white; alpha carries intensity. Pixels whose displaced sample
/// misses the outline are fully transparent.
pub fn compose(
    buffer: &mut Pixmap,
    outline: &AlphaMask,
    field: &TurbulenceField,
    t_seconds: f32,
    params: &EnergyParams,
) {
    let work_w = buffer.width();
    let work_h = buffer.height();
    let (full_w, full_h) = outline.dimensions();
    if full_w == 0 || full_h == 0 {
        buffer.pixels_mut().fill(PremultipliedColorU8::TRANSPARENT);
        return;
    }

    let ratio = work_w.max(work_h) as f32 / full_w.max(full_h) as f32;
    let amplitude = params.amplitude * ratio;
    let scale_x = full_w as f32 / work_w as f32;
    let scale_y = full_h as f32 / work_h as f32;
    let inv_w = 1.0 / work_w as f32;
    let inv_h = 1.0 / work_h as f32;

    let pixels = buffer.pixels_mut();
    for y in 0..work_h {
        let v = (y as f32 + 0.5) * inv_h;
        let wave = params.wave_amplitude
            * (TAU * params.wave_frequency * v + params.wave_speed * t_seconds).sin();
        for x in 0..work_w {
            let idx = (y * work_w + x) as usize;
            let u = (x as f32 + 0.5) * inv_w;
            let texel = field.sample_bilinear(u, v);

            let sx = x as f32 + 0.5 + texel.dx * amplitude + wave;
            let sy = y as f32 + 0.5 + texel.dy * amplitude;
            let base = outline.sample_nearest(sx * scale_x, sy * scale_y);
            if base == 0 {
                pixels[idx] = PremultipliedColorU8::TRANSPARENT;
                continue;
            }

            let sharp = ((texel.filament - params.cut).clamp(0.0, 1.0) * FILAMENT_BOOST)
                .powf(params.sharp_pow);
            let mut intensity = sharp * params.filament_weight + texel.spark * params.spark_weight;
            let flicker = 1.0
                + params.flicker_amplitude
                    * ((x + y) as f32 * params.flicker_spatial + t_seconds * params.flicker_speed)
                        .sin();
            intensity *= f32::from(base) / 255.0 * params.gain * flicker;

            let a = (intensity.clamp(0.0, 1.0) * 255.0).round() as u8;
            pixels[idx] = PremultipliedColorU8::from_rgba(a, a, a, a)
                .unwrap_or(PremultipliedColorU8::TRANSPARENT);
        }
    }
}

/// Identity of the buffers an [`EnergyArena`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolutionFingerprint {
    pub full_width: u32,
    pub full_height: u32,
    pub working_cap: u32,
}

impl ResolutionFingerprint {
    pub fn working_size(&self) -> (u32, u32) {
        working_size(self.full_width, self.full_height, self.working_cap)
    }

    pub fn field_res(&self) -> u32 {
        let (w, h) = self.working_size();
        field_resolution(w, h)
    }
}

/// Turbulence field plus energy buffer, reused frame after frame.
#[derive(Debug)]
pub struct EnergyArena {
    fingerprint: ResolutionFingerprint,
    field: TurbulenceField,
    buffer: Pixmap,
    frames: u64,
}

impl EnergyArena {
    pub fn new(fingerprint: ResolutionFingerprint) -> Result<Self, MosaicError> {
        let (w, h) = fingerprint.working_size();
        Ok(Self {
            fingerprint,
            field: TurbulenceField::new(fingerprint.field_res()),
            buffer: new_pixmap(w, h)?,
            frames: 0,
        })
    }

    pub fn fingerprint(&self) -> ResolutionFingerprint {
        self.fingerprint
    }

    pub fn field(&self) -> &TurbulenceField {
        &self.field
    }

    pub fn buffer(&self) -> &Pixmap {
        &self.buffer
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Retarget to a new fingerprint. The field is only rebuilt when its
    /// side length changes.
    pub fn reconfigure(&mut self, fingerprint: ResolutionFingerprint) -> Result<(), MosaicError> {
        if fingerprint == self.fingerprint {
            return Ok(());
        }
        let (w, h) = fingerprint.working_size();
        if (self.buffer.width(), self.buffer.height()) != (w, h) {
            self.buffer = new_pixmap(w, h)?;
        }
        let res = fingerprint.field_res();
        if res != self.field.res() {
            debug!("energy field resized {} -> {}", self.field.res(), res);
            self.field = TurbulenceField::new(res);
        }
        self.fingerprint = fingerprint;
        Ok(())
    }

    /// Advance the field to `t_seconds` and redraw the energy mask.
    pub fn render(
        &mut self,
        outline: &AlphaMask,
        t_seconds: f64,
        turbulence: &TurbulenceParams,
        energy: &EnergyParams,
    ) -> &Pixmap {
        self.field.synthesize(t_seconds, turbulence);
        compose(
            &mut self.buffer,
            outline,
            &self.field,
            t_seconds as f32,
            energy,
        );
        self.frames += 1;
        &self.buffer
    }
}
