//! Time-evolving turbulence field: curl-rotated displacement plus ridged
//! filaments and sparks, packed four bytes per texel.

use std::f64::consts::TAU;

use serde::Deserialize;

use crate::noise::fbm;
use crate::pixels::{FieldTexel, PixelGrid};

pub const MIN_FIELD_RES: u32 = 220;
pub const MAX_FIELD_RES: u32 = 380;
const FIELD_RES_FACTOR: f32 = 0.72;

const DISPLACEMENT_OCTAVES: u32 = 3;
const FILAMENT_OCTAVES: u32 = 4;
/// Spatial offset that decorrelates the second displacement sample.
const SECOND_SAMPLE_OFFSET: (f64, f64) = (17.31, 9.17);
const CURL_GAIN: f64 = 1.65;
const CURL_SCALE: f64 = 1.15;
const FILAMENT_DRIFT: (f64, f64) = (0.12, -0.09);

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TurbulenceParams {
    pub seed: u32,
    pub disp_scale: f64,
    pub flow_x: f64,
    pub flow_y: f64,
    pub fil_scale: f64,
    pub ridge_power: f64,
    pub spark_threshold: f64,
    pub spark_power: f64,
    pub filament_weight: f64,
    pub spark_weight: f64,
    pub flicker_amplitude: f64,
    pub flicker_period_seconds: f64,
}

impl Default for TurbulenceParams {
    fn default() -> Self {
        Self {
            seed: 0x5EED_0001,
            disp_scale: 2.1,
            flow_x: 0.28,
            flow_y: 0.22,
            fil_scale: 7.75,
            ridge_power: 3.25,
            spark_threshold: 0.62,
            spark_power: 2.1,
            filament_weight: 0.85,
            spark_weight: 0.55,
            flicker_amplitude: 0.10,
            flicker_period_seconds: 2.0,
        }
    }
}

/// Field side length for a working buffer, clamped to `[220, 380]`.
pub fn field_resolution(work_width: u32, work_height: u32) -> u32 {
    let long_edge = work_width.max(work_height) as f32;
    ((long_edge * FIELD_RES_FACTOR).round() as u32).clamp(MIN_FIELD_RES, MAX_FIELD_RES)
}

fn smoothstep(edge0: f64, edge1: f64, x: f64) -> f64 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Displacement, spark and filament for one normalized position.
pub fn sample_texel(u: f64, v: f64, t_seconds: f64, params: &TurbulenceParams) -> FieldTexel {
    let ds = params.disp_scale;
    let nx = fbm(
        u * ds + t_seconds * params.flow_x,
        v * ds + t_seconds * params.flow_y,
        DISPLACEMENT_OCTAVES,
        params.seed,
    );
    let ny = fbm(
        u * ds + SECOND_SAMPLE_OFFSET.0 - t_seconds * params.flow_y,
        v * ds + SECOND_SAMPLE_OFFSET.1 + t_seconds * params.flow_x,
        DISPLACEMENT_OCTAVES,
        params.seed.wrapping_add(1),
    );

    let raw_x = nx * 2.0 - 1.0;
    let raw_y = ny * 2.0 - 1.0;
    let angle = (nx + ny - 1.0) * CURL_GAIN;
    let (sin, cos) = angle.sin_cos();
    let dx = (raw_x * cos - raw_y * sin) * CURL_SCALE;
    let dy = (raw_x * sin + raw_y * cos) * CURL_SCALE;

    let fs = params.fil_scale;
    let n = fbm(
        u * fs + t_seconds * FILAMENT_DRIFT.0,
        v * fs + t_seconds * FILAMENT_DRIFT.1,
        FILAMENT_OCTAVES,
        params.seed.wrapping_add(2),
    );
    let ridged = 1.0 - (2.0 * n - 1.0).abs();
    let filament = ridged.powf(params.ridge_power);
    let spark = smoothstep(params.spark_threshold, 1.0, n).powf(params.spark_power);

    let flicker = flicker(t_seconds, params);
    let blended =
        (params.filament_weight * filament + params.spark_weight * spark).clamp(0.0, 1.0);

    FieldTexel {
        dx: dx.clamp(-1.0, 1.0) as f32,
        dy: dy.clamp(-1.0, 1.0) as f32,
        spark: (spark * flicker).clamp(0.0, 1.0) as f32,
        filament: (blended * flicker).clamp(0.0, 1.0) as f32,
    }
}

/// Slow global brightness wobble around 1.0.
pub fn flicker(t_seconds: f64, params: &TurbulenceParams) -> f64 {
    let period = params.flicker_period_seconds.max(f64::EPSILON);
    1.0 + params.flicker_amplitude * (TAU * t_seconds / period).sin()
}

/// Square texel buffer rewritten in place every tick.
#[derive(Debug, Clone)]
pub struct TurbulenceField {
    grid: PixelGrid<4>,
    last_time: Option<f64>,
}

impl TurbulenceField {
    pub fn new(res: u32) -> Self {
        let res = res.max(1);
        Self {
            grid: PixelGrid::new(res, res),
            last_time: None,
        }
    }

    pub fn res(&self) -> u32 {
        self.grid.width()
    }

    pub fn last_time(&self) -> Option<f64> {
        self.last_time
    }

    pub fn data(&self) -> &[u8] {
        self.grid.data()
    }

    pub fn texel(&self, x: u32, y: u32) -> FieldTexel {
        FieldTexel::decode(self.grid.pixel(x, y))
    }

    pub fn synthesize(&mut self, t_seconds: f64, params: &TurbulenceParams) {
        let res = self.res();
        let inv = 1.0 / f64::from(res);
        for y in 0..res {
            let v = f64::from(y) * inv;
            for x in 0..res {
                let u = f64::from(x) * inv;
                let packed = sample_texel(u, v, t_seconds, params).encode();
                self.grid.pixel_mut(x, y).copy_from_slice(&packed);
            }
        }
        self.last_time = Some(t_seconds);
    }

    /// Bilinear sample at normalized `(u, v)`, clamped at the edges.
    pub fn sample_bilinear(&self, u: f32, v: f32) -> FieldTexel {
        let res = self.res();
        let max = (res - 1) as f32;
        let fx = (u * res as f32 - 0.5).clamp(0.0, max);
        let fy = (v * res as f32 - 0.5).clamp(0.0, max);
        let x0 = fx.floor() as u32;
        let y0 = fy.floor() as u32;
        let x1 = (x0 + 1).min(res - 1);
        let y1 = (y0 + 1).min(res - 1);
        let tx = fx - x0 as f32;
        let ty = fy - y0 as f32;

        let p00 = self.grid.pixel(x0, y0);
        let p10 = self.grid.pixel(x1, y0);
        let p01 = self.grid.pixel(x0, y1);
        let p11 = self.grid.pixel(x1, y1);

        let mut mixed = [0.0_f32; 4];
        for (c, slot) in mixed.iter_mut().enumerate() {
            let top = f32::from(p00[c]) * (1.0 - tx) + f32::from(p10[c]) * tx;
            let bottom = f32::from(p01[c]) * (1.0 - tx) + f32::from(p11[c]) * tx;
            *slot = top * (1.0 - ty) + bottom * ty;
        }
        FieldTexel::decode_weighted(mixed)
    }
}
