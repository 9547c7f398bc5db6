//! Separable gaussian blur over premultiplied RGBA8, fixed-point weights.

use std::collections::HashMap;

use tiny_skia::Pixmap;

use crate::error::MosaicError;

const Q16_ONE: u32 = 1 << 16;

/// Normalized Q16 kernel of `2 * radius + 1` taps; weights sum to exactly
/// `1 << 16`.
pub fn gaussian_kernel_q16(radius: u32, sigma: f32) -> Result<Vec<u32>, MosaicError> {
    if radius == 0 {
        return Ok(vec![Q16_ONE]);
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(MosaicError::ConfigInvalid(
            "blur sigma must be finite and > 0".to_owned(),
        ));
    }

    let r = radius as i32;
    let denom = 2.0 * f64::from(sigma) * f64::from(sigma);
    let weights_f = (-r..=r)
        .map(|i| {
            let x = f64::from(i);
            (-x * x / denom).exp()
        })
        .collect::<Vec<_>>();
    let sum: f64 = weights_f.iter().sum();

    let mut weights = weights_f
        .iter()
        .map(|w| ((w / sum) * f64::from(Q16_ONE)).round().clamp(0.0, 65536.0) as u32)
        .collect::<Vec<_>>();

    // Push rounding drift into the centre tap.
    let acc: i64 = weights.iter().map(|&w| i64::from(w)).sum();
    let centre = radius as usize;
    let fixed = i64::from(weights[centre]) + (i64::from(Q16_ONE) - acc);
    weights[centre] = fixed.clamp(0, i64::from(Q16_ONE)) as u32;
    Ok(weights)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct KernelKey {
    radius: u32,
    sigma_bits: u32,
}

/// Blur helper that caches kernels and reuses its scratch row buffer.
#[derive(Debug, Default)]
pub struct Blurrer {
    kernels: HashMap<KernelKey, Vec<u32>>,
    scratch: Vec<u8>,
}

impl Blurrer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blurred copy of `src` with a radius in pixels; `sigma = radius / 2`.
    pub fn blurred(&mut self, src: &Pixmap, radius: u32) -> Result<Pixmap, MosaicError> {
        let mut out = src.clone();
        if radius == 0 {
            return Ok(out);
        }
        let sigma = (radius as f32 / 2.0).max(0.5);
        let key = KernelKey {
            radius,
            sigma_bits: sigma.to_bits(),
        };
        if !self.kernels.contains_key(&key) {
            let kernel = gaussian_kernel_q16(radius, sigma)?;
            self.kernels.insert(key, kernel);
        }
        let kernel = &self.kernels[&key];

        let (width, height) = (src.width(), src.height());
        self.scratch.resize(src.data().len(), 0);
        horizontal_pass(src.data(), &mut self.scratch, width, height, kernel);
        vertical_pass(&self.scratch, out.data_mut(), width, height, kernel);
        Ok(out)
    }
}

fn horizontal_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    for y in 0..height as i32 {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let sx = (x + ki as i32 - radius).clamp(0, w - 1);
                let idx = ((y * w + sx) as usize) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            write_q16(dst, ((y * w + x) as usize) * 4, acc);
        }
    }
}

fn vertical_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    let h = height as i32;
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let sy = (y + ki as i32 - radius).clamp(0, h - 1);
                let idx = ((sy * w + x) as usize) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            write_q16(dst, ((y * w + x) as usize) * 4, acc);
        }
    }
}

#[inline]
fn write_q16(dst: &mut [u8], idx: usize, acc: [u64; 4]) {
    let alpha = ((acc[3] + 32768) >> 16).min(255) as u8;
    dst[idx + 3] = alpha;
    // Premultiplied color never exceeds alpha.
    for c in 0..3 {
        dst[idx + c] = (((acc[c] + 32768) >> 16).min(255) as u8).min(alpha);
    }
}
