//! Typed pixel buffers and the packing helpers shared by the render passes.

use tiny_skia::{Pixmap, PremultipliedColorU8};

use crate::error::MosaicError;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0001_0000_01b3;

/// Row-major 8-bit buffer with a fixed channel count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid<const CHANNELS: usize> {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl<const CHANNELS: usize> PixelGrid<CHANNELS> {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * CHANNELS],
        }
    }

    pub fn from_vec(width: u32, height: u32, data: Vec<u8>) -> Result<Self, MosaicError> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(MosaicError::BufferLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub const fn channels(&self) -> usize {
        CHANNELS
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * CHANNELS
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let idx = self.index(x, y);
        &self.data[idx..idx + CHANNELS]
    }

    #[inline]
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let idx = self.index(x, y);
        &mut self.data[idx..idx + CHANNELS]
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }
}

/// Signed `[-1, 1]` → `[0, 255]`.
#[inline]
pub fn encode_signed(value: f32) -> u8 {
    ((value.clamp(-1.0, 1.0) * 0.5 + 0.5) * 255.0).round() as u8
}

#[inline]
pub fn decode_signed(byte: u8) -> f32 {
    f32::from(byte) / 255.0 * 2.0 - 1.0
}

/// Unit `[0, 1]` → `[0, 255]`.
#[inline]
pub fn encode_unit(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[inline]
pub fn decode_unit(byte: u8) -> f32 {
    f32::from(byte) / 255.0
}

/// One texel of the turbulence field.
///
/// Channel layout: `[dx, dy, spark, filament]`, displacement signed, the two
/// intensities unit-ranged.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FieldTexel {
    pub dx: f32,
    pub dy: f32,
    pub spark: f32,
    pub filament: f32,
}

impl FieldTexel {
    pub fn encode(&self) -> [u8; 4] {
        [
            encode_signed(self.dx),
            encode_signed(self.dy),
            encode_unit(self.spark),
            encode_unit(self.filament),
        ]
    }

    pub fn decode(bytes: &[u8]) -> Self {
        Self {
            dx: decode_signed(bytes[0]),
            dy: decode_signed(bytes[1]),
            spark: decode_unit(bytes[2]),
            filament: decode_unit(bytes[3]),
        }
    }

    /// Decode from channel values that were already bilinearly mixed.
    pub fn decode_weighted(channels: [f32; 4]) -> Self {
        Self {
            dx: channels[0] / 255.0 * 2.0 - 1.0,
            dy: channels[1] / 255.0 * 2.0 - 1.0,
            spark: channels[2] / 255.0,
            filament: channels[3] / 255.0,
        }
    }
}

pub fn new_pixmap(width: u32, height: u32) -> Result<Pixmap, MosaicError> {
    Pixmap::new(width, height).ok_or(MosaicError::Allocation { width, height })
}

/// Source-over of a straight-alpha color onto one premultiplied pixel.
#[inline]
pub fn blend_straight_over(dst: &mut PremultipliedColorU8, rgb: [u8; 3], alpha: f32) {
    let a = alpha.clamp(0.0, 1.0);
    if a <= 0.0 {
        return;
    }
    let inv = 1.0 - a;
    let mix = |src: u8, dst: u8| -> u8 {
        (f32::from(src) * a + f32::from(dst) * inv)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    let out_a = mix(255, dst.alpha());
    let r = mix(rgb[0], dst.red()).min(out_a);
    let g = mix(rgb[1], dst.green()).min(out_a);
    let b = mix(rgb[2], dst.blue()).min(out_a);
    *dst = PremultipliedColorU8::from_rgba(r, g, b, out_a).unwrap_or(*dst);
}

pub fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
