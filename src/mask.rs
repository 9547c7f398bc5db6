//! Shape stencils: grayscale source images reduced to single-channel alpha.

use image::imageops::{self, FilterType};
use image::DynamicImage;
use tiny_skia::{IntSize, Mask, Pixmap};

use crate::pixels::{blend_straight_over, PixelGrid};

const BT709_R: f32 = 0.2126;
const BT709_G: f32 = 0.7152;
const BT709_B: f32 = 0.0722;

/// Single-channel opacity stencil. Carries no color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaMask {
    grid: PixelGrid<1>,
}

impl AlphaMask {
    /// All-zero mask: the feature is absent.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            grid: PixelGrid::new(width, height),
        }
    }

    pub fn from_grid(grid: PixelGrid<1>) -> Self {
        Self { grid }
    }

    pub fn width(&self) -> u32 {
        self.grid.width()
    }

    pub fn height(&self) -> u32 {
        self.grid.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.grid.dimensions()
    }

    pub fn data(&self) -> &[u8] {
        self.grid.data()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.grid.data_mut()
    }

    #[inline]
    pub fn alpha(&self, x: u32, y: u32) -> u8 {
        self.grid.pixel(x, y)[0]
    }

    pub fn is_empty(&self) -> bool {
        self.grid.data().iter().all(|&a| a == 0)
    }

    pub fn coverage(&self) -> usize {
        self.grid.data().iter().filter(|&&a| a > 0).count()
    }

    /// Nearest-pixel lookup clamped to the mask bounds.
    ///
    /// Non-finite coordinates read as transparent.
    pub fn sample_nearest(&self, x: f32, y: f32) -> u8 {
        if !x.is_finite() || !y.is_finite() || self.width() == 0 || self.height() == 0 {
            return 0;
        }
        let max_x = self.width() as i64 - 1;
        let max_y = self.height() as i64 - 1;
        let ix = (x.floor() as i64).clamp(0, max_x) as u32;
        let iy = (y.floor() as i64).clamp(0, max_y) as u32;
        self.alpha(ix, iy)
    }

    /// Alpha for a pixel of a `width`x`height` target, rescaling when the
    /// target and the mask differ in size.
    #[inline]
    fn alpha_for_target(&self, x: u32, y: u32, width: u32, height: u32) -> u8 {
        if self.dimensions() == (width, height) {
            return self.alpha(x, y);
        }
        let sx = (x as f32 + 0.5) * self.width() as f32 / width as f32;
        let sy = (y as f32 + 0.5) * self.height() as f32 / height as f32;
        self.sample_nearest(sx, sy)
    }

    /// `self · (1 − other)`.
    pub fn subtract(&self, other: &AlphaMask) -> AlphaMask {
        let mut out = self.clone();
        let (width, height) = self.dimensions();
        for y in 0..height {
            for x in 0..width {
                let a = u32::from(self.alpha(x, y));
                if a == 0 {
                    continue;
                }
                let b = u32::from(other.alpha_for_target(x, y, width, height));
                out.grid.pixel_mut(x, y)[0] = ((a * (255 - b) + 127) / 255) as u8;
            }
        }
        out
    }

    /// Source-over union of two stencils.
    pub fn union(&self, other: &AlphaMask) -> AlphaMask {
        let mut out = self.clone();
        let (width, height) = self.dimensions();
        for y in 0..height {
            for x in 0..width {
                let a = u32::from(self.alpha(x, y));
                let b = u32::from(other.alpha_for_target(x, y, width, height));
                let combined = a + b - (a * b + 127) / 255;
                out.grid.pixel_mut(x, y)[0] = combined.min(255) as u8;
            }
        }
        out
    }

    /// Copy into a `tiny_skia::Mask` for clipped drawing.
    pub fn to_skia_mask(&self) -> Option<Mask> {
        let size = IntSize::from_wh(self.width(), self.height())?;
        Mask::from_vec(self.grid.data().to_vec(), size)
    }
}

/// Rasterize a grayscale shape image into an alpha mask.
///
/// Luminance at or below `threshold` is cut to zero; above it the luminance
/// itself becomes the alpha, which keeps anti-aliased edges soft.
pub fn to_alpha_mask(image: &DynamicImage, width: u32, height: u32, threshold: u8) -> AlphaMask {
    let rgba = image.to_rgba8();
    let resized = if rgba.dimensions() == (width, height) {
        rgba
    } else {
        imageops::resize(&rgba, width, height, FilterType::Triangle)
    };

    let mut grid = PixelGrid::<1>::new(width, height);
    for (x, y, px) in resized.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let luma = BT709_R * f32::from(r) + BT709_G * f32::from(g) + BT709_B * f32::from(b);
        let luma = (luma * f32::from(a) / 255.0).round().clamp(0.0, 255.0) as u8;
        grid.pixel_mut(x, y)[0] = if luma <= threshold { 0 } else { luma };
    }
    AlphaMask::from_grid(grid)
}

/// Expand a mask by compositing it at every offset in `[-radius, radius]²`.
pub fn dilate(mask: &AlphaMask, radius: u32) -> AlphaMask {
    if radius == 0 {
        return mask.clone();
    }
    let (width, height) = mask.dimensions();
    let r = radius as i64;
    let mut remaining = vec![1.0_f32; width as usize * height as usize];

    for dy in -r..=r {
        for dx in -r..=r {
            for y in 0..height as i64 {
                let sy = y - dy;
                if sy < 0 || sy >= height as i64 {
                    continue;
                }
                for x in 0..width as i64 {
                    let sx = x - dx;
                    if sx < 0 || sx >= width as i64 {
                        continue;
                    }
                    let a = mask.alpha(sx as u32, sy as u32);
                    if a == 0 {
                        continue;
                    }
                    let idx = (y * width as i64 + x) as usize;
                    remaining[idx] *= 1.0 - f32::from(a) / 255.0;
                }
            }
        }
    }

    let mut out = AlphaMask::empty(width, height);
    for (dst, transmitted) in out.data_mut().iter_mut().zip(remaining) {
        if transmitted < 1.0 {
            let alpha = ((1.0 - transmitted) * 255.0).round().clamp(1.0, 255.0);
            *dst = alpha as u8;
        }
    }
    out
}

/// Paint `rgb` at `alpha`, clipped to `mask`, over `target`.
pub fn fill_through_mask(target: &mut Pixmap, mask: &AlphaMask, rgb: [u8; 3], alpha: f32) {
    if alpha <= 0.0 {
        return;
    }
    let width = target.width();
    let height = target.height();
    let pixels = target.pixels_mut();
    for y in 0..height {
        for x in 0..width {
            let m = mask.alpha_for_target(x, y, width, height);
            if m == 0 {
                continue;
            }
            let idx = (y * width + x) as usize;
            blend_straight_over(&mut pixels[idx], rgb, alpha * f32::from(m) / 255.0);
        }
    }
}

/// Alpha-intersect a layer with a stencil, in place.
pub fn clip_to_mask(layer: &mut Pixmap, mask: &AlphaMask) {
    let width = layer.width();
    let height = layer.height();
    let pixels = layer.pixels_mut();
    for y in 0..height {
        for x in 0..width {
            let idx = (y * width + x) as usize;
            let px = pixels[idx];
            if px.alpha() == 0 {
                continue;
            }
            let m = u16::from(mask.alpha_for_target(x, y, width, height));
            if m == 255 {
                continue;
            }
            let scale = |c: u8| ((u16::from(c) * m + 127) / 255) as u8;
            pixels[idx] = tiny_skia::PremultipliedColorU8::from_rgba(
                scale(px.red()),
                scale(px.green()),
                scale(px.blue()),
                scale(px.alpha()),
            )
            .unwrap_or(tiny_skia::PremultipliedColorU8::TRANSPARENT);
        }
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;

    fn solid(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([value, value, value, 255]),
        ))
    }

    fn dot_mask(width: u32, height: u32, at: (u32, u32)) -> AlphaMask {
        let mut mask = AlphaMask::empty(width, height);
        let idx = (at.1 * width + at.0) as usize;
        mask.data_mut()[idx] = 200;
        mask
    }

    #[test]
    fn white_source_is_fully_opaque() {
        let mask = to_alpha_mask(&solid(8, 8, 255), 16, 12, 0);
        assert_eq!(mask.dimensions(), (16, 12));
        assert!(mask.data().iter().all(|&a| a == 255));
    }

    #[test]
    fn black_source_is_fully_transparent() {
        let mask = to_alpha_mask(&solid(8, 8, 0), 16, 12, 0);
        assert!(mask.is_empty());
    }

    #[test]
    fn threshold_cuts_dim_luminance_but_keeps_soft_values() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([40, 40, 40, 255]));
        img.put_pixel(1, 0, Rgba([180, 180, 180, 255]));
        let mask = to_alpha_mask(&DynamicImage::ImageRgba8(img), 2, 1, 64);
        assert_eq!(mask.alpha(0, 0), 0);
        assert_eq!(mask.alpha(1, 0), 180, "alpha carries luminance, not a hard step");
    }

    #[test]
    fn dilate_zero_is_identity() {
        let mask = dot_mask(9, 9, (4, 4));
        assert_eq!(dilate(&mask, 0), mask);
    }

    #[test]
    fn dilate_grows_a_superset() {
        let mask = dot_mask(9, 9, (4, 4));
        let grown = dilate(&mask, 2);
        for (before, after) in mask.data().iter().zip(grown.data()) {
            if *before > 0 {
                assert!(*after > 0);
            }
        }
        assert_eq!(grown.coverage(), 25);
        assert_eq!(grown.alpha(2, 2), 200);
        assert_eq!(grown.alpha(1, 1), 0);
    }

    #[test]
    fn subtract_removes_covered_area() {
        let full = to_alpha_mask(&solid(4, 4, 255), 4, 4, 0);
        let hole = dot_mask(4, 4, (1, 1));
        let mut opaque_hole = hole.clone();
        opaque_hole.data_mut()[5] = 255;
        let body = full.subtract(&opaque_hole);
        assert_eq!(body.alpha(1, 1), 0);
        assert_eq!(body.alpha(0, 0), 255);
    }

    #[test]
    fn fill_through_mask_only_touches_masked_pixels() {
        let mut target = Pixmap::new(4, 4).expect("pixmap");
        let mask = dot_mask(4, 4, (2, 3));
        fill_through_mask(&mut target, &mask, [255, 0, 0], 1.0);
        let pixels = target.pixels();
        assert_eq!(pixels[(3 * 4 + 2) as usize].alpha(), 200);
        assert_eq!(pixels[0].alpha(), 0);
    }

    #[test]
    fn clip_to_mask_zeroes_outside_stencil() {
        let mut layer = Pixmap::new(4, 4).expect("pixmap");
        layer.fill(tiny_skia::Color::WHITE);
        clip_to_mask(&mut layer, &dot_mask(4, 4, (0, 0)));
        assert_eq!(layer.pixels()[0].alpha(), 200);
        assert!(layer.pixels()[1..].iter().all(|px| px.alpha() == 0));
    }

    #[test]
    fn nearest_sampling_clamps_out_of_range_points() {
        let mask = dot_mask(4, 4, (3, 3));
        assert_eq!(mask.sample_nearest(100.0, 100.0), 200);
        assert_eq!(mask.sample_nearest(-5.0, -5.0), 0);
        assert_eq!(mask.sample_nearest(f32::NAN, 1.0), 0);
    }
}
