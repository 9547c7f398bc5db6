//! Layered neon composition: region text layers, bloom passes, facial detail,
//! plus the preview build, energy overlay and crossfade helpers.

use std::collections::HashMap;

use log::debug;
use tiny_skia::{BlendMode, FilterQuality, Pixmap, PixmapPaint, PremultipliedColorU8, Transform};

use crate::blur::Blurrer;
use crate::config::{RenderConfig, Rgb};
use crate::error::MosaicError;
use crate::mask::{clip_to_mask, fill_through_mask, AlphaMask};
use crate::pixels::new_pixmap;
use crate::plan::Plan;
use crate::regions::{Region, RegionSet};
use crate::text::TextPainter;

/// Blur radii at or above this are blurred on a downsampled copy.
const DOWNSAMPLE_RADIUS: u32 = 6;
const LARGE_EXTENT: f32 = 3000.0;
const ENERGY_OUTER_RADIUS: u32 = 6;
const ENERGY_INNER_RADIUS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlowRadii {
    pub outer: u32,
    pub mid: u32,
    pub inner: u32,
}

impl GlowRadii {
    /// Radii grow with the plan's long edge, reaching the upper end of each
    /// range at 3000 px.
    pub fn for_extent(width: u32, height: u32) -> Self {
        let s = (width.max(height) as f32 / LARGE_EXTENT).clamp(0.0, 1.0);
        let lerp = |lo: f32, hi: f32| (lo + (hi - lo) * s).round() as u32;
        Self {
            outer: lerp(10.0, 24.0),
            mid: lerp(6.0, 14.0),
            inner: lerp(3.0, 7.0),
        }
    }
}

/// A composed Final frame and what went into it.
#[derive(Debug)]
pub struct FinalComposite {
    pub frame: Pixmap,
    pub region_counts: HashMap<Region, usize>,
    pub static_outline: bool,
    pub headband_active: bool,
}

pub struct Compositor {
    config: RenderConfig,
    painter: TextPainter,
    blurrer: Blurrer,
}

impl Compositor {
    pub fn new(config: RenderConfig) -> Result<Self, MosaicError> {
        let painter = TextPainter::from_font_path(config.font.path.as_deref())?;
        Ok(Self::with_painter(config, painter))
    }

    pub fn with_painter(config: RenderConfig, painter: TextPainter) -> Self {
        Self {
            config,
            painter,
            blurrer: Blurrer::new(),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    fn detail_alpha(&self, population: u64) -> f32 {
        (population as f32 / self.config.masks.detail_full_population as f32).clamp(0.0, 1.0)
    }

    /// Pupil and nostril opacity for `population`, quantized to a byte.
    pub fn detail_level(&self, population: u64) -> u8 {
        (self.detail_alpha(population) * 255.0).round() as u8
    }

    fn region_intensity(&self, region: Region) -> f32 {
        let intensity = &self.config.glow.intensity;
        match region {
            Region::Body => intensity.body,
            Region::Beak => intensity.beak,
            Region::Feet => intensity.feet,
            Region::Headband => intensity.headband,
            Region::Hair => intensity.hair,
        }
    }

    /// Add a blurred copy of `layer` to `target`.
    fn add_blurred(
        &mut self,
        target: &mut Pixmap,
        layer: &Pixmap,
        radius: u32,
        opacity: f32,
    ) -> Result<(), MosaicError> {
        if opacity <= 0.0 {
            return Ok(());
        }
        let factor = (radius / DOWNSAMPLE_RADIUS).max(1);
        if factor == 1 {
            let blurred = self.blurrer.blurred(layer, radius)?;
            draw_layer(target, &blurred, opacity, BlendMode::Plus);
            return Ok(());
        }

        let small_w = layer.width().div_ceil(factor);
        let small_h = layer.height().div_ceil(factor);
        let mut small = new_pixmap(small_w, small_h)?;
        let inv = 1.0 / factor as f32;
        small.draw_pixmap(
            0,
            0,
            layer.as_ref(),
            &PixmapPaint {
                opacity: 1.0,
                blend_mode: BlendMode::Source,
                quality: FilterQuality::Bilinear,
            },
            Transform::from_scale(inv, inv),
            None,
        );
        let blurred = self.blurrer.blurred(&small, (radius / factor).max(1))?;
        let scale = factor as f32;
        target.draw_pixmap(
            0,
            0,
            blurred.as_ref(),
            &PixmapPaint {
                opacity: opacity.clamp(0.0, 1.0),
                blend_mode: BlendMode::Plus,
                quality: FilterQuality::Bilinear,
            },
            Transform::from_scale(scale, scale),
            None,
        );
        Ok(())
    }

    /// Four additive glow passes then one crisp source-over pass.
    pub fn neon_bloom(
        &mut self,
        target: &mut Pixmap,
        layer: &Pixmap,
        intensity: f32,
        radii: GlowRadii,
    ) -> Result<(), MosaicError> {
        let glow = self.config.glow.clone();
        self.add_blurred(target, layer, radii.outer, glow.outer_opacity * intensity)?;
        self.add_blurred(target, layer, radii.mid, glow.mid_opacity * intensity)?;
        self.add_blurred(target, layer, radii.inner, glow.inner_opacity * intensity)?;
        draw_layer(
            target,
            layer,
            glow.core_boost_opacity * intensity,
            BlendMode::Plus,
        );
        draw_layer(target, layer, 1.0, BlendMode::SourceOver);
        Ok(())
    }

    pub fn static_outline_glow(
        &mut self,
        target: &mut Pixmap,
        outline: &AlphaMask,
        radii: GlowRadii,
    ) -> Result<(), MosaicError> {
        if outline.is_empty() {
            return Ok(());
        }
        let mut layer = new_pixmap(target.width(), target.height())?;
        fill_through_mask(&mut layer, outline, self.config.palette.outline_glow, 1.0);
        let intensity = self.config.glow.outline_intensity;
        self.neon_bloom(target, &layer, intensity, radii)
    }

    fn headband_emphasis(
        &mut self,
        target: &mut Pixmap,
        headband: &AlphaMask,
        radii: GlowRadii,
    ) -> Result<(), MosaicError> {
        let palette = self.config.palette.clone();
        let mut layer = new_pixmap(target.width(), target.height())?;
        fill_through_mask(&mut layer, headband, palette.headband_glow, 1.0);
        self.add_blurred(target, &layer, radii.mid, palette.headband_glow_alpha)?;
        draw_layer(
            target,
            &layer,
            palette.headband_glow_alpha * 0.5,
            BlendMode::SourceOver,
        );
        Ok(())
    }

    /// Build the full-color Final frame for `plan`.
    ///
    /// `energy_active` drops the static outline glow; the animated overlay
    /// replaces it.
    pub fn compose_final(
        &mut self,
        plan: &Plan,
        regions: &RegionSet,
        population: u64,
        energy_active: bool,
    ) -> Result<FinalComposite, MosaicError> {
        let (width, height) = (plan.width, plan.height);
        let radii = GlowRadii::for_extent(width, height);
        let palette = self.config.palette.clone();

        let mut frame = new_pixmap(width, height)?;
        fill_through_mask(
            &mut frame,
            &regions.silhouette,
            palette.silhouette_fill,
            palette.silhouette_alpha,
        );

        if let Some(headband) = &regions.headband {
            self.headband_emphasis(&mut frame, headband, radii)?;
        }

        let mut layers: HashMap<Region, Pixmap> = HashMap::new();
        let mut region_counts: HashMap<Region, usize> = HashMap::new();
        for tile in plan.text_tiles() {
            let region = regions.classify(tile);
            *region_counts.entry(region).or_insert(0) += 1;
            let layer = match layers.entry(region) {
                std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert(new_pixmap(width, height)?)
                }
            };
            let [r, g, b] = tile.rgb();
            self.painter
                .draw(layer, tile.x, tile.y, &tile.text, tile.size, [r, g, b, 255]);
        }

        for region in Region::GLOW_ORDER {
            let (Some(mut layer), Some(mask)) =
                (layers.remove(&region), regions.region_mask(region))
            else {
                continue;
            };
            clip_to_mask(&mut layer, mask);
            let intensity = self.region_intensity(region);
            self.neon_bloom(&mut frame, &layer, intensity, radii)?;
        }

        let static_outline = !energy_active && !regions.outline.is_empty();
        if static_outline {
            self.static_outline_glow(&mut frame, &regions.outline, radii)?;
        }

        fill_through_mask(&mut frame, &regions.eyes, palette.eye_white, 1.0);
        let detail = self.detail_alpha(population);
        fill_through_mask(&mut frame, &regions.pupils, palette.pupil, detail);
        fill_through_mask(&mut frame, &regions.nostrils, palette.pupil, detail);

        debug!(
            "final composite {}x{}: {} tiles, static outline {}",
            width,
            height,
            plan.text_tile_count(),
            static_outline
        );
        Ok(FinalComposite {
            frame,
            region_counts,
            static_outline,
            headband_active: regions.headband_active(),
        })
    }

    pub fn preview_builder(
        &mut self,
        plan: &Plan,
        silhouette: AlphaMask,
        outline: &AlphaMask,
    ) -> Result<PreviewBuilder, MosaicError> {
        let (width, height) = (plan.width, plan.height);
        let palette = self.config.palette.clone();
        let mut base = new_pixmap(width, height)?;
        fill_through_mask(
            &mut base,
            &silhouette,
            palette.silhouette_fill,
            palette.silhouette_alpha,
        );
        self.static_outline_glow(&mut base, outline, GlowRadii::for_extent(width, height))?;

        let frame = base.clone();
        Ok(PreviewBuilder {
            base,
            text: new_pixmap(width, height)?,
            frame,
            silhouette,
            cursor: 0,
            batches: 0,
        })
    }

    fn paint_preview_tiles(
        &mut self,
        builder: &mut PreviewBuilder,
        plan: &Plan,
        count: usize,
    ) -> usize {
        let [r, g, b] = self.config.palette.preview_text;
        let tiles = plan
            .text_tiles()
            .skip(builder.cursor)
            .take(count)
            .collect::<Vec<_>>();
        for tile in &tiles {
            self.painter.draw(
                &mut builder.text,
                tile.x,
                tile.y,
                &tile.text,
                tile.size,
                [r, g, b, 255],
            );
        }
        builder.cursor += tiles.len();
        tiles.len()
    }
}

/// Incrementally drawn low-fidelity preview.
pub struct PreviewBuilder {
    base: Pixmap,
    text: Pixmap,
    frame: Pixmap,
    silhouette: AlphaMask,
    cursor: usize,
    batches: usize,
}

impl PreviewBuilder {
    pub fn drawn(&self) -> usize {
        self.cursor
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn is_complete(&self, plan: &Plan) -> bool {
        self.cursor >= plan.text_tile_count()
    }

    pub fn frame(&self) -> &Pixmap {
        &self.frame
    }

    pub fn into_frame(self) -> Pixmap {
        self.frame
    }

    /// Draw the next `count` tiles and refresh the preview frame.
    pub fn draw_batch(&mut self, compositor: &mut Compositor, plan: &Plan, count: usize) -> usize {
        let drawn = compositor.paint_preview_tiles(self, plan, count);
        if drawn == 0 {
            return 0;
        }
        self.frame.data_mut().copy_from_slice(self.base.data());
        let mut clipped = self.text.clone();
        clip_to_mask(&mut clipped, &self.silhouette);
        draw_layer(&mut self.frame, &clipped, 1.0, BlendMode::SourceOver);
        self.batches += 1;
        drawn
    }
}

/// Tints the working-resolution energy mask and lays it over the Final frame.
#[derive(Debug, Default)]
pub struct EnergyOverlay {
    tinted: Option<Pixmap>,
    blurrer: Blurrer,
}

impl EnergyOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(
        &mut self,
        out: &mut Pixmap,
        base: &Pixmap,
        energy: &Pixmap,
        tint: Rgb,
        bloom_opacity: f32,
        core_opacity: f32,
    ) -> Result<(), MosaicError> {
        if out.data().len() == base.data().len() {
            out.data_mut().copy_from_slice(base.data());
        } else {
            *out = base.clone();
        }

        let reuse = self
            .tinted
            .as_ref()
            .is_some_and(|t| t.width() == energy.width() && t.height() == energy.height());
        if !reuse {
            self.tinted = Some(new_pixmap(energy.width(), energy.height())?);
        }
        let Some(tinted) = self.tinted.as_mut() else {
            return Ok(());
        };
        for (dst, src) in tinted.pixels_mut().iter_mut().zip(energy.pixels()) {
            let a = u16::from(src.alpha());
            let scale = |c: u8| ((u16::from(c) * a + 127) / 255) as u8;
            *dst = PremultipliedColorU8::from_rgba(
                scale(tint[0]),
                scale(tint[1]),
                scale(tint[2]),
                src.alpha(),
            )
            .unwrap_or(PremultipliedColorU8::TRANSPARENT);
        }

        let sx = out.width() as f32 / energy.width() as f32;
        let sy = out.height() as f32 / energy.height() as f32;
        let upscale = Transform::from_scale(sx, sy);

        let outer = self.blurrer.blurred(tinted, ENERGY_OUTER_RADIUS)?;
        let inner = self.blurrer.blurred(tinted, ENERGY_INNER_RADIUS)?;
        for (layer, opacity) in [
            (&outer, bloom_opacity * 0.6),
            (&inner, bloom_opacity),
            (&*energy, core_opacity),
        ] {
            out.draw_pixmap(
                0,
                0,
                layer.as_ref(),
                &PixmapPaint {
                    opacity: opacity.clamp(0.0, 1.0),
                    blend_mode: BlendMode::Plus,
                    quality: FilterQuality::Bilinear,
                },
                upscale,
                None,
            );
        }
        Ok(())
    }
}

pub fn draw_layer(target: &mut Pixmap, layer: &Pixmap, opacity: f32, blend_mode: BlendMode) {
    if opacity <= 0.0 {
        return;
    }
    target.draw_pixmap(
        0,
        0,
        layer.as_ref(),
        &PixmapPaint {
            opacity: opacity.clamp(0.0, 1.0),
            blend_mode,
            quality: FilterQuality::Nearest,
        },
        Transform::identity(),
        None,
    );
}

/// Quadratic-eased opacities for crossfade progress `t`.
pub fn crossfade_weights(t: f32) -> (f32, f32) {
    let t = t.clamp(0.0, 1.0);
    ((1.0 - t) * (1.0 - t), t * t)
}

/// Blend `from` into `to` at progress `t`, writing into `out`.
pub fn crossfade(out: &mut Pixmap, from: &Pixmap, to: &Pixmap, t: f32) {
    if t <= 0.0 {
        *out = from.clone();
        return;
    }
    if t >= 1.0 {
        *out = to.clone();
        return;
    }
    if out.width() != to.width() || out.height() != to.height() {
        if let Some(fresh) = Pixmap::new(to.width(), to.height()) {
            *out = fresh;
        }
    } else {
        out.fill(tiny_skia::Color::TRANSPARENT);
    }
    let (alpha_out, alpha_in) = crossfade_weights(t);
    let sx = to.width() as f32 / from.width().max(1) as f32;
    let sy = to.height() as f32 / from.height().max(1) as f32;
    out.draw_pixmap(
        0,
        0,
        from.as_ref(),
        &PixmapPaint {
            opacity: alpha_out,
            blend_mode: BlendMode::SourceOver,
            quality: FilterQuality::Bilinear,
        },
        Transform::from_scale(sx, sy),
        None,
    );
    draw_layer(out, to, alpha_in, BlendMode::SourceOver);
}

/// Contain-fit `src` into `surface`, centred.
pub fn blit(surface: &mut Pixmap, src: &Pixmap) {
    surface.fill(tiny_skia::Color::TRANSPARENT);
    let scale = (surface.width() as f32 / src.width() as f32)
        .min(surface.height() as f32 / src.height() as f32);
    let tx = (surface.width() as f32 - src.width() as f32 * scale) / 2.0;
    let ty = (surface.height() as f32 - src.height() as f32 * scale) / 2.0;
    surface.draw_pixmap(
        0,
        0,
        src.as_ref(),
        &PixmapPaint {
            opacity: 1.0,
            blend_mode: BlendMode::SourceOver,
            quality: FilterQuality::Bilinear,
        },
        Transform::from_row(scale, 0.0, 0.0, scale, tx, ty),
        None,
    );
}

#[cfg(test)]
mod tests {
    use tiny_skia::Color;

    use super::*;
    use crate::plan::Tile;
    use crate::regions::ShapeMasks;

    fn rect_mask(width: u32, height: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> AlphaMask {
        let mut mask = AlphaMask::empty(width, height);
        for y in y0..y1 {
            for x in x0..x1 {
                mask.data_mut()[(y * width + x) as usize] = 255;
            }
        }
        mask
    }

    fn solid(width: u32, height: u32, color: Color) -> Pixmap {
        let mut pixmap = Pixmap::new(width, height).expect("pixmap");
        pixmap.fill(color);
        pixmap
    }

    fn tile(x: f32, y: f32) -> Tile {
        Tile {
            kind: "text".into(),
            text: "ab".into(),
            full_text: "ab".into(),
            x,
            y,
            size: 6.0,
            color: Some("#ff0000".into()),
        }
    }

    fn regions(width: u32, height: u32) -> RegionSet {
        RegionSet::build(
            ShapeMasks {
                silhouette: rect_mask(width, height, 4, 4, width - 4, height - 4),
                hair: rect_mask(width, height, 4, 4, width - 4, 12),
                headband: None,
                beak: AlphaMask::empty(width, height),
                feet: AlphaMask::empty(width, height),
                eyes: rect_mask(width, height, 20, 20, 24, 24),
                pupils: rect_mask(width, height, 21, 21, 23, 23),
                nostrils: AlphaMask::empty(width, height),
                outline: rect_mask(width, height, 2, 2, width - 2, 4),
            },
            0,
        )
    }

    fn plan(width: u32, height: u32) -> Plan {
        Plan {
            width,
            height,
            items: vec![tile(30.0, 8.0), tile(30.0, 40.0), tile(40.0, 45.0)],
            subscriber_count: 0,
            is_preview: false,
            names_requested: 3,
            names_placed: 3,
        }
    }

    fn compositor() -> Compositor {
        Compositor::with_painter(RenderConfig::default(), TextPainter::Blocks)
    }

    #[test]
    fn glow_radii_track_extent() {
        assert_eq!(
            GlowRadii::for_extent(100, 100),
            GlowRadii {
                outer: 10,
                mid: 6,
                inner: 3
            }
        );
        assert_eq!(
            GlowRadii::for_extent(6000, 10),
            GlowRadii {
                outer: 24,
                mid: 14,
                inner: 7
            }
        );
    }

    #[test]
    fn crossfade_endpoints_match_inputs() {
        let from = solid(8, 8, Color::from_rgba8(255, 0, 0, 255));
        let to = solid(8, 8, Color::from_rgba8(0, 0, 255, 255));
        let mut out = Pixmap::new(8, 8).expect("pixmap");

        crossfade(&mut out, &from, &to, 0.0);
        assert_eq!(out.data(), from.data());
        crossfade(&mut out, &from, &to, 1.0);
        assert_eq!(out.data(), to.data());

        crossfade(&mut out, &from, &to, 0.5);
        let px = out.pixels()[0];
        assert!(px.red() > 0 && px.blue() > 0);
    }

    #[test]
    fn crossfade_weights_are_quadratic() {
        let (out, inn) = crossfade_weights(0.5);
        assert!((out - 0.25).abs() < 1e-6);
        assert!((inn - 0.25).abs() < 1e-6);
        assert_eq!(crossfade_weights(2.0), (0.0, 1.0));
    }

    #[test]
    fn final_composite_has_static_outline_without_energy() {
        let mut compositor = compositor();
        let regions = regions(64, 64);
        let composite = compositor
            .compose_final(&plan(64, 64), &regions, 500, false)
            .expect("compose");
        assert!(composite.static_outline);
        assert_eq!(composite.region_counts.get(&Region::Hair), Some(&1));
        assert_eq!(composite.region_counts.get(&Region::Body), Some(&2));
        // Outline strip sits outside the silhouette; only the glow lights it.
        assert!(composite.frame.pixels()[(3 * 64 + 32) as usize].alpha() > 0);
    }

    #[test]
    fn energy_composite_drops_static_outline() {
        let mut compositor = compositor();
        let regions = regions(64, 64);
        let with_glow = compositor
            .compose_final(&plan(64, 64), &regions, 4000, false)
            .expect("compose");
        let without = compositor
            .compose_final(&plan(64, 64), &regions, 4000, true)
            .expect("compose");
        assert!(!without.static_outline);
        let strip = (3 * 64 + 32) as usize;
        assert!(without.frame.pixels()[strip].alpha() < with_glow.frame.pixels()[strip].alpha());
    }

    #[test]
    fn pupils_fade_in_with_population() {
        let mut compositor = compositor();
        let regions = regions(64, 64);
        let pupil = (22 * 64 + 22) as usize;
        let empty = compositor
            .compose_final(&plan(64, 64), &regions, 0, false)
            .expect("compose");
        let full = compositor
            .compose_final(&plan(64, 64), &regions, 1000, false)
            .expect("compose");
        let eye_white = empty.frame.pixels()[pupil];
        let dark = full.frame.pixels()[pupil];
        assert!(eye_white.red() > 200, "no pupil at zero population");
        assert!(dark.red() < 40, "pupil fully drawn at 1000");
    }

    #[test]
    fn preview_builds_in_batches() {
        let mut compositor = compositor();
        let plan = plan(64, 64);
        let regions = regions(64, 64);
        let mut builder = compositor
            .preview_builder(&plan, regions.silhouette.clone(), &regions.outline)
            .expect("builder");
        assert_eq!(builder.draw_batch(&mut compositor, &plan, 2), 2);
        assert!(!builder.is_complete(&plan));
        assert_eq!(builder.draw_batch(&mut compositor, &plan, 2), 1);
        assert!(builder.is_complete(&plan));
        assert_eq!(builder.draw_batch(&mut compositor, &plan, 2), 0);
        assert_eq!(builder.batches(), 2);
    }

    #[test]
    fn blit_contain_fits_and_centres() {
        let src = solid(10, 20, Color::WHITE);
        let mut surface = Pixmap::new(40, 40).expect("pixmap");
        blit(&mut surface, &src);
        assert_eq!(surface.pixels()[(20 * 40 + 2) as usize].alpha(), 0, "letterbox");
        assert_eq!(surface.pixels()[(20 * 40 + 20) as usize].alpha(), 255);
    }
}
