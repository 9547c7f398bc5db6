use std::collections::HashMap;
use std::fs;
use std::path::Path;

use fontdue::layout::{
    CoordinateSystem, GlyphRasterConfig, HorizontalAlign, Layout, LayoutSettings, TextStyle,
    VerticalAlign, WrapStyle,
};
use fontdue::{Font, FontSettings};
use tiny_skia::{Paint, Pixmap, Rect, Transform};

use crate::error::MosaicError;
use crate::pixels::blend_straight_over;

const BLOCK_ADVANCE: f32 = 0.56;
const BLOCK_HEIGHT: f32 = 0.64;
const BLOCK_GAP: f32 = 0.08;

#[derive(Debug, Clone)]
struct GlyphBitmap {
    width: usize,
    height: usize,
    bitmap: Vec<u8>,
}

pub struct FontPainter {
    font: Font,
    glyph_cache: HashMap<GlyphRasterConfig, GlyphBitmap>,
    layout: Layout,
}

impl FontPainter {
    pub fn load(font_path: &Path) -> Result<Self, MosaicError> {
        let bytes = fs::read(font_path).map_err(|error| MosaicError::FontLoad {
            path: font_path.to_path_buf(),
            reason: error.to_string(),
        })?;
        Self::from_bytes(bytes, font_path)
    }

    pub fn from_bytes(bytes: Vec<u8>, origin: &Path) -> Result<Self, MosaicError> {
        let font = Font::from_bytes(bytes, FontSettings::default()).map_err(|error| {
            MosaicError::FontLoad {
                path: origin.to_path_buf(),
                reason: error.to_owned(),
            }
        })?;
        Ok(Self {
            font,
            glyph_cache: HashMap::new(),
            layout: Layout::new(CoordinateSystem::PositiveYDown),
        })
    }

    fn draw_centered(
        &mut self,
        pixmap: &mut Pixmap,
        cx: f32,
        cy: f32,
        text: &str,
        size: f32,
        rgba: [u8; 4],
    ) {
        self.layout.reset(&LayoutSettings {
            x: 0.0,
            y: 0.0,
            max_width: None,
            max_height: None,
            horizontal_align: HorizontalAlign::Left,
            vertical_align: VerticalAlign::Top,
            line_height: 1.0,
            wrap_style: WrapStyle::Letter,
            wrap_hard_breaks: false,
        });
        self.layout
            .append(&[&self.font], &TextStyle::new(text, size, 0));

        let glyphs = self.layout.glyphs();
        let Some(right) = glyphs
            .iter()
            .map(|glyph| glyph.x + glyph.width as f32)
            .reduce(f32::max)
        else {
            return;
        };
        let left = glyphs.iter().map(|glyph| glyph.x).fold(right, f32::min);
        let offset_x = cx - (left + right) / 2.0;
        let offset_y = cy - self.layout.height() / 2.0;

        for glyph in glyphs {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let font = &self.font;
            let bitmap = self.glyph_cache.entry(glyph.key).or_insert_with(|| {
                let (_, bitmap) = font.rasterize_config(glyph.key);
                GlyphBitmap {
                    width: glyph.width,
                    height: glyph.height,
                    bitmap,
                }
            });
            blend_glyph(
                pixmap,
                (glyph.x + offset_x).round() as i32,
                (glyph.y + offset_y).round() as i32,
                bitmap,
                rgba,
            );
        }
    }
}

fn blend_glyph(pixmap: &mut Pixmap, x: i32, y: i32, glyph: &GlyphBitmap, rgba: [u8; 4]) {
    let width = pixmap.width() as i32;
    let height = pixmap.height() as i32;
    let pixels = pixmap.pixels_mut();
    for row in 0..glyph.height {
        let py = y + row as i32;
        if py < 0 || py >= height {
            continue;
        }
        for col in 0..glyph.width {
            let px = x + col as i32;
            if px < 0 || px >= width {
                continue;
            }
            let coverage = glyph.bitmap[row * glyph.width + col];
            if coverage == 0 {
                continue;
            }
            let alpha = f32::from(coverage) / 255.0 * f32::from(rgba[3]) / 255.0;
            let idx = (py * width + px) as usize;
            blend_straight_over(&mut pixels[idx], [rgba[0], rgba[1], rgba[2]], alpha);
        }
    }
}

/// Draws tile text centred on the tile position.
pub enum TextPainter {
    Font(Box<FontPainter>),
    /// Font-free rendering: one filled cell per visible character.
    Blocks,
}

impl TextPainter {
    pub fn from_font_path(font_path: Option<&Path>) -> Result<Self, MosaicError> {
        match font_path {
            Some(path) => Ok(Self::Font(Box::new(FontPainter::load(path)?))),
            None => Ok(Self::Blocks),
        }
    }

    pub fn is_font(&self) -> bool {
        matches!(self, Self::Font(_))
    }

    pub fn draw(
        &mut self,
        pixmap: &mut Pixmap,
        cx: f32,
        cy: f32,
        text: &str,
        size: f32,
        rgba: [u8; 4],
    ) {
        if text.trim().is_empty() || !size.is_finite() || size <= 0.0 {
            return;
        }
        match self {
            Self::Font(painter) => painter.draw_centered(pixmap, cx, cy, text, size, rgba),
            Self::Blocks => draw_blocks(pixmap, cx, cy, text, size, rgba),
        }
    }
}

fn draw_blocks(pixmap: &mut Pixmap, cx: f32, cy: f32, text: &str, size: f32, rgba: [u8; 4]) {
    let advance = size * BLOCK_ADVANCE;
    let cell_height = size * BLOCK_HEIGHT;
    let gap = advance * BLOCK_GAP;
    let count = text.chars().count() as f32;
    let left = cx - advance * count / 2.0;
    let top = cy - cell_height / 2.0;

    let mut paint = Paint::default();
    paint.set_color_rgba8(rgba[0], rgba[1], rgba[2], rgba[3]);
    paint.anti_alias = true;

    for (i, ch) in text.chars().enumerate() {
        if ch.is_whitespace() {
            continue;
        }
        let x = left + advance * i as f32 + gap / 2.0;
        if let Some(rect) = Rect::from_xywh(x, top, (advance - gap).max(0.5), cell_height) {
            pixmap.fill_rect(rect, &paint, Transform::identity(), None);
        }
    }
}
