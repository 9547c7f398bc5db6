#![allow(dead_code)]

use std::path::Path;

use image::{DynamicImage, GrayImage, Luma};
use neon_mosaic::{Plan, RenderConfig, RenderController, ShapeKind, ShapeSource, Tile};
use neon_mosaic::text::TextPainter;

pub const SIZE: u32 = 96;

fn inside(x: u32, y: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> bool {
    (x0..x1).contains(&x) && (y0..y1).contains(&y)
}

/// Grayscale shape image for `kind`; white marks the feature.
pub fn shape_image(kind: ShapeKind) -> GrayImage {
    GrayImage::from_fn(SIZE, SIZE, |x, y| {
        let on = match kind {
            ShapeKind::Silhouette => inside(x, y, 12, 12, 84, 84),
            ShapeKind::Hair => inside(x, y, 12, 12, 84, 26),
            ShapeKind::Headband => inside(x, y, 12, 26, 84, 32),
            ShapeKind::Beak => inside(x, y, 42, 44, 54, 54),
            ShapeKind::Feet => inside(x, y, 12, 76, 84, 84),
            ShapeKind::Eyes => inside(x, y, 30, 34, 36, 40) || inside(x, y, 60, 34, 66, 40),
            ShapeKind::Pupils => inside(x, y, 32, 36, 34, 38) || inside(x, y, 62, 36, 64, 38),
            ShapeKind::Nostrils => inside(x, y, 46, 46, 48, 47),
            ShapeKind::Outline => inside(x, y, 8, 8, 88, 88) && !inside(x, y, 12, 12, 84, 84),
        };
        Luma([if on { 255 } else { 0 }])
    })
}

pub fn shape_source(kind: ShapeKind) -> ShapeSource {
    ShapeSource::Image(DynamicImage::ImageLuma8(shape_image(kind)))
}

pub fn write_shapes(dir: &Path, skip: &[ShapeKind]) {
    for kind in ShapeKind::ALL {
        if skip.contains(&kind) {
            continue;
        }
        shape_image(kind)
            .save(dir.join(kind.file_name()))
            .expect("shape png should write");
    }
}

pub fn tiles() -> Vec<Tile> {
    let mut tiles = Vec::new();
    for row in 0..9 {
        for col in 0..9 {
            tiles.push(Tile {
                kind: "text".into(),
                text: "abc".into(),
                full_text: format!("subscriber {row}-{col}"),
                x: 16.0 + col as f32 * 8.0,
                y: 16.0 + row as f32 * 8.0,
                size: 5.0,
                color: Some(format!("#{:02x}80ff", row * 28)),
            });
        }
    }
    tiles
}

pub fn plan(is_preview: bool, subscriber_count: u64) -> Plan {
    let items = tiles();
    let placed = items.len() as u64;
    Plan {
        width: SIZE,
        height: SIZE,
        items,
        subscriber_count,
        is_preview,
        names_requested: placed,
        names_placed: placed,
    }
}

pub fn config() -> RenderConfig {
    let mut config = RenderConfig::default();
    config.phases.surface_width = 128;
    config.phases.surface_height = 128;
    config
}

pub fn controller(config: RenderConfig) -> RenderController {
    RenderController::with_painter(config, TextPainter::Blocks).expect("controller should build")
}

pub fn provide_shapes(controller: &mut RenderController, skip: &[ShapeKind]) {
    for kind in ShapeKind::ALL {
        if !skip.contains(&kind) {
            controller.provide_shape(kind, shape_source(kind));
        }
    }
}
