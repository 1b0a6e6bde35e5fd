//! Static source adapter: uploaded images, letterboxed into the raster buffer.

use std::path::Path;

use anyhow::Context;
use image::RgbaImage;

use crate::error::PipelineResult;
use crate::frame::{Placement, RasterBuffer};

/// Decode an uploaded image (any enabled format) into RGBA.
pub fn decode_image(bytes: &[u8]) -> PipelineResult<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

pub fn read_image(path: &Path) -> PipelineResult<RgbaImage> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read image {}", path.display()))?;
    decode_image(&bytes)
}

/// Uniform scale that fits `image` inside `buffer` without cropping, centered.
pub fn letterbox(image: (u32, u32), buffer: (u32, u32)) -> Placement {
    let (iw, ih) = image;
    let (bw, bh) = buffer;
    if iw == 0 || ih == 0 {
        return Placement {
            scale: 0.0,
            x: bw / 2,
            y: bh / 2,
            width: 0,
            height: 0,
        };
    }
    let scale = (bw as f64 / iw as f64).min(bh as f64 / ih as f64);
    let width = ((iw as f64 * scale).round() as u32).min(bw);
    let height = ((ih as f64 * scale).round() as u32).min(bh);
    Placement {
        scale,
        x: (bw - width) / 2,
        y: (bh - height) / 2,
        width,
        height,
    }
}

/// Clear the buffer and draw `image` letterboxed. Never mirrored.
pub fn composite_image(image: &RgbaImage, buffer: &mut RasterBuffer) -> Placement {
    let placement = letterbox(image.dimensions(), buffer.dimensions());
    buffer.clear();
    buffer.draw_placed(image, placement);
    log::debug!(
        "StaticSource: {}x{} image drawn at ({}, {}) as {}x{}",
        image.width(),
        image.height(),
        placement.x,
        placement.y,
        placement.width,
        placement.height
    );
    placement
}
