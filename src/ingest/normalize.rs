use anyhow::{anyhow, Result};
use image::{Rgba, RgbaImage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Yuyv,
    Nv12,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(Self::Rgb24),
            b"YUYV" => Some(Self::Yuyv),
            b"NV12" => Some(Self::Nv12),
            _ => None,
        }
    }
}

/// Convert a captured buffer into the RGBA frame the compositor expects.
pub(crate) fn normalize_to_rgba(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<RgbaImage> {
    let w = width as usize;
    let h = height as usize;
    let plane = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    let expected = match format {
        PixelFormat::Rgb24 => plane * 3,
        PixelFormat::Yuyv => plane * 2,
        PixelFormat::Nv12 => plane + plane / 2,
    };
    // drivers may pad the last buffer; anything shorter is a torn frame
    if pixels.len() < expected {
        return Err(anyhow!(
            "{:?} frame too short: expected {}, got {}",
            format,
            expected,
            pixels.len()
        ));
    }

    let image = match format {
        PixelFormat::Rgb24 => RgbaImage::from_fn(width, height, |x, y| {
            let o = (y as usize * w + x as usize) * 3;
            Rgba([pixels[o], pixels[o + 1], pixels[o + 2], 255])
        }),
        PixelFormat::Yuyv => RgbaImage::from_fn(width, height, |x, y| {
            // Y0 U Y1 V per pixel pair
            let pair = (y as usize * w + (x as usize & !1)) * 2;
            let luma = if x % 2 == 0 { pixels[pair] } else { pixels[pair + 2] };
            yuv_to_rgba(luma, pixels[pair + 1], pixels[pair + 3])
        }),
        PixelFormat::Nv12 => RgbaImage::from_fn(width, height, |x, y| {
            let (i, j) = (x as usize, y as usize);
            let uv = plane + (j / 2) * w + (i / 2) * 2;
            yuv_to_rgba(pixels[j * w + i], pixels[uv], pixels[uv + 1])
        }),
    };
    Ok(image)
}

fn yuv_to_rgba(y: u8, u: u8, v: u8) -> Rgba<u8> {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    Rgba([
        clamp_to_u8(y + 1.402_f32 * v),
        clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v),
        clamp_to_u8(y + 1.772_f32 * u),
        255,
    ])
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
