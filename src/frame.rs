//! Shared raster buffer.
//!
//! - `RasterBuffer`: fixed-size RGBA surface both input sources composite into.
//! - `InferenceView`: read-only view the classifier receives.
//!
//! Dimensions are chosen once at construction and never change. Live capture
//! fills the whole surface; static images are letterboxed onto a cleared
//! surface. Neither path retains a frame between cycles.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::classify::{ClassScore, ClassifierBackend};

/// Transparent black, what a cleared canvas holds.
pub const CLEAR_PIXEL: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Region of the buffer an image was drawn into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub scale: f64,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

// ----------------------------------------------------------------------------
// RasterBuffer
// ----------------------------------------------------------------------------

pub struct RasterBuffer {
    image: RgbaImage,
}

impl RasterBuffer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!(
                "raster buffer dimensions must be non-zero (got {}x{})",
                width,
                height
            ));
        }
        Ok(Self {
            image: RgbaImage::from_pixel(width, height, CLEAR_PIXEL),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.image.get_pixel(x, y)
    }

    pub fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = CLEAR_PIXEL;
        }
    }

    /// Scale `frame` to exactly cover the buffer, ignoring aspect ratio.
    ///
    /// With `mirror` the result is flipped about the vertical centerline.
    pub fn draw_stretched(&mut self, frame: &RgbaImage, mirror: bool) {
        let (width, height) = self.dimensions();
        if frame.dimensions() == (width, height) {
            self.image.copy_from_slice(frame.as_raw());
        } else {
            self.image = imageops::resize(frame, width, height, FilterType::Triangle);
        }
        if mirror {
            imageops::flip_horizontal_in_place(&mut self.image);
        }
    }

    /// Draw `image` scaled into `placement`, leaving the rest of the buffer as is.
    pub fn draw_placed(&mut self, image: &RgbaImage, placement: Placement) {
        if placement.width == 0 || placement.height == 0 {
            return;
        }
        let scaled = if image.dimensions() == (placement.width, placement.height) {
            image.clone()
        } else {
            imageops::resize(
                image,
                placement.width,
                placement.height,
                FilterType::Triangle,
            )
        };
        imageops::replace(
            &mut self.image,
            &scaled,
            i64::from(placement.x),
            i64::from(placement.y),
        );
    }

    /// Restricted view for classification.
    pub fn inference_view(&self) -> InferenceView<'_> {
        InferenceView { buffer: self }
    }
}

// ----------------------------------------------------------------------------
// InferenceView
// ----------------------------------------------------------------------------

/// What a classifier backend gets to see: dimensions and RGBA pixels, read-only.
pub struct InferenceView<'a> {
    buffer: &'a RasterBuffer,
}

impl<'a> InferenceView<'a> {
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Run a backend over the buffer. The pixel slice only lives for the call.
    pub fn run_classifier<B: ClassifierBackend + ?Sized>(
        &self,
        backend: &mut B,
        flip_horizontal: bool,
    ) -> Result<Vec<ClassScore>> {
        backend.predict(
            self.buffer.image.as_raw(),
            self.width(),
            self.height(),
            flip_horizontal,
        )
    }
}
