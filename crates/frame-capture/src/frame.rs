//! Frame types and region cropping

use std::fmt;

use chrono::{DateTime, Utc};
use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};

use crate::CaptureError;

/// Rectangular region of interest inside a composite frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Whether the region lies entirely inside a `width` x `height` frame
    pub fn fits(&self, width: u32, height: u32) -> bool {
        let right = self.x.checked_add(self.width);
        let bottom = self.y.checked_add(self.height);
        matches!((right, bottom), (Some(r), Some(b)) if r <= width && b <= height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Decoded RGB frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// RGB pixel data
    pub image: RgbImage,
    /// Wall-clock capture time
    pub captured_at: DateTime<Utc>,
    /// Capture sequence number (per source)
    pub sequence: u64,
}

impl Frame {
    /// Wrap a decoded image captured now
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image,
            captured_at: Utc::now(),
            sequence,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Convert to grayscale
    pub fn to_grayscale(&self) -> GrayImage {
        let mut gray = GrayImage::new(self.width(), self.height());
        for (x, y, pixel) in self.image.enumerate_pixels() {
            // Luminance formula: 0.299*R + 0.587*G + 0.114*B
            let luma = pixel[0] as f32 * 0.299
                + pixel[1] as f32 * 0.587
                + pixel[2] as f32 * 0.114;
            gray.put_pixel(x, y, Luma([luma.round().min(255.0) as u8]));
        }
        gray
    }

    /// Crop a region of the frame
    pub fn crop(&self, roi: &Roi) -> Result<Frame, CaptureError> {
        if roi.is_empty() {
            return Err(CaptureError::EmptyRegion(*roi));
        }
        if !roi.fits(self.width(), self.height()) {
            return Err(CaptureError::OutOfBounds {
                roi: *roi,
                width: self.width(),
                height: self.height(),
            });
        }

        let cropped = image::imageops::crop_imm(&self.image, roi.x, roi.y, roi.width, roi.height)
            .to_image();

        Ok(Frame {
            image: cropped,
            captured_at: self.captured_at,
            sequence: self.sequence,
        })
    }
}
