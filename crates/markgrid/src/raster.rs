//! Borrowed pixel buffers handed to the engine.

use image::{GrayImage, Luma, RgbImage, RgbaImage};

use crate::error::{OmrError, Result};

/// Channel layout of a [`PixelBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Gray,
    Rgb,
    Bgr,
    Rgba,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb | Self::Bgr => 3,
            Self::Rgba => 4,
        }
    }
}

/// Row-major 8-bit image data without ownership.
#[derive(Debug, Clone, Copy)]
pub struct PixelBuffer<'a> {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: &'a [u8],
}

impl<'a> PixelBuffer<'a> {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: &'a [u8]) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }

    /// Check dimensions and buffer length.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(OmrError::InvalidImage(format!(
                "image has zero size ({}x{})",
                self.width, self.height
            )));
        }
        let expected = (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|n| n.checked_mul(self.format.channels()))
            .ok_or_else(|| OmrError::InvalidImage("image dimensions overflow".to_string()))?;
        if self.data.len() != expected {
            return Err(OmrError::InvalidImage(format!(
                "expected {} bytes for {}x{} {:?}, got {}",
                expected,
                self.width,
                self.height,
                self.format,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Validate and convert to 8-bit luma (BT.601 weights).
    pub fn to_gray(&self) -> Result<GrayImage> {
        self.validate()?;
        let luma = |r: u8, g: u8, b: u8| -> u8 {
            let v = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
            v.round().clamp(0.0, 255.0) as u8
        };
        let ch = self.format.channels();
        let data: Vec<u8> = match self.format {
            PixelFormat::Gray => self.data.to_vec(),
            PixelFormat::Rgb | PixelFormat::Rgba => self
                .data
                .chunks_exact(ch)
                .map(|p| luma(p[0], p[1], p[2]))
                .collect(),
            PixelFormat::Bgr => self
                .data
                .chunks_exact(ch)
                .map(|p| luma(p[2], p[1], p[0]))
                .collect(),
        };
        GrayImage::from_raw(self.width, self.height, data)
            .ok_or_else(|| OmrError::InvalidImage("buffer does not match dimensions".to_string()))
    }
}

impl<'a> From<&'a GrayImage> for PixelBuffer<'a> {
    fn from(img: &'a GrayImage) -> Self {
        Self::new(img.width(), img.height(), PixelFormat::Gray, img.as_raw())
    }
}

impl<'a> From<&'a RgbImage> for PixelBuffer<'a> {
    fn from(img: &'a RgbImage) -> Self {
        Self::new(img.width(), img.height(), PixelFormat::Rgb, img.as_raw())
    }
}

impl<'a> From<&'a RgbaImage> for PixelBuffer<'a> {
    fn from(img: &'a RgbaImage) -> Self {
        Self::new(img.width(), img.height(), PixelFormat::Rgba, img.as_raw())
    }
}

/// Mean intensity of a grayscale image; 0 for an empty image.
pub(crate) fn mean_intensity(gray: &GrayImage) -> f64 {
    let n = gray.as_raw().len();
    if n == 0 {
        return 0.0;
    }
    let sum: u64 = gray.pixels().map(|&Luma([v])| v as u64).sum();
    sum as f64 / n as f64
}
