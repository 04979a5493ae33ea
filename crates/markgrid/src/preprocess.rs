//! Grayscale image to binary ink mask.
//!
//! Stages: Gaussian smoothing, inverted adaptive threshold against a
//! Gaussian-weighted local mean, then morphological closing and opening.
//! Output pixels are exactly 0 (paper) or 255 (ink).

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::distance_transform::Norm;

use crate::error::{OmrError, Result, Stage};

/// Foreground value in binary masks.
pub const INK: u8 = 255;

type GrayF32 = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Binarization parameters.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Smoothing kernel size (odd, pixels); sigma is derived from it.
    pub blur_kernel: u32,
    /// Neighbourhood size of the local mean (odd, pixels).
    pub block_size: u32,
    /// A pixel is ink iff it is at least this much darker than its local mean.
    pub offset: f32,
    /// Radius of the cross-shaped structuring element; 0 disables morphology.
    pub morph_radius: u8,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            blur_kernel: 5,
            block_size: 11,
            offset: 2.0,
            morph_radius: 1,
        }
    }
}

/// Gaussian sigma conventionally associated with an odd kernel size `k`.
pub fn kernel_sigma(k: u32) -> f32 {
    0.3 * ((k as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

fn to_f32(gray: &GrayImage) -> GrayF32 {
    let (w, h) = gray.dimensions();
    let data = gray.as_raw().iter().map(|&v| v as f32).collect();
    // Same dimensions as the source, so this cannot fail.
    GrayF32::from_raw(w, h, data).unwrap_or_else(|| GrayF32::new(w, h))
}

fn smooth(img: &GrayF32, kernel: u32) -> GrayF32 {
    let sigma = kernel_sigma(kernel);
    if kernel <= 1 || sigma <= 0.0 {
        return img.clone();
    }
    imageproc::filter::gaussian_blur_f32(img, sigma)
}

/// Produce the binary ink mask of a grayscale sheet.
pub fn binarize(gray: &GrayImage, config: &PreprocessConfig) -> Result<GrayImage> {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return Err(OmrError::stage(Stage::Preprocess, "empty image"));
    }
    if config.block_size < 3 || config.block_size % 2 == 0 {
        return Err(OmrError::stage(
            Stage::Preprocess,
            format!("block_size must be odd and >= 3, got {}", config.block_size),
        ));
    }

    let smoothed = smooth(&to_f32(gray), config.blur_kernel);
    let local_mean = smooth(&smoothed, config.block_size);

    let data: Vec<u8> = smoothed
        .as_raw()
        .iter()
        .zip(local_mean.as_raw())
        .map(|(&v, &m)| if v - m <= -config.offset { INK } else { 0 })
        .collect();
    let mask = GrayImage::from_raw(w, h, data)
        .ok_or_else(|| OmrError::stage(Stage::Preprocess, "mask dimensions mismatch"))?;

    if config.morph_radius == 0 {
        return Ok(mask);
    }
    let closed = imageproc::morphology::close(&mask, Norm::L1, config.morph_radius);
    Ok(imageproc::morphology::open(&closed, Norm::L1, config.morph_radius))
}

/// Perspective correction hook. Returns the mask unchanged.
pub fn correct_perspective(mask: GrayImage) -> GrayImage {
    mask
}

/// Full preprocessing: binarize, then the perspective hook.
pub fn preprocess(gray: &GrayImage, config: &PreprocessConfig) -> Result<GrayImage> {
    let mask = binarize(gray, config)?;
    tracing::debug!(
        ink_pixels = mask.as_raw().iter().filter(|&&v| v == INK).count(),
        "binarized {}x{} image",
        mask.width(),
        mask.height()
    );
    Ok(correct_perspective(mask))
}
