//! Image quality diagnostics.
//!
//! Computed from the grayscale input, independently of the ink mask. The
//! skew estimate is a placeholder and always reports 0.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::filter3x3;

use crate::raster::mean_intensity;
use crate::round_dp;

const LAPLACIAN_3X3: [f32; 9] = [0.0, 1.0, 0.0, 1.0, -4.0, 1.0, 0.0, 1.0, 0.0];

/// Thresholds for the quality tiers.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Resolution is good only when width exceeds this.
    pub min_width: u32,
    /// Resolution is good only when height exceeds this.
    pub min_height: u32,
    /// Mean intensity below which lighting is "Too Dark".
    pub dark_below: f64,
    /// Mean intensity above which lighting is "Too Bright".
    pub bright_above: f64,
    /// Laplacian variance mapped to a blur score of 1.0.
    pub blur_normalizer: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_width: 800,
            min_height: 600,
            dark_below: 50.0,
            bright_above: 200.0,
            blur_normalizer: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ResolutionTier {
    Good,
    Poor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LightingTier {
    Good,
    #[serde(rename = "Too Bright")]
    TooBright,
    #[serde(rename = "Too Dark")]
    TooDark,
}

/// Quality block reported with every successful result.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ImageQuality {
    pub resolution: ResolutionTier,
    pub lighting: LightingTier,
    /// Degrees. Always 0.0.
    pub skew_angle: f64,
    /// Laplacian variance over `blur_normalizer`, clamped to `[0, 1]`,
    /// two decimals. Higher means sharper.
    pub blur_score: f64,
}

/// Variance of the 3×3 Laplacian response.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return 0.0;
    }
    let data: Vec<f32> = gray.as_raw().iter().map(|&v| v as f32).collect();
    let Some(img) = ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(w, h, data) else {
        return 0.0;
    };
    let response: Vec<f32> = filter3x3(&img, &LAPLACIAN_3X3).into_raw();
    let n = response.len() as f64;
    let mean = response.iter().map(|&v| v as f64).sum::<f64>() / n;
    response
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n
}

/// Assess resolution, lighting and sharpness of a grayscale sheet.
pub fn assess(gray: &GrayImage, config: &QualityConfig) -> ImageQuality {
    let (w, h) = gray.dimensions();
    let resolution = if w > config.min_width && h > config.min_height {
        ResolutionTier::Good
    } else {
        ResolutionTier::Poor
    };

    let mean = mean_intensity(gray);
    let lighting = if mean > config.bright_above {
        LightingTier::TooBright
    } else if mean < config.dark_below {
        LightingTier::TooDark
    } else {
        LightingTier::Good
    };

    let normalizer = if config.blur_normalizer > 0.0 {
        config.blur_normalizer
    } else {
        1.0
    };
    let blur_score = round_dp((laplacian_variance(gray) / normalizer).clamp(0.0, 1.0), 2);

    ImageQuality {
        resolution,
        lighting,
        skew_angle: 0.0,
        blur_score,
    }
}
