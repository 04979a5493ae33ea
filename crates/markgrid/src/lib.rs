//! markgrid: pure-Rust optical mark recognition for bubble answer sheets.
//!
//! The pipeline stages are:
//!
//! 1. **Preprocess** – Gaussian smoothing, inverted adaptive threshold,
//!    morphological close/open; yields a binary ink mask.
//! 2. **Candidates** – gradient-voting circle transform, with a
//!    contour/circularity fallback when too few bubbles are found.
//! 3. **Grid** – candidates to `(question, choice)` slots, exact row
//!    partitioning or horizontal banding.
//! 4. **Fill** – per-bubble ink ratio, per-question mark resolution
//!    (blank, marked, weak mark, multi-mark) and margin confidence.
//! 5. **Grading** – comparison with the answer key.
//! 6. **Quality** – resolution, lighting and sharpness diagnostics.
//!
//! # Public API
//! - [`OmrEngine`] as the primary entry point
//! - [`TemplateRegistry`] and [`Template`] for sheet layouts
//! - [`OmrConfig`] for tuning every threshold
//! - [`Outcome`], [`ProcessingResult`] and [`ErrorResult`] as results

mod api;
pub mod candidate;
mod config;
pub mod debug_dump;
mod error;
pub mod fill;
pub mod grading;
pub mod grid;
mod pipeline;
pub mod preprocess;
pub mod quality;
mod raster;
pub mod render;
mod template;

#[cfg(test)]
pub(crate) mod test_utils;

pub use api::OmrEngine;
pub use candidate::{
    Candidate, CandidateSet, CircleTransformConfig, ContourConfig, DetectionConfig,
    DetectionMethod, DetectionStrategy, ShapeMetrics,
};
pub use config::OmrConfig;
pub use debug_dump::DebugDump;
pub use error::{ErrorCode, ErrorResult, OmrError, Result, Stage};
pub use fill::{FillThresholds, MarkResolution, QuestionReport, WeakMarkPolicy};
pub use grading::GradeReport;
pub use grid::{GridPolicy, ReconstructionConfig, ReconstructionMode};
pub use pipeline::{analyze, Outcome, ProcessingResult, SheetAnalysis};
pub use preprocess::PreprocessConfig;
pub use quality::{ImageQuality, LightingTier, QualityConfig, ResolutionTier};
pub use raster::{PixelBuffer, PixelFormat};
pub use render::{render_sheet, SheetLayout};
pub use template::{LayoutTag, Template, TemplateRegistry};

/// Round to `decimals` places, ties to even.
///
/// Ties are judged on the exact value of `value * 10^decimals`, so `6.25`
/// rounds to `6.2` while `0.285` (stored slightly below the tie) rounds to
/// `0.28`.
pub(crate) fn round_dp(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    let scaled = value * scale;
    let rounded = if scaled.fract().abs() == 0.5 {
        // Error of the product tells on which side of the tie `value` lies.
        let residual = value.mul_add(scale, -scaled);
        if residual > 0.0 {
            scaled.ceil()
        } else if residual < 0.0 {
            scaled.floor()
        } else {
            scaled.round_ties_even()
        }
    } else {
        scaled.round()
    };
    rounded / scale
}
