//! Bubble candidate detection.
//!
//! Two strategies run over the binary ink mask:
//! - [`circle_transform`]: gradient-voting circle transform (primary),
//! - [`contour`]: external contours filtered by area and circularity
//!   (fallback, used when the primary finds fewer bubbles than the template
//!   expects).
//!
//! Fallback results are appended to the primary list. Overlaps between the
//! two are reported and, on request, merged by [`dedup`].

pub mod circle_transform;
pub mod contour;
pub mod dedup;

use image::GrayImage;

use crate::error::Result;
use crate::template::Template;

pub use circle_transform::CircleTransformConfig;
pub use contour::ContourConfig;

/// Strategy that produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    CircleTransform,
    Contour,
}

/// Shape measurements available for contour-derived candidates.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ShapeMetrics {
    /// Enclosed polygon area (pixels²).
    pub area: f64,
    /// `4π·area / perimeter²`, 1.0 for a perfect circle.
    pub circularity: f64,
}

/// A detected circular region not yet assigned to a question slot.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Candidate {
    /// Sequential index over the final candidate list.
    pub id: usize,
    pub x: u32,
    pub y: u32,
    pub radius: u32,
    pub method: DetectionMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<ShapeMetrics>,
}

impl Candidate {
    pub(crate) fn center_distance_sq(&self, other: &Candidate) -> i64 {
        let dx = self.x as i64 - other.x as i64;
        let dy = self.y as i64 - other.y as i64;
        dx * dx + dy * dy
    }

    /// True when either center lies inside the other candidate's disc.
    pub fn overlaps(&self, other: &Candidate) -> bool {
        let r = self.radius.max(other.radius) as i64;
        self.center_distance_sq(other) < r * r
    }
}

/// When the contour fallback may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStrategy {
    /// Circle transform only.
    CircleOnly,
    /// Circle transform, then contours when it comes up short.
    #[default]
    CircleWithContourFallback,
}

/// Candidate detection configuration.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub strategy: DetectionStrategy,
    pub circle: CircleTransformConfig,
    pub contour: ContourConfig,
    /// Drop the later candidate of each overlapping pair.
    pub merge_overlaps: bool,
}

/// Output of [`detect_candidates`].
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CandidateSet {
    pub candidates: Vec<Candidate>,
    /// Number of candidates found by the circle transform.
    pub primary_count: usize,
    /// Number of candidates appended by the contour fallback.
    pub secondary_count: usize,
    pub fallback_triggered: bool,
    /// Overlapping pairs found in the combined list (before any merging).
    pub overlapping_pairs: usize,
}

/// Detect bubble candidates in a binary mask.
pub fn detect_candidates(
    mask: &GrayImage,
    template: &Template,
    config: &DetectionConfig,
) -> Result<CandidateSet> {
    let r_min = template.bubble_radius_min;
    let r_max = template.bubble_radius_max;

    let mut candidates = circle_transform::find_circles(mask, r_min, r_max, &config.circle)?;
    let primary_count = candidates.len();
    let expected = template.expected_bubbles();
    tracing::debug!(primary_count, expected, "circle transform finished");

    let fallback_triggered = primary_count < expected
        && config.strategy == DetectionStrategy::CircleWithContourFallback;
    let mut secondary_count = 0;
    if fallback_triggered {
        let secondary = contour::find_contour_bubbles(mask, r_min, r_max, &config.contour);
        secondary_count = secondary.len();
        tracing::info!(
            "contour fallback: {} circle candidates < {} expected, {} contour candidates added",
            primary_count,
            expected,
            secondary_count
        );
        candidates.extend(secondary);
    }

    let overlapping_pairs = dedup::count_overlapping_pairs(&candidates);
    if overlapping_pairs > 0 {
        tracing::warn!(
            overlapping_pairs,
            merged = config.merge_overlaps,
            "overlapping bubble candidates"
        );
    }
    if config.merge_overlaps {
        candidates = dedup::merge_overlapping(candidates);
    }

    for (id, c) in candidates.iter_mut().enumerate() {
        c.id = id;
    }

    Ok(CandidateSet {
        candidates,
        primary_count,
        secondary_count,
        fallback_triggered,
        overlapping_pairs,
    })
}
