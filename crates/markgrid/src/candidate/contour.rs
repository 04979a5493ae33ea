//! Contour/shape-filter bubble detection.
//!
//! Outermost contours of the ink mask are kept when their enclosed area fits
//! a disc of the template radius range and their outline is round enough.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::arc_length;
use imageproc::point::Point;

use super::{Candidate, DetectionMethod, ShapeMetrics};

/// Configuration for the contour fallback.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ContourConfig {
    /// Minimum `4π·area / perimeter²`.
    pub min_circularity: f64,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            min_circularity: 0.5,
        }
    }
}

/// Zeroth and first polygon moments of a closed outline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PolygonMoments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
}

/// Green's-theorem moments of the polygon through `points` (closed).
///
/// The sign of the area follows the winding; callers use absolute values.
pub(crate) fn polygon_moments(points: &[Point<i32>]) -> PolygonMoments {
    let n = points.len();
    let mut m = PolygonMoments {
        m00: 0.0,
        m10: 0.0,
        m01: 0.0,
    };
    if n < 3 {
        return m;
    }
    for i in 0..n {
        let p = points[i];
        let q = points[(i + 1) % n];
        let (x0, y0, x1, y1) = (p.x as f64, p.y as f64, q.x as f64, q.y as f64);
        let cross = x0 * y1 - x1 * y0;
        m.m00 += cross;
        m.m10 += (x0 + x1) * cross;
        m.m01 += (y0 + y1) * cross;
    }
    m.m00 *= 0.5;
    m.m10 /= 6.0;
    m.m01 /= 6.0;
    m
}

/// Bubble candidates from the outermost contours of `mask`, in discovery order.
pub fn find_contour_bubbles(
    mask: &GrayImage,
    r_min: u32,
    r_max: u32,
    config: &ContourConfig,
) -> Vec<Candidate> {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 || r_min == 0 || r_max < r_min {
        return Vec::new();
    }
    let min_area = std::f64::consts::PI * (r_min as f64).powi(2);
    let max_area = std::f64::consts::PI * (r_max as f64).powi(2);

    let contours = find_contours::<i32>(mask);
    let mut rejected = 0usize;
    let mut out = Vec::new();
    for contour in contours
        .iter()
        .filter(|c| c.parent.is_none() && matches!(c.border_type, BorderType::Outer))
    {
        let moments = polygon_moments(&contour.points);
        let area = moments.m00.abs();
        if area < min_area || area > max_area {
            rejected += 1;
            continue;
        }
        let perim = arc_length(&contour.points, true);
        if perim <= 0.0 {
            rejected += 1;
            continue;
        }
        let circularity = 4.0 * std::f64::consts::PI * area / (perim * perim);
        if circularity < config.min_circularity {
            rejected += 1;
            continue;
        }

        // m00 carries the winding sign, so the ratios are orientation-free.
        let cx = (moments.m10 / moments.m00).floor().clamp(0.0, (w - 1) as f64);
        let cy = (moments.m01 / moments.m00).floor().clamp(0.0, (h - 1) as f64);
        let radius = ((area / std::f64::consts::PI).sqrt().floor() as u32).clamp(r_min, r_max);
        out.push(Candidate {
            id: 0,
            x: cx as u32,
            y: cy as u32,
            radius,
            method: DetectionMethod::Contour,
            shape: Some(ShapeMetrics { area, circularity }),
        });
    }
    tracing::debug!(accepted = out.len(), rejected, "contour filter");
    out
}
