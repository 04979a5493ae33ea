//! Gradient-voting circle transform.
//!
//! Every mask pixel with a strong gradient votes along both gradient
//! directions at each integer radius in `[r_min, r_max]`. Bubble outlines
//! produce accumulator peaks at their centers because boundary gradients
//! converge radially. Peaks are accepted greedily in score order, subject to
//! a minimum center distance. Each accepted peak is then fitted: the center
//! is re-searched a few pixels around the peak and the radius chosen by
//! boundary support.

use image::GrayImage;

use super::{Candidate, DetectionMethod};
use crate::error::{OmrError, Result, Stage};

/// Configuration for the circle transform.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CircleTransformConfig {
    /// Minimum distance between accepted centers (pixels).
    pub min_center_distance_px: f32,
    /// Gradient magnitude threshold (fraction of max gradient).
    pub grad_threshold: f32,
    /// Minimum accumulator value for a peak (fraction of max).
    pub min_vote_frac: f32,
    /// Gaussian sigma for accumulator smoothing.
    pub accum_sigma: f32,
    /// Minimum fraction of the circumference `2πr` covered by mask boundary
    /// pixels at the selected radius.
    pub min_edge_support: f32,
    /// Optional cap on the number of accepted circles (in score order).
    #[serde(default)]
    pub max_candidates: Option<usize>,
    /// Half-width (pixels) of the square searched around each peak for the
    /// center with the best boundary support. Votes from neighbouring
    /// bubbles pull peaks of edge bubbles off center.
    pub center_refine_px: u32,
}

impl Default for CircleTransformConfig {
    fn default() -> Self {
        Self {
            min_center_distance_px: 30.0,
            grad_threshold: 0.05,
            min_vote_frac: 0.2,
            accum_sigma: 1.5,
            min_edge_support: 0.5,
            max_candidates: None,
            center_refine_px: 4,
        }
    }
}

/// Accumulator peak.
#[derive(Debug, Clone, Copy)]
struct Peak {
    x: usize,
    y: usize,
    score: f32,
}

#[inline]
fn bilinear_add_in_bounds(accum: &mut [f32], stride: usize, x: f32, y: f32, weight: f32) {
    let x0 = x as usize;
    let y0 = y as usize;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let base = y0 * stride + x0;
    accum[base] += weight * (1.0 - fx) * (1.0 - fy);
    accum[base + 1] += weight * fx * (1.0 - fy);
    accum[base + stride] += weight * (1.0 - fx) * fy;
    accum[base + stride + 1] += weight * fx * fy;
}

/// Mask pixels that are ink with at least one 4-neighbour that is paper or
/// outside the image.
fn boundary_map(mask: &GrayImage) -> Vec<bool> {
    let (w, h) = mask.dimensions();
    let (w, h) = (w as usize, h as usize);
    let raw = mask.as_raw();
    let ink = |x: usize, y: usize| raw[y * w + x] > 0;
    let mut out = vec![false; w * h];
    for y in 0..h {
        for x in 0..w {
            if !ink(x, y) {
                continue;
            }
            let edge = x == 0
                || y == 0
                || x + 1 == w
                || y + 1 == h
                || !ink(x - 1, y)
                || !ink(x + 1, y)
                || !ink(x, y - 1)
                || !ink(x, y + 1);
            out[y * w + x] = edge;
        }
    }
    out
}

/// Boundary pixels within `reach` (Chebyshev distance) of `(cx, cy)`.
fn boundary_near(
    boundary: &[bool],
    w: usize,
    h: usize,
    cx: usize,
    cy: usize,
    reach: usize,
) -> Vec<[i64; 2]> {
    let x0 = cx.saturating_sub(reach);
    let x1 = (cx + reach).min(w - 1);
    let y0 = cy.saturating_sub(reach);
    let y1 = (cy + reach).min(h - 1);
    let mut out = Vec::new();
    for y in y0..=y1 {
        for x in x0..=x1 {
            if boundary[y * w + x] {
                out.push([x as i64, y as i64]);
            }
        }
    }
    out
}

/// Pick the radius with the best boundary support around `center`.
///
/// A boundary pixel at distance `d` supports radius `r` when
/// `r - 1.5 <= d <= r + 0.5`. Returns `(radius, support)`; ties keep the
/// smaller radius.
fn estimate_radius(
    points: &[[i64; 2]],
    center: [i64; 2],
    r_min: u32,
    r_max: u32,
) -> Option<(u32, f32)> {
    let mut counts = vec![0u32; (r_max - r_min + 1) as usize];
    for p in points {
        let dx = (p[0] - center[0]) as f32;
        let dy = (p[1] - center[1]) as f32;
        let d = (dx * dx + dy * dy).sqrt();
        let lo = ((d - 0.5).ceil() as i64).max(r_min as i64);
        let hi = ((d + 1.5).floor() as i64).min(r_max as i64);
        for r in lo..=hi {
            counts[(r - r_min as i64) as usize] += 1;
        }
    }

    let mut best: Option<(u32, f32)> = None;
    for (i, &count) in counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        let r = r_min + i as u32;
        let support = count as f32 / (std::f32::consts::TAU * r as f32);
        if best.map_or(true, |(_, s)| support > s) {
            best = Some((r, support));
        }
    }
    best
}

/// Circle fitted around an accumulator peak.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CircleFit {
    x: usize,
    y: usize,
    radius: u32,
    support: f32,
}

/// Search centers within `refine` pixels of `(px, py)` for the best
/// boundary support. Ties keep the center closest to the peak.
fn fit_circle(
    boundary: &[bool],
    w: usize,
    h: usize,
    (px, py): (usize, usize),
    r_min: u32,
    r_max: u32,
    refine: u32,
) -> Option<CircleFit> {
    let reach = r_max as usize + 2 + refine as usize;
    let points = boundary_near(boundary, w, h, px, py, reach);
    if points.is_empty() {
        return None;
    }

    let refine = refine as i64;
    let mut best: Option<(CircleFit, i64)> = None;
    for oy in -refine..=refine {
        for ox in -refine..=refine {
            let cx = px as i64 + ox;
            let cy = py as i64 + oy;
            if cx < 0 || cy < 0 || cx >= w as i64 || cy >= h as i64 {
                continue;
            }
            let Some((radius, support)) = estimate_radius(&points, [cx, cy], r_min, r_max) else {
                continue;
            };
            let offset = ox * ox + oy * oy;
            let better = best.map_or(true, |(b, b_off)| {
                support > b.support || (support == b.support && offset < b_off)
            });
            if better {
                let fit = CircleFit {
                    x: cx as usize,
                    y: cy as usize,
                    radius,
                    support,
                };
                best = Some((fit, offset));
            }
        }
    }
    best.map(|(fit, _)| fit)
}

/// Detect circles of radius `[r_min, r_max]` in a binary mask.
///
/// Returns candidates sorted by `(y, x)`.
pub fn find_circles(
    mask: &GrayImage,
    r_min: u32,
    r_max: u32,
    config: &CircleTransformConfig,
) -> Result<Vec<Candidate>> {
    let (w, h) = mask.dimensions();
    if w < 4 || h < 4 || r_min == 0 || r_max < r_min {
        return Ok(Vec::new());
    }

    let gx = imageproc::gradients::horizontal_scharr(mask);
    let gy = imageproc::gradients::vertical_scharr(mask);
    let gx_raw = gx.as_raw();
    let gy_raw = gy.as_raw();

    let mut max_mag_sq: f32 = 0.0;
    for (&gxv, &gyv) in gx_raw.iter().zip(gy_raw.iter()) {
        let gxv = gxv as f32;
        let gyv = gyv as f32;
        max_mag_sq = max_mag_sq.max(gxv * gxv + gyv * gyv);
    }
    let max_mag = max_mag_sq.sqrt();
    if max_mag < 1e-6 {
        return Ok(Vec::new());
    }
    let threshold = config.grad_threshold * max_mag;
    let threshold_sq = threshold * threshold;

    let stride = w as usize;
    let h_usize = h as usize;
    let mut accum = vec![0.0f32; stride * h_usize];
    let radii: Vec<f32> = (r_min..=r_max).map(|r| r as f32).collect();
    let x_limit = (w - 1) as f32;
    let y_limit = (h - 1) as f32;

    for y in 0..h_usize {
        let y_base = y * stride;
        let yf = y as f32;
        for x in 0..stride {
            let idx = y_base + x;
            let gxv = gx_raw[idx] as f32;
            let gyv = gy_raw[idx] as f32;
            let mag_sq = gxv * gxv + gyv * gyv;
            if mag_sq < threshold_sq || mag_sq == 0.0 {
                continue;
            }
            let mag = mag_sq.sqrt();
            let dx = gxv / mag;
            let dy = gyv / mag;
            let xf = x as f32;

            for &r in &radii {
                let vx_pos = xf + dx * r;
                let vy_pos = yf + dy * r;
                if vx_pos >= 0.0 && vx_pos < x_limit && vy_pos >= 0.0 && vy_pos < y_limit {
                    bilinear_add_in_bounds(&mut accum, stride, vx_pos, vy_pos, mag);
                }

                let vx_neg = xf - dx * r;
                let vy_neg = yf - dy * r;
                if vx_neg >= 0.0 && vx_neg < x_limit && vy_neg >= 0.0 && vy_neg < y_limit {
                    bilinear_add_in_bounds(&mut accum, stride, vx_neg, vy_neg, mag);
                }
            }
        }
    }

    let accum_img = image::ImageBuffer::<image::Luma<f32>, Vec<f32>>::from_raw(w, h, accum)
        .ok_or_else(|| OmrError::stage(Stage::Detection, "accumulator dimensions mismatch"))?;
    let smoothed = if config.accum_sigma > 0.0 {
        imageproc::filter::gaussian_blur_f32(&accum_img, config.accum_sigma)
    } else {
        accum_img
    };

    let peaks = local_maxima(smoothed.as_raw(), stride, h_usize, r_min, config.min_vote_frac);
    tracing::trace!("{} accumulator peaks", peaks.len());

    let boundary = boundary_map(mask);
    let min_dist_sq = config.min_center_distance_px * config.min_center_distance_px;
    let mut accepted: Vec<Candidate> = Vec::new();
    for peak in peaks {
        if let Some(cap) = config.max_candidates {
            if accepted.len() >= cap {
                break;
            }
        }
        let too_close = accepted.iter().any(|c| {
            let dx = c.x as f32 - peak.x as f32;
            let dy = c.y as f32 - peak.y as f32;
            dx * dx + dy * dy < min_dist_sq
        });
        if too_close {
            continue;
        }
        let Some(fit) = fit_circle(
            &boundary,
            stride,
            h_usize,
            (peak.x, peak.y),
            r_min,
            r_max,
            config.center_refine_px,
        ) else {
            continue;
        };
        if fit.support < config.min_edge_support {
            tracing::trace!(
                x = fit.x,
                y = fit.y,
                support = fit.support,
                "peak rejected: weak boundary support"
            );
            continue;
        }
        accepted.push(Candidate {
            id: 0,
            x: fit.x as u32,
            y: fit.y as u32,
            radius: fit.radius,
            method: DetectionMethod::CircleTransform,
            shape: None,
        });
    }

    accepted.sort_by_key(|c| (c.y, c.x));
    Ok(accepted)
}

/// Local maxima of the smoothed accumulator, highest score first.
fn local_maxima(data: &[f32], stride: usize, h: usize, r_min: u32, min_vote_frac: f32) -> Vec<Peak> {
    let max_val = data.iter().cloned().fold(0.0f32, f32::max);
    if max_val < 1e-6 {
        return Vec::new();
    }
    let vote_threshold = min_vote_frac * max_val;
    let nms_radius = (r_min as f32 * 0.5).max(2.0);
    let nms_r = nms_radius.ceil() as i64;
    let nms_r_sq = nms_radius * nms_radius;
    let mut nms_offsets = Vec::new();
    for dy in -nms_r..=nms_r {
        for dx in -nms_r..=nms_r {
            if dx == 0 && dy == 0 {
                continue;
            }
            if (dx * dx + dy * dy) as f32 > nms_r_sq {
                continue;
            }
            nms_offsets.push(dy as isize * stride as isize + dx as isize);
        }
    }

    let mut peaks = Vec::new();
    let (w, h) = (stride as i64, h as i64);
    for y in nms_r..(h - nms_r) {
        for x in nms_r..(w - nms_r) {
            let idx = y as usize * stride + x as usize;
            let val = data[idx];
            if val < vote_threshold {
                continue;
            }
            let is_max = nms_offsets.iter().all(|&off| {
                let nidx = idx.wrapping_add_signed(off);
                !(data[nidx] > val || (data[nidx] == val && nidx < idx))
            });
            if is_max {
                peaks.push(Peak {
                    x: x as usize,
                    y: y as usize,
                    score: val,
                });
            }
        }
    }

    peaks.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| (a.y, a.x).cmp(&(b.y, b.x)))
    });
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::{preprocess, PreprocessConfig};
    use crate::render::{render_sheet, SheetLayout};
    use crate::template::TemplateRegistry;
    use crate::test_utils::{cyclic_marks, draw_mask, draw_ring_mask};
    use image::Luma;

    fn assert_near(c: &Candidate, x: f32, y: f32, r: u32) {
        let err = ((c.x as f32 - x).powi(2) + (c.y as f32 - y).powi(2)).sqrt();
        assert!(err <= 2.0, "center ({}, {}) too far from ({x}, {y})", c.x, c.y);
        assert!(
            c.radius.abs_diff(r) <= 2,
            "radius {} too far from {r}",
            c.radius
        );
    }

    #[test]
    fn finds_filled_discs() {
        let centers = [[50.0, 50.0], [130.0, 50.0], [50.0, 130.0]];
        let mask = draw_mask(180, 180, &centers, 15.0);
        let found = find_circles(&mask, 10, 25, &CircleTransformConfig::default()).unwrap();
        assert_eq!(found.len(), 3, "{found:?}");
        // Sorted by (y, x).
        assert_near(&found[0], 50.0, 50.0, 15);
        assert_near(&found[1], 130.0, 50.0, 15);
        assert_near(&found[2], 50.0, 130.0, 15);
        assert!(found
            .iter()
            .all(|c| c.method == DetectionMethod::CircleTransform));
    }

    #[test]
    fn finds_hollow_outlines() {
        let mask = draw_ring_mask(120, 120, &[[60.0, 60.0]], 20.0, 3.0);
        let found = find_circles(&mask, 12, 30, &CircleTransformConfig::default()).unwrap();
        assert_eq!(found.len(), 1, "{found:?}");
        let c = &found[0];
        assert!(c.x.abs_diff(60) <= 2 && c.y.abs_diff(60) <= 2);
        assert!((12..=30).contains(&c.radius));
    }

    #[test]
    fn min_distance_suppresses_close_circles() {
        let mask = draw_mask(120, 100, &[[45.0, 50.0], [65.0, 50.0]], 8.0);
        let found = find_circles(&mask, 6, 12, &CircleTransformConfig::default()).unwrap();
        assert_eq!(found.len(), 1, "{found:?}");
    }

    #[test]
    fn max_candidates_caps_output() {
        let centers = [[50.0, 50.0], [130.0, 50.0], [50.0, 130.0]];
        let mask = draw_mask(180, 180, &centers, 15.0);
        let cfg = CircleTransformConfig {
            max_candidates: Some(2),
            ..Default::default()
        };
        assert_eq!(find_circles(&mask, 10, 25, &cfg).unwrap().len(), 2);
    }

    #[test]
    fn degenerate_inputs_return_empty() {
        let blank = GrayImage::from_pixel(100, 100, Luma([0]));
        let cfg = CircleTransformConfig::default();
        assert!(find_circles(&blank, 5, 10, &cfg).unwrap().is_empty());

        let mask = draw_mask(100, 100, &[[50.0, 50.0]], 10.0);
        assert!(find_circles(&mask, 0, 10, &cfg).unwrap().is_empty());
        assert!(find_circles(&mask, 12, 10, &cfg).unwrap().is_empty());

        let tiny = GrayImage::new(3, 3);
        assert!(find_circles(&tiny, 1, 2, &cfg).unwrap().is_empty());
    }

    #[test]
    fn radius_estimate_on_drawn_disc() {
        let mask = draw_mask(80, 80, &[[40.0, 40.0]], 12.0);
        let boundary = boundary_map(&mask);
        let points = boundary_near(&boundary, 80, 80, 40, 40, 22);
        let (r, support) = estimate_radius(&points, [40, 40], 6, 20).unwrap();
        assert!(r.abs_diff(12) <= 1, "radius {r}");
        assert!(support > 0.5, "support {support}");
    }

    #[test]
    fn fit_recenters_an_offset_peak() {
        let mask = draw_mask(80, 80, &[[40.0, 40.0]], 12.0);
        let boundary = boundary_map(&mask);

        let unrefined = fit_circle(&boundary, 80, 80, (44, 40), 6, 20, 0).unwrap();
        assert!(unrefined.support < 0.5, "{unrefined:?}");

        let fit = fit_circle(&boundary, 80, 80, (44, 40), 6, 20, 4).unwrap();
        assert!(fit.x.abs_diff(40) <= 1 && fit.y.abs_diff(40) <= 1, "{fit:?}");
        assert!(fit.radius.abs_diff(12) <= 1, "{fit:?}");
        assert!(fit.support > 0.5, "{fit:?}");
    }

    #[test]
    fn fit_without_boundary_is_none() {
        let boundary = vec![false; 40 * 40];
        assert!(fit_circle(&boundary, 40, 40, (20, 20), 5, 10, 2).is_none());
    }

    #[test]
    fn recovers_every_bubble_of_a_rendered_sheet() {
        let t = TemplateRegistry::builtin().get("standard_25").unwrap().clone();
        let layout = SheetLayout::for_template(&t);
        let gray = render_sheet(&t, &layout, &cyclic_marks(&t));
        let mask = preprocess(&gray, &PreprocessConfig::default()).unwrap();

        let found = find_circles(
            &mask,
            t.bubble_radius_min,
            t.bubble_radius_max,
            &CircleTransformConfig::default(),
        )
        .unwrap();
        assert_eq!(found.len(), 100);
        for &[x, y] in layout.centers.iter().flatten() {
            assert!(
                found
                    .iter()
                    .any(|c| c.x.abs_diff(x as u32) <= 2 && c.y.abs_diff(y as u32) <= 2),
                "no circle near ({x}, {y})"
            );
        }
    }
}
