//! Synthetic answer-sheet rendering.
//!
//! Produces clean, axis-aligned sheets: one row of bubbles per question,
//! rows evenly spaced down the page so that row `q` sits in the middle of
//! the `q`-th horizontal band. Marked bubbles are solid discs, empty ones
//! thin outlines.

use image::{GrayImage, Luma};

use crate::template::Template;

const PAPER: u8 = 235;
const INK: u8 = 30;
const OUTLINE_PX: f32 = 1.5;
const MIN_WIDTH: u32 = 1000;
const MIN_HEIGHT: u32 = 800;

/// Bubble geometry of a rendered sheet.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SheetLayout {
    pub width: u32,
    pub height: u32,
    /// Bubble radius (pixels).
    pub radius: u32,
    /// `centers[q][c]`: center of choice `c` of question `q`.
    pub centers: Vec<Vec<[f32; 2]>>,
}

impl SheetLayout {
    /// Default page size for a template.
    pub fn for_template(template: &Template) -> Self {
        let radius = nominal_radius(template);
        let pitch = 3 * radius;
        let width = MIN_WIDTH.max(pitch * (template.choice_count() as u32 + 1));
        let height = MIN_HEIGHT.max(pitch * template.question_count as u32);
        Self::with_size(template, width, height)
    }

    /// Layout on a page of the given size. Rows are spaced `height / Q`
    /// apart; the bubble radius shrinks when rows get tight.
    pub fn with_size(template: &Template, width: u32, height: u32) -> Self {
        let q = template.question_count.max(1);
        let n = template.choice_count().max(1);
        let band = height as f32 / q as f32;
        let radius = nominal_radius(template)
            .min((band / 3.0).floor() as u32)
            .max(1);
        let pitch = 3.0 * radius as f32;
        let span = pitch * (n as f32 - 1.0);
        let x0 = (width as f32 - span) * 0.5;

        let centers = (0..template.question_count)
            .map(|row| {
                let y = ((row as f32 + 0.5) * band).floor();
                (0..template.choice_count())
                    .map(|c| [(x0 + c as f32 * pitch).floor(), y])
                    .collect()
            })
            .collect();
        Self {
            width,
            height,
            radius,
            centers,
        }
    }
}

fn nominal_radius(template: &Template) -> u32 {
    let lo = template.bubble_radius_min;
    let hi = template.bubble_radius_max.max(lo);
    lo + (hi - lo) / 4
}

/// Parse a comma-separated answer list (`"A,,C"`) into marks per question.
///
/// Each entry may name several labels separated by `+` (`"A+C"`). Unknown
/// labels are reported as errors.
pub fn parse_marks(template: &Template, answers: &str) -> Result<Vec<Vec<usize>>, String> {
    let mut marks = Vec::new();
    for (q, entry) in answers.split(',').enumerate() {
        let mut row = Vec::new();
        for label in entry.split('+').map(str::trim).filter(|l| !l.is_empty()) {
            let idx = template
                .choice_labels
                .iter()
                .position(|l| l == label)
                .ok_or_else(|| format!("question {}: unknown choice '{}'", q + 1, label))?;
            row.push(idx);
        }
        marks.push(row);
    }
    Ok(marks)
}

/// Render a sheet. `marks[q]` lists the filled choices of question `q`;
/// missing entries are left blank.
pub fn render_sheet(template: &Template, layout: &SheetLayout, marks: &[Vec<usize>]) -> GrayImage {
    let mut img = GrayImage::from_pixel(layout.width, layout.height, Luma([PAPER]));
    let r = layout.radius as f32;
    for (q, row) in layout.centers.iter().enumerate() {
        let filled = marks.get(q).map(Vec::as_slice).unwrap_or(&[]);
        for (c, &center) in row.iter().enumerate() {
            if filled.contains(&c) {
                draw_annulus(&mut img, center, 0.0, r, INK);
            } else {
                draw_annulus(&mut img, center, (r - OUTLINE_PX).max(0.0), r, INK);
            }
        }
    }
    tracing::debug!(
        template = %template.id,
        "rendered {}x{} sheet",
        layout.width,
        layout.height
    );
    img
}

/// Paint pixels whose distance to `center` lies in `[inner, outer]`.
pub(crate) fn draw_annulus(img: &mut GrayImage, center: [f32; 2], inner: f32, outer: f32, value: u8) {
    let (w, h) = img.dimensions();
    let x0 = (center[0] - outer).floor().max(0.0) as u32;
    let y0 = (center[1] - outer).floor().max(0.0) as u32;
    let x1 = ((center[0] + outer).ceil().max(0.0) as u32).min(w.saturating_sub(1));
    let y1 = ((center[1] + outer).ceil().max(0.0) as u32).min(h.saturating_sub(1));
    if w == 0 || h == 0 || x0 > x1 || y0 > y1 {
        return;
    }
    let (in_sq, out_sq) = (inner * inner, outer * outer);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 - center[0];
            let dy = y as f32 - center[1];
            let d_sq = dx * dx + dy * dy;
            if d_sq >= in_sq && d_sq <= out_sq {
                img.put_pixel(x, y, Luma([value]));
            }
        }
    }
}
