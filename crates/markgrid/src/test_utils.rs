//! Shared synthetic inputs for unit tests.

use image::{GrayImage, Luma};

use crate::candidate::{Candidate, DetectionMethod};
use crate::preprocess::INK;
use crate::render::{draw_annulus, SheetLayout};
use crate::template::Template;

pub(crate) fn candidate_at(x: u32, y: u32, radius: u32) -> Candidate {
    Candidate {
        id: 0,
        x,
        y,
        radius,
        method: DetectionMethod::CircleTransform,
        shape: None,
    }
}

/// Row-major `rows × cols` lattice of radius-15 candidates.
pub(crate) fn grid_candidates(
    rows: usize,
    cols: usize,
    origin: [f32; 2],
    pitch: [f32; 2],
) -> Vec<Candidate> {
    let mut out = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            let x = origin[0] + c as f32 * pitch[0];
            let y = origin[1] + r as f32 * pitch[1];
            out.push(candidate_at(x as u32, y as u32, 15));
        }
    }
    out
}

/// Binary mask with solid ink discs.
pub(crate) fn draw_mask(w: u32, h: u32, centers: &[[f32; 2]], radius: f32) -> GrayImage {
    let mut img = GrayImage::new(w, h);
    for &c in centers {
        draw_annulus(&mut img, c, 0.0, radius, INK);
    }
    img
}

/// Binary mask with ink rings of the given thickness, measured inward.
pub(crate) fn draw_ring_mask(
    w: u32,
    h: u32,
    centers: &[[f32; 2]],
    radius: f32,
    thickness: f32,
) -> GrayImage {
    let mut img = GrayImage::new(w, h);
    for &c in centers {
        draw_annulus(&mut img, c, (radius - thickness).max(0.0), radius, INK);
    }
    img
}

/// Grayscale image of dark discs on a uniform background.
pub(crate) fn draw_disc_image(
    w: u32,
    h: u32,
    discs: &[([f32; 2], f32)],
    disc_pix: u8,
    bg_pix: u8,
) -> GrayImage {
    let mut img = GrayImage::from_pixel(w, h, Luma([bg_pix]));
    for &(c, r) in discs {
        draw_annulus(&mut img, c, 0.0, r, disc_pix);
    }
    img
}

/// Ideal ink mask of a sheet: solid discs for marks, one-pixel outlines for
/// empty bubbles.
pub(crate) fn sheet_mask(template: &Template, marks: &[Vec<usize>]) -> (GrayImage, SheetLayout) {
    let layout = SheetLayout::for_template(template);
    let mut img = GrayImage::new(layout.width, layout.height);
    let r = layout.radius as f32;
    for (q, row) in layout.centers.iter().enumerate() {
        let filled = marks.get(q).map(Vec::as_slice).unwrap_or(&[]);
        for (c, &center) in row.iter().enumerate() {
            let inner = if filled.contains(&c) { 0.0 } else { r - 1.0 };
            draw_annulus(&mut img, center, inner, r, INK);
        }
    }
    (img, layout)
}

/// One mark per question, cycling through the choices.
pub(crate) fn cyclic_marks(template: &Template) -> Vec<Vec<usize>> {
    (0..template.question_count)
        .map(|q| vec![q % template.choice_count()])
        .collect()
}
