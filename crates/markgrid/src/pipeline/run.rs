//! Stage orchestration: preprocess → detect → reconstruct → classify.

use image::GrayImage;

use super::SheetAnalysis;
use crate::candidate::detect_candidates;
use crate::config::OmrConfig;
use crate::error::{OmrError, Result, Stage};
use crate::fill::classify;
use crate::grid::reconstruct;
use crate::preprocess::preprocess;
use crate::template::Template;

/// Run detection, reconstruction and classification on an ink mask.
pub(crate) fn analyze_mask(
    mask: &GrayImage,
    template: &Template,
    config: &OmrConfig,
) -> Result<SheetAnalysis> {
    let (w, h) = mask.dimensions();
    let candidates = detect_candidates(mask, template, &config.detection)?;
    tracing::info!(
        "{} bubble candidates ({} circle, {} contour)",
        candidates.candidates.len(),
        candidates.primary_count,
        candidates.secondary_count
    );

    let grid = reconstruct(&candidates.candidates, h, template, &config.reconstruction);
    if grid.questions.len() != template.question_count {
        return Err(OmrError::stage(
            Stage::Reconstruction,
            format!(
                "grid has {} questions, template expects {}",
                grid.questions.len(),
                template.question_count
            ),
        ));
    }

    let questions = classify(
        mask,
        &candidates.candidates,
        &grid,
        template,
        &config.thresholds,
    );
    let blank = questions.iter().filter(|q| q.answer.is_empty()).count();
    tracing::debug!(policy = ?grid.policy, blank, "questions classified");

    Ok(SheetAnalysis {
        image_size: [w, h],
        candidates,
        policy: grid.policy,
        questions,
    })
}

/// Analyze a grayscale sheet.
pub fn analyze(gray: &GrayImage, template: &Template, config: &OmrConfig) -> Result<SheetAnalysis> {
    let mask = preprocess(gray, &config.preprocess)?;
    analyze_mask(&mask, template, config)
}
