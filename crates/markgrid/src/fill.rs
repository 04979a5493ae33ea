//! Fill measurement and per-question mark resolution.

use image::GrayImage;

use crate::candidate::Candidate;
use crate::grid::{GridAssignment, GridPolicy};
use crate::round_dp;
use crate::template::Template;

/// When a below-threshold maximum may still count as a mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeakMarkPolicy {
    Never,
    /// Only under the degraded grid policy.
    #[default]
    DegradedOnly,
    Always,
}

impl WeakMarkPolicy {
    pub fn applies(self, policy: GridPolicy) -> bool {
        match self {
            Self::Never => false,
            Self::DegradedOnly => policy == GridPolicy::Degraded,
            Self::Always => true,
        }
    }
}

/// Fill thresholds used to resolve marks.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FillThresholds {
    /// A slot is marked when its fill ratio exceeds this value.
    pub mark_fill: f32,
    /// Lower bound for weak marks.
    pub weak_mark_fill: f32,
    pub weak_mark_policy: WeakMarkPolicy,
}

impl Default for FillThresholds {
    fn default() -> Self {
        Self {
            mark_fill: 0.3,
            weak_mark_fill: 0.15,
            weak_mark_policy: WeakMarkPolicy::DegradedOnly,
        }
    }
}

/// Resolved state of one question. Choice values index the template labels.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarkResolution {
    Blank,
    Marked { choice: usize, weak: bool },
    MultiMark { choices: Vec<usize> },
}

impl MarkResolution {
    /// Single chosen index: the mark, or the first of several marks.
    pub fn chosen(&self) -> Option<usize> {
        match self {
            Self::Blank => None,
            Self::Marked { choice, .. } => Some(*choice),
            Self::MultiMark { choices } => choices.first().copied(),
        }
    }

    /// Flattened answer label; `""` when blank.
    pub fn answer<'a>(&self, labels: &'a [String]) -> &'a str {
        self.chosen()
            .and_then(|i| labels.get(i))
            .map_or("", String::as_str)
    }
}

/// Fraction of ink pixels inside the disc `(x, y, r)`, clipped to the image.
///
/// Returns 0.0 for a zero radius or a disc entirely off the image.
pub fn fill_ratio(mask: &GrayImage, x: u32, y: u32, r: u32) -> f32 {
    let (w, h) = mask.dimensions();
    if r == 0 || w == 0 || h == 0 {
        return 0.0;
    }
    let (cx, cy, r) = (x as i64, y as i64, r as i64);
    let r_sq = r * r;
    let x0 = (cx - r).max(0);
    let x1 = (cx + r).min(w as i64 - 1);
    let y0 = (cy - r).max(0);
    let y1 = (cy + r).min(h as i64 - 1);

    let raw = mask.as_raw();
    let mut total = 0u64;
    let mut ink = 0u64;
    for py in y0..=y1 {
        let dy = py - cy;
        let row = py as usize * w as usize;
        for px in x0..=x1 {
            let dx = px - cx;
            if dx * dx + dy * dy > r_sq {
                continue;
            }
            total += 1;
            if raw[row + px as usize] > 0 {
                ink += 1;
            }
        }
    }
    if total == 0 {
        return 0.0;
    }
    ink as f32 / total as f32
}

/// Resolve one question from its per-slot fills (template order).
pub fn resolve(fills: &[f32], policy: GridPolicy, thresholds: &FillThresholds) -> MarkResolution {
    let marked: Vec<usize> = fills
        .iter()
        .enumerate()
        .filter(|(_, &f)| f > thresholds.mark_fill)
        .map(|(i, _)| i)
        .collect();
    match marked.len() {
        0 => {}
        1 => {
            return MarkResolution::Marked {
                choice: marked[0],
                weak: false,
            }
        }
        _ => return MarkResolution::MultiMark { choices: marked },
    }

    let Some((argmax, max)) = first_max(fills) else {
        return MarkResolution::Blank;
    };
    if max > thresholds.weak_mark_fill && thresholds.weak_mark_policy.applies(policy) {
        MarkResolution::Marked {
            choice: argmax,
            weak: true,
        }
    } else {
        MarkResolution::Blank
    }
}

fn first_max(fills: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &f) in fills.iter().enumerate() {
        if best.map_or(true, |(_, b)| f > b) {
            best = Some((i, f));
        }
    }
    best
}

/// Margin-based confidence in `[0, 1]`, rounded to two decimals.
///
/// Marks score the gap between the chosen fill and the best other fill;
/// blanks score the gap between the largest fill and `mark_fill`. Both are
/// normalized by `mark_fill`.
pub fn confidence(fills: &[f32], resolution: &MarkResolution, mark_fill: f32) -> f32 {
    let scale = mark_fill.max(f32::EPSILON);
    let margin = match resolution.chosen() {
        Some(chosen) => {
            let own = fills.get(chosen).copied().unwrap_or(0.0);
            let best_other = fills
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != chosen)
                .map(|(_, &f)| f)
                .fold(0.0f32, f32::max);
            own - best_other
        }
        None => mark_fill - fills.iter().cloned().fold(0.0f32, f32::max),
    };
    round_dp((margin / scale).clamp(0.0, 1.0) as f64, 2) as f32
}

/// Classification of one question.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuestionReport {
    /// 1-based question number.
    pub question: usize,
    /// Slot fill ratios in template choice order.
    pub fills: Vec<f32>,
    pub resolution: MarkResolution,
    /// Flattened answer label (`""` for blank).
    pub answer: String,
    pub confidence: f32,
}

/// Classify every question of a reconstructed grid.
pub fn classify(
    mask: &GrayImage,
    candidates: &[Candidate],
    grid: &GridAssignment,
    template: &Template,
    thresholds: &FillThresholds,
) -> Vec<QuestionReport> {
    let candidate_fills: Vec<f32> = candidates
        .iter()
        .map(|c| fill_ratio(mask, c.x, c.y, c.radius))
        .collect();

    grid.questions
        .iter()
        .enumerate()
        .map(|(q, cells)| {
            let fills: Vec<f32> = cells
                .slots
                .iter()
                .map(|slot| {
                    slot.iter()
                        .filter_map(|&i| candidate_fills.get(i).copied())
                        .fold(0.0f32, f32::max)
                })
                .collect();
            let resolution = resolve(&fills, grid.policy, thresholds);
            let answer = resolution.answer(&template.choice_labels).to_string();
            let confidence = confidence(&fills, &resolution, thresholds.mark_fill);
            tracing::trace!(question = q + 1, ?fills, ?resolution, confidence);
            QuestionReport {
                question: q + 1,
                fills,
                resolution,
                answer,
                confidence,
            }
        })
        .collect()
}
