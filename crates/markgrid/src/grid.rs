//! Candidate-to-slot assignment.
//!
//! With enough candidates for a full grid the exact policy partitions the
//! row-major ordering into rows of `choices_per_row`. Otherwise the degraded
//! policy slices the page into one horizontal band per question and orders
//! each band left to right. Both assume an axis-aligned, roughly uniform
//! layout.

use crate::candidate::Candidate;
use crate::template::Template;

/// Reconstruction policy applied to one sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridPolicy {
    Exact,
    Degraded,
}

/// How the policy is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconstructionMode {
    /// Exact when the candidate count allows it, degraded otherwise.
    #[default]
    Auto,
    /// Always use the banded (degraded) policy.
    Banded,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub mode: ReconstructionMode,
}

/// Candidate indices assigned to each choice slot of one question.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuestionCells {
    /// `slots[c]` lists indices into the candidate list for choice `c`.
    pub slots: Vec<Vec<usize>>,
}

impl QuestionCells {
    fn empty(choices: usize) -> Self {
        Self {
            slots: vec![Vec::new(); choices],
        }
    }
}

/// Output of [`reconstruct`]: exactly `question_count` questions.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GridAssignment {
    pub policy: GridPolicy,
    pub questions: Vec<QuestionCells>,
}

/// Pick the policy for a candidate count.
pub fn select_policy(
    candidate_count: usize,
    template: &Template,
    mode: ReconstructionMode,
) -> GridPolicy {
    match mode {
        ReconstructionMode::Banded => GridPolicy::Degraded,
        ReconstructionMode::Auto => {
            if candidate_count >= template.question_count * template.choices_per_row {
                GridPolicy::Exact
            } else {
                GridPolicy::Degraded
            }
        }
    }
}

/// Assign candidates to `(question, choice)` slots.
pub fn reconstruct(
    candidates: &[Candidate],
    image_height: u32,
    template: &Template,
    config: &ReconstructionConfig,
) -> GridAssignment {
    let policy = select_policy(candidates.len(), template, config.mode);
    let questions = match policy {
        GridPolicy::Exact => assign_exact(candidates, template),
        GridPolicy::Degraded => assign_banded(candidates, image_height, template),
    };
    tracing::debug!(
        ?policy,
        candidates = candidates.len(),
        questions = questions.len(),
        "grid reconstructed"
    );
    GridAssignment { policy, questions }
}

fn assign_exact(candidates: &[Candidate], template: &Template) -> Vec<QuestionCells> {
    let choices = template.choice_count();
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by_key(|&i| (candidates[i].y, candidates[i].x));

    let mut questions = Vec::with_capacity(template.question_count);
    for group in order
        .chunks(template.choices_per_row)
        .take(template.question_count)
    {
        let mut row = group.to_vec();
        row.sort_by_key(|&i| candidates[i].x);
        let mut cells = QuestionCells::empty(choices);
        for (p, &idx) in row.iter().enumerate() {
            if p < choices {
                cells.slots[p].push(idx);
            }
        }
        questions.push(cells);
    }
    // No-op under the policy's count precondition; keeps the length invariant
    // for direct callers.
    questions.resize_with(template.question_count, || QuestionCells::empty(choices));
    questions
}

fn assign_banded(
    candidates: &[Candidate],
    image_height: u32,
    template: &Template,
) -> Vec<QuestionCells> {
    let q = template.question_count;
    let choices = template.choice_count();
    let band = image_height as f64 / q as f64;

    let mut bands: Vec<Vec<usize>> = vec![Vec::new(); q];
    for (i, c) in candidates.iter().enumerate() {
        let b = if band > 0.0 {
            ((c.y as f64 / band).floor() as usize).min(q - 1)
        } else {
            q - 1
        };
        bands[b].push(i);
    }

    bands
        .into_iter()
        .map(|mut members| {
            members.sort_by_key(|&i| (candidates[i].x, candidates[i].y));
            let mut cells = QuestionCells::empty(choices);
            for (p, &idx) in members.iter().enumerate() {
                cells.slots[p.min(choices - 1)].push(idx);
            }
            cells
        })
        .collect()
}
