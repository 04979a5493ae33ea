use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::run::analyze_mask;
use super::*;
use crate::candidate::Candidate;
use crate::config::OmrConfig;
use crate::fill::{classify, MarkResolution};
use crate::grading::grade;
use crate::grid::{reconstruct, GridPolicy, ReconstructionConfig, ReconstructionMode};
use crate::quality::ResolutionTier;
use crate::raster::PixelBuffer;
use crate::render::{render_sheet, SheetLayout};
use crate::template::{Template, TemplateRegistry};
use crate::test_utils::{candidate_at, cyclic_marks, draw_mask, sheet_mask};
use crate::OmrEngine;

fn template(id: &str) -> Template {
    TemplateRegistry::builtin().get(id).unwrap().clone()
}

fn labels_for(t: &Template, marks: &[Vec<usize>]) -> Vec<String> {
    marks
        .iter()
        .map(|m| m.first().map_or(String::new(), |&c| t.choice_labels[c].clone()))
        .collect()
}

fn layout_candidates(layout: &SheetLayout) -> Vec<Candidate> {
    layout
        .centers
        .iter()
        .flatten()
        .map(|&[x, y]| candidate_at(x as u32, y as u32, layout.radius))
        .collect()
}

/// Render `marks` on a `standard_25` sheet and run the default engine on it.
fn process_rendered(marks: &[Vec<usize>], key: &[String]) -> (ProcessingResult, SheetAnalysis) {
    let t = template("standard_25");
    let layout = SheetLayout::for_template(&t);
    let img = render_sheet(&t, &layout, marks);
    let (outcome, analysis) =
        OmrEngine::new().process_with_analysis(PixelBuffer::from(&img), key, "standard_25", None);
    (outcome.success().unwrap().clone(), analysis.unwrap())
}

#[test]
fn perfect_grid_from_ideal_candidates() {
    let t = template("standard_25");
    let marks = cyclic_marks(&t);
    let (mask, layout) = sheet_mask(&t, &marks);
    let mut cands = layout_candidates(&layout);
    cands.reverse();

    let grid = reconstruct(&cands, mask.height(), &t, &ReconstructionConfig::default());
    assert_eq!(grid.policy, GridPolicy::Exact);
    let reports = classify(&mask, &cands, &grid, &t, &Default::default());
    let answers: Vec<String> = reports.iter().map(|r| r.answer.clone()).collect();
    let key = labels_for(&t, &marks);
    assert_eq!(answers, key);
    assert_eq!(grade(&answers, &key).score, 25);
    assert!(reports.iter().all(|r| r.confidence >= 0.9));
}

#[test]
fn perfect_grid_mask_scores_full_marks() {
    let t = template("standard_25");
    let marks = cyclic_marks(&t);
    let (mask, _) = sheet_mask(&t, &marks);

    let analysis = analyze_mask(&mask, &t, &OmrConfig::default()).unwrap();
    assert_eq!(analysis.policy, GridPolicy::Exact);
    assert_eq!(analysis.candidates.candidates.len(), 100);
    let key = labels_for(&t, &marks);
    let answers = analysis.student_answers();
    assert_eq!(answers, key);

    let report = grade(&answers, &key);
    assert_eq!(report.score, 25);
    assert_eq!(report.percentage, 100.0);
    assert!(report.incorrect_questions.is_empty());
    assert!(analysis.confidence_scores().iter().all(|&c| c > 0.5));
}

#[test]
fn blank_row_is_reported_empty_and_wrong() {
    let t = template("standard_25");
    let mut marks = cyclic_marks(&t);
    marks[2].clear();
    let (mask, _) = sheet_mask(&t, &marks);

    let analysis = analyze_mask(&mask, &t, &OmrConfig::default()).unwrap();
    assert_eq!(analysis.policy, GridPolicy::Exact);
    let answers = analysis.student_answers();
    assert_eq!(answers[2], "");
    assert_eq!(analysis.questions[2].resolution, MarkResolution::Blank);

    let key = labels_for(&t, &cyclic_marks(&t));
    let report = grade(&answers, &key);
    assert_eq!(report.score, 24);
    assert_eq!(report.incorrect_questions, vec![3]);
}

#[test]
fn double_mark_resolves_to_first_choice() {
    let t = template("standard_25");
    let mut marks = cyclic_marks(&t);
    marks[4] = vec![0, 2];
    let (mask, _) = sheet_mask(&t, &marks);

    let analysis = analyze_mask(&mask, &t, &OmrConfig::default()).unwrap();
    assert_eq!(analysis.student_answers()[4], "A");
    assert_eq!(
        analysis.questions[4].resolution,
        MarkResolution::MultiMark {
            choices: vec![0, 2]
        }
    );
    assert!(analysis.questions[4].confidence < 0.5);
}

#[test]
fn rendered_perfect_sheet_scores_full_marks() {
    let t = template("standard_25");
    let marks = cyclic_marks(&t);
    let key = labels_for(&t, &marks);
    let (result, analysis) = process_rendered(&marks, &key);

    assert_eq!(analysis.candidates.primary_count, 100);
    assert!(!analysis.candidates.fallback_triggered);
    assert_eq!(analysis.candidates.overlapping_pairs, 0);
    assert_eq!(analysis.policy, GridPolicy::Exact);
    assert_eq!(result.student_answers, key);
    assert_eq!(result.score, 25);
    assert_eq!(result.total_questions, 25);
    assert_eq!(result.percentage, 100.0);
    assert!(result.incorrect_questions.is_empty());
}

#[test]
fn rendered_blank_row_is_empty_and_wrong() {
    let t = template("standard_25");
    let mut marks = cyclic_marks(&t);
    marks[2].clear();
    let key = labels_for(&t, &cyclic_marks(&t));
    let (result, analysis) = process_rendered(&marks, &key);

    assert_eq!(analysis.policy, GridPolicy::Exact);
    assert_eq!(result.student_answers[2], "");
    assert_eq!(result.incorrect_questions, vec![3]);
    assert_eq!(result.score, 24);
    assert_eq!(result.percentage, 96.0);
}

#[test]
fn rendered_double_mark_keeps_first_choice() {
    let t = template("standard_25");
    let mut marks = cyclic_marks(&t);
    marks[4] = vec![0, 2];
    let key = labels_for(&t, &marks);
    let (result, analysis) = process_rendered(&marks, &key);

    assert_eq!(result.student_answers[4], "A");
    assert_eq!(
        analysis.questions[4].resolution,
        MarkResolution::MultiMark {
            choices: vec![0, 2]
        }
    );
    assert_eq!(result.score, 25);
}

#[test]
fn short_key_grades_only_its_prefix() {
    let t = template("standard_25");
    let marks = cyclic_marks(&t);
    let (mask, layout) = sheet_mask(&t, &marks);
    let cands = layout_candidates(&layout);
    let grid = reconstruct(&cands, mask.height(), &t, &ReconstructionConfig::default());
    let answers: Vec<String> = classify(&mask, &cands, &grid, &t, &Default::default())
        .into_iter()
        .map(|r| r.answer)
        .collect();

    let key: Vec<String> = labels_for(&t, &marks).into_iter().take(5).collect();
    let report = grade(&answers, &key);
    assert_eq!(answers.len(), 25);
    assert_eq!(report.total_questions, 5);
    assert_eq!(report.score, 5);
    assert_eq!(report.percentage, 100.0);
}

#[test]
fn sparse_candidates_fall_back_to_banding() {
    let t = template("standard_25");
    let marks = cyclic_marks(&t);
    let (mask, layout) = sheet_mask(&t, &marks);
    // Only the marked bubble of every row was found.
    let cands: Vec<Candidate> = layout
        .centers
        .iter()
        .zip(&marks)
        .map(|(row, m)| {
            let [x, y] = row[m[0]];
            candidate_at(x as u32, y as u32, layout.radius)
        })
        .collect();

    let grid = reconstruct(&cands, mask.height(), &t, &ReconstructionConfig::default());
    assert_eq!(grid.policy, GridPolicy::Degraded);
    let reports = classify(&mask, &cands, &grid, &t, &Default::default());
    assert_eq!(reports.len(), 25);
    // Banding only sees positions, so every lone mark lands in the first slot.
    assert!(reports.iter().all(|r| r.answer == "A"));
}

#[test]
fn banded_mode_matches_exact_on_a_clean_grid() {
    let t = template("standard_25");
    let marks = cyclic_marks(&t);
    let (mask, layout) = sheet_mask(&t, &marks);
    let cands = layout_candidates(&layout);
    let cfg = ReconstructionConfig {
        mode: ReconstructionMode::Banded,
    };
    let grid = reconstruct(&cands, mask.height(), &t, &cfg);
    assert_eq!(grid.policy, GridPolicy::Degraded);
    let answers: Vec<String> = classify(&mask, &cands, &grid, &t, &Default::default())
        .into_iter()
        .map(|r| r.answer)
        .collect();
    assert_eq!(answers, labels_for(&t, &marks));
}

#[test]
fn featureless_image_yields_blank_answers() {
    let engine = OmrEngine::new();
    let img = GrayImage::from_pixel(300, 200, Luma([128]));
    let key = vec!["A".to_string(); 25];
    let (outcome, analysis) =
        engine.process_with_analysis(PixelBuffer::from(&img), &key, "standard_25", None);

    let result = outcome.success().unwrap();
    assert_eq!(result.student_answers, vec![String::new(); 25]);
    assert_eq!(result.score, 0);
    assert_eq!(result.incorrect_questions, (1..=25).collect::<Vec<_>>());
    assert_eq!(result.image_quality.resolution, ResolutionTier::Poor);
    let analysis = analysis.unwrap();
    assert!(analysis.candidates.candidates.is_empty());
    assert!(analysis.candidates.fallback_triggered);
    assert_eq!(analysis.policy, GridPolicy::Degraded);
}

#[test]
fn rendered_sheet_satisfies_result_invariants() {
    let t = template("standard_25");
    let layout = SheetLayout::for_template(&t);
    let marks = cyclic_marks(&t);
    let img = render_sheet(&t, &layout, &marks);
    let key = labels_for(&t, &marks);

    let engine = OmrEngine::new();
    let (outcome, analysis) =
        engine.process_with_analysis(PixelBuffer::from(&img), &key, "standard_25", Some("s-1"));
    let result = outcome.success().unwrap();
    assert_eq!(result.student_answers, key);
    assert_eq!(result.score, 25);
    assert_eq!(result.confidence_scores.len(), 25);
    assert!(result
        .confidence_scores
        .iter()
        .all(|c| (0.0..=1.0).contains(c)));
    assert_eq!(result.score + result.incorrect_questions.len(), 25);
    assert_eq!(result.image_quality.resolution, ResolutionTier::Good);
    for a in &result.student_answers {
        assert!(a.is_empty() || t.choice_labels.contains(a));
    }

    let analysis = analysis.unwrap();
    for c in &analysis.candidates.candidates {
        assert!(c.radius >= t.bubble_radius_min && c.radius <= t.bubble_radius_max);
    }
    for q in &analysis.questions {
        assert!(q.fills.iter().all(|f| (0.0..=1.0).contains(f)));
    }
}

#[test]
fn processing_is_deterministic() {
    let t = template("simple_5");
    let layout = SheetLayout::for_template(&t);
    let marks = vec![vec![0], vec![3], vec![], vec![1, 2], vec![2]];
    let img = render_sheet(&t, &layout, &marks);
    let key = ["A", "D", "B", "B", "C"];

    let engine = OmrEngine::new();
    let mut first = engine
        .try_process(PixelBuffer::from(&img), &key, "simple_5", None)
        .unwrap();
    let second = engine
        .try_process(PixelBuffer::from(&img), &key, "simple_5", None)
        .unwrap();
    first.processing_time = second.processing_time;
    first.timestamp = second.timestamp;
    assert_eq!(first, second);
}

#[test]
fn concurrent_calls_agree() {
    let t = template("simple_5");
    let layout = SheetLayout::for_template(&t);
    let img = render_sheet(&t, &layout, &cyclic_marks(&t));
    let key = ["A", "B", "C", "D", "A"];
    let engine = OmrEngine::new();
    let expected = engine
        .try_process(PixelBuffer::from(&img), &key, "simple_5", None)
        .unwrap();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(|| {
                    engine
                        .try_process(PixelBuffer::from(&img), &key, "simple_5", None)
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            let got = h.join().unwrap();
            assert_eq!(got.student_answers, expected.student_answers);
            assert_eq!(got.confidence_scores, expected.confidence_scores);
            assert_eq!(got.score, expected.score);
        }
    });
}

#[test]
fn random_candidate_sets_keep_question_count() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let registry = TemplateRegistry::builtin();
    for t in registry.iter() {
        for _ in 0..10 {
            let (w, h) = (rng.gen_range(50..600u32), rng.gen_range(50..900u32));
            let n = rng.gen_range(0..(t.expected_bubbles() * 2));
            let cands: Vec<Candidate> = (0..n)
                .map(|_| {
                    candidate_at(
                        rng.gen_range(0..w),
                        rng.gen_range(0..h),
                        rng.gen_range(t.bubble_radius_min..=t.bubble_radius_max),
                    )
                })
                .collect();
            let centers: Vec<[f32; 2]> = cands
                .iter()
                .filter(|_| rng.gen_bool(0.3))
                .map(|c| [c.x as f32, c.y as f32])
                .collect();
            let mask = draw_mask(w, h, &centers, t.bubble_radius_min as f32);

            for mode in [ReconstructionMode::Auto, ReconstructionMode::Banded] {
                let grid = reconstruct(&cands, h, t, &ReconstructionConfig { mode });
                let reports = classify(&mask, &cands, &grid, t, &Default::default());
                assert_eq!(reports.len(), t.question_count);
                for r in &reports {
                    assert_eq!(r.fills.len(), t.choice_count());
                    assert!((0.0..=1.0).contains(&r.confidence));
                    assert!(r.fills.iter().all(|f| (0.0..=1.0).contains(f)));
                }
            }
        }
    }
}

#[test]
fn outcome_serializes_untagged() {
    let engine = OmrEngine::new();
    let img = GrayImage::from_pixel(64, 48, Luma([128]));
    let key = ["A"];

    let ok = engine.process(PixelBuffer::from(&img), &key, "simple_5", None);
    let json = serde_json::to_value(&ok).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["student_answers"].as_array().unwrap().len(), 5);
    assert_eq!(json["image_quality"]["lighting"], "Good");
    assert!(json.get("student_id").is_none());
    assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));

    let back: Outcome = serde_json::from_value(json).unwrap();
    assert!(back.is_success());

    let err = engine.process(PixelBuffer::from(&img), &key, "nope", None);
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error_code"], "UNKNOWN_TEMPLATE");
    let back: Outcome = serde_json::from_value(json).unwrap();
    assert!(!back.is_success());
}
