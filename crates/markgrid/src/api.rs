//! High-level grading API.
//!
//! [`OmrEngine`] is the primary entry point. It owns a template registry and
//! an [`OmrConfig`]; both are read-only during processing, so one engine can
//! serve many threads at once.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use chrono::Utc;

use crate::config::OmrConfig;
use crate::error::{ErrorResult, OmrError, Result};
use crate::grading::grade;
use crate::pipeline::{self, Outcome, ProcessingResult, SheetAnalysis};
use crate::quality::assess;
use crate::raster::PixelBuffer;
use crate::round_dp;
use crate::template::TemplateRegistry;

/// Primary grading interface.
///
/// # Examples
///
/// ```no_run
/// use markgrid::{OmrEngine, PixelBuffer};
///
/// let engine = OmrEngine::new();
/// let sheet = image::open("sheet.png").unwrap().to_luma8();
/// let key: Vec<String> = ["A", "B", "C", "D", "A"].iter().map(|s| s.to_string()).collect();
/// let outcome = engine.process(PixelBuffer::from(&sheet), &key, "simple_5", Some("s-001"));
/// println!("{}", serde_json::to_string_pretty(&outcome).unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct OmrEngine {
    registry: TemplateRegistry,
    config: OmrConfig,
}

impl Default for OmrEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OmrEngine {
    /// Built-in templates, default configuration.
    pub fn new() -> Self {
        Self::with_config(OmrConfig::default())
    }

    /// Built-in templates with a custom configuration.
    pub fn with_config(config: OmrConfig) -> Self {
        Self::with_registry(TemplateRegistry::builtin(), config)
    }

    /// Full control over templates and configuration.
    pub fn with_registry(registry: TemplateRegistry, config: OmrConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &OmrConfig {
        &self.config
    }

    /// Mutable access to configuration for post-construction tuning.
    pub fn config_mut(&mut self) -> &mut OmrConfig {
        &mut self.config
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TemplateRegistry {
        &mut self.registry
    }

    fn run<K: AsRef<str>>(
        &self,
        image: PixelBuffer<'_>,
        correct_answers: &[K],
        template_id: &str,
        student_id: Option<&str>,
        started: Instant,
    ) -> Result<(ProcessingResult, SheetAnalysis)> {
        let template = self
            .registry
            .get(template_id)
            .ok_or_else(|| OmrError::UnknownTemplate(template_id.to_string()))?;
        let gray = image.to_gray()?;

        let analysis = pipeline::analyze(&gray, template, &self.config)?;
        let student_answers = analysis.student_answers();
        let report = grade(&student_answers, correct_answers);
        let image_quality = assess(&gray, &self.config.quality);

        let result = ProcessingResult {
            success: true,
            student_answers,
            correct_answers: correct_answers
                .iter()
                .map(|k| k.as_ref().to_string())
                .collect(),
            score: report.score,
            total_questions: report.total_questions,
            percentage: report.percentage,
            incorrect_questions: report.incorrect_questions,
            processing_time: round_dp(started.elapsed().as_secs_f64(), 2),
            confidence_scores: analysis.confidence_scores(),
            image_quality,
            student_id: student_id.map(str::to_string),
            timestamp: Utc::now(),
        };
        tracing::info!(
            template = template_id,
            score = result.score,
            total = result.total_questions,
            "sheet graded in {:.2}s",
            result.processing_time
        );
        Ok((result, analysis))
    }

    /// Grade one sheet, returning errors to the caller.
    pub fn try_process<K: AsRef<str>>(
        &self,
        image: PixelBuffer<'_>,
        correct_answers: &[K],
        template_id: &str,
        student_id: Option<&str>,
    ) -> Result<ProcessingResult> {
        self.run(image, correct_answers, template_id, student_id, Instant::now())
            .map(|(result, _)| result)
    }

    /// Grade one sheet and keep the intermediate analysis.
    ///
    /// Never panics: failures, including panics inside a stage, become an
    /// [`ErrorResult`]. The analysis is `None` on failure.
    pub fn process_with_analysis<K: AsRef<str>>(
        &self,
        image: PixelBuffer<'_>,
        correct_answers: &[K],
        template_id: &str,
        student_id: Option<&str>,
    ) -> (Outcome, Option<SheetAnalysis>) {
        let started = Instant::now();
        let attempt = catch_unwind(AssertUnwindSafe(|| {
            self.run(image, correct_answers, template_id, student_id, started)
        }));
        let err = match attempt {
            Ok(Ok((result, analysis))) => return (Outcome::Success(result), Some(analysis)),
            Ok(Err(err)) => err,
            Err(payload) => OmrError::Internal(panic_message(payload.as_ref())),
        };
        tracing::warn!(
            template = template_id,
            code = ?err.code(),
            "sheet processing failed after {:.2}s: {}",
            started.elapsed().as_secs_f64(),
            err
        );
        (Outcome::Failure(ErrorResult::from(err)), None)
    }

    /// Grade one sheet. Never panics.
    pub fn process<K: AsRef<str>>(
        &self,
        image: PixelBuffer<'_>,
        correct_answers: &[K],
        template_id: &str,
        student_id: Option<&str>,
    ) -> Outcome {
        self.process_with_analysis(image, correct_answers, template_id, student_id)
            .0
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic during processing".to_string()
    }
}
