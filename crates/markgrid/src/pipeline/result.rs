use chrono::{DateTime, Utc};

use crate::candidate::CandidateSet;
use crate::error::ErrorResult;
use crate::fill::QuestionReport;
use crate::grid::GridPolicy;
use crate::quality::ImageQuality;

/// Successful grading of one sheet.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProcessingResult {
    /// Always `true`.
    pub success: bool,
    /// One label per template question; `""` when nothing was marked.
    pub student_answers: Vec<String>,
    /// Echo of the answer key.
    pub correct_answers: Vec<String>,
    pub score: usize,
    /// Length of the answer key.
    pub total_questions: usize,
    pub percentage: f64,
    /// 1-based question numbers.
    pub incorrect_questions: Vec<usize>,
    /// Wall-clock seconds, two decimals.
    pub processing_time: f64,
    /// One value in `[0, 1]` per template question.
    pub confidence_scores: Vec<f32>,
    pub image_quality: ImageQuality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Result of [`crate::OmrEngine::process`]: success or a structured error.
///
/// Serialized without a tag; the `success` field tells the two apart.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Outcome {
    Success(ProcessingResult),
    Failure(ErrorResult),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn success(&self) -> Option<&ProcessingResult> {
        match self {
            Self::Success(r) => Some(r),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ErrorResult> {
        match self {
            Self::Success(_) => None,
            Self::Failure(e) => Some(e),
        }
    }
}

/// Intermediate products of one sheet, for diagnostics.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SheetAnalysis {
    /// Image dimensions [width, height].
    pub image_size: [u32; 2],
    pub candidates: CandidateSet,
    pub policy: GridPolicy,
    pub questions: Vec<QuestionReport>,
}

impl SheetAnalysis {
    pub fn student_answers(&self) -> Vec<String> {
        self.questions.iter().map(|q| q.answer.clone()).collect()
    }

    pub fn confidence_scores(&self) -> Vec<f32> {
        self.questions.iter().map(|q| q.confidence).collect()
    }
}
