//! Answer-key comparison.

use crate::round_dp;

/// Score of one sheet against its key.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GradeReport {
    pub score: usize,
    /// Length of the answer key.
    pub total_questions: usize,
    /// `100 · score / total`, one decimal with ties to even; 0.0 for an
    /// empty key.
    pub percentage: f64,
    /// 1-based numbers of wrongly answered questions.
    pub incorrect_questions: Vec<usize>,
}

/// Compare answers position by position over the shorter of the two lists.
///
/// Comparison is exact; a blank answer (`""`) is wrong unless the key entry
/// is blank too.
pub fn grade<S: AsRef<str>, K: AsRef<str>>(student: &[S], key: &[K]) -> GradeReport {
    let mut score = 0;
    let mut incorrect_questions = Vec::new();
    for (i, (s, k)) in student.iter().zip(key.iter()).enumerate() {
        if s.as_ref() == k.as_ref() {
            score += 1;
        } else {
            incorrect_questions.push(i + 1);
        }
    }
    let total_questions = key.len();
    let percentage = if total_questions == 0 {
        0.0
    } else {
        round_dp(score as f64 / total_questions as f64 * 100.0, 1)
    };
    GradeReport {
        score,
        total_questions,
        percentage,
        incorrect_questions,
    }
}
