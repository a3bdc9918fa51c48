//! Business arithmetic shared by the learning use cases: progress
//! percentages, quiz grading and certificate numbering.

use crate::domain::{ProgressCounts, QuizQuestion};
use crate::error::{LmsError, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// `completed / total * 100`, rounded to the nearest integer and clamped to `[0, 100]`.
/// An empty course has made no progress.
pub fn progress_percentage(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (f64::from(completed) * 100.0 / f64::from(total)).round();
    pct.clamp(0.0, 100.0) as u8
}

impl ProgressCounts {
    pub fn percentage(&self) -> u8 {
        progress_percentage(self.completed_items, self.total_items)
    }

    pub fn is_complete(&self) -> bool {
        self.percentage() == 100
    }
}

/// Outcome of grading one quiz attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizGrade {
    pub correct: u32,
    pub total: u32,
    pub score: u8,
}

impl QuizGrade {
    pub fn passes(&self, passing_score: u8) -> bool {
        meets_passing_score(self.score, passing_score)
    }
}

pub fn meets_passing_score(score: u8, passing_score: u8) -> bool {
    score >= passing_score
}

/// Grade `answers` (option indexes) against the quiz questions.
pub fn grade_quiz(questions: &[QuizQuestion], answers: &[usize]) -> Result<QuizGrade> {
    if answers.len() != questions.len() {
        return Err(LmsError::validation(format!(
            "expected {} answers, got {}",
            questions.len(),
            answers.len()
        )));
    }

    let correct = questions
        .iter()
        .zip(answers)
        .filter(|(question, answer)| question.answer_index == **answer)
        .count() as u32;
    let total = questions.len() as u32;

    Ok(QuizGrade {
        correct,
        total,
        score: progress_percentage(correct, total),
    })
}

/// Reject quizzes that could never be answered correctly.
pub fn validate_quiz(questions: &[QuizQuestion], passing_score: u8) -> Result<()> {
    if questions.is_empty() {
        return Err(LmsError::validation("a quiz needs at least one question"));
    }
    if passing_score > 100 {
        return Err(LmsError::validation("passing_score must be between 0 and 100"));
    }
    for (idx, question) in questions.iter().enumerate() {
        if question.prompt.trim().is_empty() {
            return Err(LmsError::validation(format!("question {} has no prompt", idx + 1)));
        }
        if question.options.len() < 2 {
            return Err(LmsError::validation(format!(
                "question {} needs at least two options",
                idx + 1
            )));
        }
        if question.answer_index >= question.options.len() {
            return Err(LmsError::validation(format!(
                "question {} has an answer_index outside its options",
                idx + 1
            )));
        }
    }
    Ok(())
}

/// `CERT-<YYYYMMDD>-<10 hex chars of sha256(enrollment id)>`.
pub fn certificate_number(enrollment_id: Uuid, issued_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(enrollment_id.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!(
        "CERT-{}-{}",
        issued_at.format("%Y%m%d"),
        digest[..10].to_uppercase()
    )
}
