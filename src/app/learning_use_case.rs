use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::app::catalog_use_case::ensure_manages;
use crate::app::enrollment_use_case::{refresh_progress, require_enrollment, ProgressReport};
use crate::domain::{DetailKind, StudentProgress, StudentQuizAnswer, User};
use crate::error::{LmsError, Result};
use crate::metrics::LmsMetrics;
use crate::progress::grade_quiz;
use crate::storage::Storage;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionRequest {
    pub submission_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuizSubmission {
    pub answers: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizResult {
    pub quiz_id: Uuid,
    pub score: u8,
    pub passed: bool,
    pub correct: u32,
    pub total: u32,
    pub best_score: u8,
    pub progress: ProgressReport,
}

/// Use case for learner activity: finishing content items, handing in
/// assignments and taking quizzes
pub struct LearningUseCase {
    storage: Arc<dyn Storage>,
}

impl LearningUseCase {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn complete_detail(
        &self,
        user: &User,
        detail_id: Uuid,
        request: CompletionRequest,
    ) -> Result<ProgressReport> {
        let detail = self
            .storage
            .get_material_detail(detail_id)
            .await?
            .ok_or_else(|| LmsError::not_found("content item"))?;
        let course_id = self.course_of_material(detail.material_id).await?;
        let enrollment = require_enrollment(self.storage.as_ref(), user, course_id).await?;

        let submission_url = match detail.kind {
            DetailKind::Assignment => {
                let url = request
                    .submission_url
                    .map(|u| u.trim().to_string())
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| LmsError::validation("assignments need a submission_url"))?;
                Some(url)
            }
            _ => None,
        };

        self.storage
            .upsert_progress(&StudentProgress {
                id: Uuid::new_v4(),
                user_id: user.id,
                material_detail_id: detail.id,
                submission_url,
                completed_at: Utc::now(),
            })
            .await?;

        refresh_progress(self.storage.as_ref(), enrollment).await
    }

    /// Grade an attempt. The best attempt is kept, so a passed quiz stays passed.
    pub async fn submit_quiz(&self, user: &User, quiz_id: Uuid, submission: QuizSubmission) -> Result<QuizResult> {
        let quiz = self
            .storage
            .get_quiz(quiz_id)
            .await?
            .ok_or_else(|| LmsError::not_found("quiz"))?;
        let course_id = self.course_of_material(quiz.material_id).await?;
        let enrollment = require_enrollment(self.storage.as_ref(), user, course_id).await?;

        let grade = grade_quiz(&quiz.questions, &submission.answers)?;
        let passed = grade.passes(quiz.passing_score);
        LmsMetrics::quiz_submitted(passed);

        let previous = self.storage.get_quiz_answer(user.id, quiz.id).await?;
        let best_score = match &previous {
            Some(prev) if prev.score >= grade.score => prev.score,
            _ => {
                self.storage
                    .upsert_quiz_answer(&StudentQuizAnswer {
                        id: Uuid::new_v4(),
                        user_id: user.id,
                        quiz_id: quiz.id,
                        answers: submission.answers,
                        score: grade.score,
                        passed,
                        submitted_at: Utc::now(),
                    })
                    .await?;
                grade.score
            }
        };
        info!(
            user_id = %user.id,
            quiz_id = %quiz.id,
            score = grade.score,
            passed,
            "Quiz submitted"
        );

        let progress = refresh_progress(self.storage.as_ref(), enrollment).await?;
        Ok(QuizResult {
            quiz_id: quiz.id,
            score: grade.score,
            passed,
            correct: grade.correct,
            total: grade.total,
            best_score,
            progress,
        })
    }

    /// Assignment hand-ins for a course, for its instructor.
    pub async fn submissions(&self, user: &User, course_id: Uuid) -> Result<Vec<StudentProgress>> {
        let course = self
            .storage
            .get_course(course_id)
            .await?
            .ok_or_else(|| LmsError::not_found("course"))?;
        ensure_manages(&course, user)?;
        self.storage.list_assignment_submissions(course.id).await
    }

    async fn course_of_material(&self, material_id: Uuid) -> Result<Uuid> {
        let material = self
            .storage
            .get_material(material_id)
            .await?
            .ok_or_else(|| LmsError::not_found("material"))?;
        Ok(material.course_id)
    }
}
