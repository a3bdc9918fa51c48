//! Account, enrollment, progress, certificate and review handlers.

use super::auth::{ApiJson, AuthUser};
use super::AppState;
use crate::app::account_use_case::{NewUser, Registration};
use crate::app::certificate_use_case::{CertificateClaim, CertificateVerification};
use crate::app::enrollment_use_case::ProgressReport;
use crate::app::learning_use_case::{CompletionRequest, QuizResult, QuizSubmission};
use crate::app::review_use_case::NewReview;
use crate::domain::{Enrollment, EnrollmentOverview, Review, StudentProgress, User};
use crate::error::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

pub async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<NewUser>,
) -> Result<(StatusCode, Json<Registration>)> {
    let registration = state.accounts.register(body).await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

pub async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

pub async fn enroll(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(course_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Enrollment>)> {
    let enrollment = state.enrollments.enroll_free(&user, course_id).await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

pub async fn enrollments(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<EnrollmentOverview>>> {
    Ok(Json(state.enrollments.list_enrollments(&user).await?))
}

pub async fn progress(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(course_id): Path<Uuid>,
) -> Result<Json<ProgressReport>> {
    Ok(Json(state.enrollments.progress(&user, course_id).await?))
}

/// The body is optional; only assignments carry one.
pub async fn complete_detail(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(detail_id): Path<Uuid>,
    body: Option<Json<CompletionRequest>>,
) -> Result<Json<ProgressReport>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(state.learning.complete_detail(&user, detail_id, request).await?))
}

pub async fn submissions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(course_id): Path<Uuid>,
) -> Result<Json<Vec<StudentProgress>>> {
    Ok(Json(state.learning.submissions(&user, course_id).await?))
}

pub async fn submit_quiz(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(quiz_id): Path<Uuid>,
    ApiJson(body): ApiJson<QuizSubmission>,
) -> Result<Json<QuizResult>> {
    Ok(Json(state.learning.submit_quiz(&user, quiz_id, body).await?))
}

pub async fn claim_certificate(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(course_id): Path<Uuid>,
) -> Result<(StatusCode, Json<CertificateClaim>)> {
    let claim = state.certificates.claim(&user, course_id).await?;
    let status = if claim.newly_issued {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(claim)))
}

pub async fn verify_certificate(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> Result<Json<CertificateVerification>> {
    Ok(Json(state.certificates.verify(&number).await?))
}

pub async fn create_review(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(course_id): Path<Uuid>,
    ApiJson(body): ApiJson<NewReview>,
) -> Result<(StatusCode, Json<Review>)> {
    let review = state.reviews.create(&user, course_id, body).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> Result<Json<Vec<Review>>> {
    Ok(Json(state.reviews.list(course_id).await?))
}

pub async fn delete_review(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(review_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.reviews.delete(&user, review_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
