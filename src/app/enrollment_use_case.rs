use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::constants::SOURCE_FREE;
use crate::domain::{Course, Enrollment, EnrollmentOverview, EnrollmentStatus, User};
use crate::error::{LmsError, Result};
use crate::metrics::LmsMetrics;
use crate::storage::Storage;

/// Freshly computed progress for one enrollment.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub enrollment_id: Uuid,
    pub course_id: Uuid,
    pub progress: u8,
    pub status: EnrollmentStatus,
    pub completed_items: u32,
    pub total_items: u32,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Load the caller's enrollment in `course_id`, or refuse.
pub(crate) async fn require_enrollment(
    storage: &dyn Storage,
    user: &User,
    course_id: Uuid,
) -> Result<Enrollment> {
    storage
        .get_enrollment(user.id, course_id)
        .await?
        .ok_or_else(|| LmsError::forbidden("you are not enrolled in this course"))
}

/// Recompute progress from stored completions and persist it on the
/// enrollment. Completion is sticky: `completed_at` is set the first time
/// progress reaches 100 and never cleared.
pub(crate) async fn refresh_progress(
    storage: &dyn Storage,
    mut enrollment: Enrollment,
) -> Result<ProgressReport> {
    let counts = storage
        .progress_counts(enrollment.user_id, enrollment.course_id)
        .await?;
    let progress = counts.percentage();

    let mut changed = enrollment.progress != progress;
    enrollment.progress = progress;
    if progress == 100 && enrollment.status != EnrollmentStatus::Completed {
        enrollment.status = EnrollmentStatus::Completed;
        enrollment.completed_at = Some(Utc::now());
        changed = true;
        info!(enrollment_id = %enrollment.id, course_id = %enrollment.course_id, "Course completed");
    }
    if changed {
        storage.update_enrollment(&enrollment).await?;
        debug!(enrollment_id = %enrollment.id, progress, "Progress updated");
    }

    Ok(ProgressReport {
        enrollment_id: enrollment.id,
        course_id: enrollment.course_id,
        progress,
        status: enrollment.status,
        completed_items: counts.completed_items,
        total_items: counts.total_items,
        completed_at: enrollment.completed_at,
    })
}

/// Use case for joining free courses and listing a learner's courses
pub struct EnrollmentUseCase {
    storage: Arc<dyn Storage>,
}

impl EnrollmentUseCase {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Enroll in a free course. Paid courses go through checkout.
    pub async fn enroll_free(&self, user: &User, course_id: Uuid) -> Result<Enrollment> {
        let course = self.published_course(course_id).await?;
        if !course.is_free() {
            return Err(LmsError::validation(
                "this course is paid; start a checkout to enroll",
            ));
        }

        let enrollment = Enrollment::new(user.id, course.id);
        if !self.storage.create_enrollment_if_absent(&enrollment).await? {
            return Err(LmsError::conflict("already enrolled in this course"));
        }
        LmsMetrics::enrollment_created(SOURCE_FREE);
        info!(user_id = %user.id, course_id = %course.id, "Enrolled in free course");
        Ok(enrollment)
    }

    pub async fn list_enrollments(&self, user: &User) -> Result<Vec<EnrollmentOverview>> {
        self.storage.list_enrollments_for_user(user.id).await
    }

    pub async fn progress(&self, user: &User, course_id: Uuid) -> Result<ProgressReport> {
        let enrollment = require_enrollment(self.storage.as_ref(), user, course_id).await?;
        refresh_progress(self.storage.as_ref(), enrollment).await
    }

    async fn published_course(&self, course_id: Uuid) -> Result<Course> {
        self.storage
            .get_course(course_id)
            .await?
            .filter(|c| c.is_published)
            .ok_or_else(|| LmsError::not_found("course"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DetailKind, Material, MaterialDetail, Role, StudentProgress};
    use crate::storage::SqliteStorage;

    fn user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            name: "U".to_string(),
            email: format!("{}@example.com", Uuid::new_v4()),
            role,
            api_token_hash: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        }
    }

    async fn course_with_price(storage: &SqliteStorage, owner: &User, price: i64) -> Course {
        let now = Utc::now();
        let course = Course {
            id: Uuid::new_v4(),
            instructor_id: owner.id,
            title: "Course".to_string(),
            slug: "course".to_string(),
            description: String::new(),
            category: None,
            price,
            is_published: true,
            created_at: now,
            updated_at: now,
        };
        storage.create_course(&course).await.unwrap();
        course
    }

    #[tokio::test]
    async fn free_enrollment_happens_once() {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let owner = user(Role::Instructor);
        let student = user(Role::Student);
        storage.create_user(&owner).await.unwrap();
        storage.create_user(&student).await.unwrap();
        let course = course_with_price(&storage, &owner, 0).await;
        let enrollments = EnrollmentUseCase::new(storage.clone());

        enrollments.enroll_free(&student, course.id).await.unwrap();
        let err = enrollments.enroll_free(&student, course.id).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
        assert_eq!(enrollments.list_enrollments(&student).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn paid_courses_require_checkout() {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let owner = user(Role::Instructor);
        let student = user(Role::Student);
        storage.create_user(&owner).await.unwrap();
        storage.create_user(&student).await.unwrap();
        let course = course_with_price(&storage, &owner, 250_000).await;

        let err = EnrollmentUseCase::new(storage)
            .enroll_free(&student, course.id)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn progress_completes_and_stays_completed() {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let owner = user(Role::Instructor);
        let student = user(Role::Student);
        storage.create_user(&owner).await.unwrap();
        storage.create_user(&student).await.unwrap();
        let course = course_with_price(&storage, &owner, 0).await;
        let now = Utc::now();
        let material = Material {
            id: Uuid::new_v4(),
            course_id: course.id,
            title: "Ch".to_string(),
            position: 1,
            created_at: now,
            updated_at: now,
        };
        storage.create_material(&material).await.unwrap();
        let make_detail = || MaterialDetail {
            id: Uuid::new_v4(),
            material_id: material.id,
            title: "Doc".to_string(),
            kind: DetailKind::Document,
            content_url: Some("https://example.com/doc.pdf".to_string()),
            position: 0,
            created_at: now,
        };
        let doc = make_detail();
        storage.create_material_detail(&doc).await.unwrap();

        let enrollments = EnrollmentUseCase::new(storage.clone());
        enrollments.enroll_free(&student, course.id).await.unwrap();
        assert_eq!(enrollments.progress(&student, course.id).await.unwrap().progress, 0);

        storage
            .upsert_progress(&StudentProgress {
                id: Uuid::new_v4(),
                user_id: student.id,
                material_detail_id: doc.id,
                submission_url: None,
                completed_at: now,
            })
            .await
            .unwrap();
        let report = enrollments.progress(&student, course.id).await.unwrap();
        assert_eq!(report.progress, 100);
        assert_eq!(report.status, EnrollmentStatus::Completed);
        let completed_at = report.completed_at;
        assert!(completed_at.is_some());

        // New content lowers the percentage but keeps the completion record
        storage.create_material_detail(&make_detail()).await.unwrap();
        let report = enrollments.progress(&student, course.id).await.unwrap();
        assert_eq!(report.progress, 50);
        assert_eq!(report.status, EnrollmentStatus::Completed);
        assert_eq!(report.completed_at, completed_at);
    }

    #[tokio::test]
    async fn progress_requires_enrollment() {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let student = user(Role::Student);
        storage.create_user(&student).await.unwrap();
        let err = EnrollmentUseCase::new(storage)
            .progress(&student, Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }
}
