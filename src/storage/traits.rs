use crate::domain::*;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Result of applying a paid webhook to a stored payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaidTransition {
    /// The stored status was still pending and has now been marked paid.
    pub applied: bool,
    /// A new enrollment row was created for the payer.
    pub enrollment_created: bool,
}

/// Storage trait for persisting learning platform data
#[async_trait]
pub trait Storage: Send + Sync {
    // User operations
    async fn create_user(&self, user: &User) -> Result<()>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn get_user_by_token_hash(&self, token_hash: &str) -> Result<Option<User>>;

    // Course operations
    async fn create_course(&self, course: &Course) -> Result<()>;
    async fn update_course(&self, course: &Course) -> Result<()>;
    async fn get_course(&self, id: Uuid) -> Result<Option<Course>>;
    async fn list_published_courses(&self, query: &CourseQuery) -> Result<Vec<CourseSummary>>;
    async fn list_courses_by_instructor(&self, instructor_id: Uuid) -> Result<Vec<Course>>;
    /// Soft-deletes the course and everything beneath it in one transaction.
    async fn delete_course(&self, id: Uuid) -> Result<()>;

    // Material operations
    async fn create_material(&self, material: &Material) -> Result<()>;
    async fn update_material(&self, material: &Material) -> Result<()>;
    async fn get_material(&self, id: Uuid) -> Result<Option<Material>>;
    async fn list_materials(&self, course_id: Uuid) -> Result<Vec<Material>>;
    /// Soft-deletes the material, its content items and quizzes in one transaction.
    async fn delete_material(&self, id: Uuid) -> Result<()>;

    // Content item operations
    async fn create_material_detail(&self, detail: &MaterialDetail) -> Result<()>;
    async fn get_material_detail(&self, id: Uuid) -> Result<Option<MaterialDetail>>;
    async fn list_details_for_course(&self, course_id: Uuid) -> Result<Vec<MaterialDetail>>;
    async fn delete_material_detail(&self, id: Uuid) -> Result<()>;

    // Quiz operations
    async fn create_quiz(&self, quiz: &Quiz) -> Result<()>;
    async fn get_quiz(&self, id: Uuid) -> Result<Option<Quiz>>;
    async fn list_quizzes_for_course(&self, course_id: Uuid) -> Result<Vec<Quiz>>;

    // Enrollment operations
    /// Inserts unless the user is already enrolled; returns whether a row was created.
    async fn create_enrollment_if_absent(&self, enrollment: &Enrollment) -> Result<bool>;
    async fn get_enrollment(&self, user_id: Uuid, course_id: Uuid) -> Result<Option<Enrollment>>;
    async fn list_enrollments_for_user(&self, user_id: Uuid) -> Result<Vec<EnrollmentOverview>>;
    async fn update_enrollment(&self, enrollment: &Enrollment) -> Result<()>;

    // Progress operations
    async fn upsert_progress(&self, progress: &StudentProgress) -> Result<()>;
    async fn progress_counts(&self, user_id: Uuid, course_id: Uuid) -> Result<ProgressCounts>;
    async fn list_assignment_submissions(&self, course_id: Uuid) -> Result<Vec<StudentProgress>>;

    // Quiz answer operations
    async fn get_quiz_answer(&self, user_id: Uuid, quiz_id: Uuid) -> Result<Option<StudentQuizAnswer>>;
    async fn upsert_quiz_answer(&self, answer: &StudentQuizAnswer) -> Result<()>;

    // Payment operations
    async fn create_payment(&self, payment: &Payment) -> Result<()>;
    async fn update_payment(&self, payment: &Payment) -> Result<()>;
    async fn get_payment_by_external_id(&self, external_id: &str) -> Result<Option<Payment>>;
    async fn find_pending_payment(&self, user_id: Uuid, course_id: Uuid) -> Result<Option<Payment>>;
    async fn list_payments_for_user(&self, user_id: Uuid) -> Result<Vec<Payment>>;
    /// Compare-and-set from PENDING or EXPIRED to `status`, creating `enrollment` in the same transaction.
    async fn mark_payment_paid(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        paid_at: DateTime<Utc>,
        payment_method: Option<&str>,
        enrollment: &Enrollment,
    ) -> Result<PaidTransition>;
    /// Moves the payment from `from` to `to`; returns false when the stored status was not `from`.
    async fn transition_payment_status(
        &self,
        payment_id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<bool>;

    // Webhook delivery log
    /// Records a delivery key; returns false when the key was already seen.
    async fn record_webhook_event(&self, key: &str, external_id: &str, status: &str) -> Result<bool>;
    /// Drops a delivery key so a redelivery of the same callback is applied again.
    async fn forget_webhook_event(&self, key: &str) -> Result<()>;

    // Certificate operations
    /// Inserts unless the enrollment already has a certificate; returns the stored one.
    async fn create_certificate_if_absent(&self, certificate: &Certificate) -> Result<(Certificate, bool)>;
    async fn get_certificate_by_number(&self, number: &str) -> Result<Option<Certificate>>;

    // Review operations
    async fn create_review(&self, review: &Review) -> Result<()>;
    async fn get_review(&self, id: Uuid) -> Result<Option<Review>>;
    async fn find_review(&self, user_id: Uuid, course_id: Uuid) -> Result<Option<Review>>;
    async fn list_reviews(&self, course_id: Uuid) -> Result<Vec<Review>>;
    async fn delete_review(&self, id: Uuid) -> Result<()>;
}
