use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailKind {
    Video,
    Document,
    Assignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Active,
    Completed,
}

/// Invoice status as reported by the payment gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Settled,
    Expired,
    Failed,
}

impl PaymentStatus {
    /// Money has been received for the invoice.
    pub fn is_paid(self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Settled)
    }
}

macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($ty), other)),
                }
            }
        }
    };
}

text_enum!(Role { Student => "student", Instructor => "instructor", Admin => "admin" });
text_enum!(DetailKind { Video => "video", Document => "document", Assignment => "assignment" });
text_enum!(EnrollmentStatus { Active => "active", Completed => "completed" });
text_enum!(PaymentStatus {
    Pending => "PENDING",
    Paid => "PAID",
    Settled => "SETTLED",
    Expired => "EXPIRED",
    Failed => "FAILED",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub api_token_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: Uuid,
    pub instructor_id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub category: Option<String>,
    /// Whole currency units; zero means the course is free.
    pub price: i64,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn is_free(&self) -> bool {
        self.price == 0
    }

    /// Owners and admins may manage a course.
    pub fn is_managed_by(&self, user: &User) -> bool {
        user.is_admin() || self.instructor_id == user.id
    }
}

/// Catalog row: a published course with aggregate figures.
#[derive(Debug, Clone, Serialize)]
pub struct CourseSummary {
    #[serde(flatten)]
    pub course: Course,
    pub average_rating: Option<f64>,
    pub review_count: i64,
    pub enrollment_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialDetail {
    pub id: Uuid,
    pub material_id: Uuid,
    pub title: String,
    pub kind: DetailKind,
    pub content_url: Option<String>,
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub prompt: String,
    pub options: Vec<String>,
    pub answer_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: Uuid,
    pub material_id: Uuid,
    pub title: String,
    pub questions: Vec<QuizQuestion>,
    pub passing_score: u8,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub status: EnrollmentStatus,
    pub progress: u8,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    pub fn new(user_id: Uuid, course_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            course_id,
            status: EnrollmentStatus::Active,
            progress: 0,
            enrolled_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Enrollment joined with the course title, for "my courses" listings.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentOverview {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub course_title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentProgress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub material_detail_id: Uuid,
    pub submission_url: Option<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentQuizAnswer {
    pub id: Uuid,
    pub user_id: Uuid,
    pub quiz_id: Uuid,
    pub answers: Vec<usize>,
    pub score: u8,
    pub passed: bool,
    pub submitted_at: DateTime<Utc>,
}

/// Counts feeding the progress percentage for one user in one course.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressCounts {
    pub completed_items: u32,
    pub total_items: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub external_id: String,
    pub gateway_invoice_id: Option<String>,
    pub amount: i64,
    pub status: PaymentStatus,
    pub invoice_url: Option<String>,
    pub payment_method: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub certificate_number: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_round_trip_through_strings() {
        assert_eq!("PAID".parse::<PaymentStatus>().unwrap(), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::Settled.as_str(), "SETTLED");
        assert_eq!("assignment".parse::<DetailKind>().unwrap(), DetailKind::Assignment);
        assert!("paid".parse::<PaymentStatus>().is_err());
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn paid_and_settled_count_as_paid() {
        assert!(PaymentStatus::Paid.is_paid());
        assert!(PaymentStatus::Settled.is_paid());
        assert!(!PaymentStatus::Pending.is_paid());
        assert!(!PaymentStatus::Expired.is_paid());
    }

    #[test]
    fn payment_status_serializes_upper_case() {
        let json = serde_json::to_string(&PaymentStatus::Expired).unwrap();
        assert_eq!(json, "\"EXPIRED\"");
    }
}
