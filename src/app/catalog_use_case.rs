use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::domain::{Course, CourseQuery, CourseSummary, Material, MaterialDetail, Quiz, Role, User};
use crate::error::{LmsError, Result};
use crate::storage::Storage;

static NON_SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug regex"));

pub fn slugify(title: &str) -> String {
    NON_SLUG_RE
        .replace_all(&title.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCourse {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: Option<String>,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub is_published: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<i64>,
    pub is_published: Option<bool>,
}

/// Quiz as shown to learners: the answer key stays server-side.
#[derive(Debug, Clone, Serialize)]
pub struct QuizView {
    pub id: Uuid,
    pub material_id: Uuid,
    pub title: String,
    pub passing_score: u8,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub prompt: String,
    pub options: Vec<String>,
}

impl From<Quiz> for QuizView {
    fn from(quiz: Quiz) -> Self {
        Self {
            id: quiz.id,
            material_id: quiz.material_id,
            title: quiz.title,
            passing_score: quiz.passing_score,
            questions: quiz
                .questions
                .into_iter()
                .map(|q| QuestionView {
                    prompt: q.prompt,
                    options: q.options,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterialView {
    #[serde(flatten)]
    pub material: Material,
    pub details: Vec<MaterialDetail>,
    pub quizzes: Vec<QuizView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    pub materials: Vec<MaterialView>,
}

/// Owners and admins only.
pub(crate) fn ensure_manages(course: &Course, user: &User) -> Result<()> {
    if course.is_managed_by(user) {
        Ok(())
    } else {
        Err(LmsError::forbidden("you do not manage this course"))
    }
}

/// Use case for the course catalog and course lifecycle
pub struct CatalogUseCase {
    storage: Arc<dyn Storage>,
}

impl CatalogUseCase {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn list_catalog(&self, query: &CourseQuery) -> Result<Vec<CourseSummary>> {
        self.storage.list_published_courses(query).await
    }

    /// Load a live course the viewer is allowed to see. Drafts are only
    /// visible to their managers.
    pub async fn visible_course(&self, course_id: Uuid, viewer: Option<&User>) -> Result<Course> {
        let course = self
            .storage
            .get_course(course_id)
            .await?
            .ok_or_else(|| LmsError::not_found("course"))?;
        let can_manage = viewer.map(|u| course.is_managed_by(u)).unwrap_or(false);
        if !course.is_published && !can_manage {
            return Err(LmsError::not_found("course"));
        }
        Ok(course)
    }

    pub async fn course_detail(&self, course_id: Uuid, viewer: Option<&User>) -> Result<CourseDetail> {
        let course = self.visible_course(course_id, viewer).await?;
        let materials = self.storage.list_materials(course.id).await?;
        let details = self.storage.list_details_for_course(course.id).await?;
        let quizzes = self.storage.list_quizzes_for_course(course.id).await?;

        let materials = materials
            .into_iter()
            .map(|material| {
                let details = details
                    .iter()
                    .filter(|d| d.material_id == material.id)
                    .cloned()
                    .collect();
                let quizzes = quizzes
                    .iter()
                    .filter(|q| q.material_id == material.id)
                    .cloned()
                    .map(QuizView::from)
                    .collect();
                MaterialView {
                    material,
                    details,
                    quizzes,
                }
            })
            .collect();

        Ok(CourseDetail { course, materials })
    }

    pub async fn create_course(&self, user: &User, new_course: NewCourse) -> Result<Course> {
        if user.role == Role::Student {
            return Err(LmsError::forbidden("only instructors can create courses"));
        }
        let title = new_course.title.trim().to_string();
        validate_course_fields(&title, new_course.price)?;

        let now = Utc::now();
        let course = Course {
            id: Uuid::new_v4(),
            instructor_id: user.id,
            slug: slugify(&title),
            title,
            description: new_course.description,
            category: normalize_category(new_course.category),
            price: new_course.price,
            is_published: new_course.is_published,
            created_at: now,
            updated_at: now,
        };
        self.storage.create_course(&course).await?;
        info!(course_id = %course.id, instructor_id = %user.id, "Created course");
        Ok(course)
    }

    pub async fn update_course(&self, user: &User, course_id: Uuid, update: CourseUpdate) -> Result<Course> {
        let mut course = self.managed_course(user, course_id).await?;

        if let Some(title) = update.title {
            course.title = title.trim().to_string();
            course.slug = slugify(&course.title);
        }
        if let Some(description) = update.description {
            course.description = description;
        }
        if update.category.is_some() {
            course.category = normalize_category(update.category);
        }
        if let Some(price) = update.price {
            course.price = price;
        }
        if let Some(published) = update.is_published {
            course.is_published = published;
        }
        validate_course_fields(&course.title, course.price)?;

        course.updated_at = Utc::now();
        self.storage.update_course(&course).await?;
        Ok(course)
    }

    pub async fn delete_course(&self, user: &User, course_id: Uuid) -> Result<()> {
        let course = self.managed_course(user, course_id).await?;
        self.storage.delete_course(course.id).await
    }

    pub async fn list_own_courses(&self, user: &User) -> Result<Vec<Course>> {
        self.storage.list_courses_by_instructor(user.id).await
    }

    async fn managed_course(&self, user: &User, course_id: Uuid) -> Result<Course> {
        let course = self
            .storage
            .get_course(course_id)
            .await?
            .ok_or_else(|| LmsError::not_found("course"))?;
        ensure_manages(&course, user)?;
        Ok(course)
    }
}

fn validate_course_fields(title: &str, price: i64) -> Result<()> {
    if title.is_empty() {
        return Err(LmsError::validation("title is required"));
    }
    if price < 0 {
        return Err(LmsError::validation("price cannot be negative"));
    }
    Ok(())
}

fn normalize_category(category: Option<String>) -> Option<String> {
    category
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
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

    async fn setup() -> (CatalogUseCase, User, User) {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let owner = user(Role::Instructor);
        let student = user(Role::Student);
        storage.create_user(&owner).await.unwrap();
        storage.create_user(&student).await.unwrap();
        (CatalogUseCase::new(storage), owner, student)
    }

    fn new_course(title: &str, price: i64) -> NewCourse {
        NewCourse {
            title: title.to_string(),
            description: "About".to_string(),
            category: Some(" Programming ".to_string()),
            price,
            is_published: false,
        }
    }

    #[test]
    fn slugs_are_url_safe() {
        assert_eq!(slugify("Intro to Rust: Ownership & Borrowing!"), "intro-to-rust-ownership-borrowing");
        assert_eq!(slugify("  --  "), "");
    }

    #[tokio::test]
    async fn students_cannot_create_courses() {
        let (catalog, _, student) = setup().await;
        let err = catalog
            .create_course(&student, new_course("Mine", 0))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn drafts_are_hidden_from_non_owners() {
        let (catalog, owner, student) = setup().await;
        let course = catalog.create_course(&owner, new_course("Draft", 0)).await.unwrap();
        assert_eq!(course.category.as_deref(), Some("programming"));

        let err = catalog.course_detail(course.id, Some(&student)).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert!(catalog.course_detail(course.id, Some(&owner)).await.is_ok());

        catalog
            .update_course(
                &owner,
                course.id,
                CourseUpdate { is_published: Some(true), ..Default::default() },
            )
            .await
            .unwrap();
        assert!(catalog.course_detail(course.id, None).await.is_ok());
    }

    #[tokio::test]
    async fn only_owner_updates_and_price_stays_non_negative() {
        let (catalog, owner, student) = setup().await;
        let course = catalog.create_course(&owner, new_course("Paid", 1000)).await.unwrap();

        let err = catalog
            .update_course(&student, course.id, CourseUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);

        let err = catalog
            .update_course(&owner, course.id, CourseUpdate { price: Some(-1), ..Default::default() })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let renamed = catalog
            .update_course(
                &owner,
                course.id,
                CourseUpdate { title: Some("Paid Course v2".to_string()), ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(renamed.slug, "paid-course-v2");
    }

    #[tokio::test]
    async fn deleted_courses_disappear() {
        let (catalog, owner, _) = setup().await;
        let course = catalog.create_course(&owner, new_course("Gone", 0)).await.unwrap();
        catalog.delete_course(&owner, course.id).await.unwrap();
        let err = catalog.course_detail(course.id, Some(&owner)).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert!(catalog.list_own_courses(&owner).await.unwrap().is_empty());
    }
}
