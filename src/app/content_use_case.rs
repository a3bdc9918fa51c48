use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::app::catalog_use_case::ensure_manages;
use crate::constants::DEFAULT_PASSING_SCORE;
use crate::domain::{Course, DetailKind, Material, MaterialDetail, Quiz, QuizQuestion, User};
use crate::error::{LmsError, Result};
use crate::progress::validate_quiz;
use crate::storage::Storage;

#[derive(Debug, Clone, Deserialize)]
pub struct NewMaterial {
    pub title: String,
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MaterialUpdate {
    pub title: Option<String>,
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMaterialDetail {
    pub title: String,
    pub kind: DetailKind,
    pub content_url: Option<String>,
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewQuiz {
    pub title: String,
    pub questions: Vec<QuizQuestion>,
    pub passing_score: Option<u8>,
}

/// Use case for course content: chapters, their content items and quizzes.
/// Every write verifies ownership of the parent course.
pub struct ContentUseCase {
    storage: Arc<dyn Storage>,
}

impl ContentUseCase {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn create_material(&self, user: &User, course_id: Uuid, new: NewMaterial) -> Result<Material> {
        let course = self.course(course_id).await?;
        ensure_manages(&course, user)?;
        let title = required_title(&new.title)?;

        let position = match new.position {
            Some(p) => p,
            None => self.storage.list_materials(course.id).await?.len() as i64 + 1,
        };
        let now = Utc::now();
        let material = Material {
            id: Uuid::new_v4(),
            course_id: course.id,
            title,
            position,
            created_at: now,
            updated_at: now,
        };
        self.storage.create_material(&material).await?;
        info!(course_id = %course.id, material_id = %material.id, "Added material");
        Ok(material)
    }

    pub async fn update_material(&self, user: &User, material_id: Uuid, update: MaterialUpdate) -> Result<Material> {
        let (mut material, _) = self.managed_material(user, material_id).await?;
        if let Some(title) = update.title {
            material.title = required_title(&title)?;
        }
        if let Some(position) = update.position {
            material.position = position;
        }
        material.updated_at = Utc::now();
        self.storage.update_material(&material).await?;
        Ok(material)
    }

    /// Removes the chapter together with its content items and quizzes.
    pub async fn delete_material(&self, user: &User, material_id: Uuid) -> Result<()> {
        let (material, _) = self.managed_material(user, material_id).await?;
        self.storage.delete_material(material.id).await
    }

    pub async fn create_detail(
        &self,
        user: &User,
        material_id: Uuid,
        new: NewMaterialDetail,
    ) -> Result<MaterialDetail> {
        let (material, _) = self.managed_material(user, material_id).await?;
        let title = required_title(&new.title)?;
        let content_url = new.content_url.filter(|u| !u.trim().is_empty());
        if new.kind != DetailKind::Assignment && content_url.is_none() {
            return Err(LmsError::validation("content_url is required for videos and documents"));
        }

        let detail = MaterialDetail {
            id: Uuid::new_v4(),
            material_id: material.id,
            title,
            kind: new.kind,
            content_url,
            position: new.position.unwrap_or(0),
            created_at: Utc::now(),
        };
        self.storage.create_material_detail(&detail).await?;
        Ok(detail)
    }

    pub async fn delete_detail(&self, user: &User, detail_id: Uuid) -> Result<()> {
        let detail = self
            .storage
            .get_material_detail(detail_id)
            .await?
            .ok_or_else(|| LmsError::not_found("content item"))?;
        self.managed_material(user, detail.material_id).await?;
        self.storage.delete_material_detail(detail.id).await
    }

    pub async fn create_quiz(&self, user: &User, material_id: Uuid, new: NewQuiz) -> Result<Quiz> {
        let (material, _) = self.managed_material(user, material_id).await?;
        let title = required_title(&new.title)?;
        let passing_score = new.passing_score.unwrap_or(DEFAULT_PASSING_SCORE);
        validate_quiz(&new.questions, passing_score)?;

        let quiz = Quiz {
            id: Uuid::new_v4(),
            material_id: material.id,
            title,
            questions: new.questions,
            passing_score,
            created_at: Utc::now(),
        };
        self.storage.create_quiz(&quiz).await?;
        info!(quiz_id = %quiz.id, questions = quiz.questions.len(), "Added quiz");
        Ok(quiz)
    }

    async fn course(&self, course_id: Uuid) -> Result<Course> {
        self.storage
            .get_course(course_id)
            .await?
            .ok_or_else(|| LmsError::not_found("course"))
    }

    async fn managed_material(&self, user: &User, material_id: Uuid) -> Result<(Material, Course)> {
        let material = self
            .storage
            .get_material(material_id)
            .await?
            .ok_or_else(|| LmsError::not_found("material"))?;
        let course = self.course(material.course_id).await?;
        ensure_manages(&course, user)?;
        Ok((material, course))
    }
}

fn required_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        Err(LmsError::validation("title is required"))
    } else {
        Ok(title.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use crate::storage::SqliteStorage;

    struct Fixture {
        storage: Arc<SqliteStorage>,
        content: ContentUseCase,
        owner: User,
        stranger: User,
        course: Course,
    }

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

    async fn fixture() -> Fixture {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let owner = user(Role::Instructor);
        let stranger = user(Role::Instructor);
        storage.create_user(&owner).await.unwrap();
        storage.create_user(&stranger).await.unwrap();
        let now = Utc::now();
        let course = Course {
            id: Uuid::new_v4(),
            instructor_id: owner.id,
            title: "Course".to_string(),
            slug: "course".to_string(),
            description: String::new(),
            category: None,
            price: 0,
            is_published: true,
            created_at: now,
            updated_at: now,
        };
        storage.create_course(&course).await.unwrap();
        Fixture {
            content: ContentUseCase::new(storage.clone()),
            storage,
            owner,
            stranger,
            course,
        }
    }

    fn new_material(title: &str) -> NewMaterial {
        NewMaterial { title: title.to_string(), position: None }
    }

    #[tokio::test]
    async fn materials_get_sequential_positions() {
        let f = fixture().await;
        let first = f.content.create_material(&f.owner, f.course.id, new_material("One")).await.unwrap();
        let second = f.content.create_material(&f.owner, f.course.id, new_material("Two")).await.unwrap();
        assert_eq!(first.position, 1);
        assert_eq!(second.position, 2);
    }

    #[tokio::test]
    async fn strangers_cannot_edit_content() {
        let f = fixture().await;
        let err = f
            .content
            .create_material(&f.stranger, f.course.id, new_material("Nope"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);

        let material = f.content.create_material(&f.owner, f.course.id, new_material("Mine")).await.unwrap();
        let err = f.content.delete_material(&f.stranger, material.id).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn videos_need_a_url_but_assignments_do_not() {
        let f = fixture().await;
        let material = f.content.create_material(&f.owner, f.course.id, new_material("Ch")).await.unwrap();

        let err = f
            .content
            .create_detail(
                &f.owner,
                material.id,
                NewMaterialDetail {
                    title: "Video".to_string(),
                    kind: DetailKind::Video,
                    content_url: None,
                    position: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let assignment = f
            .content
            .create_detail(
                &f.owner,
                material.id,
                NewMaterialDetail {
                    title: "Homework".to_string(),
                    kind: DetailKind::Assignment,
                    content_url: None,
                    position: Some(2),
                },
            )
            .await
            .unwrap();
        assert_eq!(assignment.kind, DetailKind::Assignment);
    }

    #[tokio::test]
    async fn deleting_a_material_removes_its_quizzes() {
        let f = fixture().await;
        let material = f.content.create_material(&f.owner, f.course.id, new_material("Ch")).await.unwrap();
        let quiz = f
            .content
            .create_quiz(
                &f.owner,
                material.id,
                NewQuiz {
                    title: "Q".to_string(),
                    questions: vec![QuizQuestion {
                        prompt: "Pick b".to_string(),
                        options: vec!["a".into(), "b".into()],
                        answer_index: 1,
                    }],
                    passing_score: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(quiz.passing_score, DEFAULT_PASSING_SCORE);

        f.content.delete_material(&f.owner, material.id).await.unwrap();
        assert!(f.storage.get_quiz(quiz.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_quizzes_are_rejected() {
        let f = fixture().await;
        let material = f.content.create_material(&f.owner, f.course.id, new_material("Ch")).await.unwrap();
        let err = f
            .content
            .create_quiz(
                &f.owner,
                material.id,
                NewQuiz { title: "Empty".to_string(), questions: vec![], passing_score: Some(50) },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
