use super::traits::{PaidTransition, Storage};
use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::domain::*;
use crate::error::{LmsError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

const MIGRATION_SQL: &str = include_str!("../../migrations/001_init.sql");

const USER_COLUMNS: &str = "id, name, email, role, api_token_hash, created_at";
const COURSE_COLUMNS: &str =
    "c.id, c.instructor_id, c.title, c.slug, c.description, c.category, c.price, c.is_published, c.created_at, c.updated_at";
const MATERIAL_COLUMNS: &str = "m.id, m.course_id, m.title, m.position, m.created_at, m.updated_at";
const DETAIL_COLUMNS: &str =
    "d.id, d.material_id, d.title, d.kind, d.content_url, d.position, d.created_at";
const QUIZ_COLUMNS: &str = "q.id, q.material_id, q.title, q.questions, q.passing_score, q.created_at";
const ENROLLMENT_COLUMNS: &str =
    "e.id, e.user_id, e.course_id, e.status, e.progress, e.enrolled_at, e.completed_at";
const PROGRESS_COLUMNS: &str =
    "sp.id, sp.user_id, sp.material_detail_id, sp.submission_url, sp.completed_at";
const PAYMENT_COLUMNS: &str = "id, user_id, course_id, external_id, gateway_invoice_id, amount, status, invoice_url, payment_method, paid_at, created_at, updated_at";
const CERTIFICATE_COLUMNS: &str =
    "id, enrollment_id, user_id, course_id, certificate_number, issued_at";
const REVIEW_COLUMNS: &str = "id, user_id, course_id, rating, comment, created_at";

// Status enums are stored as their text form
macro_rules! sql_text_enum {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $ty {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    value
                        .as_str()?
                        .parse()
                        .map_err(|e: String| FromSqlError::Other(e.into()))
                }
            }
        )+
    };
}

sql_text_enum!(Role, DetailKind, EnrollmentStatus, PaymentStatus);

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        api_token_hash: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn row_to_course(row: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: row.get(0)?,
        instructor_id: row.get(1)?,
        title: row.get(2)?,
        slug: row.get(3)?,
        description: row.get(4)?,
        category: row.get(5)?,
        price: row.get(6)?,
        is_published: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn row_to_material(row: &Row<'_>) -> rusqlite::Result<Material> {
    Ok(Material {
        id: row.get(0)?,
        course_id: row.get(1)?,
        title: row.get(2)?,
        position: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn row_to_detail(row: &Row<'_>) -> rusqlite::Result<MaterialDetail> {
    Ok(MaterialDetail {
        id: row.get(0)?,
        material_id: row.get(1)?,
        title: row.get(2)?,
        kind: row.get(3)?,
        content_url: row.get(4)?,
        position: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn row_to_quiz(row: &Row<'_>) -> rusqlite::Result<Quiz> {
    Ok(Quiz {
        id: row.get(0)?,
        material_id: row.get(1)?,
        title: row.get(2)?,
        questions: json_column(row, 3)?,
        passing_score: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn row_to_enrollment(row: &Row<'_>) -> rusqlite::Result<Enrollment> {
    Ok(Enrollment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        course_id: row.get(2)?,
        status: row.get(3)?,
        progress: row.get(4)?,
        enrolled_at: row.get(5)?,
        completed_at: row.get(6)?,
    })
}

fn row_to_progress(row: &Row<'_>) -> rusqlite::Result<StudentProgress> {
    Ok(StudentProgress {
        id: row.get(0)?,
        user_id: row.get(1)?,
        material_detail_id: row.get(2)?,
        submission_url: row.get(3)?,
        completed_at: row.get(4)?,
    })
}

fn row_to_quiz_answer(row: &Row<'_>) -> rusqlite::Result<StudentQuizAnswer> {
    Ok(StudentQuizAnswer {
        id: row.get(0)?,
        user_id: row.get(1)?,
        quiz_id: row.get(2)?,
        answers: json_column(row, 3)?,
        score: row.get(4)?,
        passed: row.get(5)?,
        submitted_at: row.get(6)?,
    })
}

fn row_to_payment(row: &Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        course_id: row.get(2)?,
        external_id: row.get(3)?,
        gateway_invoice_id: row.get(4)?,
        amount: row.get(5)?,
        status: row.get(6)?,
        invoice_url: row.get(7)?,
        payment_method: row.get(8)?,
        paid_at: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn row_to_certificate(row: &Row<'_>) -> rusqlite::Result<Certificate> {
    Ok(Certificate {
        id: row.get(0)?,
        enrollment_id: row.get(1)?,
        user_id: row.get(2)?,
        course_id: row.get(3)?,
        certificate_number: row.get(4)?,
        issued_at: row.get(5)?,
    })
}

fn row_to_review(row: &Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        id: row.get(0)?,
        user_id: row.get(1)?,
        course_id: row.get(2)?,
        rating: row.get(3)?,
        comment: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// SQLite-backed storage. A single connection behind a mutex; every
/// operation is short and never held across an await.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the database file and run migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("Opening SQLite database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    /// Run database migrations
    pub fn run_migrations(&self) -> Result<()> {
        debug!("Running database migrations...");
        self.conn()?.execute_batch(MIGRATION_SQL)?;
        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| LmsError::Database {
            message: format!("connection lock poisoned: {e}"),
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (id, name, email, role, api_token_hash, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![user.id, user.name, user.email, user.role, user.api_token_hash, user.created_at],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                LmsError::conflict("email is already registered")
            } else {
                e.into()
            }
        })?;
        debug!("Created user {} ({})", user.email, user.id);
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1 AND deleted_at IS NULL"),
                params![id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1 AND deleted_at IS NULL"),
                params![email],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    async fn get_user_by_token_hash(&self, token_hash: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE api_token_hash = ?1 AND deleted_at IS NULL"
                ),
                params![token_hash],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    async fn create_course(&self, course: &Course) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO courses (id, instructor_id, title, slug, description, category, price, is_published, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                course.id,
                course.instructor_id,
                course.title,
                course.slug,
                course.description,
                course.category,
                course.price,
                course.is_published,
                course.created_at,
                course.updated_at
            ],
        )?;
        debug!("Created course '{}' with id {}", course.title, course.id);
        Ok(())
    }

    async fn update_course(&self, course: &Course) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE courses SET title = ?1, slug = ?2, description = ?3, category = ?4, price = ?5, is_published = ?6, updated_at = ?7
             WHERE id = ?8 AND deleted_at IS NULL",
            params![
                course.title,
                course.slug,
                course.description,
                course.category,
                course.price,
                course.is_published,
                course.updated_at,
                course.id
            ],
        )?;
        Ok(())
    }

    async fn get_course(&self, id: Uuid) -> Result<Option<Course>> {
        let conn = self.conn()?;
        let course = conn
            .query_row(
                &format!("SELECT {COURSE_COLUMNS} FROM courses c WHERE c.id = ?1 AND c.deleted_at IS NULL"),
                params![id],
                row_to_course,
            )
            .optional()?;
        Ok(course)
    }

    async fn list_published_courses(&self, query: &CourseQuery) -> Result<Vec<CourseSummary>> {
        let per_page = query.per_page.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let page = query.page.unwrap_or(1).max(1);
        let offset = i64::from(page - 1) * i64::from(per_page);
        let search = query
            .q
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        let category = query.category.as_deref().filter(|s| !s.is_empty());

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COURSE_COLUMNS},
                (SELECT AVG(r.rating) FROM reviews r WHERE r.course_id = c.id AND r.deleted_at IS NULL),
                (SELECT COUNT(*) FROM reviews r WHERE r.course_id = c.id AND r.deleted_at IS NULL),
                (SELECT COUNT(*) FROM enrollments e WHERE e.course_id = c.id)
             FROM courses c
             WHERE c.deleted_at IS NULL AND c.is_published = 1
               AND (?1 IS NULL OR instr(lower(c.title), ?1) > 0)
               AND (?2 IS NULL OR c.category = ?2)
             ORDER BY c.created_at DESC
             LIMIT ?3 OFFSET ?4"
        ))?;
        let rows = stmt.query_map(
            params![search, category, i64::from(per_page), offset],
            |row| {
                Ok(CourseSummary {
                    course: row_to_course(row)?,
                    average_rating: row.get(10)?,
                    review_count: row.get(11)?,
                    enrollment_count: row.get(12)?,
                })
            },
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn list_courses_by_instructor(&self, instructor_id: Uuid) -> Result<Vec<Course>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses c
             WHERE c.instructor_id = ?1 AND c.deleted_at IS NULL
             ORDER BY c.created_at DESC"
        ))?;
        let rows = stmt.query_map(params![instructor_id], row_to_course)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn delete_course(&self, id: Uuid) -> Result<()> {
        let now = Utc::now();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE material_details SET deleted_at = ?1
             WHERE deleted_at IS NULL AND material_id IN (SELECT id FROM materials WHERE course_id = ?2)",
            params![now, id],
        )?;
        tx.execute(
            "UPDATE quizzes SET deleted_at = ?1
             WHERE deleted_at IS NULL AND material_id IN (SELECT id FROM materials WHERE course_id = ?2)",
            params![now, id],
        )?;
        tx.execute(
            "UPDATE materials SET deleted_at = ?1 WHERE course_id = ?2 AND deleted_at IS NULL",
            params![now, id],
        )?;
        tx.execute(
            "UPDATE courses SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![now, id],
        )?;
        tx.commit()?;
        info!(course_id = %id, "Soft-deleted course and its materials");
        Ok(())
    }

    async fn create_material(&self, material: &Material) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO materials (id, course_id, title, position, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                material.id,
                material.course_id,
                material.title,
                material.position,
                material.created_at,
                material.updated_at
            ],
        )?;
        Ok(())
    }

    async fn update_material(&self, material: &Material) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE materials SET title = ?1, position = ?2, updated_at = ?3 WHERE id = ?4 AND deleted_at IS NULL",
            params![material.title, material.position, material.updated_at, material.id],
        )?;
        Ok(())
    }

    async fn get_material(&self, id: Uuid) -> Result<Option<Material>> {
        let conn = self.conn()?;
        let material = conn
            .query_row(
                &format!("SELECT {MATERIAL_COLUMNS} FROM materials m WHERE m.id = ?1 AND m.deleted_at IS NULL"),
                params![id],
                row_to_material,
            )
            .optional()?;
        Ok(material)
    }

    async fn list_materials(&self, course_id: Uuid) -> Result<Vec<Material>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials m
             WHERE m.course_id = ?1 AND m.deleted_at IS NULL
             ORDER BY m.position, m.created_at"
        ))?;
        let rows = stmt.query_map(params![course_id], row_to_material)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn delete_material(&self, id: Uuid) -> Result<()> {
        let now = Utc::now();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let details = tx.execute(
            "UPDATE material_details SET deleted_at = ?1 WHERE material_id = ?2 AND deleted_at IS NULL",
            params![now, id],
        )?;
        let quizzes = tx.execute(
            "UPDATE quizzes SET deleted_at = ?1 WHERE material_id = ?2 AND deleted_at IS NULL",
            params![now, id],
        )?;
        tx.execute(
            "UPDATE materials SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![now, id],
        )?;
        tx.commit()?;
        info!(material_id = %id, details, quizzes, "Soft-deleted material");
        Ok(())
    }

    async fn create_material_detail(&self, detail: &MaterialDetail) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO material_details (id, material_id, title, kind, content_url, position, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                detail.id,
                detail.material_id,
                detail.title,
                detail.kind,
                detail.content_url,
                detail.position,
                detail.created_at
            ],
        )?;
        Ok(())
    }

    async fn get_material_detail(&self, id: Uuid) -> Result<Option<MaterialDetail>> {
        let conn = self.conn()?;
        let detail = conn
            .query_row(
                &format!(
                    "SELECT {DETAIL_COLUMNS} FROM material_details d
                     JOIN materials m ON m.id = d.material_id
                     WHERE d.id = ?1 AND d.deleted_at IS NULL AND m.deleted_at IS NULL"
                ),
                params![id],
                row_to_detail,
            )
            .optional()?;
        Ok(detail)
    }

    async fn list_details_for_course(&self, course_id: Uuid) -> Result<Vec<MaterialDetail>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DETAIL_COLUMNS} FROM material_details d
             JOIN materials m ON m.id = d.material_id
             WHERE m.course_id = ?1 AND d.deleted_at IS NULL AND m.deleted_at IS NULL
             ORDER BY m.position, d.position, d.created_at"
        ))?;
        let rows = stmt.query_map(params![course_id], row_to_detail)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn delete_material_detail(&self, id: Uuid) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE material_details SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![Utc::now(), id],
        )?;
        Ok(())
    }

    async fn create_quiz(&self, quiz: &Quiz) -> Result<()> {
        let questions = serde_json::to_string(&quiz.questions)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO quizzes (id, material_id, title, questions, passing_score, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                quiz.id,
                quiz.material_id,
                quiz.title,
                questions,
                quiz.passing_score,
                quiz.created_at
            ],
        )?;
        Ok(())
    }

    async fn get_quiz(&self, id: Uuid) -> Result<Option<Quiz>> {
        let conn = self.conn()?;
        let quiz = conn
            .query_row(
                &format!(
                    "SELECT {QUIZ_COLUMNS} FROM quizzes q
                     JOIN materials m ON m.id = q.material_id
                     WHERE q.id = ?1 AND q.deleted_at IS NULL AND m.deleted_at IS NULL"
                ),
                params![id],
                row_to_quiz,
            )
            .optional()?;
        Ok(quiz)
    }

    async fn list_quizzes_for_course(&self, course_id: Uuid) -> Result<Vec<Quiz>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {QUIZ_COLUMNS} FROM quizzes q
             JOIN materials m ON m.id = q.material_id
             WHERE m.course_id = ?1 AND q.deleted_at IS NULL AND m.deleted_at IS NULL
             ORDER BY m.position, q.created_at"
        ))?;
        let rows = stmt.query_map(params![course_id], row_to_quiz)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn create_enrollment_if_absent(&self, enrollment: &Enrollment) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = insert_enrollment(&conn, enrollment)?;
        Ok(inserted)
    }

    async fn get_enrollment(&self, user_id: Uuid, course_id: Uuid) -> Result<Option<Enrollment>> {
        let conn = self.conn()?;
        let enrollment = conn
            .query_row(
                &format!(
                    "SELECT {ENROLLMENT_COLUMNS} FROM enrollments e WHERE e.user_id = ?1 AND e.course_id = ?2"
                ),
                params![user_id, course_id],
                row_to_enrollment,
            )
            .optional()?;
        Ok(enrollment)
    }

    async fn list_enrollments_for_user(&self, user_id: Uuid) -> Result<Vec<EnrollmentOverview>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENROLLMENT_COLUMNS}, c.title FROM enrollments e
             JOIN courses c ON c.id = e.course_id
             WHERE e.user_id = ?1 AND c.deleted_at IS NULL
             ORDER BY e.enrolled_at DESC"
        ))?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(EnrollmentOverview {
                enrollment: row_to_enrollment(row)?,
                course_title: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn update_enrollment(&self, enrollment: &Enrollment) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE enrollments SET status = ?1, progress = ?2, completed_at = ?3 WHERE id = ?4",
            params![
                enrollment.status,
                enrollment.progress,
                enrollment.completed_at,
                enrollment.id
            ],
        )?;
        Ok(())
    }

    async fn upsert_progress(&self, progress: &StudentProgress) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO student_progress (id, user_id, material_detail_id, submission_url, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, material_detail_id) DO UPDATE SET
                submission_url = COALESCE(excluded.submission_url, student_progress.submission_url)",
            params![
                progress.id,
                progress.user_id,
                progress.material_detail_id,
                progress.submission_url,
                progress.completed_at
            ],
        )?;
        Ok(())
    }

    async fn progress_counts(&self, user_id: Uuid, course_id: Uuid) -> Result<ProgressCounts> {
        let conn = self.conn()?;
        let (details, quizzes, completed, passed): (i64, i64, i64, i64) = conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM material_details d JOIN materials m ON m.id = d.material_id
                  WHERE m.course_id = ?1 AND d.deleted_at IS NULL AND m.deleted_at IS NULL),
                (SELECT COUNT(*) FROM quizzes q JOIN materials m ON m.id = q.material_id
                  WHERE m.course_id = ?1 AND q.deleted_at IS NULL AND m.deleted_at IS NULL),
                (SELECT COUNT(*) FROM student_progress sp
                  JOIN material_details d ON d.id = sp.material_detail_id
                  JOIN materials m ON m.id = d.material_id
                  WHERE sp.user_id = ?2 AND m.course_id = ?1 AND d.deleted_at IS NULL AND m.deleted_at IS NULL),
                (SELECT COUNT(*) FROM student_quiz_answers a
                  JOIN quizzes q ON q.id = a.quiz_id
                  JOIN materials m ON m.id = q.material_id
                  WHERE a.user_id = ?2 AND a.passed = 1 AND m.course_id = ?1
                    AND q.deleted_at IS NULL AND m.deleted_at IS NULL)",
            params![course_id, user_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        Ok(ProgressCounts {
            completed_items: (completed + passed) as u32,
            total_items: (details + quizzes) as u32,
        })
    }

    async fn list_assignment_submissions(&self, course_id: Uuid) -> Result<Vec<StudentProgress>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM student_progress sp
             JOIN material_details d ON d.id = sp.material_detail_id
             JOIN materials m ON m.id = d.material_id
             WHERE m.course_id = ?1 AND d.kind = 'assignment'
               AND d.deleted_at IS NULL AND m.deleted_at IS NULL
             ORDER BY sp.completed_at"
        ))?;
        let rows = stmt.query_map(params![course_id], row_to_progress)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn get_quiz_answer(&self, user_id: Uuid, quiz_id: Uuid) -> Result<Option<StudentQuizAnswer>> {
        let conn = self.conn()?;
        let answer = conn
            .query_row(
                "SELECT id, user_id, quiz_id, answers, score, passed, submitted_at
                 FROM student_quiz_answers WHERE user_id = ?1 AND quiz_id = ?2",
                params![user_id, quiz_id],
                row_to_quiz_answer,
            )
            .optional()?;
        Ok(answer)
    }

    async fn upsert_quiz_answer(&self, answer: &StudentQuizAnswer) -> Result<()> {
        let answers = serde_json::to_string(&answer.answers)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO student_quiz_answers (id, user_id, quiz_id, answers, score, passed, submitted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(user_id, quiz_id) DO UPDATE SET
                answers = excluded.answers,
                score = excluded.score,
                passed = excluded.passed,
                submitted_at = excluded.submitted_at",
            params![
                answer.id,
                answer.user_id,
                answer.quiz_id,
                answers,
                answer.score,
                answer.passed,
                answer.submitted_at
            ],
        )?;
        Ok(())
    }

    async fn create_payment(&self, payment: &Payment) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO payments ({PAYMENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                payment.id,
                payment.user_id,
                payment.course_id,
                payment.external_id,
                payment.gateway_invoice_id,
                payment.amount,
                payment.status,
                payment.invoice_url,
                payment.payment_method,
                payment.paid_at,
                payment.created_at,
                payment.updated_at
            ],
        )?;
        Ok(())
    }

    async fn update_payment(&self, payment: &Payment) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE payments SET gateway_invoice_id = ?1, status = ?2, invoice_url = ?3, payment_method = ?4,
                paid_at = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                payment.gateway_invoice_id,
                payment.status,
                payment.invoice_url,
                payment.payment_method,
                payment.paid_at,
                payment.updated_at,
                payment.id
            ],
        )?;
        Ok(())
    }

    async fn get_payment_by_external_id(&self, external_id: &str) -> Result<Option<Payment>> {
        let conn = self.conn()?;
        let payment = conn
            .query_row(
                &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE external_id = ?1"),
                params![external_id],
                row_to_payment,
            )
            .optional()?;
        Ok(payment)
    }

    async fn find_pending_payment(&self, user_id: Uuid, course_id: Uuid) -> Result<Option<Payment>> {
        let conn = self.conn()?;
        let payment = conn
            .query_row(
                &format!(
                    "SELECT {PAYMENT_COLUMNS} FROM payments
                     WHERE user_id = ?1 AND course_id = ?2 AND status = 'PENDING' AND invoice_url IS NOT NULL
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![user_id, course_id],
                row_to_payment,
            )
            .optional()?;
        Ok(payment)
    }

    async fn list_payments_for_user(&self, user_id: Uuid) -> Result<Vec<Payment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE user_id = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params![user_id], row_to_payment)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn mark_payment_paid(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        paid_at: DateTime<Utc>,
        payment_method: Option<&str>,
        enrollment: &Enrollment,
    ) -> Result<PaidTransition> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE payments SET status = ?1, paid_at = ?2, payment_method = COALESCE(?3, payment_method), updated_at = ?4
             WHERE id = ?5 AND status IN ('PENDING', 'EXPIRED')",
            params![status, paid_at, payment_method, Utc::now(), payment_id],
        )?;
        if updated == 0 {
            // Already paid (or never existed): leave everything as it is
            tx.rollback()?;
            return Ok(PaidTransition {
                applied: false,
                enrollment_created: false,
            });
        }
        let enrollment_created = insert_enrollment(&tx, enrollment)?;
        tx.commit()?;
        Ok(PaidTransition {
            applied: true,
            enrollment_created,
        })
    }

    async fn transition_payment_status(
        &self,
        payment_id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE payments SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![to, Utc::now(), payment_id, from],
        )?;
        Ok(updated == 1)
    }

    async fn record_webhook_event(&self, key: &str, external_id: &str, status: &str) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO webhook_events (idempotency_key, external_id, status, received_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(idempotency_key) DO NOTHING",
            params![key, external_id, status, Utc::now()],
        )?;
        Ok(inserted == 1)
    }

    async fn forget_webhook_event(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM webhook_events WHERE idempotency_key = ?1", params![key])?;
        Ok(())
    }

    async fn create_certificate_if_absent(&self, certificate: &Certificate) -> Result<(Certificate, bool)> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            &format!(
                "INSERT INTO certificates ({CERTIFICATE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(enrollment_id) DO NOTHING"
            ),
            params![
                certificate.id,
                certificate.enrollment_id,
                certificate.user_id,
                certificate.course_id,
                certificate.certificate_number,
                certificate.issued_at
            ],
        )?;
        let stored = conn.query_row(
            &format!("SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE enrollment_id = ?1"),
            params![certificate.enrollment_id],
            row_to_certificate,
        )?;
        Ok((stored, inserted == 1))
    }

    async fn get_certificate_by_number(&self, number: &str) -> Result<Option<Certificate>> {
        let conn = self.conn()?;
        let certificate = conn
            .query_row(
                &format!("SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE certificate_number = ?1"),
                params![number],
                row_to_certificate,
            )
            .optional()?;
        Ok(certificate)
    }

    async fn create_review(&self, review: &Review) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO reviews ({REVIEW_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                review.id,
                review.user_id,
                review.course_id,
                review.rating,
                review.comment,
                review.created_at
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                LmsError::conflict("you have already reviewed this course")
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn get_review(&self, id: Uuid) -> Result<Option<Review>> {
        let conn = self.conn()?;
        let review = conn
            .query_row(
                &format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?1 AND deleted_at IS NULL"),
                params![id],
                row_to_review,
            )
            .optional()?;
        Ok(review)
    }

    async fn find_review(&self, user_id: Uuid, course_id: Uuid) -> Result<Option<Review>> {
        let conn = self.conn()?;
        let review = conn
            .query_row(
                &format!(
                    "SELECT {REVIEW_COLUMNS} FROM reviews WHERE user_id = ?1 AND course_id = ?2 AND deleted_at IS NULL"
                ),
                params![user_id, course_id],
                row_to_review,
            )
            .optional()?;
        Ok(review)
    }

    async fn list_reviews(&self, course_id: Uuid) -> Result<Vec<Review>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE course_id = ?1 AND deleted_at IS NULL ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params![course_id], row_to_review)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn delete_review(&self, id: Uuid) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE reviews SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![Utc::now(), id],
        )?;
        Ok(())
    }
}

/// `INSERT ... ON CONFLICT DO NOTHING` on (user_id, course_id); true when a row was written.
fn insert_enrollment(conn: &Connection, enrollment: &Enrollment) -> rusqlite::Result<bool> {
    let inserted = conn.execute(
        "INSERT INTO enrollments (id, user_id, course_id, status, progress, enrolled_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(user_id, course_id) DO NOTHING",
        params![
            enrollment.id,
            enrollment.user_id,
            enrollment.course_id,
            enrollment.status,
            enrollment.progress,
            enrollment.enrolled_at,
            enrollment.completed_at
        ],
    )?;
    Ok(inserted == 1)
}
