//! Catalog and course authoring handlers.

use super::auth::{ApiJson, AuthUser, OptionalUser};
use super::AppState;
use crate::app::catalog_use_case::{CourseDetail, CourseUpdate, NewCourse};
use crate::app::content_use_case::{MaterialUpdate, NewMaterial, NewMaterialDetail, NewQuiz};
use crate::domain::{Course, CourseQuery, CourseSummary, Material, MaterialDetail, Quiz};
use crate::error::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

pub async fn list_courses(
    State(state): State<AppState>,
    Query(query): Query<CourseQuery>,
) -> Result<Json<Vec<CourseSummary>>> {
    Ok(Json(state.catalog.list_catalog(&query).await?))
}

pub async fn get_course(
    State(state): State<AppState>,
    OptionalUser(viewer): OptionalUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CourseDetail>> {
    Ok(Json(state.catalog.course_detail(id, viewer.as_ref()).await?))
}

pub async fn create_course(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(body): ApiJson<NewCourse>,
) -> Result<(StatusCode, Json<Course>)> {
    let course = state.catalog.create_course(&user, body).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

pub async fn update_course(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<CourseUpdate>,
) -> Result<Json<Course>> {
    Ok(Json(state.catalog.update_course(&user, id, body).await?))
}

pub async fn delete_course(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.catalog.delete_course(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn instructor_courses(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Course>>> {
    Ok(Json(state.catalog.list_own_courses(&user).await?))
}

pub async fn create_material(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(course_id): Path<Uuid>,
    ApiJson(body): ApiJson<NewMaterial>,
) -> Result<(StatusCode, Json<Material>)> {
    let material = state.content.create_material(&user, course_id, body).await?;
    Ok((StatusCode::CREATED, Json(material)))
}

pub async fn update_material(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<MaterialUpdate>,
) -> Result<Json<Material>> {
    Ok(Json(state.content.update_material(&user, id, body).await?))
}

pub async fn delete_material(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.content.delete_material(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_detail(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(material_id): Path<Uuid>,
    ApiJson(body): ApiJson<NewMaterialDetail>,
) -> Result<(StatusCode, Json<MaterialDetail>)> {
    let detail = state.content.create_detail(&user, material_id, body).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn delete_detail(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.content.delete_detail(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_quiz(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(material_id): Path<Uuid>,
    ApiJson(body): ApiJson<NewQuiz>,
) -> Result<(StatusCode, Json<Quiz>)> {
    let quiz = state.content.create_quiz(&user, material_id, body).await?;
    Ok((StatusCode::CREATED, Json(quiz)))
}
