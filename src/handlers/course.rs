// src/handlers/course.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    models::course::{Course, CreateCourseRequest},
    utils::slug,
};

/// Creates a new course.
pub async fn create_course(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let base = slug::slugify(&payload.title);
    let taken = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM courses WHERE slug = ?")
        .bind(&base)
        .fetch_one(&pool)
        .await?;
    let course_slug = slug::disambiguate(&base, taken > 0);

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO courses (title, slug, code, credit, level, semester, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&payload.title)
    .bind(&course_slug)
    .bind(&payload.code)
    .bind(payload.credit)
    .bind(payload.level)
    .bind(&payload.semester)
    .bind(Utc::now())
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            AppError::Conflict(format!("Course code '{}' already exists", payload.code))
        } else {
            tracing::error!("Failed to create course: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": id, "slug": course_slug})),
    ))
}

/// Fetches a course by slug.
pub async fn get_course(
    State(pool): State<SqlitePool>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let course = sqlx::query_as::<_, Course>(
        r#"
        SELECT id, title, slug, code, credit, level, semester, created_at
        FROM courses
        WHERE slug = ?
        "#,
    )
    .bind(&slug)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Course not found".to_string()))?;

    Ok(Json(course))
}
