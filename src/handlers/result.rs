// src/handlers/result.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        course::validate_semester,
        result::{TakenCourse, UpdateMarksRequest, weighted_gpa},
        user::User,
    },
};

/// Upserts a student's raw component marks on a course. The derived
/// columns (total, grade, point, comment) are recomputed here on every
/// write and are never accepted from the caller.
pub async fn upsert_marks(
    State(pool): State<SqlitePool>,
    Path((student_id, course_id)): Path<(i64, i64)>,
    Json(payload): Json<UpdateMarksRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let credit = sqlx::query_scalar::<_, i64>("SELECT credit FROM courses WHERE id = ?")
        .bind(course_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Course not found".to_string()))?;

    let student_exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
        .bind(student_id)
        .fetch_one(&pool)
        .await?;
    if student_exists == 0 {
        return Err(AppError::NotFound("Student not found".to_string()));
    }

    let derived = payload.derive(credit);

    sqlx::query(
        r#"
        INSERT INTO taken_courses
        (student_id, course_id, assignment, mid_exam, quiz, attendance, final_exam,
         total, grade, point, comment)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(student_id, course_id) DO UPDATE SET
            assignment = excluded.assignment,
            mid_exam = excluded.mid_exam,
            quiz = excluded.quiz,
            attendance = excluded.attendance,
            final_exam = excluded.final_exam,
            total = excluded.total,
            grade = excluded.grade,
            point = excluded.point,
            comment = excluded.comment
        "#,
    )
    .bind(student_id)
    .bind(course_id)
    .bind(payload.assignment)
    .bind(payload.mid_exam)
    .bind(payload.quiz)
    .bind(payload.attendance)
    .bind(payload.final_exam)
    .bind(derived.total)
    .bind(derived.grade.as_str())
    .bind(derived.point)
    .bind(derived.comment)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to upsert marks: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let stored = sqlx::query_as::<_, TakenCourse>(
        "SELECT id, student_id, course_id, assignment, mid_exam, quiz, attendance, final_exam, \
                total, grade, point, comment \
         FROM taken_courses WHERE student_id = ? AND course_id = ?",
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_one(&pool)
    .await?;

    Ok(Json(stored))
}

#[derive(Debug, Deserialize)]
pub struct GpaParams {
    pub semester: String,
}

/// GPA for one semester: credit-weighted grade points over the student's
/// taken courses at their current level in that semester.
pub async fn get_gpa(
    State(pool): State<SqlitePool>,
    Path(student_id): Path<i64>,
    Query(params): Query<GpaParams>,
) -> Result<impl IntoResponse, AppError> {
    if validate_semester(&params.semester).is_err() {
        return Err(AppError::BadRequest(format!(
            "Unknown semester '{}'",
            params.semester
        )));
    }

    let student = sqlx::query_as::<_, User>(
        "SELECT id, username, role, level, created_at FROM users WHERE id = ?",
    )
    .bind(student_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Student not found".to_string()))?;

    let rows: Vec<(f64, i64)> = sqlx::query_as(
        "SELECT tc.point, c.credit \
         FROM taken_courses tc \
         JOIN courses c ON tc.course_id = c.id \
         WHERE tc.student_id = ? AND c.level = ? AND c.semester = ?",
    )
    .bind(student.id)
    .bind(student.level)
    .bind(&params.semester)
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!({
        "student_id": student_id,
        "semester": params.semester,
        "gpa": weighted_gpa(&rows),
    })))
}

/// CGPA: the same aggregation over every taken course on record for the
/// student, any level, any semester.
pub async fn get_cgpa(
    State(pool): State<SqlitePool>,
    Path(student_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
        .bind(student_id)
        .fetch_one(&pool)
        .await?;
    if student_exists == 0 {
        return Err(AppError::NotFound("Student not found".to_string()));
    }

    let rows: Vec<(f64, i64)> = sqlx::query_as(
        "SELECT tc.point, c.credit \
         FROM taken_courses tc \
         JOIN courses c ON tc.course_id = c.id \
         WHERE tc.student_id = ?",
    )
    .bind(student_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!({
        "student_id": student_id,
        "cgpa": weighted_gpa(&rows),
    })))
}
