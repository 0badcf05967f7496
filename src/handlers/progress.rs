// src/handlers/progress.rs

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{
    error::AppError,
    models::{
        progress::{ExamEntry, ProgressSummaryEntry},
        user::Role,
    },
};

#[derive(Debug, Deserialize)]
pub struct ProgressParams {
    pub user_id: i64,
    pub role: Option<String>,
}

/// The caller's cumulative per-quiz score record plus their completed
/// exams. Privileged callers see every user's completed exams.
pub async fn get_progress(
    State(pool): State<SqlitePool>,
    Query(params): Query<ProgressParams>,
) -> Result<impl IntoResponse, AppError> {
    let role = Role::parse(params.role.as_deref().unwrap_or("student"));

    let summary = sqlx::query_as::<_, ProgressSummaryEntry>(
        "SELECT p.quiz_id, q.title AS quiz_title, p.correct, p.possible \
         FROM progress p \
         JOIN quizzes q ON p.quiz_id = q.id \
         WHERE p.user_id = ? \
         ORDER BY p.quiz_id",
    )
    .bind(params.user_id)
    .fetch_all(&pool)
    .await?;

    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT s.id AS sitting_id, s.user_id, u.username, s.quiz_id, \
                q.title AS quiz_title, s.current_score, s.ended_at \
         FROM sittings s \
         JOIN users u ON s.user_id = u.id \
         JOIN quizzes q ON s.quiz_id = q.id \
         WHERE s.complete = 1",
    );
    if !role.is_privileged() {
        builder.push(" AND s.user_id = ");
        builder.push_bind(params.user_id);
    }
    builder.push(" ORDER BY s.ended_at DESC");

    let exams: Vec<ExamEntry> = builder.build_query_as().fetch_all(&pool).await?;

    Ok(Json(json!({
        "summary": summary,
        "exams_count": exams.len(),
        "exams": exams,
    })))
}
