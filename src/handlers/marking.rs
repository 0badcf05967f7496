// src/handlers/marking.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{
    error::AppError,
    handlers::take::load_questions,
    models::{progress::ExamEntry, sitting::SittingRow, user::Role},
};

#[derive(Debug, Deserialize)]
pub struct MarkingParams {
    pub user_id: i64,
    pub role: Option<String>,
    pub quiz_filter: Option<String>,
    pub user_filter: Option<String>,
}

/// Lists completed sittings for marking, newest end first. Privileged
/// callers see everyone's; others see only their own.
pub async fn list_marking(
    State(pool): State<SqlitePool>,
    Query(params): Query<MarkingParams>,
) -> Result<impl IntoResponse, AppError> {
    let role = Role::parse(params.role.as_deref().unwrap_or("student"));

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
    if let Some(quiz_filter) = params.quiz_filter {
        builder.push(" AND q.title LIKE ");
        builder.push_bind(format!("%{}%", quiz_filter));
    }
    if let Some(user_filter) = params.user_filter {
        builder.push(" AND u.username LIKE ");
        builder.push_bind(format!("%{}%", user_filter));
    }
    builder.push(" ORDER BY s.ended_at DESC");

    let sittings: Vec<ExamEntry> = builder
        .build_query_as()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list sittings for marking: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(sittings))
}

/// Full detail of one sitting: every question from the order snapshot with
/// the recorded answer and its current correctness flag.
pub async fn marking_detail(
    State(pool): State<SqlitePool>,
    Path(sitting_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let sitting = sqlx::query_as::<_, SittingRow>(
        "SELECT id, user_id, quiz_id, course_id, question_order, question_list, \
                incorrect_questions, current_score, complete, user_answers, started_at, ended_at \
         FROM sittings WHERE id = ?",
    )
    .bind(sitting_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Sitting not found".to_string()))?
    .into_sitting()?;

    let mut conn = pool.acquire().await?;
    let questions = load_questions(&mut conn, &sitting.question_order).await?;

    let review: Vec<Value> = questions
        .iter()
        .map(|q| {
            let guess = sitting.user_answers.get(&q.id);
            json!({
                "question_id": q.id,
                "kind": q.kind(),
                "content": q.content,
                "explanation": q.explanation,
                "answered": guess.is_some(),
                "your_answer": guess.map(|g| q.guess_to_display(g)),
                "incorrect": sitting.incorrect_questions.contains(&q.id),
            })
        })
        .collect();

    Ok(Json(json!({
        "sitting": {
            "id": sitting.id,
            "user_id": sitting.user_id,
            "quiz_id": sitting.quiz_id,
            "course_id": sitting.course_id,
            "score": sitting.current_score,
            "max_score": sitting.max_score(),
            "percent": sitting.percent_correct(),
            "complete": sitting.complete,
            "started_at": sitting.started_at,
            "ended_at": sitting.ended_at,
        },
        "questions": review,
        "incorrect_questions": sitting.incorrect_questions,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ToggleMarkRequest {
    pub question_id: i64,
}

/// Marking override: flips a question's incorrect flag on a sitting,
/// adjusting the score per the toggle semantics. Used for essay marking
/// and grader corrections, never during normal answering.
pub async fn toggle_mark(
    State(pool): State<SqlitePool>,
    Path(sitting_id): Path<i64>,
    Json(req): Json<ToggleMarkRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let mut sitting = sqlx::query_as::<_, SittingRow>(
        "SELECT id, user_id, quiz_id, course_id, question_order, question_list, \
                incorrect_questions, current_score, complete, user_answers, started_at, ended_at \
         FROM sittings WHERE id = ?",
    )
    .bind(sitting_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Sitting not found".to_string()))?
    .into_sitting()?;

    let incorrect = sitting.toggle_incorrect(req.question_id)?;

    sqlx::query("UPDATE sittings SET incorrect_questions = ?, current_score = ? WHERE id = ?")
        .bind(sitting.incorrect_column())
        .bind(sitting.current_score)
        .bind(sitting.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Json(json!({
        "question_id": req.question_id,
        "incorrect": incorrect,
        "current_score": sitting.current_score,
        "percent": sitting.percent_correct(),
    })))
}
