// src/handlers/quiz.rs

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
    models::{
        question::CreateQuestionRequest,
        quiz::{CreateQuizRequest, Quiz, UpdateQuizRequest},
    },
    utils::{html::clean_html, slug},
};

pub(crate) async fn fetch_quiz_by_slug(
    pool: &SqlitePool,
    slug: &str,
) -> Result<Option<Quiz>, AppError> {
    let quiz = sqlx::query_as::<_, Quiz>(
        r#"
        SELECT id, course_id, title, slug, description, category,
               random_order, answers_at_end, exam_paper, single_attempt,
               draft, pass_mark, created_at
        FROM quizzes
        WHERE slug = ?
        "#,
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?;
    Ok(quiz)
}

/// Creates a new quiz under a course.
///
/// * Validates the pass mark range at persistence time.
/// * `single_attempt` forces `exam_paper`.
/// * Generates a unique slug from the title, suffixing on collision.
pub async fn create_quiz(
    State(pool): State<SqlitePool>,
    Path(course_slug): Path<String>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let course_id = sqlx::query_scalar::<_, i64>("SELECT id FROM courses WHERE slug = ?")
        .bind(&course_slug)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Course not found".to_string()))?;

    let base = slug::slugify(&payload.title);
    let taken = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM quizzes WHERE slug = ?")
        .bind(&base)
        .fetch_one(&pool)
        .await?;
    let quiz_slug = slug::disambiguate(&base, taken > 0);

    let exam_paper = payload.effective_exam_paper();

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO quizzes
        (course_id, title, slug, description, category, random_order,
         answers_at_end, exam_paper, single_attempt, draft, pass_mark, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(course_id)
    .bind(&payload.title)
    .bind(&quiz_slug)
    .bind(clean_html(&payload.description))
    .bind(&payload.category)
    .bind(payload.random_order)
    .bind(payload.answers_at_end)
    .bind(exam_paper)
    .bind(payload.single_attempt)
    .bind(payload.draft)
    .bind(payload.pass_mark)
    .bind(Utc::now())
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create quiz: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": id, "slug": quiz_slug})),
    ))
}

/// Updates a quiz by ID. The stored row is merged with the optional
/// payload fields so the single-attempt/exam-paper coupling holds on
/// every write.
pub async fn update_quiz(
    State(pool): State<SqlitePool>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<UpdateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let quiz = sqlx::query_as::<_, Quiz>(
        r#"
        SELECT id, course_id, title, slug, description, category,
               random_order, answers_at_end, exam_paper, single_attempt,
               draft, pass_mark, created_at
        FROM quizzes
        WHERE id = ?
        "#,
    )
    .bind(quiz_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    let title = payload.title.unwrap_or(quiz.title);
    let description = payload
        .description
        .map(|d| clean_html(&d))
        .unwrap_or(quiz.description);
    let category = payload.category.unwrap_or(quiz.category);
    let random_order = payload.random_order.unwrap_or(quiz.random_order);
    let answers_at_end = payload.answers_at_end.unwrap_or(quiz.answers_at_end);
    let single_attempt = payload.single_attempt.unwrap_or(quiz.single_attempt);
    let exam_paper = payload.exam_paper.unwrap_or(quiz.exam_paper) || single_attempt;
    let draft = payload.draft.unwrap_or(quiz.draft);
    let pass_mark = payload.pass_mark.unwrap_or(quiz.pass_mark);

    sqlx::query(
        r#"
        UPDATE quizzes
        SET title = ?, description = ?, category = ?, random_order = ?,
            answers_at_end = ?, exam_paper = ?, single_attempt = ?,
            draft = ?, pass_mark = ?
        WHERE id = ?
        "#,
    )
    .bind(&title)
    .bind(&description)
    .bind(&category)
    .bind(random_order)
    .bind(answers_at_end)
    .bind(exam_paper)
    .bind(single_attempt)
    .bind(draft)
    .bind(pass_mark)
    .bind(quiz_id)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to update quiz: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(StatusCode::OK)
}

/// Deletes a quiz by ID. Shared questions survive; only the quiz row and
/// its attachment rows go.
pub async fn delete_quiz(
    State(pool): State<SqlitePool>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM quizzes WHERE id = ?")
        .bind(quiz_id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete quiz: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Creates a new question and attaches it to a quiz.
pub async fn create_question(
    State(pool): State<SqlitePool>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if let Err(msg) = payload.check_variant() {
        return Err(AppError::BadRequest(msg));
    }

    let quiz_exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM quizzes WHERE id = ?")
        .bind(quiz_id)
        .fetch_one(&pool)
        .await?;
    if quiz_exists == 0 {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }

    let mut tx = pool.begin().await?;

    let question_id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO questions (kind, content, explanation, figure, choice_order, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&payload.kind)
    .bind(clean_html(&payload.content))
    .bind(payload.explanation.as_deref().map(clean_html))
    .bind(&payload.figure)
    .bind(payload.choice_order.as_deref().unwrap_or("none"))
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    for choice in payload.choices.as_deref().unwrap_or(&[]) {
        sqlx::query("INSERT INTO choices (question_id, choice_text, correct) VALUES (?, ?, ?)")
            .bind(question_id)
            .bind(&choice.text)
            .bind(choice.correct)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("INSERT INTO quiz_questions (quiz_id, question_id) VALUES (?, ?)")
        .bind(quiz_id)
        .bind(question_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": question_id})),
    ))
}

/// Attaches an existing question to another quiz (questions are shared
/// many-to-many).
pub async fn attach_question(
    State(pool): State<SqlitePool>,
    Path((question_id, quiz_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let question_exists =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM questions WHERE id = ?")
            .bind(question_id)
            .fetch_one(&pool)
            .await?;
    if question_exists == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }
    let quiz_exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM quizzes WHERE id = ?")
        .bind(quiz_id)
        .fetch_one(&pool)
        .await?;
    if quiz_exists == 0 {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }

    sqlx::query("INSERT OR IGNORE INTO quiz_questions (quiz_id, question_id) VALUES (?, ?)")
        .bind(quiz_id)
        .bind(question_id)
        .execute(&pool)
        .await?;

    Ok(StatusCode::OK)
}
