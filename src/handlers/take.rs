// src/handlers/take.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::{
    error::AppError,
    handlers::quiz::fetch_quiz_by_slug,
    models::{
        progress::checked_deltas,
        question::{ChoiceRow, PublicQuestion, Question, QuestionRow},
        quiz::Quiz,
        sitting::{Sitting, SittingRow},
        user::Role,
    },
};

const SITTING_COLUMNS: &str = "id, user_id, quiz_id, course_id, question_order, question_list, \
     incorrect_questions, current_score, complete, user_answers, started_at, ended_at";

/// Outcome of the sitting directory lookup. Attempt exhaustion is a normal
/// branch for callers, not an error.
pub(crate) enum SittingLookup {
    Found(Sitting),
    AttemptsExhausted,
}

/// Finds the unique non-complete sitting for (user, quiz, course), creating
/// one if none exists.
///
/// * A completed single-attempt quiz reports `AttemptsExhausted`.
/// * Creation snapshots the quiz's question set, shuffled once here when
///   the quiz wants random order.
/// * The partial unique index closes the check-then-act race: a losing
///   concurrent insert falls back to fetching the winner's row.
pub(crate) async fn find_or_create_sitting(
    pool: &SqlitePool,
    quiz: &Quiz,
    user_id: i64,
) -> Result<SittingLookup, AppError> {
    if quiz.single_attempt {
        let completed = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sittings \
             WHERE user_id = ? AND quiz_id = ? AND course_id = ? AND complete = 1",
        )
        .bind(user_id)
        .bind(quiz.id)
        .bind(quiz.course_id)
        .fetch_one(pool)
        .await?;
        if completed > 0 {
            return Ok(SittingLookup::AttemptsExhausted);
        }
    }

    let actives: Vec<SittingRow> = sqlx::query_as(&format!(
        "SELECT {SITTING_COLUMNS} FROM sittings \
         WHERE user_id = ? AND quiz_id = ? AND course_id = ? AND complete = 0 \
         ORDER BY started_at ASC, id ASC"
    ))
    .bind(user_id)
    .bind(quiz.id)
    .bind(quiz.course_id)
    .fetch_all(pool)
    .await?;

    if actives.len() > 1 {
        // Cannot happen under the partial unique index; recover anyway by
        // keeping the earliest and leaving the rest for cleanup.
        tracing::warn!(
            "Found {} active sittings for user {} on quiz {}; keeping the earliest",
            actives.len(),
            user_id,
            quiz.id
        );
    }
    if let Some(row) = actives.into_iter().next() {
        return Ok(SittingLookup::Found(row.into_sitting()?));
    }

    let mut question_ids = sqlx::query_scalar::<_, i64>(
        "SELECT question_id FROM quiz_questions WHERE quiz_id = ? ORDER BY question_id",
    )
    .bind(quiz.id)
    .fetch_all(pool)
    .await?;
    if quiz.random_order {
        question_ids.shuffle(&mut rand::thread_rng());
    }

    let mut sitting = Sitting::new(user_id, quiz.id, quiz.course_id, question_ids, Utc::now())?;

    let inserted = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO sittings
        (user_id, quiz_id, course_id, question_order, question_list,
         incorrect_questions, current_score, complete, user_answers, started_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(quiz.id)
    .bind(quiz.course_id)
    .bind(sitting.order_column())
    .bind(sitting.list_column())
    .bind(sitting.incorrect_column())
    .bind(sitting.current_score)
    .bind(sitting.complete)
    .bind(sitting.answers_column()?)
    .bind(sitting.started_at)
    .fetch_one(pool)
    .await;

    match inserted {
        Ok(id) => {
            sitting.id = id;
            Ok(SittingLookup::Found(sitting))
        }
        Err(e) if e.to_string().contains("UNIQUE constraint failed") => {
            tracing::warn!(
                "Concurrent sitting creation for user {} on quiz {}; reusing the winner",
                user_id,
                quiz.id
            );
            let row: SittingRow = sqlx::query_as(&format!(
                "SELECT {SITTING_COLUMNS} FROM sittings \
                 WHERE user_id = ? AND quiz_id = ? AND course_id = ? AND complete = 0 \
                 ORDER BY started_at ASC, id ASC LIMIT 1"
            ))
            .bind(user_id)
            .bind(quiz.id)
            .bind(quiz.course_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| {
                AppError::InternalServerError(
                    "Active sitting vanished after insert conflict".to_string(),
                )
            })?;
            Ok(SittingLookup::Found(row.into_sitting()?))
        }
        Err(e) => {
            tracing::error!("Failed to create sitting: {:?}", e);
            Err(e.into())
        }
    }
}

pub(crate) async fn load_question(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Question>, AppError> {
    let row: Option<QuestionRow> = sqlx::query_as(
        "SELECT id, kind, content, explanation, figure, choice_order, created_at \
         FROM questions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let choices: Vec<ChoiceRow> = sqlx::query_as(
        "SELECT id, question_id, choice_text, correct FROM choices \
         WHERE question_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(Some(row.into_question(choices)))
}

/// Loads a batch of questions in the order of `ids`.
pub(crate) async fn load_questions(
    conn: &mut SqliteConnection,
    ids: &[i64],
) -> Result<Vec<Question>, AppError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT id, kind, content, explanation, figure, choice_order, created_at \
         FROM questions WHERE id IN (",
    );
    let mut separated = builder.separated(",");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
    let rows: Vec<QuestionRow> = builder.build_query_as().fetch_all(&mut *conn).await?;

    let mut choice_builder = QueryBuilder::<Sqlite>::new(
        "SELECT id, question_id, choice_text, correct FROM choices WHERE question_id IN (",
    );
    let mut separated = choice_builder.separated(",");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY id");
    let choice_rows: Vec<ChoiceRow> = choice_builder
        .build_query_as()
        .fetch_all(&mut *conn)
        .await?;

    let mut choices_by_question: HashMap<i64, Vec<ChoiceRow>> = HashMap::new();
    for row in choice_rows {
        choices_by_question
            .entry(row.question_id)
            .or_default()
            .push(row);
    }

    let mut rows_by_id: HashMap<i64, QuestionRow> = rows.into_iter().map(|r| (r.id, r)).collect();
    Ok(ids
        .iter()
        .filter_map(|id| rows_by_id.remove(id))
        .map(|row| {
            let choices = choices_by_question.remove(&row.id).unwrap_or_default();
            row.into_question(choices)
        })
        .collect())
}

fn final_payload(quiz: &Quiz, sitting: &Sitting) -> Value {
    let passed = sitting.passed(quiz.pass_mark);
    json!({
        "status": "complete",
        "sitting_id": sitting.id,
        "score": sitting.current_score,
        "max_score": sitting.max_score(),
        "percent": sitting.percent_correct(),
        "passed": passed,
        "message": if passed {
            "You have passed this quiz, congratulations!"
        } else {
            "You failed this quiz, try again."
        },
    })
}

#[derive(Debug, Deserialize)]
pub struct TakeParams {
    pub user_id: i64,
    pub role: Option<String>,
}

/// Starts or resumes a quiz: returns the current question of the caller's
/// active sitting, creating the sitting if needed.
pub async fn start_quiz(
    State(pool): State<SqlitePool>,
    Path(slug): Path<String>,
    Query(params): Query<TakeParams>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = fetch_quiz_by_slug(&pool, &slug)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;
    let role = Role::parse(params.role.as_deref().unwrap_or("student"));
    if quiz.draft && !role.is_privileged() {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }

    let sitting = match find_or_create_sitting(&pool, &quiz, params.user_id).await? {
        SittingLookup::AttemptsExhausted => {
            return Ok(Json(json!({
                "status": "attempts_exhausted",
                "message": "You have already completed this quiz. Only one attempt is permitted.",
            })));
        }
        SittingLookup::Found(sitting) => sitting,
    };

    let Some(question_id) = sitting.current_question() else {
        // An exhausted-but-unfinalized sitting should not persist, but if
        // one surfaces its result is all that is left to show.
        return Ok(Json(final_payload(&quiz, &sitting)));
    };

    let mut conn = pool.acquire().await?;
    let question = load_question(&mut conn, question_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Question {} not found", question_id)))?;

    let (answered, total) = sitting.progress();
    Ok(Json(json!({
        "status": "in_progress",
        "sitting_id": sitting.id,
        "question": PublicQuestion::from_question(&question),
        "progress": {"answered": answered, "total": total},
    })))
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub user_id: i64,
    pub role: Option<String>,
}

/// Force-finalizes the caller's active sitting, abandoning any remaining
/// questions. Idempotent from the caller's view: with no active sitting
/// there is nothing to finalize.
pub async fn finalize_quiz(
    State(pool): State<SqlitePool>,
    Path(slug): Path<String>,
    Json(req): Json<FinalizeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = fetch_quiz_by_slug(&pool, &slug)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;
    let role = Role::parse(req.role.as_deref().unwrap_or("student"));

    let mut tx = pool.begin().await?;

    let mut sitting = sqlx::query_as::<_, SittingRow>(&format!(
        "SELECT {SITTING_COLUMNS} FROM sittings \
         WHERE user_id = ? AND quiz_id = ? AND course_id = ? AND complete = 0 \
         ORDER BY started_at ASC, id ASC LIMIT 1"
    ))
    .bind(req.user_id)
    .bind(quiz.id)
    .bind(quiz.course_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound(
        "No active sitting for this quiz".to_string(),
    ))?
    .into_sitting()?;

    sitting.finalize(Utc::now());
    sqlx::query("UPDATE sittings SET complete = 1, ended_at = ? WHERE id = ?")
        .bind(sitting.ended_at)
        .bind(sitting.id)
        .execute(&mut *tx)
        .await?;

    if !quiz.exam_paper && !role.is_privileged() {
        sqlx::query("DELETE FROM sittings WHERE id = ?")
            .bind(sitting.id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(Json(final_payload(&quiz, &sitting)))
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub user_id: i64,
    pub role: Option<String>,
    pub question_id: i64,
    pub guess: String,
}

/// Submits an answer for the current question of the caller's active
/// sitting.
///
/// Scores the guess, records the progress-ledger delta in the same
/// transaction, advances the queue, and finalizes the sitting when the
/// last question is answered. Finalized sittings are deleted unless the
/// quiz is an exam paper or the caller is privileged.
pub async fn submit_answer(
    State(pool): State<SqlitePool>,
    Path(slug): Path<String>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = fetch_quiz_by_slug(&pool, &slug)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;
    let role = Role::parse(req.role.as_deref().unwrap_or("student"));

    let mut tx = pool.begin().await?;

    let mut sitting = sqlx::query_as::<_, SittingRow>(&format!(
        "SELECT {SITTING_COLUMNS} FROM sittings \
         WHERE user_id = ? AND quiz_id = ? AND course_id = ? AND complete = 0 \
         ORDER BY started_at ASC, id ASC LIMIT 1"
    ))
    .bind(req.user_id)
    .bind(quiz.id)
    .bind(quiz.course_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound(
        "No active sitting for this quiz; start it first".to_string(),
    ))?
    .into_sitting()?;

    let question = load_question(&mut *tx, req.question_id)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    let outcome = sitting.answer(&question, &req.guess)?;
    let (correct_delta, possible_delta) = checked_deltas(outcome.correct as i64, 1)?;

    sqlx::query(
        "UPDATE sittings SET question_list = ?, incorrect_questions = ?, \
         current_score = ?, user_answers = ? WHERE id = ?",
    )
    .bind(sitting.list_column())
    .bind(sitting.incorrect_column())
    .bind(sitting.current_score)
    .bind(sitting.answers_column()?)
    .bind(sitting.id)
    .execute(&mut *tx)
    .await?;

    // The ledger delta rides the sitting mutation's transaction so a crash
    // cannot desynchronize the two.
    sqlx::query(
        "INSERT INTO progress (user_id, quiz_id, correct, possible) VALUES (?, ?, ?, ?) \
         ON CONFLICT(user_id, quiz_id) DO UPDATE SET \
             correct = correct + excluded.correct, \
             possible = possible + excluded.possible",
    )
    .bind(req.user_id)
    .bind(quiz.id)
    .bind(correct_delta)
    .bind(possible_delta)
    .execute(&mut *tx)
    .await?;

    let finished = outcome.next_question.is_none();
    if finished {
        sitting.finalize(Utc::now());
        sqlx::query("UPDATE sittings SET complete = 1, ended_at = ? WHERE id = ?")
            .bind(sitting.ended_at)
            .bind(sitting.id)
            .execute(&mut *tx)
            .await?;

        if !quiz.exam_paper && !role.is_privileged() {
            // No permanent marking record is needed; drop the sitting.
            sqlx::query("DELETE FROM sittings WHERE id = ?")
                .bind(sitting.id)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;

    if finished {
        let mut payload = final_payload(&quiz, &sitting);
        if quiz.answers_at_end {
            let mut conn = pool.acquire().await?;
            let questions = load_questions(&mut conn, &sitting.question_order).await?;
            let review: Vec<Value> = questions
                .iter()
                .map(|q| {
                    let guess = sitting.user_answers.get(&q.id).cloned().unwrap_or_default();
                    json!({
                        "question_id": q.id,
                        "content": q.content,
                        "explanation": q.explanation,
                        "your_answer": q.guess_to_display(&guess),
                        "correct": !sitting.incorrect_questions.contains(&q.id),
                    })
                })
                .collect();
            payload["questions"] = Value::Array(review);
            payload["incorrect_questions"] = json!(sitting.incorrect_questions);
        }
        return Ok(Json(payload));
    }

    let next_id = outcome.next_question.ok_or_else(|| {
        AppError::InternalServerError("Unfinished sitting without a next question".to_string())
    })?;
    let mut conn = pool.acquire().await?;
    let next = load_question(&mut conn, next_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Question {} not found", next_id)))?;

    let (answered, total) = sitting.progress();
    let mut body = json!({
        "status": "in_progress",
        "sitting_id": sitting.id,
        "question": PublicQuestion::from_question(&next),
        "progress": {"answered": answered, "total": total},
    });
    if !quiz.answers_at_end {
        body["previous"] = json!({
            "question_id": question.id,
            "correct": outcome.correct,
            "explanation": question.explanation,
            "your_answer": question.guess_to_display(&req.guess),
        });
    }
    Ok(Json(body))
}
