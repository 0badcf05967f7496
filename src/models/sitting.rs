// src/models/sitting.rs

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

use crate::error::AppError;
use crate::models::question::Question;

/// One user's attempt at one quiz within one course.
///
/// Lifecycle: created when the user first takes the quiz (or resumed if an
/// unfinished attempt exists), mutated on each answer submission, finalized
/// when the question queue empties or the caller abandons, and deleted after
/// finalization unless the quiz keeps permanent marking records.
///
/// `question_order` is the immutable snapshot taken at creation and is the
/// denominator for `percent_correct`; `question_list` is the remaining
/// queue, popped from the front as questions are answered.
#[derive(Debug, Clone)]
pub struct Sitting {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,
    pub course_id: i64,
    pub question_order: Vec<i64>,
    pub question_list: VecDeque<i64>,
    pub incorrect_questions: Vec<i64>,
    pub current_score: i64,
    pub complete: bool,
    pub user_answers: HashMap<i64, String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Result of a single answer submission.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerOutcome {
    pub correct: bool,
    pub next_question: Option<i64>,
}

impl Sitting {
    /// A fresh sitting over a question snapshot. The snapshot must not be
    /// empty: a questionless quiz cannot be sat.
    pub fn new(
        user_id: i64,
        quiz_id: i64,
        course_id: i64,
        question_ids: Vec<i64>,
        started_at: DateTime<Utc>,
    ) -> Result<Sitting, AppError> {
        if question_ids.is_empty() {
            return Err(AppError::EmptyQuiz(
                "Question set of the quiz is empty. Please configure questions properly."
                    .to_string(),
            ));
        }
        Ok(Sitting {
            id: 0,
            user_id,
            quiz_id,
            course_id,
            question_list: question_ids.iter().copied().collect(),
            question_order: question_ids,
            incorrect_questions: Vec::new(),
            current_score: 0,
            complete: false,
            user_answers: HashMap::new(),
            started_at,
            ended_at: None,
        })
    }

    /// The head of the remaining-question queue, if any. Pure read.
    pub fn current_question(&self) -> Option<i64> {
        self.question_list.front().copied()
    }

    /// Scores a guess for the current question and advances the queue.
    ///
    /// The submitted question must be the current head; anything else is an
    /// ordering violation. The caller is responsible for persisting the
    /// mutated sitting together with the matching progress-ledger delta in
    /// one transaction.
    pub fn answer(&mut self, question: &Question, guess: &str) -> Result<AnswerOutcome, AppError> {
        if self.complete {
            return Err(AppError::OrderingViolation(
                "This sitting is already complete".to_string(),
            ));
        }
        let head = self.current_question().ok_or_else(|| {
            AppError::OrderingViolation("No questions remain in this sitting".to_string())
        })?;
        if head != question.id {
            return Err(AppError::OrderingViolation(format!(
                "Question {} is not the current question (expected {})",
                question.id, head
            )));
        }

        let correct = question.check_if_correct(guess);
        if correct {
            self.current_score += 1;
        } else {
            self.incorrect_questions.push(question.id);
        }
        self.user_answers.insert(question.id, guess.to_string());
        self.question_list.pop_front();

        Ok(AnswerOutcome {
            correct,
            next_question: self.current_question(),
        })
    }

    /// Manual-marking override, used after completion for essay questions
    /// and grader corrections.
    ///
    /// Un-flagging an incorrect question credits one point; flagging a
    /// question debits one point only once the sitting is complete. Returns
    /// whether the question is flagged incorrect afterwards.
    pub fn toggle_incorrect(&mut self, question_id: i64) -> Result<bool, AppError> {
        if !self.question_order.contains(&question_id) {
            return Err(AppError::NotFound(format!(
                "Question {} does not belong to this sitting",
                question_id
            )));
        }
        if let Some(pos) = self
            .incorrect_questions
            .iter()
            .position(|&id| id == question_id)
        {
            self.incorrect_questions.remove(pos);
            self.current_score += 1;
            Ok(false)
        } else {
            self.incorrect_questions.push(question_id);
            if self.complete {
                self.current_score -= 1;
            }
            Ok(true)
        }
    }

    /// Marks the sitting complete and stamps the end time. Idempotent; may
    /// be invoked with questions still outstanding when a caller abandons
    /// the attempt.
    pub fn finalize(&mut self, now: DateTime<Utc>) {
        if !self.complete {
            self.complete = true;
            self.ended_at = Some(now);
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.question_list.is_empty()
    }

    /// One point per question in the creation snapshot.
    pub fn max_score(&self) -> usize {
        self.question_order.len()
    }

    pub fn answered_count(&self) -> usize {
        self.user_answers.len()
    }

    /// (answered, total) pair for progress display.
    pub fn progress(&self) -> (usize, usize) {
        (self.answered_count(), self.max_score())
    }

    /// Integer percentage in [0, 100]. The denominator is the immutable
    /// creation snapshot, never the remaining queue; an empty snapshot
    /// yields 0.
    pub fn percent_correct(&self) -> i64 {
        let total = self.question_order.len();
        if total == 0 {
            return 0;
        }
        let percent = (self.current_score as f64 / total as f64) * 100.0;
        (percent.round() as i64).clamp(0, 100)
    }

    pub fn passed(&self, pass_mark: i64) -> bool {
        self.percent_correct() >= pass_mark
    }
}

// ---------------------------------------------------------------------------
// Storage boundary. The domain state above round-trips through the original
// persisted shape: comma-terminated id lists plus a JSON object keyed by
// question id. The string forms exist only here.
// ---------------------------------------------------------------------------

/// Encodes ids as a comma-terminated list, e.g. `3,1,2,`. Empty input
/// encodes as the empty string.
pub fn encode_id_list<'a>(ids: impl IntoIterator<Item = &'a i64>) -> String {
    let mut out = String::new();
    for id in ids {
        out.push_str(&id.to_string());
        out.push(',');
    }
    out
}

/// Decodes a comma-terminated id list, tolerating the trailing comma.
pub fn decode_id_list(s: &str) -> Result<Vec<i64>, AppError> {
    s.split(',')
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>().map_err(|_| {
                AppError::InternalServerError(format!("Corrupt id list in sitting row: {:?}", s))
            })
        })
        .collect()
}

fn encode_answers(answers: &HashMap<i64, String>) -> Result<String, AppError> {
    serde_json::to_string(answers)
        .map_err(|e| AppError::InternalServerError(format!("Failed to encode answers: {}", e)))
}

fn decode_answers(s: &str) -> Result<HashMap<i64, String>, AppError> {
    serde_json::from_str(s)
        .map_err(|e| AppError::InternalServerError(format!("Corrupt answer map: {}", e)))
}

/// Represents the 'sittings' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SittingRow {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,
    pub course_id: i64,
    pub question_order: String,
    pub question_list: String,
    pub incorrect_questions: String,
    pub current_score: i64,
    pub complete: bool,
    pub user_answers: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SittingRow {
    pub fn into_sitting(self) -> Result<Sitting, AppError> {
        Ok(Sitting {
            id: self.id,
            user_id: self.user_id,
            quiz_id: self.quiz_id,
            course_id: self.course_id,
            question_order: decode_id_list(&self.question_order)?,
            question_list: decode_id_list(&self.question_list)?.into(),
            incorrect_questions: decode_id_list(&self.incorrect_questions)?,
            current_score: self.current_score,
            complete: self.complete,
            user_answers: decode_answers(&self.user_answers)?,
            started_at: self.started_at,
            ended_at: self.ended_at,
        })
    }
}

impl Sitting {
    pub fn order_column(&self) -> String {
        encode_id_list(&self.question_order)
    }

    pub fn list_column(&self) -> String {
        encode_id_list(&self.question_list)
    }

    pub fn incorrect_column(&self) -> String {
        encode_id_list(&self.incorrect_questions)
    }

    pub fn answers_column(&self) -> Result<String, AppError> {
        encode_answers(&self.user_answers)
    }
}
