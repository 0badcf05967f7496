// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,

    pub course_id: i64,

    pub title: String,

    /// Unique slug derived from the title; collisions get a short random
    /// suffix.
    pub slug: String,

    pub description: String,

    /// 'assignment', 'exam' or 'practice'.
    pub category: String,

    /// Shuffle the question snapshot once, at sitting creation.
    pub random_order: bool,

    /// Correct answers are withheld per question and shown only with the
    /// final result.
    pub answers_at_end: bool,

    /// Completed sittings are kept permanently for marking.
    pub exam_paper: bool,

    /// Only one completed attempt per user is permitted.
    pub single_attempt: bool,

    /// Draft quizzes cannot be taken by students.
    pub draft: bool,

    /// Percentage required to pass, 0..=100.
    pub pass_mark: i64,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a new quiz under a course.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 60))]
    pub title: String,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub description: String,
    #[validate(custom(function = validate_category))]
    pub category: String,
    #[serde(default)]
    pub random_order: bool,
    #[serde(default)]
    pub answers_at_end: bool,
    #[serde(default)]
    pub exam_paper: bool,
    #[serde(default)]
    pub single_attempt: bool,
    #[serde(default)]
    pub draft: bool,
    /// Rejected outside [0, 100] at persistence time.
    #[validate(range(min = 0, max = 100))]
    pub pass_mark: i64,
}

impl CreateQuizRequest {
    /// A single-attempt quiz must keep its sittings for marking, so
    /// `single_attempt` forces `exam_paper` on save.
    pub fn effective_exam_paper(&self) -> bool {
        self.exam_paper || self.single_attempt
    }
}

/// DTO for updating a quiz. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuizRequest {
    #[validate(length(min = 1, max = 60))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(custom(function = validate_category))]
    pub category: Option<String>,
    pub random_order: Option<bool>,
    pub answers_at_end: Option<bool>,
    pub exam_paper: Option<bool>,
    pub single_attempt: Option<bool>,
    pub draft: Option<bool>,
    #[validate(range(min = 0, max = 100))]
    pub pass_mark: Option<i64>,
}

pub fn validate_category(category: &str) -> Result<(), validator::ValidationError> {
    match category {
        "assignment" | "exam" | "practice" => Ok(()),
        _ => Err(validator::ValidationError::new("unknown_category")),
    }
}
