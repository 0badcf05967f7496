// src/models/course.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'courses' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,

    pub title: String,

    /// Unique slug derived from the title.
    pub slug: String,

    /// Unique course code (e.g., "CSC201").
    pub code: String,

    /// Credit hours, weights the grade point in GPA/CGPA.
    pub credit: i64,

    pub level: i64,

    /// 'First' or 'Second'.
    pub semester: String,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a new course.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 20))]
    pub code: String,
    #[validate(range(min = 0, max = 30))]
    pub credit: i64,
    #[validate(range(min = 100, max = 900))]
    pub level: i64,
    #[validate(custom(function = validate_semester))]
    pub semester: String,
}

pub fn validate_semester(semester: &str) -> Result<(), validator::ValidationError> {
    match semester {
        "First" | "Second" => Ok(()),
        _ => Err(validator::ValidationError::new("unknown_semester")),
    }
}
