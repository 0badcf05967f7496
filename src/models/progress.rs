// src/models/progress.rs

use serde::Serialize;
use sqlx::prelude::FromRow;

use crate::error::AppError;

// The 'progress' table holds one row per (user, quiz) with the accumulated
// (correct, possible) pair across all of that user's sittings. Rows are
// created lazily on the first recorded answer and are strictly additive
// afterwards.

/// Summary row joined with the quiz title for display.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProgressSummaryEntry {
    pub quiz_id: i64,
    pub quiz_title: String,
    pub correct: i64,
    pub possible: i64,
}

/// A completed sitting as listed in progress and marking views, newest
/// end first.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ExamEntry {
    pub sitting_id: i64,
    pub user_id: i64,
    pub username: String,
    pub quiz_id: i64,
    pub quiz_title: String,
    pub current_score: i64,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Validates a ledger delta before it is applied. Deltas are produced
/// internally (0 or 1 per answered question) but the ledger still refuses
/// values that could corrupt it.
pub fn checked_deltas(correct_delta: i64, possible_delta: i64) -> Result<(i64, i64), AppError> {
    if correct_delta < 0 || possible_delta < 0 {
        return Err(AppError::BadRequest(
            "Invalid score values: deltas must be non-negative".to_string(),
        ));
    }
    if correct_delta > possible_delta {
        return Err(AppError::BadRequest(
            "Invalid score values: correct exceeds possible".to_string(),
        ));
    }
    Ok((correct_delta, possible_delta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_accept_unit_values() {
        assert_eq!(checked_deltas(1, 1).unwrap(), (1, 1));
        assert_eq!(checked_deltas(0, 1).unwrap(), (0, 1));
        assert_eq!(checked_deltas(0, 0).unwrap(), (0, 0));
    }

    #[test]
    fn negative_or_inverted_deltas_are_rejected() {
        assert!(checked_deltas(-1, 1).is_err());
        assert!(checked_deltas(0, -1).is_err());
        assert!(checked_deltas(2, 1).is_err());
    }
}
