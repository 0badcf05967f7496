// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Caller-supplied role. The service does not authenticate or authorize;
/// it only branches on the role the caller declares (marking access,
/// sitting retention, exam listings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Lecturer,
    Admin,
}

impl Role {
    /// Lecturers and admins may see all sittings and keep finalized
    /// records for marking.
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Lecturer | Role::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Lecturer => "lecturer",
            Role::Admin => "admin",
        }
    }

    /// Parses a stored or caller-supplied role string. Anything
    /// unrecognized degrades to the least-privileged role.
    pub fn parse(s: &str) -> Role {
        match s {
            "lecturer" => Role::Lecturer,
            "admin" => Role::Admin,
            _ => Role::Student,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Student
    }
}

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique username.
    pub username: String,

    /// 'student', 'lecturer' or 'admin'.
    pub role: String,

    /// Academic level (100, 200, ...). GPA aggregates only courses at the
    /// student's current level.
    pub level: i64,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}
