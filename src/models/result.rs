// src/models/result.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

pub const PASS: &str = "PASS";
pub const FAIL: &str = "FAIL";

/// Letter grades in descending order of merit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B+")]
    BPlus,
    B,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C+")]
    CPlus,
    C,
    #[serde(rename = "C-")]
    CMinus,
    D,
    F,
    NG,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::CMinus => "C-",
            Grade::D => "D",
            Grade::F => "F",
            Grade::NG => "NG",
        }
    }

    /// Parses a stored grade string. Unknown values degrade to `NG`
    /// (0.0 points) rather than erroring; the scoring pipeline never
    /// crashes on bad data.
    pub fn parse(s: &str) -> Grade {
        match s {
            "A+" => Grade::APlus,
            "A" => Grade::A,
            "A-" => Grade::AMinus,
            "B+" => Grade::BPlus,
            "B" => Grade::B,
            "B-" => Grade::BMinus,
            "C+" => Grade::CPlus,
            "C" => Grade::C,
            "C-" => Grade::CMinus,
            "D" => Grade::D,
            "F" => Grade::F,
            _ => Grade::NG,
        }
    }

    pub fn point(self) -> f64 {
        match self {
            Grade::APlus => 4.0,
            Grade::A => 4.0,
            Grade::AMinus => 3.75,
            Grade::BPlus => 3.5,
            Grade::B => 3.0,
            Grade::BMinus => 2.75,
            Grade::CPlus => 2.5,
            Grade::C => 2.0,
            Grade::CMinus => 1.75,
            Grade::D => 1.0,
            Grade::F => 0.0,
            Grade::NG => 0.0,
        }
    }
}

/// Boundary table, highest first. `grade_for` returns the first boundary
/// the total meets or exceeds.
pub const GRADE_BOUNDARIES: [(f64, Grade); 11] = [
    (90.0, Grade::APlus),
    (85.0, Grade::A),
    (80.0, Grade::AMinus),
    (75.0, Grade::BPlus),
    (70.0, Grade::B),
    (65.0, Grade::BMinus),
    (60.0, Grade::CPlus),
    (55.0, Grade::C),
    (50.0, Grade::CMinus),
    (45.0, Grade::D),
    (0.0, Grade::F),
];

/// Total-ordering scan over the boundary table. Totals below every
/// boundary (negative) grade as `NG`.
pub fn grade_for(total: f64) -> Grade {
    for (boundary, grade) in GRADE_BOUNDARIES {
        if total >= boundary {
            return grade;
        }
    }
    Grade::NG
}

/// `credit × grade point`. Total over all inputs.
pub fn point_for(grade: Grade, credit: i64) -> f64 {
    credit as f64 * grade.point()
}

pub fn comment_for(grade: Grade) -> &'static str {
    match grade {
        Grade::F | Grade::NG => FAIL,
        _ => PASS,
    }
}

/// Rounds half away from zero to 2 decimal places. GPA, CGPA and stored
/// points all go through here so tests can pin exact values.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Credit-weighted mean of grade points: `Σ point / Σ credit`, rounded to
/// 2 decimals. Zero total credit yields exactly 0.00 rather than a
/// division error.
pub fn weighted_gpa(rows: &[(f64, i64)]) -> f64 {
    let total_credits: i64 = rows.iter().map(|(_, credit)| credit).sum();
    if total_credits == 0 {
        return 0.0;
    }
    let total_points: f64 = rows.iter().map(|(point, _)| point).sum();
    round2(total_points / total_credits as f64)
}

/// Represents the 'taken_courses' table: one row per (student, course)
/// holding the five raw component marks and the derived columns.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TakenCourse {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub assignment: f64,
    pub mid_exam: f64,
    pub quiz: f64,
    pub attendance: f64,
    pub final_exam: f64,
    pub total: f64,
    pub grade: String,
    pub point: f64,
    pub comment: String,
}

/// Derived columns, always recomputed from the raw marks and the course
/// credit; never settable by callers.
#[derive(Debug, Clone, Serialize)]
pub struct DerivedMarks {
    pub total: f64,
    pub grade: Grade,
    pub point: f64,
    pub comment: &'static str,
}

/// DTO for upserting a student's raw marks on a course.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMarksRequest {
    #[validate(range(min = 0.0, max = 100.0))]
    pub assignment: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub mid_exam: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub quiz: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub attendance: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub final_exam: f64,
}

impl UpdateMarksRequest {
    pub fn derive(&self, credit: i64) -> DerivedMarks {
        let total = self.assignment + self.mid_exam + self.quiz + self.attendance + self.final_exam;
        let grade = grade_for(total);
        DerivedMarks {
            total,
            grade,
            point: round2(point_for(grade, credit)),
            comment: comment_for(grade),
        }
    }
}
