// src/models/question.rs

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use url::Url;
use validator::Validate;

/// The order in which multiple-choice options are displayed to the user.
/// Presentation only; evaluation never depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChoiceOrder {
    /// Lexical by choice text.
    Content,
    /// A fresh shuffle on every call.
    Random,
    /// Stored order.
    None,
}

impl ChoiceOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            ChoiceOrder::Content => "content",
            ChoiceOrder::Random => "random",
            ChoiceOrder::None => "none",
        }
    }

    pub fn parse(s: &str) -> ChoiceOrder {
        match s {
            "content" => ChoiceOrder::Content,
            "random" => ChoiceOrder::Random,
            _ => ChoiceOrder::None,
        }
    }
}

/// One selectable option of a multiple-choice question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub id: i64,
    pub text: String,
    pub correct: bool,
}

/// Question variants. The original system modeled these as subclasses
/// resolved at query time; here a single tagged union is dispatched
/// through `check_if_correct` / `choices_in_display_order`.
#[derive(Debug, Clone)]
pub enum QuestionVariant {
    MultipleChoice {
        choice_order: ChoiceOrder,
        choices: Vec<Choice>,
    },
    /// Never auto-gradable; scored through the manual marking override.
    Essay,
}

/// A fully-assembled question with its variant data.
#[derive(Debug, Clone)]
pub struct Question {
    pub id: i64,
    pub content: String,
    pub explanation: Option<String>,
    pub figure: Option<String>,
    pub variant: QuestionVariant,
}

impl Question {
    pub fn kind(&self) -> &'static str {
        match self.variant {
            QuestionVariant::MultipleChoice { .. } => "multiple_choice",
            QuestionVariant::Essay => "essay",
        }
    }

    /// Evaluates a submitted guess.
    ///
    /// For multiple choice the guess is a choice id; an unparsable or
    /// unknown id is simply wrong, never an error. Essay questions always
    /// report false and are credited later via the marking override.
    pub fn check_if_correct(&self, guess: &str) -> bool {
        match &self.variant {
            QuestionVariant::MultipleChoice { choices, .. } => match guess.trim().parse::<i64>() {
                Ok(choice_id) => choices
                    .iter()
                    .any(|choice| choice.id == choice_id && choice.correct),
                Err(_) => false,
            },
            QuestionVariant::Essay => false,
        }
    }

    /// Choices in display order per the question's policy. Empty for essay
    /// questions.
    pub fn choices_in_display_order(&self) -> Vec<&Choice> {
        match &self.variant {
            QuestionVariant::MultipleChoice {
                choice_order,
                choices,
            } => {
                let mut out: Vec<&Choice> = choices.iter().collect();
                match choice_order {
                    ChoiceOrder::Content => out.sort_by(|a, b| a.text.cmp(&b.text)),
                    ChoiceOrder::Random => out.shuffle(&mut rand::thread_rng()),
                    ChoiceOrder::None => {}
                }
                out
            }
            QuestionVariant::Essay => Vec::new(),
        }
    }

    /// Human-readable form of a recorded guess: the choice text for
    /// multiple choice (empty if the id no longer resolves), the guess
    /// itself for essays.
    pub fn guess_to_display(&self, guess: &str) -> String {
        match &self.variant {
            QuestionVariant::MultipleChoice { choices, .. } => guess
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(|id| choices.iter().find(|c| c.id == id))
                .map(|c| c.text.clone())
                .unwrap_or_default(),
            QuestionVariant::Essay => guess.to_string(),
        }
    }
}

/// Represents the 'questions' table in the database. Choices live in their
/// own table and are joined in when assembling a `Question`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuestionRow {
    pub id: i64,
    pub kind: String,
    pub content: String,
    pub explanation: Option<String>,
    pub figure: Option<String>,
    pub choice_order: String,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'choices' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChoiceRow {
    pub id: i64,
    pub question_id: i64,
    pub choice_text: String,
    pub correct: bool,
}

impl QuestionRow {
    pub fn into_question(self, choices: Vec<ChoiceRow>) -> Question {
        let variant = if self.kind == "essay" {
            QuestionVariant::Essay
        } else {
            QuestionVariant::MultipleChoice {
                choice_order: ChoiceOrder::parse(&self.choice_order),
                choices: choices
                    .into_iter()
                    .map(|row| Choice {
                        id: row.id,
                        text: row.choice_text,
                        correct: row.correct,
                    })
                    .collect(),
            }
        };
        Question {
            id: self.id,
            content: self.content,
            explanation: self.explanation,
            figure: self.figure,
            variant,
        }
    }
}

/// DTO choice payload inside `CreateQuestionRequest`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceInput {
    pub text: String,
    #[serde(default)]
    pub correct: bool,
}

/// DTO for creating a new question and attaching it to a quiz.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    /// 'multiple_choice' or 'essay'.
    #[validate(custom(function = validate_kind))]
    pub kind: String,
    #[validate(length(min = 1, max = 1000))]
    pub content: String,
    #[validate(length(max = 2000))]
    pub explanation: Option<String>,
    pub figure: Option<String>,
    /// 'content', 'random' or 'none'. Ignored for essays.
    pub choice_order: Option<String>,
    pub choices: Option<Vec<ChoiceInput>>,
}

fn validate_kind(kind: &str) -> Result<(), validator::ValidationError> {
    match kind {
        "multiple_choice" | "essay" => Ok(()),
        _ => Err(validator::ValidationError::new("unknown_question_kind")),
    }
}

impl CreateQuestionRequest {
    /// Cross-field rules the derive cannot express: a figure must be a
    /// well-formed URL, and a multiple-choice question needs choices.
    pub fn check_variant(&self) -> Result<(), String> {
        if let Some(figure) = &self.figure {
            if Url::parse(figure).is_err() {
                return Err(format!("Figure must be a valid URL: {}", figure));
            }
        }
        if self.kind == "multiple_choice" {
            let choices = self.choices.as_deref().unwrap_or(&[]);
            if choices.is_empty() {
                return Err("A multiple-choice question requires choices".to_string());
            }
            if choices
                .iter()
                .any(|c| c.text.is_empty() || c.text.len() > 1000)
            {
                return Err("Choice text must be between 1 and 1000 characters".to_string());
            }
        }
        Ok(())
    }
}

/// DTO choice without the `correct` flag, safe to show mid-quiz.
#[derive(Debug, Serialize)]
pub struct PublicChoice {
    pub id: i64,
    pub text: String,
}

/// DTO for sending a question to the client (hides correctness flags and,
/// until answered, the explanation).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub kind: &'static str,
    pub content: String,
    pub figure: Option<String>,
    pub choices: Vec<PublicChoice>,
}

impl PublicQuestion {
    pub fn from_question(question: &Question) -> Self {
        PublicQuestion {
            id: question.id,
            kind: question.kind(),
            content: question.content.clone(),
            figure: question.figure.clone(),
            choices: question
                .choices_in_display_order()
                .into_iter()
                .map(|c| PublicChoice {
                    id: c.id,
                    text: c.text.clone(),
                })
                .collect(),
        }
    }
}
