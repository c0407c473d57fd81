// src/models/question.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// Allowed multiple-choice option labels, in display order.
pub const OPTION_LABELS: [&str; 4] = ["A", "B", "C", "D"];

/// Question format. Dispatched as a tagged variant rather than ad hoc
/// string checks: multiple-choice answers are option labels, fill-in
/// answers are literal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "question_format", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum QuestionFormat {
    MultipleChoice,
    FillIn,
}

/// Where an optional stimulus image renders relative to the passage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "image_position", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ImagePosition {
    Above,
    Below,
}

/// Represents the 'questions' table in the database. The same shape is
/// frozen into a test result's snapshot at completion.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub test_id: i64,

    /// Module slot 1-4. Slots 1-2 are verbal, 3-4 quantitative.
    pub module: i16,

    /// Question number within its module, unique per module.
    pub number: i32,

    pub format: QuestionFormat,

    /// Rich-text prompt (sanitized on write).
    pub prompt: String,

    /// Optional rich-text stimulus passage.
    pub stimulus: Option<String>,

    pub image_url: Option<String>,
    pub image_width: Option<i32>,
    pub image_pos: Option<ImagePosition>,

    /// Option label -> option text. Empty for fill-in questions.
    pub options: Json<BTreeMap<String, String>>,

    /// Correct answer: an option label, or literal text for fill-in.
    pub answer: String,

    pub domain: String,
    pub skill: String,
    pub points: i32,

    pub explanation: Option<String>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Question {
    /// Modules 3-4 carry the calculator tool.
    pub fn is_quantitative(&self) -> bool {
        self.module >= 3
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    pub test_id: i64,
    #[validate(range(min = 1, max = 4))]
    pub module: i16,
    #[validate(range(min = 1))]
    pub number: i32,
    pub format: QuestionFormat,
    #[validate(length(min = 1, max = 10000))]
    pub prompt: String,
    #[validate(length(max = 20000))]
    pub stimulus: Option<String>,
    pub image_url: Option<String>,
    #[validate(range(min = 1, max = 2000))]
    pub image_width: Option<i32>,
    pub image_pos: Option<ImagePosition>,
    #[validate(custom(function = validate_options))]
    pub options: Option<BTreeMap<String, String>>,
    #[validate(length(min = 1, max = 500))]
    pub answer: String,
    #[validate(length(min = 1, max = 100))]
    pub domain: String,
    #[validate(length(min = 1, max = 100))]
    pub skill: String,
    #[validate(range(min = 1, max = 10))]
    pub points: Option<i32>,
    #[validate(length(max = 20000))]
    pub explanation: Option<String>,
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateQuestionRequest {
    pub prompt: Option<String>,
    pub stimulus: Option<String>,
    pub image_url: Option<String>,
    pub image_width: Option<i32>,
    pub image_pos: Option<ImagePosition>,
    pub options: Option<BTreeMap<String, String>>,
    pub answer: Option<String>,
    pub domain: Option<String>,
    pub skill: Option<String>,
    pub points: Option<i32>,
    pub explanation: Option<String>,
}

fn validate_options(
    options: &BTreeMap<String, String>,
) -> Result<(), validator::ValidationError> {
    for (label, text) in options {
        if !OPTION_LABELS.contains(&label.as_str()) {
            return Err(validator::ValidationError::new("unknown_option_label"));
        }
        if text.is_empty() || text.len() > 2000 {
            return Err(validator::ValidationError::new("option_text_length"));
        }
    }
    Ok(())
}
