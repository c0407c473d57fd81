// src/engine/view.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    engine::{
        answers::AnswerSheet,
        navigator::{MODULE_SLOTS, ModuleNavigator, Position},
        timer::ModuleTimer,
    },
    models::question::{ImagePosition, Question, QuestionFormat},
};

/// What the student's pane is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Question,
    Review,
    Finished,
}

#[derive(Debug, Serialize)]
pub struct ImageView {
    pub url: String,
    pub width: Option<i32>,
    pub position: ImagePosition,
}

#[derive(Debug, Serialize)]
pub struct OptionView {
    pub label: String,
    pub text: String,
    pub eliminated: bool,
}

/// The delivery projection of one question. Answer keys and
/// explanations never leave the server during a test.
#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: i64,
    pub number: i32,
    pub format: QuestionFormat,
    pub prompt: String,
    pub stimulus: Option<String>,
    pub image: Option<ImageView>,
    pub options: Vec<OptionView>,
    /// Restored answer value, if any.
    pub selected: Option<String>,
    pub marked: bool,
}

/// One cell of the navigator grid.
#[derive(Debug, Serialize)]
pub struct GridCell {
    pub index: usize,
    pub number: i32,
    pub answered: bool,
    pub marked: bool,
    pub current: bool,
}

/// The rendered pane: a deterministic projection of (current question,
/// answer sheet, mark set, timer).
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub attempt_id: Uuid,
    pub stage: Stage,
    pub module: Option<usize>,
    pub module_label: Option<String>,
    pub timer: String,
    pub calculator_enabled: bool,
    pub question: Option<QuestionView>,
    pub grid: Vec<GridCell>,
}

pub(crate) fn project(
    attempt_id: Uuid,
    modules: &[Vec<Question>; MODULE_SLOTS],
    navigator: &ModuleNavigator,
    sheet: &AnswerSheet,
    timer: &ModuleTimer,
    now: DateTime<Utc>,
) -> SessionView {
    let (stage, module, current_index) = match navigator.position() {
        Position::Question { module, index } => (Stage::Question, Some(module), Some(index)),
        Position::Review { module } => (Stage::Review, Some(module), None),
        Position::Finished => (Stage::Finished, None, None),
    };

    let grid = module
        .map(|m| {
            modules[m]
                .iter()
                .enumerate()
                .map(|(i, q)| GridCell {
                    index: i,
                    number: q.number,
                    answered: sheet.is_answered(q.id),
                    marked: sheet.is_marked(q.id),
                    current: Some(i) == current_index,
                })
                .collect()
        })
        .unwrap_or_default();

    let question = match (module, current_index) {
        (Some(m), Some(i)) => modules[m].get(i).map(|q| question_view(q, sheet)),
        _ => None,
    };

    SessionView {
        attempt_id,
        stage,
        module,
        module_label: module.map(module_label),
        timer: timer.display(now),
        // The calculator tool is only available in quantitative modules.
        calculator_enabled: module.is_some_and(|m| m >= 2),
        question,
        grid,
    }
}

fn question_view(question: &Question, sheet: &AnswerSheet) -> QuestionView {
    let options = question
        .options
        .iter()
        .map(|(label, text)| OptionView {
            label: label.clone(),
            text: text.clone(),
            eliminated: sheet.is_eliminated(question.id, label),
        })
        .collect();

    QuestionView {
        id: question.id,
        number: question.number,
        format: question.format,
        prompt: question.prompt.clone(),
        stimulus: question.stimulus.clone(),
        image: question.image_url.as_ref().map(|url| ImageView {
            url: url.clone(),
            width: question.image_width,
            position: question.image_pos.unwrap_or(ImagePosition::Above),
        }),
        options,
        selected: sheet.answer(question.id).map(str::to_string),
        marked: sheet.is_marked(question.id),
    }
}

fn module_label(slot: usize) -> String {
    if slot < 2 {
        format!("Reading and Writing · Module {}", slot + 1)
    } else {
        format!("Math · Module {}", slot - 1)
    }
}
