// tests/engine_flow.rs
//
// End-to-end flows through the public engine, scoring and
// orchestration APIs, with the external estimation call mocked.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;

use satprep::analysis::{
    AnalysisError, AnalysisReport, AnalysisRequest, Analyzer, ScoreRange, SectionAnalysis,
};
use satprep::engine::{ModuleDurations, Position, TestSession};
use satprep::models::question::{Question, QuestionFormat};
use satprep::proctor::{self, ParticipantWork};
use satprep::scoring::{self, ScaleTable};

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

fn question(id: i64, module: i16, number: i32, format: QuestionFormat, answer: &str) -> Question {
    let options = match format {
        QuestionFormat::MultipleChoice => {
            let mut map = BTreeMap::new();
            for label in ["A", "B", "C", "D"] {
                map.insert(label.to_string(), format!("Option {label}"));
            }
            map
        }
        QuestionFormat::FillIn => BTreeMap::new(),
    };
    Question {
        id,
        test_id: 1,
        module,
        number,
        format,
        prompt: format!("Question {number}"),
        stimulus: None,
        image_url: None,
        image_width: None,
        image_pos: None,
        options: Json(options),
        answer: answer.to_string(),
        domain: if module >= 3 {
            "Algebra".to_string()
        } else {
            "Information and Ideas".to_string()
        },
        skill: "Sample skill".to_string(),
        points: 1,
        explanation: None,
        created_at: None,
    }
}

/// Module sizes [2, 0, 1, 1] with an empty second verbal slot.
fn uneven_test() -> Vec<Question> {
    vec![
        question(1, 1, 1, QuestionFormat::MultipleChoice, "A"),
        question(2, 1, 2, QuestionFormat::MultipleChoice, "B"),
        question(3, 3, 1, QuestionFormat::MultipleChoice, "C"),
        question(4, 4, 1, QuestionFormat::FillIn, "12"),
    ]
}

fn durations() -> ModuleDurations {
    ModuleDurations::from_minutes(32, 35)
}

#[test]
fn uneven_test_visits_only_nonempty_modules() {
    // Arrange
    let mut session = TestSession::start(7, 1, uneven_test(), durations(), at(0)).unwrap();
    let mut visited = Vec::new();

    // Act: answer Q1 right, Q2 wrong, skip nothing else, answer the
    // single quantitative question right, leave the last one blank.
    visited.push(current_module(&session));
    session.answer("A".to_string(), at(10)).unwrap();
    session.next(at(11));
    session.answer("C".to_string(), at(12)).unwrap();
    session.finish_module(at(13)).unwrap();
    session.confirm_review(at(14)).unwrap();

    visited.push(current_module(&session));
    session.answer("C".to_string(), at(20)).unwrap();
    session.finish_module(at(21)).unwrap();
    session.confirm_review(at(22)).unwrap();

    visited.push(current_module(&session));
    session.finish_module(at(30)).unwrap();
    assert_eq!(session.confirm_review(at(31)).unwrap(), Position::Finished);

    // Assert: the empty module was never shown.
    assert_eq!(visited, vec![Some(0), Some(2), Some(3)]);

    let outcome = session.outcome().unwrap();
    let summary = scoring::score(&outcome.questions, &outcome.answers, &ScaleTable::default());
    assert_eq!((summary.verbal.raw, summary.verbal.total), (1, 2));
    assert_eq!((summary.quant.raw, summary.quant.total), (1, 2));
}

fn current_module(session: &TestSession) -> Option<usize> {
    match session.position() {
        Position::Question { module, .. } | Position::Review { module } => Some(module),
        Position::Finished => None,
    }
}

#[test]
fn timer_expiry_matches_a_manual_finish() {
    // Two sessions over the same test: one finishes the module
    // explicitly, the other lets the countdown run out.
    let mut manual = TestSession::start(7, 1, uneven_test(), durations(), at(0)).unwrap();
    let mut expired = TestSession::start(7, 1, uneven_test(), durations(), at(0)).unwrap();

    manual.answer("A".to_string(), at(5)).unwrap();
    manual.finish_module(at(6)).unwrap();

    expired.answer("A".to_string(), at(5)).unwrap();
    // Any interaction after the 32-minute mark applies the expiry.
    expired.next(at(33 * 60));

    assert_eq!(manual.position(), Position::Review { module: 0 });
    assert_eq!(expired.position(), Position::Review { module: 0 });

    // Both continue identically afterwards.
    manual.confirm_review(at(7)).unwrap();
    expired.confirm_review(at(34 * 60)).unwrap();
    assert_eq!(manual.position(), expired.position());
}

#[test]
fn view_reflects_the_answer_sheet() {
    let mut session = TestSession::start(7, 1, uneven_test(), durations(), at(0)).unwrap();

    session.answer("B".to_string(), at(5)).unwrap();
    session.toggle_mark(at(6)).unwrap();
    let view = session.view(at(7));

    let question = view.question.unwrap();
    assert_eq!(question.selected.as_deref(), Some("B"));
    assert!(question.marked);
    assert!(!view.calculator_enabled);
    assert!(view.grid[0].answered && view.grid[0].marked && view.grid[0].current);
    assert!(!view.grid[1].answered);

    // Striking the selected option leaves the question unanswered.
    session.toggle_elimination("B", at(8)).unwrap();
    let view = session.view(at(9));
    let question = view.question.unwrap();
    assert_eq!(question.selected, None);
    assert!(
        question
            .options
            .iter()
            .find(|o| o.label == "B")
            .unwrap()
            .eliminated
    );
    assert!(!view.grid[0].answered);
}

/// Mocked estimation call: fails for requests whose totals are listed.
struct MockAnalyzer {
    fail_totals: Vec<i32>,
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    async fn analyze(
        &self,
        request: &AnalysisRequest,
    ) -> Result<Option<AnalysisReport>, AnalysisError> {
        if self.fail_totals.contains(&request.total_scaled) {
            return Err(AnalysisError("estimation endpoint unavailable".to_string()));
        }
        Ok(Some(AnalysisReport {
            score_confidence: "medium".to_string(),
            score_assessment: "Consistent performance.".to_string(),
            verbal: SectionAnalysis {
                strengths: vec!["main ideas".to_string()],
                weaknesses: vec![],
                tip: "Keep practicing.".to_string(),
            },
            quant: SectionAnalysis {
                strengths: vec![],
                weaknesses: vec!["geometry".to_string()],
                tip: "Review figures.".to_string(),
            },
            overall_tip: "Take full timed tests.".to_string(),
            estimated_score_range: ScoreRange {
                low: request.total_scaled - 30,
                high: request.total_scaled + 30,
                explanation: "Based on section balance.".to_string(),
            },
        }))
    }
}

fn participant(id: i64, label: &str, total_scaled: i32) -> ParticipantWork {
    let summary = scoring::ScoreSummary {
        verbal: scoring::SectionScore {
            raw: 1,
            total: 2,
            scaled: total_scaled / 2,
        },
        quant: scoring::SectionScore {
            raw: 1,
            total: 2,
            scaled: total_scaled - total_scaled / 2,
        },
        total_scaled,
    };
    let answers = std::collections::HashMap::new();
    ParticipantWork {
        participant_id: id,
        label: label.to_string(),
        request: AnalysisRequest::build(&uneven_test(), &answers, &summary),
    }
}

#[tokio::test]
async fn batch_scoring_tolerates_one_failure() {
    // Arrange: five participants, one of whom will fail estimation.
    let work = vec![
        participant(1, "alina", 1000),
        participant(2, "bao", 1100),
        participant(3, "carmen", 1200),
        participant(4, "dmitri", 1300),
        participant(5, "erin", 1400),
    ];
    let analyzer = Arc::new(MockAnalyzer {
        fail_totals: vec![1200],
    });

    // Act
    let mut progress = Vec::new();
    let outcome = proctor::run_batch(work, analyzer, 3, |scored, total, message| {
        progress.push((scored, total, message.to_string()));
    })
    .await;

    // Assert: the failure is recorded, siblings are unaffected.
    assert_eq!(outcome.total, 5);
    assert_eq!(outcome.scored.len(), 4);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].participant_id, 3);
    assert_eq!(outcome.errors[0].label, "carmen");

    // Every scored participant carries a usable report.
    assert!(outcome.scored.iter().all(|s| s.report.is_some()));

    // Progress fired once per completion with monotonic counts.
    assert_eq!(progress.len(), 5);
    for pair in progress.windows(2) {
        assert!(pair[1].0 >= pair[0].0);
    }
}

#[tokio::test]
async fn analysis_requests_stay_structural() {
    // The estimation payload must never carry question text.
    let item = participant(1, "alina", 1000);
    let serialized = serde_json::to_string(&item.request).unwrap();
    assert!(!serialized.contains("Question 1"));
    assert!(serialized.contains("Algebra"));
    assert!(serialized.contains("correct"));
}
