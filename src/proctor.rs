// src/proctor.rs
//
// Proctored-session scoring pipeline: drives each completed
// participant's answer summary through the external estimation call
// with a small fixed concurrency cap, records per-participant failures
// without aborting siblings, and advances the session status
// pending -> processing -> scored. Publication is a separate,
// single-fire operation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use sqlx::{PgPool, types::Json};

use crate::{
    analysis::{AnalysisReport, AnalysisRequest, Analyzer},
    config::Config,
    error::AppError,
    models::{question::Question, result::ScoringStatus},
    notify,
    scoring::{ScoreSummary, SectionScore},
};

/// One participant's unit of scoring work.
#[derive(Debug, Clone)]
pub struct ParticipantWork {
    pub participant_id: i64,
    pub label: String,
    pub request: AnalysisRequest,
}

#[derive(Debug)]
pub struct ParticipantFailure {
    pub participant_id: i64,
    pub label: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ScoredParticipant {
    pub participant_id: i64,
    pub report: Option<AnalysisReport>,
}

/// Aggregate outcome of a scoring run. Every participant lands either
/// in `scored` (an unavailable analysis is still terminal) or `errors`.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub total: usize,
    pub scored: Vec<ScoredParticipant>,
    pub errors: Vec<ParticipantFailure>,
}

/// Live progress of a scoring run, surfaced to the proctor UI.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScoringProgress {
    pub scored: usize,
    pub total: usize,
    pub message: String,
    pub done: bool,
}

pub type ProgressMap = Arc<Mutex<HashMap<i64, ScoringProgress>>>;

/// Run the estimation call for each work item, at most `concurrency`
/// in flight at a time. Completions within a batch may resolve out of
/// order; the progress callback still sees monotonically increasing
/// scored counts because it fires from the join loop.
pub async fn run_batch<F>(
    work: Vec<ParticipantWork>,
    analyzer: Arc<dyn Analyzer>,
    concurrency: usize,
    mut progress: F,
) -> BatchOutcome
where
    F: FnMut(usize, usize, &str),
{
    let total = work.len();
    let mut outcome = BatchOutcome {
        total,
        ..Default::default()
    };

    for batch in work.chunks(concurrency.max(1)) {
        let mut handles = Vec::new();
        for item in batch {
            let analyzer = analyzer.clone();
            let item = item.clone();
            handles.push(tokio::spawn(async move {
                let result = analyzer.analyze(&item.request).await;
                (item, result)
            }));
        }

        for handle in handles {
            match handle.await {
                Ok((item, Ok(report))) => {
                    outcome.scored.push(ScoredParticipant {
                        participant_id: item.participant_id,
                        report,
                    });
                    progress(
                        outcome.scored.len(),
                        total,
                        &format!("Scored {}", item.label),
                    );
                }
                Ok((item, Err(e))) => {
                    tracing::warn!("scoring {} failed: {}", item.label, e);
                    progress(
                        outcome.scored.len(),
                        total,
                        &format!("Failed {}: {}", item.label, e),
                    );
                    outcome.errors.push(ParticipantFailure {
                        participant_id: item.participant_id,
                        label: item.label,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::error!("scoring task failed: {}", e);
                    outcome.errors.push(ParticipantFailure {
                        participant_id: 0,
                        label: String::new(),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    outcome
}

/// Row shape for participants awaiting scoring.
#[derive(sqlx::FromRow)]
struct ScorableParticipant {
    participant_id: i64,
    username: String,
    result_id: i64,
    verbal_raw: i32,
    verbal_total: i32,
    verbal_scaled: i32,
    quant_raw: i32,
    quant_total: i32,
    quant_scaled: i32,
    total_scaled: i32,
    questions: Json<Vec<Question>>,
    answers: Json<HashMap<i64, String>>,
}

/// Score every completed participant of a session and advance the
/// session to `scored` once each has a terminal outcome.
pub async fn score_session(
    pool: &PgPool,
    session_id: i64,
    analyzer: Arc<dyn Analyzer>,
    concurrency: usize,
    progress_map: ProgressMap,
) -> Result<BatchOutcome, AppError> {
    let status: Option<ScoringStatus> =
        sqlx::query_scalar("SELECT status FROM sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(pool)
            .await?;
    let status = status.ok_or(AppError::NotFound("Session not found".to_string()))?;

    if status != ScoringStatus::Pending {
        return Err(AppError::Conflict(format!(
            "Session cannot be scored from status '{:?}'",
            status
        )));
    }

    // Conditional update so two concurrent runs cannot both start.
    let moved =
        sqlx::query("UPDATE sessions SET status = 'processing' WHERE id = $1 AND status = 'pending'")
            .bind(session_id)
            .execute(pool)
            .await?
            .rows_affected();
    if moved == 0 {
        return Err(AppError::Conflict(
            "Session scoring already started".to_string(),
        ));
    }

    let rows: Vec<ScorableParticipant> = sqlx::query_as(
        r#"
        SELECT
            p.id AS participant_id,
            u.username,
            r.id AS result_id,
            r.verbal_raw, r.verbal_total, r.verbal_scaled,
            r.quant_raw, r.quant_total, r.quant_scaled,
            r.total_scaled,
            r.questions,
            r.answers
        FROM session_participants p
        JOIN users u ON u.id = p.user_id
        JOIN test_results r ON r.id = p.result_id
        WHERE p.session_id = $1 AND p.status = 'completed'
        ORDER BY p.id
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    let mut result_ids: HashMap<i64, i64> = HashMap::new();
    let work: Vec<ParticipantWork> = rows
        .into_iter()
        .map(|row| {
            result_ids.insert(row.participant_id, row.result_id);
            let summary = ScoreSummary {
                verbal: SectionScore {
                    raw: row.verbal_raw,
                    total: row.verbal_total,
                    scaled: row.verbal_scaled,
                },
                quant: SectionScore {
                    raw: row.quant_raw,
                    total: row.quant_total,
                    scaled: row.quant_scaled,
                },
                total_scaled: row.total_scaled,
            };
            ParticipantWork {
                participant_id: row.participant_id,
                label: row.username,
                request: AnalysisRequest::build(&row.questions.0, &row.answers.0, &summary),
            }
        })
        .collect();

    let total = work.len();
    set_progress(&progress_map, session_id, 0, total, "Scoring started", false);

    let map = progress_map.clone();
    let outcome = run_batch(work, analyzer, concurrency, |scored, total, message| {
        tracing::info!("session {}: {}/{} {}", session_id, scored, total, message);
        set_progress(&map, session_id, scored, total, message, false);
    })
    .await;

    for scored in &outcome.scored {
        if let Some(result_id) = result_ids.get(&scored.participant_id) {
            sqlx::query("UPDATE test_results SET analysis = $1, status = 'scored' WHERE id = $2")
                .bind(scored.report.clone().map(Json))
                .bind(result_id)
                .execute(pool)
                .await?;
        }
    }
    for failure in &outcome.errors {
        if failure.participant_id != 0 {
            sqlx::query("UPDATE session_participants SET error = $1 WHERE id = $2")
                .bind(&failure.message)
                .bind(failure.participant_id)
                .execute(pool)
                .await?;
        }
    }

    // Every participant now has a terminal outcome (result or recorded
    // error), which is the precondition for 'scored'.
    sqlx::query("UPDATE sessions SET status = 'scored' WHERE id = $1 AND status = 'processing'")
        .bind(session_id)
        .execute(pool)
        .await?;

    set_progress(
        &progress_map,
        session_id,
        outcome.scored.len(),
        outcome.total,
        &format!(
            "Scoring complete: {}/{} scored, {} failed",
            outcome.scored.len(),
            outcome.total,
            outcome.errors.len()
        ),
        true,
    );

    Ok(outcome)
}

/// Guard for the publish transition; only `scored` may publish.
pub fn ensure_publishable(status: ScoringStatus) -> Result<(), AppError> {
    match status {
        ScoringStatus::Scored => Ok(()),
        ScoringStatus::Published => Err(AppError::Conflict(
            "Session is already published".to_string(),
        )),
        _ => Err(AppError::Conflict("Session is not scored yet".to_string())),
    }
}

/// Publish a scored session: make participant results visible to their
/// owners and send the announcement exactly once. The status flip is a
/// conditional update, so a second publish cannot re-notify.
pub async fn publish_session(
    pool: &PgPool,
    http: &reqwest::Client,
    config: &Config,
    session_id: i64,
) -> Result<(), AppError> {
    #[derive(sqlx::FromRow)]
    struct SessionRow {
        code: String,
        status: ScoringStatus,
    }

    let session: Option<SessionRow> =
        sqlx::query_as("SELECT code, status FROM sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(pool)
            .await?;
    let session = session.ok_or(AppError::NotFound("Session not found".to_string()))?;

    ensure_publishable(session.status)?;

    let flipped = sqlx::query(
        "UPDATE sessions SET status = 'published', published_at = CURRENT_TIMESTAMP \
         WHERE id = $1 AND status = 'scored'",
    )
    .bind(session_id)
    .execute(pool)
    .await?
    .rows_affected();
    if flipped == 0 {
        return Err(AppError::Conflict(
            "Session is already published".to_string(),
        ));
    }

    sqlx::query("UPDATE test_results SET status = 'published' WHERE session_id = $1 AND status = 'scored'")
        .bind(session_id)
        .execute(pool)
        .await?;

    let participants: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM session_participants WHERE session_id = $1 AND status = 'completed'",
    )
    .bind(session_id)
    .fetch_one(pool)
    .await?;

    notify::send_publish_notification(http, config, &session.code, participants as usize).await;

    Ok(())
}

fn set_progress(
    map: &ProgressMap,
    session_id: i64,
    scored: usize,
    total: usize,
    message: &str,
    done: bool,
) {
    if let Ok(mut guard) = map.lock() {
        guard.insert(
            session_id,
            ScoringProgress {
                scored,
                total,
                message: message.to_string(),
                done,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisError, AnalysisReport, Analyzer};
    use async_trait::async_trait;

    /// Fails for work items carrying the marked question count; the
    /// label is not part of the request, so tests key failures off it.
    struct FlakyAnalyzer {
        fail_question_count: usize,
    }

    #[async_trait]
    impl Analyzer for FlakyAnalyzer {
        async fn analyze(
            &self,
            request: &AnalysisRequest,
        ) -> Result<Option<AnalysisReport>, AnalysisError> {
            if request.questions.len() == self.fail_question_count {
                return Err(AnalysisError("induced failure".to_string()));
            }
            Ok(None)
        }
    }

    fn work_item(id: i64, label: &str, question_count: usize) -> ParticipantWork {
        let section = SectionScore {
            raw: 0,
            total: 0,
            scaled: 200,
        };
        ParticipantWork {
            participant_id: id,
            label: label.to_string(),
            request: AnalysisRequest {
                verbal: section,
                quant: section,
                total_scaled: 400,
                questions: (0..question_count)
                    .map(|i| crate::analysis::QuestionOutcome {
                        module: 1,
                        number: i as i32 + 1,
                        domain: "Algebra".to_string(),
                        skill: "Linear equations".to_string(),
                        points: 1,
                        correct: false,
                    })
                    .collect(),
            },
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_batch() {
        let work = vec![
            work_item(1, "a", 1),
            work_item(2, "b", 2),
            work_item(3, "c", 1),
            work_item(4, "d", 1),
            work_item(5, "e", 1),
        ];
        let analyzer = Arc::new(FlakyAnalyzer {
            fail_question_count: 2,
        });

        let mut reported = Vec::new();
        let outcome = run_batch(work, analyzer, 3, |scored, total, _| {
            reported.push((scored, total));
        })
        .await;

        assert_eq!(outcome.total, 5);
        assert_eq!(outcome.scored.len(), 4);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].participant_id, 2);

        // One progress report per completion, counts never decreasing.
        assert_eq!(reported.len(), 5);
        for pair in reported.windows(2) {
            assert!(pair[1].0 >= pair[0].0);
        }
        assert_eq!(reported.last().unwrap().1, 5);
    }

    #[tokio::test]
    async fn empty_batch_completes_immediately() {
        let analyzer = Arc::new(FlakyAnalyzer {
            fail_question_count: 0,
        });
        let outcome = run_batch(Vec::new(), analyzer, 3, |_, _, _| {}).await;
        assert_eq!(outcome.total, 0);
        assert!(outcome.scored.is_empty());
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn publish_guard_is_single_fire() {
        assert!(ensure_publishable(ScoringStatus::Scored).is_ok());
        assert!(matches!(
            ensure_publishable(ScoringStatus::Published),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            ensure_publishable(ScoringStatus::Pending),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            ensure_publishable(ScoringStatus::Processing),
            Err(AppError::Conflict(_))
        ));
    }
}
