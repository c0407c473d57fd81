// src/handlers/attempt.rs
//
// HTTP surface of the in-memory delivery engine. Handlers lock the
// attempt registry only long enough to apply one transition and project
// a view; image resolution happens after the lock is released.

use std::collections::HashMap;
use std::sync::MutexGuard;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::types::Json as SqlJson;
use uuid::Uuid;

use crate::{
    engine::{EngineError, ModuleDurations, Position, SessionView, TestSession},
    error::AppError,
    models::{result::ScoringStatus, session::Session},
    scoring::{self, ScoreSummary},
    state::AppState,
    utils::jwt::Claims,
};

fn engine_error(e: EngineError) -> AppError {
    match e {
        EngineError::EmptyTest => AppError::NotFound("Test has no questions".to_string()),
        other => AppError::BadRequest(other.to_string()),
    }
}

fn lock_attempts(
    state: &AppState,
) -> Result<MutexGuard<'_, HashMap<Uuid, TestSession>>, AppError> {
    state
        .attempts
        .lock()
        .map_err(|_| AppError::InternalServerError("attempt registry lock poisoned".to_string()))
}

/// Run one operation against the caller's attempt. Unknown ids and
/// other users' attempts read the same: not found.
fn with_session<T>(
    state: &AppState,
    attempt_id: Uuid,
    claims: &Claims,
    op: impl FnOnce(&mut TestSession) -> Result<T, AppError>,
) -> Result<T, AppError> {
    let mut attempts = lock_attempts(state)?;
    let session = attempts
        .get_mut(&attempt_id)
        .filter(|s| s.user_id == claims.user_id())
        .ok_or(AppError::NotFound("Attempt not found".to_string()))?;
    op(session)
}

/// Swap the current question's image reference for a resolved URL.
async fn resolve_view_image(state: &AppState, view: &mut SessionView) {
    if let Some(question) = view.question.as_mut() {
        if let Some(image) = question.image.as_mut() {
            image.url = state.images.resolve(&image.url).await;
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StartAttemptRequest {
    /// Required for self-paced attempts; ignored when joining by code.
    pub test_id: Option<i64>,
    pub session_code: Option<String>,
}

/// Starts an attempt: loads the test's questions, groups them into
/// modules, and registers the in-memory session. Joining with a session
/// code binds the attempt to that proctored session instead.
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<StartAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let user_id = claims.user_id();

    let (test_id, proctor) = match payload.session_code.as_deref() {
        Some(code) => {
            let session: Option<Session> = sqlx::query_as(
                "SELECT id, code, test_id, status, created_by, created_at, published_at \
                 FROM sessions WHERE code = $1",
            )
            .bind(code.to_uppercase())
            .fetch_optional(&state.pool)
            .await?;
            let session =
                session.ok_or(AppError::NotFound("Invalid session code".to_string()))?;

            if session.status != ScoringStatus::Pending {
                return Err(AppError::Conflict(
                    "Session is no longer accepting test takers".to_string(),
                ));
            }

            let participant_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO session_participants (session_id, user_id, status)
                VALUES ($1, $2, 'taking')
                ON CONFLICT (session_id, user_id) DO UPDATE SET status = 'taking'
                RETURNING id
                "#,
            )
            .bind(session.id)
            .bind(user_id)
            .fetch_one(&state.pool)
            .await?;

            (session.test_id, Some((session.id, participant_id)))
        }
        None => {
            let test_id = payload.test_id.ok_or(AppError::BadRequest(
                "Either test_id or session_code is required".to_string(),
            ))?;
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM tests WHERE id = $1")
                .bind(test_id)
                .fetch_optional(&state.pool)
                .await?;
            exists.ok_or(AppError::NotFound("Test not found".to_string()))?;
            (test_id, None)
        }
    };

    let questions = sqlx::query_as(
        r#"
        SELECT id, test_id, module, number, format, prompt, stimulus,
               image_url, image_width, image_pos, options, answer,
               domain, skill, points, explanation, created_at
        FROM questions
        WHERE test_id = $1
        ORDER BY module, number
        "#,
    )
    .bind(test_id)
    .fetch_all(&state.pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to load questions for test {}: {:?}", test_id, e);
        AppError::InternalServerError(e.to_string())
    })?;

    let durations = ModuleDurations::from_minutes(
        state.config.verbal_module_minutes,
        state.config.quant_module_minutes,
    );

    let mut session =
        TestSession::start(user_id, test_id, questions, durations, now).map_err(engine_error)?;
    if let Some((session_id, participant_id)) = proctor {
        session = session.in_proctored_session(session_id, participant_id);
    }

    let mut view = session.view(now);
    lock_attempts(&state)?.insert(session.attempt_id, session);

    resolve_view_image(&state, &mut view).await;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Current view of the attempt.
pub async fn get_view(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let mut view = with_session(&state, attempt_id, &claims, |s| Ok(s.view(now)))?;
    resolve_view_image(&state, &mut view).await;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub value: String,
}

/// Records an answer for the displayed question.
pub async fn answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(payload): Json<AnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let mut view = with_session(&state, attempt_id, &claims, |s| {
        s.answer(payload.value, now).map_err(engine_error)?;
        Ok(s.view(now))
    })?;
    resolve_view_image(&state, &mut view).await;
    Ok(Json(view))
}

/// Clears the displayed question's answer.
pub async fn clear_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let mut view = with_session(&state, attempt_id, &claims, |s| {
        s.clear_answer(now).map_err(engine_error)?;
        Ok(s.view(now))
    })?;
    resolve_view_image(&state, &mut view).await;
    Ok(Json(view))
}

/// Toggles the mark-for-review flag on the displayed question.
pub async fn toggle_mark(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let mut view = with_session(&state, attempt_id, &claims, |s| {
        s.toggle_mark(now).map_err(engine_error)?;
        Ok(s.view(now))
    })?;
    resolve_view_image(&state, &mut view).await;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct EliminateRequest {
    pub label: String,
}

/// Strikes an option through (or undoes the strike). Striking the
/// selected option clears the stored answer.
pub async fn toggle_elimination(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(payload): Json<EliminateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let mut view = with_session(&state, attempt_id, &claims, |s| {
        s.toggle_elimination(&payload.label, now)
            .map_err(engine_error)?;
        Ok(s.view(now))
    })?;
    resolve_view_image(&state, &mut view).await;
    Ok(Json(view))
}

pub async fn next(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let mut view = with_session(&state, attempt_id, &claims, |s| {
        s.next(now);
        Ok(s.view(now))
    })?;
    resolve_view_image(&state, &mut view).await;
    Ok(Json(view))
}

pub async fn back(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let mut view = with_session(&state, attempt_id, &claims, |s| {
        s.back(now);
        Ok(s.view(now))
    })?;
    resolve_view_image(&state, &mut view).await;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct JumpRequest {
    pub index: usize,
}

/// Jumps directly to a question in the current module.
pub async fn jump(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(payload): Json<JumpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let mut view = with_session(&state, attempt_id, &claims, |s| {
        s.jump(payload.index, now).map_err(engine_error)?;
        Ok(s.view(now))
    })?;
    resolve_view_image(&state, &mut view).await;
    Ok(Json(view))
}

/// Finishes the module explicitly: freezes the timer, shows review.
pub async fn finish_module(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let mut view = with_session(&state, attempt_id, &claims, |s| {
        s.finish_module(now).map_err(engine_error)?;
        Ok(s.view(now))
    })?;
    resolve_view_image(&state, &mut view).await;
    Ok(Json(view))
}

/// Re-enters a question from the review screen.
pub async fn revisit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(payload): Json<JumpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let mut view = with_session(&state, attempt_id, &claims, |s| {
        s.revisit(payload.index, now).map_err(engine_error)?;
        Ok(s.view(now))
    })?;
    resolve_view_image(&state, &mut view).await;
    Ok(Json(view))
}

/// Confirms the review screen. Moving past the last module completes
/// the attempt: the outcome is scored, persisted, and the in-memory
/// session discarded.
pub async fn confirm_review(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let now = Utc::now();

    enum Step {
        Continue(SessionView),
        Completed(Box<TestSession>),
    }

    let step = {
        let mut attempts = lock_attempts(&state)?;
        let session = attempts
            .get_mut(&attempt_id)
            .filter(|s| s.user_id == claims.user_id())
            .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

        let position = session.confirm_review(now).map_err(engine_error)?;
        if position == Position::Finished {
            let session = attempts
                .remove(&attempt_id)
                .ok_or(AppError::NotFound("Attempt not found".to_string()))?;
            Step::Completed(Box::new(session))
        } else {
            Step::Continue(session.view(now))
        }
    };

    match step {
        Step::Continue(mut view) => {
            resolve_view_image(&state, &mut view).await;
            Ok(Json(view).into_response())
        }
        Step::Completed(session) => {
            let (result_id, summary) = complete_attempt(&state, &session, now).await?;
            Ok(Json(json!({
                "completed": true,
                "result_id": result_id,
                "scores": summary,
            }))
            .into_response())
        }
    }
}

/// Abandons an attempt: the in-memory session (answers, navigator,
/// timer) is discarded without persisting anything.
pub async fn abandon(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut attempts = lock_attempts(&state)?;
    let owned = attempts
        .get(&attempt_id)
        .is_some_and(|s| s.user_id == claims.user_id());
    if !owned {
        return Err(AppError::NotFound("Attempt not found".to_string()));
    }
    attempts.remove(&attempt_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Records a page exit for proctored participants. A no-op for
/// self-paced attempts.
pub async fn record_exit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let participant_id =
        with_session(&state, attempt_id, &claims, |s| Ok(s.participant_id))?;

    if let Some(participant_id) = participant_id {
        sqlx::query("UPDATE session_participants SET exit_count = exit_count + 1 WHERE id = $1")
            .bind(participant_id)
            .execute(&state.pool)
            .await?;
    }

    Ok(StatusCode::OK)
}

/// Flush a finished attempt into a persisted result. Proctored results
/// stay `pending` for the session pipeline; self-paced results publish
/// immediately.
async fn complete_attempt(
    state: &AppState,
    session: &TestSession,
    now: chrono::DateTime<Utc>,
) -> Result<(i64, ScoreSummary), AppError> {
    let outcome = session.outcome().map_err(engine_error)?;
    let summary = scoring::score(&outcome.questions, &outcome.answers, &state.scale);

    let status = if session.proctor_session_id.is_some() {
        ScoringStatus::Pending
    } else {
        ScoringStatus::Published
    };

    let result_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO test_results
            (user_id, test_id, session_id,
             verbal_raw, verbal_total, verbal_scaled,
             quant_raw, quant_total, quant_scaled, total_scaled,
             questions, answers, marked, status, started_at, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        RETURNING id
        "#,
    )
    .bind(session.user_id)
    .bind(session.test_id)
    .bind(session.proctor_session_id)
    .bind(summary.verbal.raw)
    .bind(summary.verbal.total)
    .bind(summary.verbal.scaled)
    .bind(summary.quant.raw)
    .bind(summary.quant.total)
    .bind(summary.quant.scaled)
    .bind(summary.total_scaled)
    .bind(SqlJson(&outcome.questions))
    .bind(SqlJson(&outcome.answers))
    .bind(SqlJson(&outcome.marked))
    .bind(status)
    .bind(outcome.started_at)
    .bind(now)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to persist test result: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if let Some(participant_id) = session.participant_id {
        sqlx::query(
            "UPDATE session_participants \
             SET status = 'completed', raw_score = $1, result_id = $2 WHERE id = $3",
        )
        .bind(summary.verbal.raw + summary.quant.raw)
        .bind(result_id)
        .bind(participant_id)
        .execute(&state.pool)
        .await?;
    }

    Ok((result_id, summary))
}
