// src/handlers/session.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        result::ScoringStatus,
        session::{CreateSessionRequest, JoinSessionRequest, ParticipantView, Session},
    },
    proctor,
    state::AppState,
    utils::jwt::Claims,
};

/// Human-shareable join code.
fn generate_code() -> String {
    Uuid::new_v4().simple().to_string()[..6].to_uppercase()
}

/// Creates a proctored session for a test. Admin only.
pub async fn create_session(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM tests WHERE id = $1")
        .bind(payload.test_id)
        .fetch_optional(&pool)
        .await?;
    exists.ok_or(AppError::NotFound("Test not found".to_string()))?;

    let session: Session = sqlx::query_as(
        r#"
        INSERT INTO sessions (code, test_id, created_by)
        VALUES ($1, $2, $3)
        RETURNING id, code, test_id, status, created_by, created_at, published_at
        "#,
    )
    .bind(generate_code())
    .bind(payload.test_id)
    .bind(claims.user_id())
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create session: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// Joins a session by code; the participant waits until they start the
/// attempt with the same code.
pub async fn join_session(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<JoinSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let session: Option<Session> = sqlx::query_as(
        "SELECT id, code, test_id, status, created_by, created_at, published_at \
         FROM sessions WHERE code = $1",
    )
    .bind(payload.code.to_uppercase())
    .fetch_optional(&pool)
    .await?;
    let session = session.ok_or(AppError::NotFound("Invalid session code".to_string()))?;

    if session.status != ScoringStatus::Pending {
        return Err(AppError::Conflict(
            "Session is no longer accepting test takers".to_string(),
        ));
    }

    sqlx::query(
        r#"
        INSERT INTO session_participants (session_id, user_id, status)
        VALUES ($1, $2, 'waiting')
        ON CONFLICT (session_id, user_id) DO NOTHING
        "#,
    )
    .bind(session.id)
    .bind(claims.user_id())
    .execute(&pool)
    .await?;

    Ok(Json(serde_json::json!({
        "session_id": session.id,
        "test_id": session.test_id,
        "code": session.code,
    })))
}

/// Proctor view: session status plus every participant. Admin only.
pub async fn get_session(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session: Option<Session> = sqlx::query_as(
        "SELECT id, code, test_id, status, created_by, created_at, published_at \
         FROM sessions WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?;
    let session = session.ok_or(AppError::NotFound("Session not found".to_string()))?;

    let participants: Vec<ParticipantView> = sqlx::query_as(
        r#"
        SELECT p.id, u.username, p.status, p.exit_count, p.raw_score, p.error
        FROM session_participants p
        JOIN users u ON u.id = p.user_id
        WHERE p.session_id = $1
        ORDER BY u.username
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(serde_json::json!({
        "session": session,
        "participants": participants,
    })))
}

/// Kicks off AI scoring for every completed participant. Admin only.
/// The run continues in the background; progress is polled separately.
pub async fn start_scoring(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let status: Option<ScoringStatus> =
        sqlx::query_scalar("SELECT status FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&state.pool)
            .await?;
    let status = status.ok_or(AppError::NotFound("Session not found".to_string()))?;
    if status != ScoringStatus::Pending {
        return Err(AppError::Conflict(format!(
            "Session cannot be scored from status '{:?}'",
            status
        )));
    }

    let pool = state.pool.clone();
    let analyzer = state.analyzer.clone();
    let concurrency = state.config.scoring_concurrency;
    let progress = state.progress.clone();
    tokio::spawn(async move {
        if let Err(e) = proctor::score_session(&pool, id, analyzer, concurrency, progress).await {
            tracing::error!("session {} scoring failed: {}", id, e);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "message": "Scoring started" })),
    ))
}

/// Live `(scored, total, message)` for a running scoring batch.
pub async fn get_progress(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let progress = state
        .progress
        .lock()
        .map_err(|_| AppError::InternalServerError("progress lock poisoned".to_string()))?
        .get(&id)
        .cloned();

    match progress {
        Some(progress) => Ok(Json(progress)),
        None => Err(AppError::NotFound(
            "No scoring run for this session".to_string(),
        )),
    }
}

/// Publishes a scored session: reveals every participant result and
/// sends the announcement. Publishing twice is rejected. Admin only.
pub async fn publish(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    proctor::publish_session(&state.pool, &state.http, &state.config, id).await?;
    Ok(Json(serde_json::json!({ "message": "Session published" })))
}
