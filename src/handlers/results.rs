// src/handlers/results.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::result::{ResultSummary, ScoringStatus, TestResult},
    report::{self, ReportInput},
    scoring::scorer,
    state::AppState,
    utils::jwt::Claims,
};

/// Owner may only see a result once it is published; admins always may.
/// Someone else's result reads as not found.
fn ensure_visible(result: &TestResult, claims: &Claims) -> Result<(), AppError> {
    if claims.is_admin() {
        return Ok(());
    }
    if result.user_id != claims.user_id() {
        return Err(AppError::NotFound("Result not found".to_string()));
    }
    if result.status != ScoringStatus::Published {
        return Err(AppError::Forbidden(
            "Result is not published yet".to_string(),
        ));
    }
    Ok(())
}

/// Lists the caller's results. Unpublished records are hidden from
/// non-admin owners.
pub async fn list_my_results(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let results: Vec<ResultSummary> = sqlx::query_as(
        r#"
        SELECT r.id, r.test_id, t.title, r.total_scaled, r.verbal_scaled,
               r.quant_scaled, r.status, r.completed_at
        FROM test_results r
        JOIN tests t ON t.id = r.test_id
        WHERE r.user_id = $1 AND ($2 OR r.status = 'published')
        ORDER BY r.completed_at DESC
        "#,
    )
    .bind(claims.user_id())
    .bind(claims.is_admin())
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list results: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(results))
}

async fn fetch_result(pool: &PgPool, id: i64) -> Result<TestResult, AppError> {
    let result: Option<TestResult> = sqlx::query_as(
        r#"
        SELECT id, user_id, test_id, session_id,
               verbal_raw, verbal_total, verbal_scaled,
               quant_raw, quant_total, quant_scaled, total_scaled,
               questions, answers, marked, status, analysis,
               started_at, completed_at
        FROM test_results
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    result.ok_or(AppError::NotFound("Result not found".to_string()))
}

/// Full result for the review page: scores, analysis, and the frozen
/// question snapshot with image references resolved.
pub async fn get_result(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut result = fetch_result(&state.pool, id).await?;
    ensure_visible(&result, &claims)?;

    let references: Vec<String> = result
        .questions
        .0
        .iter()
        .filter_map(|q| q.image_url.clone())
        .collect();
    if !references.is_empty() {
        let resolved = state
            .images
            .clone()
            .resolve_many(references, state.config.scoring_concurrency)
            .await;
        let mut urls = resolved.into_iter();
        for question in result.questions.0.iter_mut() {
            if question.image_url.is_some() {
                question.image_url = urls.next();
            }
        }
    }

    Ok(Json(result))
}

/// Renders the fixed-layout score report as a downloadable SVG.
pub async fn get_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = fetch_result(&state.pool, id).await?;
    ensure_visible(&result, &claims)?;

    let username: String = sqlx::query_scalar("SELECT username FROM users WHERE id = $1")
        .bind(result.user_id)
        .fetch_one(&state.pool)
        .await?;
    let title: String = sqlx::query_scalar("SELECT title FROM tests WHERE id = $1")
        .bind(result.test_id)
        .fetch_one(&state.pool)
        .await?;

    let input = ReportInput {
        student_name: username.clone(),
        test_title: title,
        completed_on: result.completed_at.format("%Y-%m-%d").to_string(),
        total: result.total_scaled,
        verbal: result.verbal_scaled,
        quant: result.quant_scaled,
        domains: scorer::domain_tallies(&result.questions.0, &result.answers.0),
        resources_code: format!("satprep.example/r/{}", result.id),
    };

    let svg = report::render_report(&input);
    let filename = report::report_filename(&username, result.total_scaled);

    Ok((
        [
            (header::CONTENT_TYPE, "image/svg+xml".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        svg,
    ))
}
