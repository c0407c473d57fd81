// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        question::{CreateQuestionRequest, QuestionFormat, UpdateQuestionRequest},
        result::ScoringStatus,
        test::CreateTestRequest,
    },
    utils::html::clean_html,
};

/// Creates a new test. Admin only.
pub async fn create_test(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO tests (title, description) VALUES ($1, $2) RETURNING id",
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create test: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// Image references are either opaque `tg:` file ids or plain URLs.
fn validate_image_reference(reference: &str) -> Result<(), AppError> {
    if reference.starts_with("tg:") {
        return Ok(());
    }
    url::Url::parse(reference)
        .map(|_| ())
        .map_err(|_| AppError::BadRequest("Invalid image URL".to_string()))
}

/// Creates a new question. Admin only. Rich text is sanitized on write.
pub async fn create_question(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM tests WHERE id = $1")
        .bind(payload.test_id)
        .fetch_optional(&pool)
        .await?;
    exists.ok_or(AppError::NotFound("Test not found".to_string()))?;

    let options = payload.options.unwrap_or_default();
    match payload.format {
        QuestionFormat::MultipleChoice => {
            if options.is_empty() {
                return Err(AppError::BadRequest(
                    "Multiple-choice questions need options".to_string(),
                ));
            }
            if !options.contains_key(&payload.answer) {
                return Err(AppError::BadRequest(
                    "Answer must be one of the option labels".to_string(),
                ));
            }
        }
        QuestionFormat::FillIn => {
            if !options.is_empty() {
                return Err(AppError::BadRequest(
                    "Fill-in questions take no options".to_string(),
                ));
            }
        }
    }

    if let Some(reference) = payload.image_url.as_deref() {
        validate_image_reference(reference)?;
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO questions
            (test_id, module, number, format, prompt, stimulus,
             image_url, image_width, image_pos, options, answer,
             domain, skill, points, explanation)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        RETURNING id
        "#,
    )
    .bind(payload.test_id)
    .bind(payload.module)
    .bind(payload.number)
    .bind(payload.format)
    .bind(clean_html(&payload.prompt))
    .bind(payload.stimulus.as_deref().map(clean_html))
    .bind(&payload.image_url)
    .bind(payload.image_width)
    .bind(payload.image_pos)
    .bind(SqlJson(&options))
    .bind(&payload.answer)
    .bind(&payload.domain)
    .bind(&payload.skill)
    .bind(payload.points.unwrap_or(1))
    .bind(payload.explanation.as_deref().map(clean_html))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict("A question with that module and number already exists".to_string())
        } else {
            tracing::error!("Failed to create question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// Updates a question by ID. Admin only.
pub async fn update_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.prompt.is_none()
        && payload.stimulus.is_none()
        && payload.image_url.is_none()
        && payload.image_width.is_none()
        && payload.image_pos.is_none()
        && payload.options.is_none()
        && payload.answer.is_none()
        && payload.domain.is_none()
        && payload.skill.is_none()
        && payload.points.is_none()
        && payload.explanation.is_none()
    {
        return Ok(StatusCode::OK);
    }

    if let Some(reference) = payload.image_url.as_deref() {
        validate_image_reference(reference)?;
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE questions SET ");
    let mut separated = builder.separated(", ");

    if let Some(prompt) = payload.prompt {
        separated.push("prompt = ");
        separated.push_bind_unseparated(clean_html(&prompt));
    }

    if let Some(stimulus) = payload.stimulus {
        separated.push("stimulus = ");
        separated.push_bind_unseparated(clean_html(&stimulus));
    }

    if let Some(image_url) = payload.image_url {
        separated.push("image_url = ");
        separated.push_bind_unseparated(image_url);
    }

    if let Some(image_width) = payload.image_width {
        separated.push("image_width = ");
        separated.push_bind_unseparated(image_width);
    }

    if let Some(image_pos) = payload.image_pos {
        separated.push("image_pos = ");
        separated.push_bind_unseparated(image_pos);
    }

    if let Some(options) = payload.options {
        separated.push("options = ");
        separated.push_bind_unseparated(SqlJson(options));
    }

    if let Some(answer) = payload.answer {
        separated.push("answer = ");
        separated.push_bind_unseparated(answer);
    }

    if let Some(domain) = payload.domain {
        separated.push("domain = ");
        separated.push_bind_unseparated(domain);
    }

    if let Some(skill) = payload.skill {
        separated.push("skill = ");
        separated.push_bind_unseparated(skill);
    }

    if let Some(points) = payload.points {
        separated.push("points = ");
        separated.push_bind_unseparated(points);
    }

    if let Some(explanation) = payload.explanation {
        separated.push("explanation = ");
        separated.push_bind_unseparated(clean_html(&explanation));
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a question by ID. Admin only.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Result row for the admin listing, any status.
#[derive(Debug, Serialize, sqlx::FromRow)]
struct AdminResultRow {
    id: i64,
    username: String,
    title: String,
    total_scaled: i32,
    status: ScoringStatus,
    session_id: Option<i64>,
    completed_at: chrono::DateTime<chrono::Utc>,
}

/// Lists all results, published or not. Admin only.
pub async fn list_results(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let results: Vec<AdminResultRow> = sqlx::query_as(
        r#"
        SELECT r.id, u.username, t.title, r.total_scaled, r.status,
               r.session_id, r.completed_at
        FROM test_results r
        JOIN users u ON u.id = r.user_id
        JOIN tests t ON t.id = r.test_id
        ORDER BY r.completed_at DESC
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list results: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(results))
}
