// src/handlers/tests.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{error::AppError, models::test::Test};

/// Lists available tests.
pub async fn list_tests(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let tests: Vec<Test> = sqlx::query_as(
        r#"
        SELECT id, title, description, created_at
        FROM tests
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list tests: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(tests))
}

/// Helper row for per-module question counts.
#[derive(sqlx::FromRow)]
struct ModuleCount {
    module: i16,
    count: i64,
}

/// Retrieves one test with its per-module question counts.
pub async fn get_test(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let test: Option<Test> =
        sqlx::query_as("SELECT id, title, description, created_at FROM tests WHERE id = $1")
            .bind(id)
            .fetch_optional(&pool)
            .await?;
    let test = test.ok_or(AppError::NotFound("Test not found".to_string()))?;

    let counts: Vec<ModuleCount> = sqlx::query_as(
        "SELECT module, COUNT(*) AS count FROM questions WHERE test_id = $1 GROUP BY module",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let mut modules = [0i64; 4];
    for row in counts {
        let slot = (row.module as usize).saturating_sub(1);
        if slot < 4 {
            modules[slot] = row.count;
        }
    }

    Ok(Json(serde_json::json!({
        "test": test,
        "module_question_counts": modules,
    })))
}
