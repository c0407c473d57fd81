// src/models/test.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'tests' table: a named question set.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Test {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a new test.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTestRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}
