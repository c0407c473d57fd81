// src/models/session.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::result::ScoringStatus;

/// Participant lifecycle inside a proctored session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "participant_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Waiting,
    Taking,
    Completed,
}

/// Represents the 'sessions' table: a live, code-joined group test.
/// The aggregate status mirrors its participants' results and may not
/// reach `published` until every participant has a terminal outcome.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,

    /// Human-shareable join code.
    pub code: String,

    pub test_id: i64,
    pub status: ScoringStatus,
    pub created_by: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub published_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'session_participants' table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Participant {
    pub id: i64,
    pub session_id: i64,
    pub user_id: i64,
    pub status: ParticipantStatus,

    /// Times the student navigated away from the test page.
    pub exit_count: i32,

    pub raw_score: Option<i32>,
    pub result_id: Option<i64>,

    /// Per-participant scoring failure, recorded without aborting the batch.
    pub error: Option<String>,

    pub joined_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Participant row joined with its username for the proctor view.
#[derive(Debug, Serialize, FromRow)]
pub struct ParticipantView {
    pub id: i64,
    pub username: String,
    pub status: ParticipantStatus,
    pub exit_count: i32,
    pub raw_score: Option<i32>,
    pub error: Option<String>,
}

/// DTO for creating a proctored session.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    pub test_id: i64,
}

/// DTO for joining a session by code.
#[derive(Debug, Deserialize, Validate)]
pub struct JoinSessionRequest {
    #[validate(length(min = 4, max = 16))]
    pub code: String,
}
