// src/models/result.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

use crate::{analysis::AnalysisReport, models::question::Question};

/// Scoring lifecycle. Transitions are strictly monotonic; once
/// `published` a record is immutable and visible to its owner.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "scoring_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScoringStatus {
    Pending,
    Processing,
    Scored,
    Published,
}

impl ScoringStatus {
    /// No backward transitions, no skipping straight past `scored`.
    pub fn can_advance_to(self, next: ScoringStatus) -> bool {
        matches!(
            (self, next),
            (ScoringStatus::Pending, ScoringStatus::Processing)
                | (ScoringStatus::Processing, ScoringStatus::Scored)
                | (ScoringStatus::Scored, ScoringStatus::Published)
        )
    }
}

/// Represents the 'test_results' table: one record per completed
/// attempt. `questions` is a snapshot frozen at completion, not a live
/// reference to the bank.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TestResult {
    pub id: i64,
    pub user_id: i64,
    pub test_id: i64,
    pub session_id: Option<i64>,

    pub verbal_raw: i32,
    pub verbal_total: i32,
    pub verbal_scaled: i32,
    pub quant_raw: i32,
    pub quant_total: i32,
    pub quant_scaled: i32,
    pub total_scaled: i32,

    pub questions: Json<Vec<Question>>,
    pub answers: Json<HashMap<i64, String>>,
    pub marked: Json<Vec<i64>>,

    pub status: ScoringStatus,
    pub analysis: Option<Json<AnalysisReport>>,

    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

/// Row for result listings (no snapshot payload).
#[derive(Debug, Serialize, FromRow)]
pub struct ResultSummary {
    pub id: i64,
    pub test_id: i64,
    pub title: String,
    pub total_scaled: i32,
    pub verbal_scaled: i32,
    pub quant_scaled: i32,
    pub status: ScoringStatus,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_monotonic() {
        use ScoringStatus::*;

        assert!(Pending.can_advance_to(Processing));
        assert!(Processing.can_advance_to(Scored));
        assert!(Scored.can_advance_to(Published));

        assert!(!Published.can_advance_to(Scored));
        assert!(!Scored.can_advance_to(Processing));
        assert!(!Pending.can_advance_to(Scored));
        assert!(!Published.can_advance_to(Published));
    }
}
