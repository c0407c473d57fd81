// src/analysis/mod.rs
//
// AI-assisted performance analysis. The request is a structured summary
// of per-question correctness and section scores; full question text
// never leaves the server, which bounds the payload.

pub mod client;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::HttpAnalyzer;

use crate::{
    models::question::Question,
    scoring::{ScoreSummary, SectionScore, scorer},
};

/// Per-question outcome sent for analysis.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOutcome {
    pub module: i16,
    pub number: i32,
    pub domain: String,
    pub skill: String,
    pub points: i32,
    pub correct: bool,
}

/// The scoring request sent to the AI endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub verbal: SectionScore,
    pub quant: SectionScore,
    pub total_scaled: i32,
    pub questions: Vec<QuestionOutcome>,
}

impl AnalysisRequest {
    pub fn build(
        questions: &[Question],
        answers: &HashMap<i64, String>,
        summary: &ScoreSummary,
    ) -> Self {
        let outcomes = questions
            .iter()
            .map(|q| QuestionOutcome {
                module: q.module,
                number: q.number,
                domain: q.domain.clone(),
                skill: q.skill.clone(),
                points: q.points,
                correct: scorer::is_correct(q, answers),
            })
            .collect();
        Self {
            verbal: summary.verbal,
            quant: summary.quant,
            total_scaled: summary.total_scaled,
            questions: outcomes,
        }
    }
}

/// Per-section commentary in the fixed response schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionAnalysis {
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub tip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRange {
    pub low: i32,
    pub high: i32,
    #[serde(default)]
    pub explanation: String,
}

/// The fixed response schema. A response that fails to parse as this
/// is treated as "analysis unavailable", not a hard error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub score_confidence: String,
    pub score_assessment: String,
    pub verbal: SectionAnalysis,
    pub quant: SectionAnalysis,
    pub overall_tip: String,
    pub estimated_score_range: ScoreRange,
}

/// Transport-level analysis failure, after retries are exhausted.
#[derive(Debug)]
pub struct AnalysisError(pub String);

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "analysis call failed: {}", self.0)
    }
}

impl std::error::Error for AnalysisError {}

/// Seam for the external estimation call, mocked in tests.
///
/// `Ok(None)` means the analysis is unavailable (feature disabled or
/// unparseable response); core scoring proceeds unaffected either way.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(
        &self,
        request: &AnalysisRequest,
    ) -> Result<Option<AnalysisReport>, AnalysisError>;
}
