// src/analysis/client.rs

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::analysis::{AnalysisError, AnalysisReport, AnalysisRequest, Analyzer};

const PROMPT_PREAMBLE: &str = "You are scoring a practice SAT attempt. \
Given the JSON summary of per-question outcomes and section scores, \
respond with a single JSON object with fields: scoreConfidence, \
scoreAssessment, verbal {strengths, weaknesses, tip}, quant {strengths, \
weaknesses, tip}, overallTip, estimatedScoreRange {low, high, explanation}. \
Respond with JSON only.";

/// Client for the generative-AI estimation endpoint.
///
/// A missing API key disables the feature: calls return `Ok(None)` with
/// a logged warning instead of failing the caller. Transient failures
/// retry with exponential backoff up to the configured bound.
pub struct HttpAnalyzer {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    max_retries: u32,
    backoff: Duration,
}

impl HttpAnalyzer {
    pub fn new(
        client: reqwest::Client,
        api_url: String,
        api_key: Option<String>,
        max_retries: u32,
        backoff_ms: u64,
    ) -> Self {
        Self {
            client,
            api_url,
            api_key,
            max_retries,
            backoff: Duration::from_millis(backoff_ms),
        }
    }

    async fn call_once(&self, key: &str, prompt: &str) -> Result<String, String> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        let response = self
            .client
            .post(format!("{}?key={}", self.api_url, key))
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("status {}", status));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| e.to_string())?;
        parsed
            .candidates
            .into_iter()
            .flatten()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .into_iter()
            .flatten()
            .next()
            .and_then(|p| p.text)
            .ok_or_else(|| "empty response".to_string())
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn analyze(
        &self,
        request: &AnalysisRequest,
    ) -> Result<Option<AnalysisReport>, AnalysisError> {
        let Some(key) = self.api_key.as_deref() else {
            tracing::warn!("AI_API_KEY not configured, skipping analysis");
            return Ok(None);
        };

        let summary = serde_json::to_string(request).map_err(|e| AnalysisError(e.to_string()))?;
        let prompt = format!("{}\n\n{}", PROMPT_PREAMBLE, summary);

        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.backoff * 2u32.pow(attempt - 1)).await;
            }
            match self.call_once(key, &prompt).await {
                Ok(text) => return Ok(parse_report(&text)),
                Err(e) => {
                    tracing::warn!("analysis attempt {} failed: {}", attempt + 1, e);
                    last_error = e;
                }
            }
        }
        Err(AnalysisError(last_error))
    }
}

/// Extract the report from the model's text. Code fences are stripped
/// first; anything that still fails the schema reads as unavailable.
fn parse_report(text: &str) -> Option<AnalysisReport> {
    let trimmed = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    match serde_json::from_str(trimmed) {
        Ok(report) => Some(report),
        Err(e) => {
            tracing::warn!("unparseable analysis response: {}", e);
            None
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    parts: Option<Vec<Part>>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_fenced_report() {
        let text = r#"```json
        {
            "scoreConfidence": "high",
            "scoreAssessment": "Solid verbal, uneven quant.",
            "verbal": { "strengths": ["inference"], "weaknesses": [], "tip": "Keep reading." },
            "quant": { "strengths": [], "weaknesses": ["geometry"], "tip": "Drill figures." },
            "overallTip": "Practice full modules.",
            "estimatedScoreRange": { "low": 1250, "high": 1350, "explanation": "Consistent." }
        }
        ```"#;

        let report = parse_report(text).unwrap();
        assert_eq!(report.estimated_score_range.low, 1250);
        assert_eq!(report.verbal.strengths, vec!["inference"]);
    }

    #[test]
    fn malformed_response_reads_as_unavailable() {
        assert!(parse_report("the student did well").is_none());
        assert!(parse_report("{\"scoreConfidence\": 3}").is_none());
    }
}
