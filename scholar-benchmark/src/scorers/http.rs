//! Similarity scorers served over HTTP

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::traits::{ScorerError, ScorerResult, SimilarityScorer};

/// Client for a scoring service that accepts
/// `{"references": [...], "candidates": [...]}` and answers `{"scores": [...]}`
pub struct HttpScorer {
    name: String,
    endpoint: String,
    http_client: Client,
    timeout_ms: u64,
}

impl HttpScorer {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            http_client: Client::new(),
            timeout_ms: 120_000,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    references: &'a [String],
    candidates: &'a [String],
}

#[derive(Deserialize)]
struct ScoreResponse {
    scores: Vec<f64>,
}

#[async_trait]
impl SimilarityScorer for HttpScorer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn score_batch(&self, references: &[String], candidates: &[String]) -> ScorerResult<Vec<f64>> {
        let request = self
            .http_client
            .post(&self.endpoint)
            .json(&ScoreRequest {
                references,
                candidates,
            })
            .send();

        let response = tokio::time::timeout(Duration::from_millis(self.timeout_ms), request)
            .await
            .map_err(|_| ScorerError::Timeout {
                timeout_ms: self.timeout_ms,
            })??;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ScorerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ScoreResponse = response.json().await?;
        if body.scores.len() != references.len() {
            return Err(ScorerError::LengthMismatch {
                expected: references.len(),
                got: body.scores.len(),
            });
        }
        Ok(body.scores)
    }
}

/// Stand-in used when no endpoint is configured; every call fails so the
/// metric is reported as unscored
pub struct UnavailableScorer {
    name: String,
}

impl UnavailableScorer {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl SimilarityScorer for UnavailableScorer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn score_batch(&self, _references: &[String], _candidates: &[String]) -> ScorerResult<Vec<f64>> {
        Err(ScorerError::Unavailable(format!("no endpoint configured for {}", self.name)))
    }
}
