//! Text-similarity scorer trait definitions

use async_trait::async_trait;

/// Error types for scorer operations
#[derive(Debug, thiserror::Error)]
pub enum ScorerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Scorer API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Scorer returned {got} scores for {expected} pairs")]
    LengthMismatch { expected: usize, got: usize },

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Scorer unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid token pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type ScorerResult<T> = Result<T, ScorerError>;

/// A batchable (reference, candidate) similarity metric backed by an
/// external model
#[async_trait]
pub trait SimilarityScorer: Send + Sync {
    /// Metric name reported in summaries (e.g., "bert_score_f1")
    fn name(&self) -> &str;

    /// Score parallel reference/candidate lists, one score per pair
    async fn score_batch(&self, references: &[String], candidates: &[String]) -> ScorerResult<Vec<f64>>;
}
