//! Text-similarity scorers

pub mod http;
pub mod lexical;
pub mod traits;

pub use http::{HttpScorer, UnavailableScorer};
pub use lexical::Tokenizer;
pub use traits::{ScorerError, ScorerResult, SimilarityScorer};

use crate::config::ScorerConfig;
use std::sync::Arc;

/// Build the scorer for one external metric, falling back to an unavailable
/// scorer when no endpoint is configured
pub fn create_scorer(name: &str, endpoint: Option<&str>, config: &ScorerConfig) -> Arc<dyn SimilarityScorer> {
    match endpoint {
        Some(url) if !url.trim().is_empty() => {
            Arc::new(HttpScorer::new(name, url).with_timeout(config.timeout_ms))
        }
        _ => {
            tracing::warn!("No endpoint configured for {}; it will be reported as unscored", name);
            Arc::new(UnavailableScorer::new(name))
        }
    }
}
