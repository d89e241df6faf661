//! Resumable answer generation
//!
//! Items are processed one at a time in identifier order. Each task result
//! is written to the item's artifact before the next task starts, and tasks
//! already present in an artifact are never regenerated.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;

use super::progress::{NoOpProgress, ProgressCallback};
use crate::config::GenerationConfig;
use crate::providers::{CompletionRequest, LLMProvider, ProviderError, ProviderResult};
use crate::reporting::{ResultStore, StoreResult};
use crate::tasks::{
    extract_answer, is_valid_answer, ExperimentVariant, GroundTruthRecord, IdentifierIndex,
    PredictedAnswer, PromptBuilder, PromptParts, TaskKind,
};

/// Recorded when the backend keeps failing after all retries
pub const GENERATION_FAILED: &str = "ERROR: generation failed";

/// Recorded when the prompt does not fit even after maximum truncation
pub const PROMPT_TOO_LONG: &str = "ERROR: prompt too long";

/// Outcome of one generation call after truncation and retries
#[derive(Debug, Clone, PartialEq)]
enum Completion {
    Text(String),
    TooLong,
    Failed(String),
}

/// Counters for one generation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationStats {
    pub items: usize,
    pub generated: usize,
    pub resumed: usize,
    pub failed: usize,
}

/// Drives generation for one model and experiment variant
pub struct GenerationRunner {
    provider: Arc<dyn LLMProvider>,
    store: ResultStore,
    settings: GenerationConfig,
    variant: ExperimentVariant,
    model: String,
    progress: Arc<dyn ProgressCallback>,
}

impl GenerationRunner {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        store: ResultStore,
        settings: GenerationConfig,
        variant: ExperimentVariant,
    ) -> Self {
        let model = provider.default_model().to_string();
        Self {
            provider,
            store,
            settings,
            variant,
            model,
            progress: Arc::new(NoOpProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate every missing task result for the first `limit` items
    pub async fn run(
        &self,
        dataset: &IdentifierIndex<GroundTruthRecord>,
        kinds: &[TaskKind],
        limit: Option<usize>,
    ) -> StoreResult<GenerationStats> {
        let builder = PromptBuilder::from_dataset(dataset, self.variant);
        let total = limit.map_or(dataset.len(), |l| l.min(dataset.len()));
        let mut stats = GenerationStats::default();

        tracing::info!(
            "Generating {} items with {} ({} variant)",
            total,
            self.model,
            self.variant
        );

        for (&id, record) in dataset.iter().take(total) {
            self.progress.on_item_start(id);
            let mut artifact = self.store.load_or_new(self.variant, &self.model, id);
            if artifact.category.is_none() {
                artifact.category = Some(record.category.clone());
            }

            let mut generated = 0;
            for &kind in kinds {
                if artifact.results.contains_key(&kind) {
                    stats.resumed += 1;
                    continue;
                }
                let Some(parts) = builder.build(record, kind) else {
                    continue;
                };

                let answer = self.generate_answer(&parts, id).await;
                if is_sentinel(&answer) {
                    stats.failed += 1;
                }
                artifact.results.insert(kind, answer);
                self.store.save(self.variant, &self.model, &artifact)?;
                generated += 1;
            }

            stats.items += 1;
            stats.generated += generated;
            self.progress.on_item_complete(id, generated);
            self.progress.on_progress(stats.items, total);
        }

        Ok(stats)
    }

    /// Generate until the extracted answer is valid or attempts run out;
    /// the last answer is kept either way
    async fn generate_answer(&self, parts: &PromptParts, id: u64) -> PredictedAnswer {
        let attempts = self.settings.answer_attempts.max(1);
        let mut last = PredictedAnswer {
            model_original_answer: Some(String::new()),
            model_answer: Value::String(String::new()),
        };

        for attempt in 1..=attempts {
            let raw = match self.complete_with_truncation(parts, id).await {
                Completion::Text(raw) => raw,
                Completion::TooLong => return sentinel(PROMPT_TOO_LONG),
                Completion::Failed(_) => return sentinel(GENERATION_FAILED),
            };

            let answer = extract_answer(&raw, parts.kind);
            let valid = is_valid_answer(&answer);
            last = PredictedAnswer {
                model_original_answer: Some(raw),
                model_answer: answer,
            };
            if valid {
                break;
            }
            tracing::warn!(
                "Invalid {} answer for item {} (attempt {}/{})",
                parts.kind,
                id,
                attempt,
                attempts
            );
        }

        last
    }

    /// Call the backend while shrinking an oversized prompt: oldest
    /// exemplars go first, then leading item content in chunks, up to
    /// `max_truncation_fraction` of the content
    async fn complete_with_truncation(&self, parts: &PromptParts, id: u64) -> Completion {
        let content_len = parts.content_len();
        let max_skip = (content_len as f64 * self.settings.max_truncation_fraction).floor() as usize;
        let chunk = self.settings.truncation_chunk_chars.max(1);
        let mut dropped = 0;
        let mut skip = 0;

        loop {
            let request = CompletionRequest::new(parts.to_messages(dropped, skip), self.settings.max_output_tokens)
                .with_model(&self.model)
                .with_temperature(self.settings.temperature)
                .with_max_context(self.settings.max_context_tokens);

            match self.complete_with_retry(&request, id).await {
                Ok(text) => return Completion::Text(text),
                Err(ProviderError::PromptTooLong { message }) => {
                    if dropped < parts.exemplars.len() {
                        dropped += 1;
                        tracing::debug!("Prompt for item {} too long, dropping exemplar {}", id, dropped);
                        continue;
                    }
                    if skip >= max_skip {
                        tracing::warn!(
                            "Prompt for item {} still too long after dropping {} of {} characters: {}",
                            id,
                            skip,
                            content_len,
                            message
                        );
                        return Completion::TooLong;
                    }
                    skip = (skip + chunk).min(max_skip);
                    tracing::debug!("Prompt for item {} too long, dropping {} leading characters", id, skip);
                }
                Err(e) => return Completion::Failed(e.to_string()),
            }
        }
    }

    /// One request with exponential backoff on transient failures
    async fn complete_with_retry(&self, request: &CompletionRequest, id: u64) -> ProviderResult<String> {
        let mut last_error = None;
        let mut delay = self.settings.retry_delay_ms;

        for attempt in 0..=self.settings.retry_count {
            if attempt > 0 {
                tracing::info!("Retry {} for item {} on {}", attempt, id, self.provider.name());
                sleep(Duration::from_millis(delay)).await;
                delay = next_backoff(delay, self.settings.max_retry_delay_ms);
            }

            let timeout = Duration::from_millis(self.settings.timeout_ms);
            let result = match tokio::time::timeout(timeout, self.provider.complete(request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout {
                    timeout_ms: self.settings.timeout_ms,
                }),
            };

            match result {
                Ok(response) => return Ok(response.content),
                Err(e @ ProviderError::PromptTooLong { .. }) => return Err(e),
                Err(e) if e.is_permanent() => {
                    tracing::error!("Error on {} for item {}: {}", self.provider.name(), id, e);
                    return Err(e);
                }
                Err(ProviderError::RateLimited { retry_after_ms }) => {
                    tracing::warn!("Rate limited on {}, waiting {}ms", self.provider.name(), retry_after_ms);
                    sleep(Duration::from_millis(retry_after_ms)).await;
                    last_error = Some(ProviderError::RateLimited { retry_after_ms });
                }
                Err(e) => {
                    tracing::error!("Error on {} for item {}: {}", self.provider.name(), id, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::Config("no attempts made".to_string())))
    }
}

/// Double the retry delay, capped at `max_ms`
fn next_backoff(delay_ms: u64, max_ms: u64) -> u64 {
    delay_ms.saturating_mul(2).min(max_ms)
}

fn sentinel(text: &str) -> PredictedAnswer {
    PredictedAnswer {
        model_original_answer: Some(text.to_string()),
        model_answer: Value::String(text.to_string()),
    }
}

fn is_sentinel(answer: &PredictedAnswer) -> bool {
    matches!(answer.model_answer.as_str(), Some(GENERATION_FAILED) | Some(PROMPT_TOO_LONG))
}
