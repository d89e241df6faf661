//! Generation backend implementations

pub mod openai;
pub mod traits;

pub use openai::OpenAIClient;
pub use traits::{
    CompletionRequest, CompletionResponse, LLMProvider, Message, ProviderError, ProviderResult,
};

use crate::config::Config;
use std::sync::Arc;

/// Create the generation backend described by `[provider]` in the config.
/// `model` overrides the configured model when given.
pub fn create_provider(config: &Config, model: Option<&str>) -> ProviderResult<Arc<dyn LLMProvider>> {
    let pc = &config.provider;
    match pc.name.to_lowercase().as_str() {
        "openai" | "vllm" | "openai-compatible" => {
            let client = OpenAIClient::from_env(&pc.api_key_env, pc.base_url.as_deref())?
                .with_name(&pc.name)
                .with_model(model.unwrap_or(&pc.model));
            Ok(Arc::new(client))
        }
        other => Err(ProviderError::Config(format!("Unknown provider: {}", other))),
    }
}
