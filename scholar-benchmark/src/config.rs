//! Configuration management for the scholar benchmark
//!
//! Loads settings from TOML files. A `Config` is built once in `main` and
//! passed by reference to every component.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variables overriding the evaluation paths
pub const ENV_GROUND_TRUTH_FILE: &str = "SCHOLAR_GROUND_TRUTH_FILE";
pub const ENV_RESULTS_DIR: &str = "SCHOLAR_RESULTS_DIR";
pub const ENV_OUTPUT_DIR: &str = "SCHOLAR_OUTPUT_DIR";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub scorers: ScorerConfig,
}

/// Answer generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Prompt plus output limit of the backend, in tokens
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: u32,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Generations tried per task before an invalid answer is accepted
    #[serde(default = "default_answer_attempts")]
    pub answer_attempts: u32,
    /// Leading characters removed per truncation step
    #[serde(default = "default_truncation_chunk_chars")]
    pub truncation_chunk_chars: usize,
    /// Largest share of the item content that may be truncated away
    #[serde(default = "default_max_truncation_fraction")]
    pub max_truncation_fraction: f64,
}

/// Evaluation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Pairs sent to a batchable scorer per call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Include per-category and raw per-item results in evaluation outputs
    #[serde(default)]
    pub detailed: bool,
}

/// Input and output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_ground_truth_file")]
    pub ground_truth_file: PathBuf,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Root of the per-item generation artifacts
    #[serde(default = "default_generation_dir")]
    pub generation_dir: PathBuf,
}

/// Generation backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Backend kind: "openai" or "vllm"
    #[serde(default = "default_provider_name")]
    pub name: String,
    /// Base URL of an OpenAI-compatible server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model")]
    pub model: String,
}

/// External similarity scorer endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Embedding similarity service (bert_score_f1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<String>,
    /// Learned quality service (bleurt_score)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learned: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

// Default value functions
fn default_temperature() -> f32 { 0.0 }
fn default_max_output_tokens() -> u32 { 512 }
fn default_max_context_tokens() -> u32 { 8192 }
fn default_retry_count() -> u32 { 3 }
fn default_retry_delay_ms() -> u64 { 1000 }
fn default_max_retry_delay_ms() -> u64 { 60_000 }
fn default_timeout_ms() -> u64 { 120_000 }
fn default_answer_attempts() -> u32 { 5 }
fn default_truncation_chunk_chars() -> usize { 100 }
fn default_max_truncation_fraction() -> f64 { 0.9 }
fn default_batch_size() -> usize { 16 }
fn default_ground_truth_file() -> PathBuf { PathBuf::from("data/ground_truth.jsonl") }
fn default_results_dir() -> PathBuf { PathBuf::from("results/predictions") }
fn default_output_dir() -> PathBuf { PathBuf::from("results/evaluation") }
fn default_generation_dir() -> PathBuf { PathBuf::from("results/generation") }
fn default_provider_name() -> String { "vllm".to_string() }
fn default_api_key_env() -> String { "OPENAI_API_KEY".to_string() }
fn default_model() -> String { "Qwen/Qwen2.5-7B-Instruct".to_string() }

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            max_context_tokens: default_max_context_tokens(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            timeout_ms: default_timeout_ms(),
            answer_attempts: default_answer_attempts(),
            truncation_chunk_chars: default_truncation_chunk_chars(),
            max_truncation_fraction: default_max_truncation_fraction(),
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            detailed: false,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            ground_truth_file: default_ground_truth_file(),
            results_dir: default_results_dir(),
            output_dir: default_output_dir(),
            generation_dir: default_generation_dir(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: Some("http://localhost:8000/v1".to_string()),
            api_key_env: default_api_key_env(),
            model: default_model(),
        }
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            embedding: None,
            learned: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from default config location or return defaults
    pub fn load_or_default() -> Self {
        let config_paths = [
            "config/benchmark.toml",
            "../config/benchmark.toml",
            "scholar-benchmark/config/benchmark.toml",
        ];

        for path in &config_paths {
            if let Ok(config) = Self::from_file(path) {
                tracing::info!("Loaded configuration from {}", path);
                return config;
            }
        }

        tracing::info!("Using default configuration");
        Self::default()
    }

    /// Apply `SCHOLAR_*` path overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply path overrides from an arbitrary variable lookup
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);
        if let Some(path) = non_empty(ENV_GROUND_TRUTH_FILE) {
            self.paths.ground_truth_file = path;
        }
        if let Some(path) = non_empty(ENV_RESULTS_DIR) {
            self.paths.results_dir = path;
        }
        if let Some(path) = non_empty(ENV_OUTPUT_DIR) {
            self.paths.output_dir = path;
        }
        self
    }

    /// Save configuration to a TOML file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, content)
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Check value ranges; paths are checked by the commands that need them
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.evaluation.batch_size == 0 {
            return Err(ConfigError::Invalid("evaluation.batch_size must be at least 1".to_string()));
        }
        let fraction = self.generation.max_truncation_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "generation.max_truncation_fraction must be in (0, 1], got {}",
                fraction
            )));
        }
        if self.generation.answer_attempts == 0 {
            return Err(ConfigError::Invalid("generation.answer_attempts must be at least 1".to_string()));
        }
        if self.generation.truncation_chunk_chars == 0 {
            return Err(ConfigError::Invalid(
                "generation.truncation_chunk_chars must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.evaluation.batch_size, 16);
        assert_eq!(config.generation.answer_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml_config() {
        let toml = r#"
[evaluation]
batch_size = 4

[provider]
name = "openai"
model = "gpt-4o-mini"

[scorers]
embedding = "http://localhost:9000/bertscore"
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.evaluation.batch_size, 4);
        assert_eq!(config.provider.model, "gpt-4o-mini");
        assert_eq!(config.provider.api_key_env, "OPENAI_API_KEY");
        assert!(config.scorers.learned.is_none());
        assert_eq!(config.generation.retry_count, 3);
    }

    #[test]
    fn test_env_overrides_replace_paths() {
        let config = Config::default().with_overrides_from(|key| match key {
            ENV_RESULTS_DIR => Some("/tmp/preds".to_string()),
            ENV_OUTPUT_DIR => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.paths.results_dir, PathBuf::from("/tmp/preds"));
        assert_eq!(config.paths.output_dir, default_output_dir());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.evaluation.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.generation.max_truncation_fraction = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("benchmark.toml");
        Config::default().save_toml(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.provider.model, default_model());
        assert_eq!(loaded.paths.generation_dir, default_generation_dir());
    }
}
