//! Scholar Benchmark
//!
//! Answer generation, scoring and resumable aggregation for scholarly QA
//! and summarization benchmarks.
//!
//! # Features
//!
//! - Five task kinds: multiple choice, multiple select, true/false, short
//!   answer and summarization
//! - Resumable answer generation against any OpenAI-compatible backend
//! - Lexical scorers plus pluggable embedding and learned-quality scorers
//! - Overall and per-category aggregation with cross-model rankings
//! - Atomic JSON outputs and a plain-text comparison report
//!
//! # Example
//!
//! ```no_run
//! use scholar_benchmark::{
//!     analysis::{ComparisonReporter, ScoreEngine},
//!     config::Config,
//!     runner::EvaluationRunner,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_or_default().with_env_overrides();
//!     let engine = ScoreEngine::from_config(&config)?;
//!     let runner = EvaluationRunner::new(engine, config.evaluation.detailed);
//!
//!     let outcome = runner
//!         .evaluate_batch(
//!             &config.paths.ground_truth_file,
//!             &config.paths.results_dir,
//!             &config.paths.output_dir,
//!         )
//!         .await?;
//!
//!     let comparison = ComparisonReporter::compare(&outcome.summaries);
//!     println!("{} models ranked", comparison.model_count);
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod providers;
pub mod reporting;
pub mod runner;
pub mod scorers;
pub mod tasks;

pub use config::Config;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::analysis::{
        Aggregator, ComparisonReporter, MetricOutcome, ModelComparison, ScoreEngine, ScoreEntry,
        Summary,
    };
    pub use crate::config::Config;
    pub use crate::providers::{
        create_provider, CompletionRequest, CompletionResponse, LLMProvider, Message,
        ProviderError, ProviderResult,
    };
    pub use crate::reporting::{print_console_summary, EvaluationOutput, ResultStore};
    pub use crate::runner::{EvaluationRunner, GenerationRunner};
    pub use crate::scorers::{SimilarityScorer, Tokenizer};
    pub use crate::tasks::{
        GroundTruthRecord, MatchedPair, PredictionRecord, TaskKind,
    };
}
