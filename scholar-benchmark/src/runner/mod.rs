//! Generation and evaluation orchestration

pub mod evaluation;
pub mod generation;
pub mod progress;

pub use evaluation::{prediction_files, BatchOutcome, EvaluationError, EvaluationRunner};
pub use generation::{GenerationRunner, GenerationStats, GENERATION_FAILED, PROMPT_TOO_LONG};
pub use progress::{ConsoleProgress, NoOpProgress, ProgressCallback};
