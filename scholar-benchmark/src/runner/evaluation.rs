//! Single-model and resumable batch evaluation

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::analysis::{merge_category_buckets, summarize, summarize_categories, Aggregator, ScoreEngine, Summary};
use crate::reporting::{
    evaluation_output_path, load_evaluation_summary, model_name, write_comprehensive_results,
    EvaluationOutput, StoreError,
};
use crate::tasks::{
    common_identifiers, extract_pairs, load_ground_truth, load_predictions, GroundTruthRecord,
    IdentifierIndex, LoadError, TaskKind,
};

/// Error type for evaluation runs
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a batch run did with each prediction file
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Summary of every model with an output file, in file-name order
    pub summaries: IndexMap<String, Summary>,
    pub evaluated: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Runs the match, score and aggregate pipeline over prediction files
pub struct EvaluationRunner {
    engine: ScoreEngine,
    detailed: bool,
}

impl EvaluationRunner {
    pub fn new(engine: ScoreEngine, detailed: bool) -> Self {
        Self { engine, detailed }
    }

    /// Evaluate one prediction file against loaded ground truth
    pub async fn evaluate_model(
        &self,
        ground_truth: &IdentifierIndex<GroundTruthRecord>,
        predictions_file: &Path,
    ) -> Result<EvaluationOutput, EvaluationError> {
        let predictions = load_predictions(predictions_file)?;
        let common_ids = common_identifiers(ground_truth, &predictions);
        tracing::info!(
            "{}: {} ground truth, {} predictions, {} common",
            predictions_file.display(),
            ground_truth.len(),
            predictions.len(),
            common_ids.len()
        );

        let pairs = extract_pairs(ground_truth, &predictions, &common_ids, &TaskKind::all());
        let entries = self.engine.score_pairs(&pairs).await;

        let mut aggregator = Aggregator::new();
        aggregator.add_all(&entries);

        let summary = summarize(&aggregator.overall);
        if !self.detailed {
            return Ok(EvaluationOutput {
                summary,
                category_summary: None,
                evaluation_results: None,
                merged_category_results: None,
            });
        }

        let merged = merge_category_buckets(&aggregator.by_category);
        Ok(EvaluationOutput {
            summary,
            category_summary: Some(summarize_categories(&merged)),
            evaluation_results: Some(aggregator.overall),
            merged_category_results: Some(merged),
        })
    }

    /// Evaluate one model and write `evaluation_<stem>.json`, replacing any
    /// previous output
    pub async fn evaluate_single(
        &self,
        ground_truth_file: &Path,
        predictions_file: &Path,
        output_dir: &Path,
    ) -> Result<(PathBuf, EvaluationOutput), EvaluationError> {
        let ground_truth = load_ground_truth(ground_truth_file)?;
        let output = self.evaluate_model(&ground_truth, predictions_file).await?;
        let path = evaluation_output_path(output_dir, predictions_file);
        output.write_to_file(&path)?;
        tracing::info!("Saved {}", path.display());
        Ok((path, output))
    }

    /// Evaluate every `*.jsonl` file in `results_dir`, skipping models whose
    /// output already exists, then rewrite the comprehensive results file
    pub async fn evaluate_batch(
        &self,
        ground_truth_file: &Path,
        results_dir: &Path,
        output_dir: &Path,
    ) -> Result<BatchOutcome, EvaluationError> {
        let ground_truth = load_ground_truth(ground_truth_file)?;
        let files = prediction_files(results_dir)?;
        fs::create_dir_all(output_dir).map_err(|source| StoreError::Io {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let mut outcome = BatchOutcome::default();
        for file in files {
            let model = model_name(&file);
            let output_path = evaluation_output_path(output_dir, &file);

            if output_path.exists() {
                tracing::info!("{} already evaluated, skipping", model);
                match load_evaluation_summary(&output_path) {
                    Ok(summary) => {
                        outcome.summaries.insert(model.clone(), summary);
                    }
                    Err(e) => tracing::warn!("Could not reload summary for {}: {}", model, e),
                }
                outcome.skipped.push(model);
                continue;
            }

            let evaluated = self.evaluate_model(&ground_truth, &file).await.and_then(|output| {
                output.write_to_file(&output_path)?;
                Ok(output)
            });
            match evaluated {
                Ok(output) => {
                    outcome.summaries.insert(model.clone(), output.summary);
                    outcome.evaluated.push(model);
                }
                Err(e) => {
                    tracing::error!("Error evaluating {}: {}", file.display(), e);
                    outcome.failed.push((model, e.to_string()));
                }
            }
        }

        write_comprehensive_results(output_dir, &outcome.summaries)?;
        tracing::info!(
            "Batch complete: {} evaluated, {} skipped, {} failed",
            outcome.evaluated.len(),
            outcome.skipped.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }
}

/// `*.jsonl` files of a directory sorted by file name
pub fn prediction_files(results_dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    if !results_dir.is_dir() {
        return Err(StoreError::NotFound(results_dir.to_path_buf()));
    }
    let io_err = |source| StoreError::Io {
        path: results_dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(results_dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorers::UnavailableScorer;
    use std::sync::Arc;

    fn runner(detailed: bool) -> EvaluationRunner {
        let scorer = Arc::new(UnavailableScorer::new("none"));
        EvaluationRunner::new(ScoreEngine::new(scorer.clone(), scorer, 4).unwrap(), detailed)
    }

    fn write(path: &Path, content: &str) {
        fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_one_sided_identifier_not_counted() {
        let dir = tempfile::tempdir().unwrap();
        let gt = dir.path().join("gt.jsonl");
        write(
            &gt,
            "{\"id\": 1, \"category\": \"Physics\", \"true_false\": {\"answer\": \"참\"}}\n\
             {\"id\": 2, \"category\": \"Physics\", \"true_false\": {\"answer\": \"거짓\"}}\n",
        );
        let preds = dir.path().join("m.jsonl");
        write(&preds, "{\"id\": 1, \"results\": {\"true_false\": {\"model_answer\": \"1\"}}}\n");

        let ground_truth = load_ground_truth(&gt).unwrap();
        let output = runner(true).evaluate_model(&ground_truth, &preds).await.unwrap();
        let tf = &output.summary[&TaskKind::TrueFalse];
        assert_eq!(tf.count, 1);
        assert_eq!(tf.metric("accuracy"), Some(1.0));

        let categories = output.category_summary.unwrap();
        assert_eq!(categories["physics"][&TaskKind::TrueFalse].count, 1);
    }

    #[tokio::test]
    async fn test_summary_only_when_not_detailed() {
        let dir = tempfile::tempdir().unwrap();
        let gt = dir.path().join("gt.jsonl");
        write(&gt, "{\"id\": 1, \"multiple_choice\": {\"answer\": \"a\"}}\n");
        let preds = dir.path().join("m.jsonl");
        write(&preds, "{\"id\": 1, \"results\": {\"multiple_choice\": {\"model_answer\": \"b\"}}}\n");

        let ground_truth = load_ground_truth(&gt).unwrap();
        let output = runner(false).evaluate_model(&ground_truth, &preds).await.unwrap();
        assert!(output.category_summary.is_none());
        assert_eq!(output.summary[&TaskKind::MultipleChoice].metric("accuracy"), Some(0.0));
    }

    #[tokio::test]
    async fn test_missing_ground_truth_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = runner(false)
            .evaluate_batch(&dir.path().join("nope.jsonl"), dir.path(), &dir.path().join("out"))
            .await;
        assert!(matches!(result, Err(EvaluationError::Load(LoadError::NotFound(_)))));
    }

    #[tokio::test]
    async fn test_unwritable_output_does_not_stop_batch() {
        let dir = tempfile::tempdir().unwrap();
        let gt = dir.path().join("gt.jsonl");
        write(&gt, "{\"id\": 1, \"multiple_choice\": {\"answer\": \"a\"}}\n");
        let results = dir.path().join("results");
        fs::create_dir_all(&results).unwrap();
        let line = "{\"id\": 1, \"results\": {\"multiple_choice\": {\"model_answer\": \"a\"}}}\n";
        // the evaluation file name for this stem exceeds the file-name limit
        let long_stem = "m".repeat(244);
        write(&results.join(format!("{}.jsonl", long_stem)), line);
        write(&results.join("short.jsonl"), line);

        let out = dir.path().join("out");
        let outcome = runner(false).evaluate_batch(&gt, &results, &out).await.unwrap();
        assert_eq!(outcome.evaluated, vec!["short"]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, long_stem);
        assert!(!outcome.summaries.contains_key(&long_stem));
        assert!(out.join(crate::reporting::COMPREHENSIVE_RESULTS_FILE).exists());
    }

    #[test]
    fn test_prediction_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.jsonl", "a.jsonl", "notes.txt", "c.json"] {
            write(&dir.path().join(name), "");
        }
        let names: Vec<String> = prediction_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jsonl", "b.jsonl"]);
    }
}
