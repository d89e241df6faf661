//! Results reporting

pub mod store;

pub use store::{
    atomic_write, evaluation_output_path, json_array_to_jsonl, load_evaluation_summary, model_name,
    write_json_atomic, ResultStore, StoreError, StoreResult,
};

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::analysis::{CategoryBuckets, ModelComparison, Summary, TaskBuckets};

pub const COMPREHENSIVE_RESULTS_FILE: &str = "comprehensive_results.json";
pub const MODEL_COMPARISON_FILE: &str = "model_comparison.json";
pub const EVALUATION_REPORT_FILE: &str = "evaluation_report.txt";

/// Per-model evaluation output file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutput {
    pub summary: Summary,
    /// Summary per normalized category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_summary: Option<BTreeMap<String, Summary>>,
    /// Raw value sequences per task kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_results: Option<TaskBuckets>,
    /// Raw value sequences per normalized category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_category_results: Option<CategoryBuckets>,
}

impl EvaluationOutput {
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        write_json_atomic(path.as_ref(), self)
    }
}

/// Write the summaries of every evaluated model
pub fn write_comprehensive_results(output_dir: &Path, summaries: &IndexMap<String, Summary>) -> StoreResult<()> {
    write_json_atomic(&output_dir.join(COMPREHENSIVE_RESULTS_FILE), summaries)
}

/// Write `model_comparison.json` and `evaluation_report.txt`
pub fn write_comparison_report(output_dir: &Path, comparison: &ModelComparison) -> StoreResult<()> {
    write_json_atomic(&output_dir.join(MODEL_COMPARISON_FILE), comparison)?;
    atomic_write(
        &output_dir.join(EVALUATION_REPORT_FILE),
        render_text_report(comparison).as_bytes(),
    )
}

/// Plain-text report: best model per metric, then full rankings
pub fn render_text_report(comparison: &ModelComparison) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:=<60}", "");
    let _ = writeln!(out, "MODEL EVALUATION REPORT");
    let _ = writeln!(out, "{:=<60}\n", "");
    let _ = writeln!(out, "Number of models evaluated: {}\n", comparison.model_count);

    let _ = writeln!(out, "BEST PERFORMING MODELS BY METRIC:");
    let _ = writeln!(out, "{:-<40}", "");
    for (metric, model) in &comparison.best_models {
        let _ = writeln!(out, "{}: {}", metric, model);
    }

    let _ = writeln!(out, "\nDETAILED RANKINGS:");
    let _ = writeln!(out, "{:-<40}", "");
    for (metric, rankings) in &comparison.rankings {
        let _ = writeln!(out, "\n{}:", metric);
        for (i, entry) in rankings.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}: {:.4}", i + 1, entry.model, entry.score);
        }
    }
    out
}

/// Print one model's summary to the console
pub fn print_console_summary(model: &str, summary: &Summary) {
    println!("\n=== Evaluation Results: {} ===\n", model);

    for (kind, task) in summary {
        println!("{} (n={}):", kind, task.count);
        println!("{:-<50}", "");
        for (metric, mean) in &task.metrics {
            match mean {
                Some(value) => println!("  {:<16} {:.4}", metric, value),
                None => println!("  {:<16} n/a", metric),
            }
        }
        for (metric, count) in &task.unscored {
            println!("  {:<16} {} unscored", metric, count);
        }
        println!();
    }

    println!("{:=<50}", "");
}
