//! Cross-model comparison

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::aggregate::Summary;

/// One model's position in a metric ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedModel {
    pub model: String,
    pub score: f64,
}

/// Rankings of every model on every `<task>_<metric>` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelComparison {
    pub model_count: usize,
    pub rankings: BTreeMap<String, Vec<RankedModel>>,
    pub best_models: BTreeMap<String, String>,
    /// Score per model, `null` where the model has the metric but no data
    pub metrics_comparison: BTreeMap<String, IndexMap<String, Option<f64>>>,
}

/// Ranks models per metric from their persisted summaries
pub struct ComparisonReporter;

impl ComparisonReporter {
    /// Compare models. `summaries` preserves model insertion order, which
    /// breaks ties between equal scores.
    pub fn compare(summaries: &IndexMap<String, Summary>) -> ModelComparison {
        let mut metrics_comparison: BTreeMap<String, IndexMap<String, Option<f64>>> = BTreeMap::new();

        for (model, summary) in summaries {
            for (kind, task) in summary {
                for (metric, mean) in &task.metrics {
                    metrics_comparison
                        .entry(format!("{}_{}", kind, metric))
                        .or_default()
                        .insert(model.clone(), *mean);
                }
            }
        }

        let mut rankings = BTreeMap::new();
        let mut best_models = BTreeMap::new();
        for (key, by_model) in &metrics_comparison {
            let mut ranked: Vec<RankedModel> = by_model
                .iter()
                .filter_map(|(model, score)| {
                    score.map(|score| RankedModel {
                        model: model.clone(),
                        score,
                    })
                })
                .collect();
            if ranked.is_empty() {
                continue;
            }
            // stable sort keeps insertion order among ties
            ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
            best_models.insert(key.clone(), ranked[0].model.clone());
            rankings.insert(key.clone(), ranked);
        }

        ModelComparison {
            model_count: summaries.len(),
            rankings,
            best_models,
            metrics_comparison,
        }
    }
}
