//! Per-item metric values

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::tasks::TaskKind;

/// Result of computing one metric for one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricOutcome {
    /// A real score, including a genuine zero
    Scored(f64),
    /// The scorer could not produce a value; carries the reason
    Unscored(String),
}

impl MetricOutcome {
    pub fn value(&self) -> Option<f64> {
        match self {
            MetricOutcome::Scored(v) => Some(*v),
            MetricOutcome::Unscored(_) => None,
        }
    }

    pub fn is_scored(&self) -> bool {
        matches!(self, MetricOutcome::Scored(_))
    }
}

/// Metric name to outcome, in the task kind's report order
pub type MetricBundle = IndexMap<String, MetricOutcome>;

/// Scores for one identifier and task kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub kind: TaskKind,
    pub id: u64,
    pub category: String,
    pub metrics: MetricBundle,
}

impl ScoreEntry {
    pub fn new(kind: TaskKind, id: u64, category: impl Into<String>, metrics: MetricBundle) -> Self {
        Self {
            kind,
            id,
            category: category.into(),
            metrics,
        }
    }

    pub fn get(&self, metric: &str) -> Option<&MetricOutcome> {
        self.metrics.get(metric)
    }
}

/// Build a bundle of plain scores
pub fn scored_bundle<'a>(values: impl IntoIterator<Item = (&'a str, f64)>) -> MetricBundle {
    values
        .into_iter()
        .map(|(name, value)| (name.to_string(), MetricOutcome::Scored(value)))
        .collect()
}
