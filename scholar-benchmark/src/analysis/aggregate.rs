//! Aggregation of per-item scores by task kind and by category

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::metrics::{MetricBundle, MetricOutcome, ScoreEntry};
use crate::tasks::{normalize_category, TaskKind};

/// Collected values for one task kind. Unscored outcomes are counted
/// separately and never enter the value sequences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateBucket {
    pub values: IndexMap<String, Vec<f64>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub unscored: IndexMap<String, usize>,
}

impl AggregateBucket {
    /// Add one item's bundle
    pub fn record(&mut self, metrics: &MetricBundle) {
        for (name, outcome) in metrics {
            let values = self.values.entry(name.clone()).or_default();
            match outcome {
                MetricOutcome::Scored(v) => values.push(*v),
                MetricOutcome::Unscored(_) => *self.unscored.entry(name.clone()).or_insert(0) += 1,
            }
        }
    }

    /// Append all values of another bucket
    pub fn extend(&mut self, other: &AggregateBucket) {
        for (name, values) in &other.values {
            self.values.entry(name.clone()).or_default().extend_from_slice(values);
        }
        for (name, count) in &other.unscored {
            *self.unscored.entry(name.clone()).or_insert(0) += count;
        }
    }

    /// Items recorded, derived from the first metric's sequence
    pub fn count(&self) -> usize {
        self.values
            .keys()
            .next()
            .map(|name| self.metric_count(name))
            .unwrap_or(0)
    }

    fn metric_count(&self, name: &str) -> usize {
        self.values.get(name).map_or(0, Vec::len) + self.unscored.get(name).copied().unwrap_or(0)
    }

    /// Mean of the scored values, `None` when there are none
    pub fn mean(&self, name: &str) -> Option<f64> {
        let values = self.values.get(name)?;
        if values.is_empty() {
            return None;
        }
        // summing in sorted order keeps the mean independent of arrival order
        let mut sorted = values.clone();
        sorted.sort_by(f64::total_cmp);
        Some(sorted.iter().sum::<f64>() / sorted.len() as f64)
    }
}

/// One bucket per task kind
pub type TaskBuckets = BTreeMap<TaskKind, AggregateBucket>;

/// Task buckets keyed by category label
pub type CategoryBuckets = BTreeMap<String, TaskBuckets>;

/// Accumulates score entries overall and per raw category
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    pub overall: TaskBuckets,
    pub by_category: CategoryBuckets,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: &ScoreEntry) {
        if entry.metrics.is_empty() {
            return;
        }
        self.overall.entry(entry.kind).or_default().record(&entry.metrics);
        self.by_category
            .entry(entry.category.clone())
            .or_default()
            .entry(entry.kind)
            .or_default()
            .record(&entry.metrics);
    }

    pub fn add_all<'a>(&mut self, entries: impl IntoIterator<Item = &'a ScoreEntry>) {
        for entry in entries {
            self.add(entry);
        }
    }
}

/// Re-key category buckets by normalized label, concatenating the value
/// sequences of labels that normalize to the same key
pub fn merge_category_buckets(buckets: &CategoryBuckets) -> CategoryBuckets {
    let mut merged = CategoryBuckets::new();
    for (category, tasks) in buckets {
        let target = merged.entry(normalize_category(category)).or_default();
        for (kind, bucket) in tasks {
            target.entry(*kind).or_default().extend(bucket);
        }
    }
    merged
}

/// Mean and count projection of one task bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    /// Metric means, `null` when no value was scored
    #[serde(flatten)]
    pub metrics: IndexMap<String, Option<f64>>,
    pub count: usize,
    /// Per-metric number of items whose score could not be computed
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub unscored: IndexMap<String, usize>,
}

impl TaskSummary {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied().flatten()
    }
}

/// Summary per task kind
pub type Summary = BTreeMap<TaskKind, TaskSummary>;

/// Summarize task buckets. Every metric of the task kind is listed, in the
/// kind's report order, even when it has no data.
pub fn summarize(buckets: &TaskBuckets) -> Summary {
    buckets
        .iter()
        .map(|(kind, bucket)| {
            let mut metrics: IndexMap<String, Option<f64>> = kind
                .metric_names()
                .iter()
                .map(|name| (name.to_string(), bucket.mean(name)))
                .collect();
            for name in bucket.values.keys() {
                if !metrics.contains_key(name) {
                    metrics.insert(name.clone(), bucket.mean(name));
                }
            }
            let summary = TaskSummary {
                metrics,
                count: bucket.count(),
                unscored: bucket.unscored.clone(),
            };
            (*kind, summary)
        })
        .collect()
}

/// Summarize every category
pub fn summarize_categories(buckets: &CategoryBuckets) -> BTreeMap<String, Summary> {
    buckets
        .iter()
        .map(|(category, tasks)| (category.clone(), summarize(tasks)))
        .collect()
}
