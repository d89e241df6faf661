//! Scoring, aggregation and comparison

pub mod aggregate;
pub mod comparator;
pub mod metrics;
pub mod scoring;

pub use aggregate::{
    merge_category_buckets, summarize, summarize_categories, AggregateBucket, Aggregator,
    CategoryBuckets, Summary, TaskBuckets, TaskSummary,
};
pub use comparator::{ComparisonReporter, ModelComparison, RankedModel};
pub use metrics::{MetricBundle, MetricOutcome, ScoreEntry};
pub use scoring::{accuracy, multi_select_scores, ScoreEngine};
