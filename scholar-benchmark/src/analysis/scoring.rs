//! Per-task scoring
//!
//! `ScoreEngine` turns matched pairs into metric bundles. Lexical metrics are
//! computed in-process one pair at a time; embedding and learned-quality
//! metrics go to external scorers in batches of `batch_size`.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use super::metrics::{scored_bundle, MetricBundle, MetricOutcome, ScoreEntry};
use crate::config::Config;
use crate::scorers::{create_scorer, ScorerError, ScorerResult, SimilarityScorer, Tokenizer};
use crate::tasks::{parse_label_list, value_to_text, MatchedPair, PairPayload, TaskKind};

/// Largest `n` for the multiple-select a@n and exact_match_n metrics
pub const MAX_SELECT_RANK: usize = 4;

/// Scores matched pairs for every task kind
pub struct ScoreEngine {
    tokenizer: Tokenizer,
    embedding: Arc<dyn SimilarityScorer>,
    learned: Arc<dyn SimilarityScorer>,
    batch_size: usize,
}

impl ScoreEngine {
    pub fn new(
        embedding: Arc<dyn SimilarityScorer>,
        learned: Arc<dyn SimilarityScorer>,
        batch_size: usize,
    ) -> ScorerResult<Self> {
        Ok(Self {
            tokenizer: Tokenizer::new()?,
            embedding,
            learned,
            batch_size: batch_size.max(1),
        })
    }

    /// Build an engine with the scorers configured under `[scorers]`
    pub fn from_config(config: &Config) -> ScorerResult<Self> {
        let scorers = &config.scorers;
        Self::new(
            create_scorer("bert_score_f1", scorers.embedding.as_deref(), scorers),
            create_scorer("bleurt_score", scorers.learned.as_deref(), scorers),
            config.evaluation.batch_size,
        )
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Score every pair, returning entries in input order
    pub async fn score_pairs(&self, pairs: &[MatchedPair]) -> Vec<ScoreEntry> {
        let mut bundles: Vec<Option<MetricBundle>> = vec![None; pairs.len()];

        for kind in TaskKind::all() {
            let indices: Vec<usize> = (0..pairs.len()).filter(|&i| pairs[i].kind == kind).collect();
            if indices.is_empty() {
                continue;
            }
            tracing::debug!("Scoring {} {} pairs", indices.len(), kind);

            match kind {
                TaskKind::MultipleChoice | TaskKind::TrueFalse => {
                    for &i in &indices {
                        let (reference, hypothesis) = scalar_texts(&pairs[i].payload);
                        bundles[i] = Some(scored_bundle([("accuracy", accuracy(&reference, &hypothesis))]));
                    }
                }
                TaskKind::MultipleSelect => {
                    for &i in &indices {
                        let bundle = match &pairs[i].payload {
                            PairPayload::MultiLabel { gold, predicted } => {
                                multi_select_scores(gold, predicted, pairs[i].id)
                            }
                            PairPayload::Scalar { reference, hypothesis } => multi_select_scores(
                                &Value::String(reference.clone()),
                                &Value::String(hypothesis.clone()),
                                pairs[i].id,
                            ),
                        };
                        bundles[i] = Some(bundle);
                    }
                }
                TaskKind::ShortAnswer => {
                    let texts: Vec<(String, String)> =
                        indices.iter().map(|&i| scalar_texts(&pairs[i].payload)).collect();
                    let (references, hypotheses): (Vec<String>, Vec<String>) = texts.iter().cloned().unzip();
                    let bert = self.batched_outcomes(&*self.embedding, &references, &hypotheses).await;
                    let bleurt = self.batched_outcomes(&*self.learned, &references, &hypotheses).await;

                    for (pos, &i) in indices.iter().enumerate() {
                        let (reference, hypothesis) = &texts[pos];
                        let mut bundle = MetricBundle::new();
                        bundle.insert(
                            "exact_match".into(),
                            MetricOutcome::Scored(self.tokenizer.exact_match(reference, hypothesis)),
                        );
                        bundle.insert(
                            "f1".into(),
                            MetricOutcome::Scored(self.tokenizer.span_f1(reference, hypothesis)),
                        );
                        bundle.insert("bert_score_f1".into(), bert[pos].clone());
                        bundle.insert("bleurt_score".into(), bleurt[pos].clone());
                        bundle.insert(
                            "rouge-1".into(),
                            MetricOutcome::Scored(self.tokenizer.rouge_n(reference, hypothesis, 1)),
                        );
                        bundle.insert(
                            "bleu-1".into(),
                            MetricOutcome::Scored(self.tokenizer.bleu1(reference, hypothesis)),
                        );
                        bundles[i] = Some(bundle);
                    }
                }
                TaskKind::Summarization => {
                    let mut scorable = Vec::new();
                    for &i in &indices {
                        let (reference, hypothesis) = scalar_texts(&pairs[i].payload);
                        if reference.trim().is_empty() || hypothesis.trim().is_empty() {
                            tracing::debug!("Empty summarization text for id {}, no metrics recorded", pairs[i].id);
                            bundles[i] = Some(MetricBundle::new());
                        } else {
                            scorable.push((i, reference, hypothesis));
                        }
                    }
                    let references: Vec<String> = scorable.iter().map(|(_, r, _)| r.clone()).collect();
                    let hypotheses: Vec<String> = scorable.iter().map(|(_, _, h)| h.clone()).collect();
                    let bert = self.batched_outcomes(&*self.embedding, &references, &hypotheses).await;

                    for (pos, (i, reference, hypothesis)) in scorable.iter().enumerate() {
                        let mut bundle = scored_bundle([
                            ("rouge-1", self.tokenizer.rouge_n(reference, hypothesis, 1)),
                            ("rouge-2", self.tokenizer.rouge_n(reference, hypothesis, 2)),
                            ("rouge-l", self.tokenizer.rouge_l(reference, hypothesis)),
                        ]);
                        bundle.insert("bert_score_f1".into(), bert[pos].clone());
                        bundles[*i] = Some(bundle);
                    }
                }
            }
        }

        pairs
            .iter()
            .zip(bundles)
            .map(|(pair, bundle)| {
                ScoreEntry::new(pair.kind, pair.id, pair.category.clone(), bundle.unwrap_or_default())
            })
            .collect()
    }

    /// Run an external scorer over `batch_size` chunks. A failed chunk is
    /// retried pair by pair, so one pair's outcome never depends on which
    /// other pairs shared its batch.
    async fn batched_outcomes(
        &self,
        scorer: &dyn SimilarityScorer,
        references: &[String],
        hypotheses: &[String],
    ) -> Vec<MetricOutcome> {
        let mut outcomes = Vec::with_capacity(references.len());

        for (refs, hyps) in references.chunks(self.batch_size).zip(hypotheses.chunks(self.batch_size)) {
            let result = scorer.score_batch(refs, hyps).await.and_then(|scores| {
                if scores.len() == refs.len() {
                    Ok(scores)
                } else {
                    Err(ScorerError::LengthMismatch {
                        expected: refs.len(),
                        got: scores.len(),
                    })
                }
            });
            match result {
                Ok(scores) => outcomes.extend(scores.into_iter().map(MetricOutcome::Scored)),
                Err(e) if refs.len() == 1 => {
                    tracing::warn!("{} failed: {}", scorer.name(), e);
                    outcomes.push(MetricOutcome::Unscored(e.to_string()));
                }
                Err(e) => {
                    tracing::warn!("{} batch of {} failed ({}), scoring pairs individually", scorer.name(), refs.len(), e);
                    for (r, h) in refs.iter().zip(hyps) {
                        let outcome = match scorer.score_batch(std::slice::from_ref(r), std::slice::from_ref(h)).await {
                            Ok(scores) => match scores.first() {
                                Some(score) => MetricOutcome::Scored(*score),
                                None => MetricOutcome::Unscored("empty score list".to_string()),
                            },
                            Err(e) => {
                                tracing::warn!("{} failed: {}", scorer.name(), e);
                                MetricOutcome::Unscored(e.to_string())
                            }
                        };
                        outcomes.push(outcome);
                    }
                }
            }
        }

        outcomes
    }
}

fn scalar_texts(payload: &PairPayload) -> (String, String) {
    match payload {
        PairPayload::Scalar { reference, hypothesis } => (reference.clone(), hypothesis.clone()),
        PairPayload::MultiLabel { gold, predicted } => (value_to_text(gold), value_to_text(predicted)),
    }
}

/// 1.0 when both sides match after trimming and lowercasing
pub fn accuracy(reference: &str, hypothesis: &str) -> f64 {
    if reference.trim().to_lowercase() == hypothesis.trim().to_lowercase() {
        1.0
    } else {
        0.0
    }
}

fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

fn label_set<I: IntoIterator<Item = String>>(labels: I) -> BTreeSet<String> {
    labels
        .into_iter()
        .map(|l| normalize_label(&l))
        .filter(|l| !l.is_empty())
        .collect()
}

/// Gold labels; a string that is not a list is taken as a single label
fn gold_label_set(gold: &Value) -> BTreeSet<String> {
    match gold {
        Value::Array(items) => label_set(items.iter().map(value_to_text)),
        Value::String(s) => match parse_label_list(s) {
            Ok(labels) => label_set(labels),
            Err(_) => label_set([s.clone()]),
        },
        Value::Null => BTreeSet::new(),
        other => label_set([value_to_text(other)]),
    }
}

/// Predicted labels; anything that is not list-shaped is the empty set
fn predicted_label_set(predicted: &Value, id: u64) -> BTreeSet<String> {
    match predicted {
        Value::Array(items) => label_set(items.iter().map(value_to_text)),
        Value::String(s) => match parse_label_list(s) {
            Ok(labels) => label_set(labels),
            Err(e) => {
                tracing::warn!("Unparsable multiple_select answer for id {} ({}): {:?}", id, e, s);
                BTreeSet::new()
            }
        },
        other => {
            tracing::warn!("Unexpected multiple_select answer type for id {}: {}", id, other);
            BTreeSet::new()
        }
    }
}

/// Partial-credit multiple-select scores.
///
/// `a@n` is 1 when the prediction contains no spurious label and at least
/// `n` correct ones. `exact_match_n` is 1 only for `n == |gold|` and a
/// prediction equal to the gold set.
pub fn multi_select_scores(gold: &Value, predicted: &Value, id: u64) -> MetricBundle {
    let gold = gold_label_set(gold);
    let predicted = predicted_label_set(predicted, id);

    let subset = predicted.is_subset(&gold);
    let correct = predicted.intersection(&gold).count();

    // An exact set match earns no a@n credit beyond its own size: a full
    // prediction of a three-label gold set scores a@4 = 0, and an empty gold
    // set scores 0 everywhere. The "or exact match" shortcut is not applied.
    let mut bundle = MetricBundle::new();
    for n in 1..=MAX_SELECT_RANK {
        let hit = subset && correct >= n;
        bundle.insert(format!("a@{}", n), MetricOutcome::Scored(if hit { 1.0 } else { 0.0 }));
    }
    for n in 1..=MAX_SELECT_RANK {
        let hit = gold.len() == n && subset && correct == n;
        bundle.insert(format!("exact_match_{}", n), MetricOutcome::Scored(if hit { 1.0 } else { 0.0 }));
    }
    bundle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorers::{ScorerError, UnavailableScorer};
    use async_trait::async_trait;
    use serde_json::json;

    /// Scores a pair by candidate/reference length ratio; rejects batches
    /// larger than `max_batch` and any candidate equal to `poison`
    struct LengthScorer {
        max_batch: usize,
        poison: Option<&'static str>,
    }

    #[async_trait]
    impl SimilarityScorer for LengthScorer {
        fn name(&self) -> &str {
            "length"
        }

        async fn score_batch(&self, references: &[String], candidates: &[String]) -> ScorerResult<Vec<f64>> {
            if references.len() > self.max_batch {
                return Err(ScorerError::Unavailable("batch too large".into()));
            }
            if candidates.iter().any(|c| Some(c.as_str()) == self.poison) {
                return Err(ScorerError::Unavailable("poisoned".into()));
            }
            Ok(references
                .iter()
                .zip(candidates)
                .map(|(r, c)| (c.len() as f64 / r.len().max(1) as f64).min(1.0))
                .collect())
        }
    }

    fn engine(scorer: Arc<dyn SimilarityScorer>, batch_size: usize) -> ScoreEngine {
        ScoreEngine::new(scorer.clone(), scorer, batch_size).unwrap()
    }

    fn pair(id: u64, kind: TaskKind, reference: &str, hypothesis: &str) -> MatchedPair {
        MatchedPair {
            id,
            category: "physics".into(),
            kind,
            payload: PairPayload::Scalar {
                reference: reference.into(),
                hypothesis: hypothesis.into(),
            },
        }
    }

    fn values(bundle: &MetricBundle, names: &[&str]) -> Vec<f64> {
        names.iter().map(|n| bundle[*n].value().unwrap()).collect()
    }

    const A_AT: [&str; 4] = ["a@1", "a@2", "a@3", "a@4"];
    const EXACT: [&str; 4] = ["exact_match_1", "exact_match_2", "exact_match_3", "exact_match_4"];

    #[test]
    fn test_multi_select_partial_subset() {
        let bundle = multi_select_scores(&json!(["a", "c", "d"]), &json!("['a', 'c']"), 1);
        assert_eq!(values(&bundle, &A_AT), vec![1.0, 1.0, 0.0, 0.0]);
        assert_eq!(values(&bundle, &EXACT), vec![0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_multi_select_exact_set() {
        let bundle = multi_select_scores(&json!(["a", "c", "d"]), &json!(["a", "c", "d"]), 1);
        assert_eq!(values(&bundle, &A_AT), vec![1.0, 1.0, 1.0, 0.0]);
        assert_eq!(values(&bundle, &EXACT), vec![0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_multi_select_exact_match_capped_at_set_size() {
        let single = multi_select_scores(&json!(["a"]), &json!("['a']"), 1);
        assert_eq!(values(&single, &A_AT), vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(values(&single, &EXACT), vec![1.0, 0.0, 0.0, 0.0]);

        let empty = multi_select_scores(&json!([]), &json!([]), 2);
        assert_eq!(values(&empty, &A_AT), vec![0.0; 4]);
        assert_eq!(values(&empty, &EXACT), vec![0.0; 4]);
    }

    #[test]
    fn test_multi_select_spurious_label_zeroes_everything() {
        let bundle = multi_select_scores(&json!(["a", "c", "d"]), &json!(["a", "c", "b"]), 1);
        assert!(values(&bundle, &A_AT).iter().all(|v| *v == 0.0));
        assert!(values(&bundle, &EXACT).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_multi_select_unparsable_prediction_is_empty_set() {
        let bundle = multi_select_scores(&json!("['a', 'b']"), &json!("a and b"), 1);
        assert!(values(&bundle, &A_AT).iter().all(|v| *v == 0.0));
        assert_eq!(bundle.len(), 8);
    }

    #[test]
    fn test_multi_select_duplicates_collapse() {
        let bundle = multi_select_scores(&json!(["b", "b"]), &json!(["B", "b"]), 1);
        assert_eq!(values(&bundle, &EXACT), vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_accuracy_normalizes_both_sides() {
        assert_eq!(accuracy(" B ", "b"), 1.0);
        assert_eq!(accuracy("1", "0"), 0.0);
    }

    #[tokio::test]
    async fn test_true_false_pair_scores_accuracy() {
        let engine = engine(Arc::new(UnavailableScorer::new("none")), 16);
        let entries = engine.score_pairs(&[pair(1, TaskKind::TrueFalse, "1", "1")]).await;
        assert_eq!(entries[0].get("accuracy"), Some(&MetricOutcome::Scored(1.0)));
    }

    #[tokio::test]
    async fn test_empty_summarization_has_no_metrics() {
        let engine = engine(Arc::new(LengthScorer { max_batch: 16, poison: None }), 16);
        let entries = engine
            .score_pairs(&[
                pair(1, TaskKind::Summarization, "A long summary.", ""),
                pair(2, TaskKind::Summarization, "A long summary.", "A summary."),
            ])
            .await;
        assert!(entries[0].metrics.is_empty());
        assert_eq!(
            entries[1].metrics.keys().collect::<Vec<_>>(),
            vec!["rouge-1", "rouge-2", "rouge-l", "bert_score_f1"]
        );
    }

    #[tokio::test]
    async fn test_scorer_failure_is_unscored_for_that_metric_only() {
        let engine = engine(Arc::new(UnavailableScorer::new("none")), 16);
        let entries = engine
            .score_pairs(&[pair(1, TaskKind::ShortAnswer, "photosynthesis", "Photosynthesis")])
            .await;
        let metrics = &entries[0].metrics;
        assert!(matches!(metrics["bert_score_f1"], MetricOutcome::Unscored(_)));
        assert!(matches!(metrics["bleurt_score"], MetricOutcome::Unscored(_)));
        assert_eq!(metrics["exact_match"], MetricOutcome::Scored(1.0));
        assert_eq!(metrics["f1"], MetricOutcome::Scored(1.0));
        assert_eq!(metrics.len(), 6);
    }

    #[tokio::test]
    async fn test_results_independent_of_batch_size() {
        let pairs: Vec<MatchedPair> = (0..20u64)
            .map(|i| {
                let hypothesis = if i == 7 { "poison".to_string() } else { "x".repeat(i as usize) };
                pair(i, TaskKind::ShortAnswer, "reference answer", &hypothesis)
            })
            .collect();

        let scorer = || Arc::new(LengthScorer { max_batch: 8, poison: Some("poison") });
        let one = engine(scorer(), 1).score_pairs(&pairs).await;
        let many = engine(scorer(), 16).score_pairs(&pairs).await;

        assert_eq!(one, many);
        assert!(matches!(one[7].metrics["bert_score_f1"], MetricOutcome::Unscored(_)));
        assert!(one[8].metrics["bert_score_f1"].is_scored());
    }
}
