//! Matching ground truth against predictions

use std::collections::BTreeSet;

use serde_json::Value;

use super::loader::IdentifierIndex;
use super::{value_to_text, GroundTruthRecord, PredictionRecord, TaskKind};

/// What gets scored for one identifier and task kind
#[derive(Debug, Clone, PartialEq)]
pub enum PairPayload {
    /// Reference and hypothesis text for single-answer and free-text tasks
    Scalar { reference: String, hypothesis: String },
    /// Raw gold and predicted label collections for multiple-select
    MultiLabel { gold: Value, predicted: Value },
}

/// A ground-truth/prediction pair ready for scoring
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedPair {
    pub id: u64,
    pub category: String,
    pub kind: TaskKind,
    pub payload: PairPayload,
}

/// Identifiers present in both indexes
pub fn common_identifiers<A, B>(a: &IdentifierIndex<A>, b: &IdentifierIndex<B>) -> BTreeSet<u64> {
    a.keys().filter(|id| b.contains_key(id)).copied().collect()
}

/// Extract per-task pairs for every common identifier.
///
/// Pairs are emitted only when both sides carry the task; an identifier
/// missing a task on either side is skipped for that task alone.
pub fn extract_pairs(
    ground_truth: &IdentifierIndex<GroundTruthRecord>,
    predictions: &IdentifierIndex<PredictionRecord>,
    common_ids: &BTreeSet<u64>,
    kinds: &[TaskKind],
) -> Vec<MatchedPair> {
    let overlap = common_identifiers(ground_truth, predictions).len();
    let unmatched = ground_truth.len() + predictions.len() - 2 * overlap;
    if unmatched > 0 {
        tracing::debug!("{} identifiers present on only one side were excluded", unmatched);
    }

    let mut pairs = Vec::new();
    for &kind in kinds {
        for id in common_ids {
            let (Some(gt), Some(pred)) = (ground_truth.get(id), predictions.get(id)) else {
                continue;
            };
            let (Some(item), Some(answer)) = (gt.task(kind), pred.answer(kind)) else {
                continue;
            };
            let Some(gold) = item.gold() else {
                tracing::warn!("No gold answer for {} on id {}", kind, id);
                continue;
            };

            let payload = match kind {
                TaskKind::MultipleSelect => PairPayload::MultiLabel {
                    gold,
                    predicted: answer.model_answer.clone(),
                },
                TaskKind::TrueFalse => PairPayload::Scalar {
                    reference: normalize_truth_value(&gold),
                    hypothesis: value_to_text(&answer.model_answer),
                },
                TaskKind::MultipleChoice | TaskKind::ShortAnswer | TaskKind::Summarization => {
                    PairPayload::Scalar {
                        reference: value_to_text(&gold),
                        hypothesis: value_to_text(&answer.model_answer),
                    }
                }
            };

            pairs.push(MatchedPair {
                id: *id,
                category: gt.category.clone(),
                kind,
                payload,
            });
        }
    }
    pairs
}

/// Map a literal truth/falsity symbol to `"1"`/`"0"`; other values pass through
pub fn normalize_truth_value(raw: &Value) -> String {
    match raw {
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Number(n) if n.as_u64() == Some(1) => "1".to_string(),
        Value::Number(n) if n.as_u64() == Some(0) => "0".to_string(),
        Value::String(s) => match s.trim() {
            "참" => "1".to_string(),
            "거짓" => "0".to_string(),
            t if t.eq_ignore_ascii_case("true") => "1".to_string(),
            t if t.eq_ignore_ascii_case("false") => "0".to_string(),
            _ => s.clone(),
        },
        other => value_to_text(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::loader::{ground_truth_from_object, prediction_from_object};
    use serde_json::json;

    fn gt(value: Value) -> (u64, GroundTruthRecord) {
        let Value::Object(obj) = value else { unreachable!() };
        let id = obj["id"].as_u64().unwrap();
        (id, ground_truth_from_object(id, obj))
    }

    fn pred(value: Value) -> (u64, PredictionRecord) {
        let Value::Object(obj) = value else { unreachable!() };
        let id = obj["id"].as_u64().unwrap();
        (id, prediction_from_object(id, obj))
    }

    #[test]
    fn test_common_identifiers_is_intersection() {
        let a: IdentifierIndex<()> = [(1, ()), (2, ()), (3, ())].into_iter().collect();
        let b: IdentifierIndex<()> = [(2, ()), (3, ()), (4, ())].into_iter().collect();
        assert_eq!(common_identifiers(&a, &b).into_iter().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_true_false_gold_is_normalized() {
        let truth: IdentifierIndex<_> = [gt(json!({
            "id": 1, "category": "x",
            "true_false": {"question": "q", "answer": "참"}
        }))]
        .into_iter()
        .collect();
        let preds: IdentifierIndex<_> = [pred(json!({
            "id": 1, "results": {"true_false": {"model_answer": "1"}}
        }))]
        .into_iter()
        .collect();
        let ids = common_identifiers(&truth, &preds);
        let pairs = extract_pairs(&truth, &preds, &ids, &[TaskKind::TrueFalse]);
        assert_eq!(pairs.len(), 1);
        assert_eq!(
            pairs[0].payload,
            PairPayload::Scalar {
                reference: "1".to_string(),
                hypothesis: "1".to_string()
            }
        );
    }

    #[test]
    fn test_missing_task_skips_only_that_task() {
        let truth: IdentifierIndex<_> = [gt(json!({
            "id": 5, "category": "x",
            "multiple_choice": {"question": "q", "answer": "b"},
            "short_answer": {"question": "q", "answer": "photosynthesis"}
        }))]
        .into_iter()
        .collect();
        let preds: IdentifierIndex<_> = [pred(json!({
            "id": 5, "results": {"short_answer": {"model_answer": "Photosynthesis"}}
        }))]
        .into_iter()
        .collect();
        let ids = common_identifiers(&truth, &preds);
        let pairs = extract_pairs(&truth, &preds, &ids, &TaskKind::all());
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].kind, TaskKind::ShortAnswer);
    }

    #[test]
    fn test_one_sided_identifier_produces_no_pair() {
        let truth: IdentifierIndex<_> = [
            gt(json!({"id": 1, "multiple_choice": {"answer": "a"}})),
            gt(json!({"id": 2, "multiple_choice": {"answer": "b"}})),
        ]
        .into_iter()
        .collect();
        let preds: IdentifierIndex<_> = [pred(json!({
            "id": 1, "results": {"multiple_choice": {"model_answer": "a"}}
        }))]
        .into_iter()
        .collect();
        let ids = common_identifiers(&truth, &preds);
        let pairs = extract_pairs(&truth, &preds, &ids, &TaskKind::all());
        assert_eq!(pairs.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(pairs[0].category, "unknown");
    }

    #[test]
    fn test_identifier_set_beyond_both_indexes() {
        let empty_truth: IdentifierIndex<GroundTruthRecord> = IdentifierIndex::new();
        let empty_preds: IdentifierIndex<PredictionRecord> = IdentifierIndex::new();
        let ids: BTreeSet<u64> = [1, 2].into_iter().collect();
        assert!(extract_pairs(&empty_truth, &empty_preds, &ids, &TaskKind::all()).is_empty());

        let truth: IdentifierIndex<_> = [
            gt(json!({"id": 1, "multiple_choice": {"answer": "a"}})),
            gt(json!({"id": 2, "multiple_choice": {"answer": "b"}})),
        ]
        .into_iter()
        .collect();
        let preds: IdentifierIndex<_> = [pred(json!({
            "id": 1, "results": {"multiple_choice": {"model_answer": "a"}}
        }))]
        .into_iter()
        .collect();
        let ids: BTreeSet<u64> = [1, 2, 7].into_iter().collect();
        let pairs = extract_pairs(&truth, &preds, &ids, &[TaskKind::MultipleChoice]);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].id, 1);
    }

    #[test]
    fn test_normalize_truth_value_passthrough() {
        assert_eq!(normalize_truth_value(&json!("거짓")), "0");
        assert_eq!(normalize_truth_value(&json!("TRUE")), "1");
        assert_eq!(normalize_truth_value(&json!(false)), "0");
        assert_eq!(normalize_truth_value(&json!(1)), "1");
        assert_eq!(normalize_truth_value(&json!("maybe")), "maybe");
    }
}
