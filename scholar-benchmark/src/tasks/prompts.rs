//! Prompt assembly for answer generation
//!
//! A prompt is an instruction, two worked exemplars rendered as chat turns,
//! and the item input. An oversized prompt loses its oldest exemplars
//! first, then leading characters of the item input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::loader::IdentifierIndex;
use super::matcher::normalize_truth_value;
use super::{parse_label_list, value_to_text, GroundTruthRecord, TaskKind};
use crate::providers::Message;

/// Number of exemplars placed before every item
pub const EXEMPLAR_COUNT: usize = 2;

/// Extra context given to the model alongside each question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentVariant {
    /// Question only
    Base,
    /// Question prefixed with its topic
    Topic,
    /// Question prefixed with its source passage
    Paragraph,
}

impl ExperimentVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentVariant::Base => "base",
            ExperimentVariant::Topic => "topic",
            ExperimentVariant::Paragraph => "paragraph",
        }
    }
}

impl std::fmt::Display for ExperimentVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn instruction(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::MultipleChoice => {
            "A multiple-choice question with a single correct answer is given.\n\
             Read the Question and output only the letter of the correct choice.\n\
             Do not add any explanation."
        }
        TaskKind::MultipleSelect => {
            "A question with one or more correct answers is given.\n\
             Read the Question and output the letters of all correct choices as a list, e.g. ['a', 'c'].\n\
             Do not add any explanation."
        }
        TaskKind::TrueFalse => {
            "A true/false question is given.\n\
             Output 1 if the statement is true and 0 if it is false.\n\
             Do not add any explanation."
        }
        TaskKind::ShortAnswer => {
            "A short-answer question is given.\n\
             Respond only with keywords or a brief phrase, not a full sentence."
        }
        TaskKind::Summarization => {
            "A paragraph is given.\n\
             Summarize its key content in a few sentences."
        }
    }
}

/// The pieces of one generation prompt
#[derive(Debug, Clone)]
pub struct PromptParts {
    pub kind: TaskKind,
    pub instruction: String,
    /// Exemplar (input, output) pairs
    pub exemplars: Vec<(String, String)>,
    /// Item input; leading characters are dropped when the prompt is too long
    pub content: String,
}

impl PromptParts {
    /// Length of the truncatable content in characters
    pub fn content_len(&self) -> usize {
        self.content.chars().count()
    }

    /// Render as chat messages without the first `drop_exemplars`
    /// exemplars and the first `skip_chars` characters of the item content
    pub fn to_messages(&self, drop_exemplars: usize, skip_chars: usize) -> Vec<Message> {
        let kept = &self.exemplars[drop_exemplars.min(self.exemplars.len())..];
        let mut messages = Vec::with_capacity(kept.len() * 2 + 1);
        for (input, output) in kept {
            messages.push(Message::user(format!("{}\n\n{}", self.instruction, input)));
            messages.push(Message::assistant(output.clone()));
        }
        let content: String = self.content.chars().skip(skip_chars).collect();
        messages.push(Message::user(format!("{}\n\n{}", self.instruction, content)));
        messages
    }
}

/// Builds prompts for one experiment variant with fixed exemplars per task
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    variant: ExperimentVariant,
    exemplars: BTreeMap<TaskKind, Vec<(String, String)>>,
}

impl PromptBuilder {
    /// Pick the first two items carrying each task (in identifier order) as
    /// that task's exemplars
    pub fn from_dataset(dataset: &IdentifierIndex<GroundTruthRecord>, variant: ExperimentVariant) -> Self {
        let mut exemplars: BTreeMap<TaskKind, Vec<(String, String)>> = BTreeMap::new();
        for kind in TaskKind::all() {
            let picked: Vec<(String, String)> = dataset
                .values()
                .filter_map(|record| {
                    let input = item_input(record, kind, variant)?;
                    let gold = record.task(kind)?.gold()?;
                    Some((input, render_gold(kind, &gold)))
                })
                .take(EXEMPLAR_COUNT)
                .collect();
            if picked.len() < EXEMPLAR_COUNT {
                tracing::warn!("Only {} exemplar(s) available for {}", picked.len(), kind);
            }
            exemplars.insert(kind, picked);
        }
        Self { variant, exemplars }
    }

    pub fn variant(&self) -> ExperimentVariant {
        self.variant
    }

    /// Assemble the prompt for one item, or `None` if the item lacks the task
    pub fn build(&self, record: &GroundTruthRecord, kind: TaskKind) -> Option<PromptParts> {
        let content = item_input(record, kind, self.variant)?;
        Some(PromptParts {
            kind,
            instruction: instruction(kind).to_string(),
            exemplars: self.exemplars.get(&kind).cloned().unwrap_or_default(),
            content,
        })
    }
}

fn item_input(record: &GroundTruthRecord, kind: TaskKind, variant: ExperimentVariant) -> Option<String> {
    let item = record.task(kind)?;

    let body = match kind {
        TaskKind::Summarization => {
            let paragraph = record.paragraph_text();
            if paragraph.trim().is_empty() {
                return None;
            }
            return Some(format!("Paragraph: \n{}", paragraph));
        }
        TaskKind::MultipleChoice | TaskKind::MultipleSelect => {
            let question = item.question.as_deref()?;
            format!("Question: \n{}\n\nChoices: \n{}", question, item.choices.join("\n"))
        }
        TaskKind::TrueFalse | TaskKind::ShortAnswer => {
            format!("Question: \n{}", item.question.as_deref()?)
        }
    };

    let prefix = match variant {
        ExperimentVariant::Base => String::new(),
        ExperimentVariant::Topic => {
            let topic = item.topic.clone().unwrap_or_else(|| record.category.clone());
            format!("Topic\n{}\n\n", topic)
        }
        ExperimentVariant::Paragraph => format!("Paragraph\n{}\n\n", record.paragraph_text()),
    };

    Some(format!("{}{}", prefix, body))
}

fn render_gold(kind: TaskKind, gold: &Value) -> String {
    match kind {
        TaskKind::TrueFalse => normalize_truth_value(gold),
        TaskKind::MultipleSelect => {
            let labels: Vec<String> = match gold {
                Value::Array(items) => items.iter().map(value_to_text).collect(),
                Value::String(s) => parse_label_list(s).unwrap_or_else(|_| vec![s.clone()]),
                other => vec![value_to_text(other)],
            };
            let quoted: Vec<String> = labels.iter().map(|l| format!("'{}'", l)).collect();
            format!("[{}]", quoted.join(", "))
        }
        _ => value_to_text(gold),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::loader::ground_truth_from_object;
    use serde_json::json;

    fn dataset() -> IdentifierIndex<GroundTruthRecord> {
        let items = vec![
            json!({"id": 1, "category": "Chemistry", "paragraph": "Water boils at 100C.",
                   "multiple_select": {"question": "Which?", "choices": ["a) x", "b) y"], "answer": ["a", "b"]},
                   "true_false": {"question": "Water boils at 100C?", "answer": "참"}}),
            json!({"id": 2, "category": "Physics", "paragraph": "Light is fast.",
                   "true_false": {"question": "Light is slow?", "answer": "거짓", "topic": "optics"}}),
            json!({"id": 3, "category": "Physics", "paragraph": "Sound is slower.",
                   "true_false": {"question": "Sound is faster than light?", "answer": "False"}}),
        ];
        items
            .into_iter()
            .map(|v| {
                let Value::Object(obj) = v else { unreachable!() };
                let id = obj["id"].as_u64().unwrap();
                (id, ground_truth_from_object(id, obj))
            })
            .collect()
    }

    #[test]
    fn test_exemplars_are_first_two_items() {
        let data = dataset();
        let builder = PromptBuilder::from_dataset(&data, ExperimentVariant::Base);
        let parts = builder.build(&data[&3], TaskKind::TrueFalse).unwrap();
        assert_eq!(parts.exemplars.len(), 2);
        assert_eq!(parts.exemplars[0].1, "1");
        assert_eq!(parts.exemplars[1].1, "0");

        let messages = parts.to_messages(0, 0);
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[1].role, "assistant");
        assert!(messages[4].content.ends_with("Sound is faster than light?"));
    }

    #[test]
    fn test_topic_variant_prefers_task_topic() {
        let data = dataset();
        let builder = PromptBuilder::from_dataset(&data, ExperimentVariant::Topic);
        let parts = builder.build(&data[&2], TaskKind::TrueFalse).unwrap();
        assert!(parts.content.starts_with("Topic\noptics"));
        let parts = builder.build(&data[&3], TaskKind::TrueFalse).unwrap();
        assert!(parts.content.starts_with("Topic\nPhysics"));
    }

    #[test]
    fn test_truncation_drops_leading_content() {
        let data = dataset();
        let builder = PromptBuilder::from_dataset(&data, ExperimentVariant::Paragraph);
        let parts = builder.build(&data[&3], TaskKind::TrueFalse).unwrap();
        let last = parts.to_messages(0, 10).pop().unwrap();
        assert!(!last.content.contains("Paragraph\nSound"));
        assert!(last.content.ends_with("Sound is faster than light?"));
    }

    #[test]
    fn test_oldest_exemplars_dropped_first() {
        let data = dataset();
        let builder = PromptBuilder::from_dataset(&data, ExperimentVariant::Base);
        let parts = builder.build(&data[&3], TaskKind::TrueFalse).unwrap();

        let one_dropped = parts.to_messages(1, 0);
        assert_eq!(one_dropped.len(), 3);
        assert_eq!(one_dropped[1].content, "0");

        let all_dropped = parts.to_messages(5, 0);
        assert_eq!(all_dropped.len(), 1);
        assert!(all_dropped[0].content.ends_with("Question: \nSound is faster than light?"));
    }

    #[test]
    fn test_missing_task_builds_nothing() {
        let data = dataset();
        let builder = PromptBuilder::from_dataset(&data, ExperimentVariant::Base);
        assert!(builder.build(&data[&2], TaskKind::MultipleSelect).is_none());
        assert!(builder.build(&data[&1], TaskKind::Summarization).is_none());
    }

    #[test]
    fn test_multiple_select_gold_renders_as_list() {
        assert_eq!(render_gold(TaskKind::MultipleSelect, &json!(["a", "c"])), "['a', 'c']");
    }
}
