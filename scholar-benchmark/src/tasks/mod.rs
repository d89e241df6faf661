//! Task kinds, dataset records and loading

pub mod answers;
pub mod categories;
pub mod loader;
pub mod matcher;
pub mod prompts;

pub use answers::{extract_answer, is_valid_answer, parse_label_list, LabelParseError};
pub use categories::normalize_category;
pub use loader::{load_ground_truth, load_predictions, load_records, IdentifierIndex, LoadError};
pub use matcher::{common_identifiers, extract_pairs, MatchedPair, PairPayload};
pub use prompts::{ExperimentVariant, PromptBuilder, PromptParts};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of question formats in the benchmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    MultipleChoice,
    MultipleSelect,
    TrueFalse,
    ShortAnswer,
    Summarization,
}

impl TaskKind {
    pub fn all() -> Vec<TaskKind> {
        vec![
            TaskKind::MultipleChoice,
            TaskKind::MultipleSelect,
            TaskKind::TrueFalse,
            TaskKind::ShortAnswer,
            TaskKind::Summarization,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::MultipleChoice => "multiple_choice",
            TaskKind::MultipleSelect => "multiple_select",
            TaskKind::TrueFalse => "true_false",
            TaskKind::ShortAnswer => "short_answer",
            TaskKind::Summarization => "summarization",
        }
    }

    /// Metric names produced for this task kind, in report order
    pub fn metric_names(&self) -> &'static [&'static str] {
        match self {
            TaskKind::MultipleChoice | TaskKind::TrueFalse => &["accuracy"],
            TaskKind::MultipleSelect => &[
                "a@1",
                "a@2",
                "a@3",
                "a@4",
                "exact_match_1",
                "exact_match_2",
                "exact_match_3",
                "exact_match_4",
            ],
            TaskKind::ShortAnswer => &[
                "exact_match",
                "f1",
                "bert_score_f1",
                "bleurt_score",
                "rouge-1",
                "bleu-1",
            ],
            TaskKind::Summarization => &["rouge-1", "rouge-2", "rouge-l", "bert_score_f1"],
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "multiple_choice" | "mc" => Ok(TaskKind::MultipleChoice),
            "multiple_select" | "ms" => Ok(TaskKind::MultipleSelect),
            "true_false" | "tf" => Ok(TaskKind::TrueFalse),
            "short_answer" | "sa" => Ok(TaskKind::ShortAnswer),
            "summarization" | "sum" => Ok(TaskKind::Summarization),
            _ => Err(format!("Unknown task type: {}", s)),
        }
    }
}

/// Parse a comma-separated task list such as `"multiple_choice,true_false"`
pub fn parse_task_list(list: &str) -> Result<Vec<TaskKind>, String> {
    let mut kinds = Vec::new();
    for part in list.split(',').filter(|p| !p.trim().is_empty()) {
        let kind: TaskKind = part.parse()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

/// One task sub-object of a ground-truth record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl TaskItem {
    /// Gold answer; summarization falls back to `summary_text`
    pub fn gold(&self) -> Option<Value> {
        match &self.answer {
            Some(v) if !v.is_null() => Some(v.clone()),
            _ => self.summary_text.clone().map(Value::String),
        }
    }
}

/// Gold-standard entry for one dataset item
#[derive(Debug, Clone)]
pub struct GroundTruthRecord {
    pub id: u64,
    pub category: String,
    /// Source passage, either text or a list of `{section, text}` objects
    pub paragraph: Option<Value>,
    pub tasks: BTreeMap<TaskKind, TaskItem>,
}

impl GroundTruthRecord {
    pub fn task(&self, kind: TaskKind) -> Option<&TaskItem> {
        self.tasks.get(&kind)
    }

    /// Flatten the passage into plain text
    pub fn paragraph_text(&self) -> String {
        match &self.paragraph {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(sections)) => sections
                .iter()
                .map(|section| match section {
                    Value::Object(obj) => {
                        let mut text = obj
                            .get("section")
                            .map(value_to_text)
                            .unwrap_or_default();
                        match obj.get("text") {
                            Some(Value::Array(lines)) => {
                                for line in lines {
                                    text.push_str(&value_to_text(line));
                                }
                            }
                            Some(other) => text.push_str(&value_to_text(other)),
                            None => {}
                        }
                        text
                    }
                    other => value_to_text(other),
                })
                .collect(),
            Some(other) => value_to_text(other),
        }
    }
}

/// A model answer for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedAnswer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_original_answer: Option<String>,
    #[serde(default)]
    pub model_answer: Value,
}

/// A model's answers for one dataset item. Also the on-disk shape of a
/// per-item generation artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub results: BTreeMap<TaskKind, PredictedAnswer>,
}

impl PredictionRecord {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            category: None,
            results: BTreeMap::new(),
        }
    }

    pub fn answer(&self, kind: TaskKind) -> Option<&PredictedAnswer> {
        self.results.get(&kind)
    }
}

/// Render a JSON value as plain text: strings verbatim, everything else as JSON
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
