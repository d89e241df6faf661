//! Dataset loading into identifier-keyed indexes
//!
//! Accepts either JSON Lines (one object per line) or a single JSON array of
//! objects. Records with a missing or non-numeric `id` are dropped with a
//! warning; a bad line never aborts the rest of the load.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::{GroundTruthRecord, PredictedAnswer, PredictionRecord, TaskItem, TaskKind};

/// Integer-keyed view of one dataset file
pub type IdentifierIndex<T> = BTreeMap<u64, T>;

/// Error type for dataset loading
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Load raw JSON objects keyed by their validated identifier
pub fn load_records(path: impl AsRef<Path>) -> Result<IdentifierIndex<Map<String, Value>>, LoadError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    load_records_from_str(&content).map_err(|message| LoadError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Load raw JSON objects from file content. Only a top-level array that is
/// not valid JSON is an error; individual bad records are skipped.
pub fn load_records_from_str(content: &str) -> Result<IdentifierIndex<Map<String, Value>>, String> {
    let mut index = BTreeMap::new();

    if content.trim_start().starts_with('[') {
        let items: Vec<Value> = serde_json::from_str(content).map_err(|e| e.to_string())?;
        for (idx, item) in items.into_iter().enumerate() {
            insert_record(&mut index, item, idx + 1);
        }
    } else {
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(item) => insert_record(&mut index, item, idx + 1),
                Err(e) => tracing::warn!("JSON decode error (line {}): {}", idx + 1, e),
            }
        }
    }

    Ok(index)
}

fn insert_record(index: &mut IdentifierIndex<Map<String, Value>>, item: Value, position: usize) {
    let Value::Object(obj) = item else {
        tracing::warn!("Record {} is not a JSON object, skipping", position);
        return;
    };

    match obj.get("id").and_then(parse_identifier) {
        Some(id) => {
            if index.insert(id, obj).is_some() {
                tracing::warn!("Duplicate id {} at record {}, later record wins", id, position);
            }
        }
        None => {
            tracing::warn!(
                "Invalid id in record {}: {}",
                position,
                obj.get("id").map(|v| v.to_string()).unwrap_or_else(|| "<missing>".to_string())
            );
        }
    }
}

/// Accept non-negative JSON integers or strings made only of ASCII digits
pub fn parse_identifier(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => s.parse().ok(),
        _ => None,
    }
}

/// Load a ground-truth dataset
pub fn load_ground_truth(path: impl AsRef<Path>) -> Result<IdentifierIndex<GroundTruthRecord>, LoadError> {
    let raw = load_records(path)?;
    Ok(raw
        .into_iter()
        .map(|(id, obj)| (id, ground_truth_from_object(id, obj)))
        .collect())
}

/// Build a ground-truth record; malformed task sub-objects are dropped for
/// that task only
pub fn ground_truth_from_object(id: u64, mut obj: Map<String, Value>) -> GroundTruthRecord {
    let category = match obj.get("category") {
        Some(Value::String(s)) => s.clone(),
        _ => "unknown".to_string(),
    };

    let mut tasks = BTreeMap::new();
    for kind in TaskKind::all() {
        let Some(value) = obj.remove(kind.as_str()) else {
            continue;
        };
        match serde_json::from_value::<TaskItem>(value) {
            Ok(item) => {
                tasks.insert(kind, item);
            }
            Err(e) => tracing::warn!("Malformed {} entry for id {}: {}", kind, id, e),
        }
    }

    GroundTruthRecord {
        id,
        category,
        paragraph: obj.remove("paragraph"),
        tasks,
    }
}

/// Load a model prediction file
pub fn load_predictions(path: impl AsRef<Path>) -> Result<IdentifierIndex<PredictionRecord>, LoadError> {
    let raw = load_records(path)?;
    Ok(raw
        .into_iter()
        .map(|(id, obj)| (id, prediction_from_object(id, obj)))
        .collect())
}

/// Build a prediction record, ignoring result keys that are not task kinds
pub fn prediction_from_object(id: u64, obj: Map<String, Value>) -> PredictionRecord {
    let mut record = PredictionRecord::new(id);
    record.category = obj.get("category").and_then(|v| v.as_str()).map(String::from);

    if let Some(Value::Object(results)) = obj.get("results") {
        for (key, value) in results {
            let Ok(kind) = key.parse::<TaskKind>() else {
                tracing::debug!("Ignoring unknown result key {:?} for id {}", key, id);
                continue;
            };
            match serde_json::from_value::<PredictedAnswer>(value.clone()) {
                Ok(answer) => {
                    record.results.insert(kind, answer);
                }
                Err(e) => tracing::warn!("Malformed {} result for id {}: {}", kind, id, e),
            }
        }
    }

    record
}
