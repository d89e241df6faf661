//! On-disk results: per-item generation artifacts and per-model evaluation
//! outputs
//!
//! Every file is written to a temporary sibling and renamed into place, so
//! an interrupted run leaves either the old or the new content.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::analysis::Summary;
use crate::tasks::{ExperimentVariant, PredictionRecord};

/// Error type for result persistence
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} has no summary")]
    MissingSummary { path: PathBuf },
}

pub type StoreResult<T> = Result<T, StoreError>;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn json_err(path: &Path) -> impl FnOnce(serde_json::Error) -> StoreError + '_ {
    move |source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `bytes` to `path` through a synced temporary sibling and a rename
pub fn atomic_write(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(
        ".{}.tmp.{}.{}",
        name,
        std::process::id(),
        Utc::now().timestamp_micros()
    ));

    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}

/// Pretty-print `value` as JSON and write it atomically
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(json_err(path))?;
    bytes.push(b'\n');
    atomic_write(path, &bytes)
}

/// Model name as a single path component
pub fn model_slug(model: &str) -> String {
    model
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect()
}

/// Per-item generation artifacts under `<root>/<variant>/<model>/<id>.json`
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn artifact_dir(&self, variant: ExperimentVariant, model: &str) -> PathBuf {
        self.root.join(variant.as_str()).join(model_slug(model))
    }

    pub fn artifact_path(&self, variant: ExperimentVariant, model: &str, id: u64) -> PathBuf {
        self.artifact_dir(variant, model).join(format!("{}.json", id))
    }

    /// Load an item's artifact, or start an empty one. An unreadable
    /// artifact is replaced rather than aborting the run.
    pub fn load_or_new(&self, variant: ExperimentVariant, model: &str, id: u64) -> PredictionRecord {
        let path = self.artifact_path(variant, model, id);
        if !path.exists() {
            return PredictionRecord::new(id);
        }
        let loaded = fs::read_to_string(&path)
            .map_err(io_err(&path))
            .and_then(|content| serde_json::from_str::<PredictionRecord>(&content).map_err(json_err(&path)));
        match loaded {
            Ok(mut record) => {
                record.id = id;
                record
            }
            Err(e) => {
                tracing::warn!("Discarding unreadable artifact: {}", e);
                PredictionRecord::new(id)
            }
        }
    }

    /// Overwrite the whole artifact with the current record
    pub fn save(&self, variant: ExperimentVariant, model: &str, record: &PredictionRecord) -> StoreResult<()> {
        write_json_atomic(&self.artifact_path(variant, model, record.id), record)
    }

    /// Merge a model's artifacts into one prediction JSONL file sorted by
    /// identifier. Returns the number of records written.
    pub fn collect(&self, variant: ExperimentVariant, model: &str, output: &Path) -> StoreResult<usize> {
        let dir = self.artifact_dir(variant, model);
        if !dir.is_dir() {
            return Err(StoreError::NotFound(dir));
        }

        let mut records: BTreeMap<u64, PredictionRecord> = BTreeMap::new();
        for entry in fs::read_dir(&dir).map_err(io_err(&dir))? {
            let path = entry.map_err(io_err(&dir))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(io_err(&path))
                .and_then(|c| serde_json::from_str::<PredictionRecord>(&c).map_err(json_err(&path)));
            match parsed {
                Ok(record) => {
                    records.insert(record.id, record);
                }
                Err(e) => tracing::warn!("Skipping artifact: {}", e),
            }
        }

        write_jsonl(output, records.values())?;
        Ok(records.len())
    }
}

/// Write values as JSON Lines, atomically
pub fn write_jsonl<'a, T: Serialize + 'a>(path: &Path, values: impl IntoIterator<Item = &'a T>) -> StoreResult<()> {
    let mut bytes = Vec::new();
    for value in values {
        serde_json::to_writer(&mut bytes, value).map_err(json_err(path))?;
        bytes.push(b'\n');
    }
    atomic_write(path, &bytes)
}

/// Rewrite a JSON-array result file as JSON Lines
pub fn json_array_to_jsonl(input: &Path, output: &Path) -> StoreResult<usize> {
    if !input.exists() {
        return Err(StoreError::NotFound(input.to_path_buf()));
    }
    let content = fs::read_to_string(input).map_err(io_err(input))?;
    let items: Vec<Value> = serde_json::from_str(&content).map_err(json_err(input))?;
    write_jsonl(output, &items)?;
    Ok(items.len())
}

/// `<output_dir>/evaluation_<stem>.json` for a prediction file
pub fn evaluation_output_path(output_dir: &Path, predictions_file: &Path) -> PathBuf {
    output_dir.join(format!("evaluation_{}.json", model_name(predictions_file)))
}

/// Model name derived from a prediction file name
pub fn model_name(predictions_file: &Path) -> String {
    predictions_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Read the `summary` of a persisted evaluation output
pub fn load_evaluation_summary(path: &Path) -> StoreResult<Summary> {
    let content = fs::read_to_string(path).map_err(io_err(path))?;
    let mut value: Value = serde_json::from_str(&content).map_err(json_err(path))?;
    let summary = value
        .get_mut("summary")
        .map(Value::take)
        .ok_or_else(|| StoreError::MissingSummary {
            path: path.to_path_buf(),
        })?;
    serde_json::from_value(summary).map_err(json_err(path))
}
