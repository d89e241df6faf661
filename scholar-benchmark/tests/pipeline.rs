//! End-to-end checks: resumable batch evaluation and the generation loop

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use scholar_benchmark::analysis::ScoreEngine;
use scholar_benchmark::config::GenerationConfig;
use scholar_benchmark::providers::{
    CompletionRequest, CompletionResponse, LLMProvider, ProviderError, ProviderResult,
};
use scholar_benchmark::reporting::{ResultStore, COMPREHENSIVE_RESULTS_FILE};
use scholar_benchmark::runner::EvaluationRunner;
use scholar_benchmark::runner::GenerationRunner;
use scholar_benchmark::scorers::UnavailableScorer;
use scholar_benchmark::tasks::{load_ground_truth, ExperimentVariant, TaskKind};

const GROUND_TRUTH: &str = r#"{"id": 1, "category": "Physics", "multiple_choice": {"question": "Speed of light?", "choices": ["a) slow", "b) fast"], "answer": "b"}, "true_false": {"question": "Light is fast?", "answer": "참"}, "short_answer": {"question": "Unit of force?", "answer": "the newton"}}
{"id": 2, "category": "physics ", "multiple_choice": {"question": "Unit of charge?", "choices": ["a) coulomb", "b) volt"], "answer": "a"}, "true_false": {"question": "Sound beats light?", "answer": "거짓"}}
{"id": 3, "category": "Chemistry", "true_false": {"question": "Water is wet?", "answer": "True"}}
{"id": 9, "category": "Biology", "true_false": {"question": "Only in ground truth?", "answer": "참"}}
"#;

const ALPHA: &str = r#"{"id": 1, "results": {"multiple_choice": {"model_answer": "b"}, "true_false": {"model_answer": "1"}, "short_answer": {"model_answer": "Newton"}}}
{"id": 2, "results": {"multiple_choice": {"model_answer": "b"}, "true_false": {"model_answer": "0"}}}
{"id": 3, "results": {"true_false": {"model_answer": "1"}}}
"#;

const BETA: &str = r#"{"id": 1, "results": {"true_false": {"model_answer": "0"}}}
{"id": 3, "results": {"true_false": {"model_answer": "1"}}}
{"id": 42, "results": {"true_false": {"model_answer": "1"}}}
"#;

fn runner(detailed: bool) -> EvaluationRunner {
    let scorer = Arc::new(UnavailableScorer::new("offline"));
    let engine = ScoreEngine::new(scorer.clone(), scorer, 8).unwrap();
    EvaluationRunner::new(engine, detailed)
}

fn setup(root: &Path) {
    fs::write(root.join("ground_truth.jsonl"), GROUND_TRUTH).unwrap();
    let results = root.join("results");
    fs::create_dir_all(&results).unwrap();
    fs::write(results.join("alpha.jsonl"), ALPHA).unwrap();
    fs::write(results.join("beta.jsonl"), BETA).unwrap();
    fs::write(results.join("notes.txt"), "ignored").unwrap();
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_batch_counts_only_common_identifiers() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    let out = dir.path().join("eval");

    let outcome = runner(true)
        .evaluate_batch(&dir.path().join("ground_truth.jsonl"), &dir.path().join("results"), &out)
        .await
        .unwrap();
    assert_eq!(outcome.evaluated, vec!["alpha", "beta"]);
    assert!(outcome.failed.is_empty());

    let alpha = read_json(&out.join("evaluation_alpha.json"));
    assert_eq!(alpha["summary"]["true_false"]["count"], 3);
    assert_eq!(alpha["summary"]["true_false"]["accuracy"], 1.0);
    assert_eq!(alpha["summary"]["multiple_choice"]["accuracy"], 0.5);
    assert_eq!(alpha["category_summary"]["physics"]["true_false"]["count"], 2);
    assert!(alpha["category_summary"].get("biology").is_none());

    let beta = read_json(&out.join("evaluation_beta.json"));
    assert_eq!(beta["summary"]["true_false"]["count"], 2);
    assert_eq!(beta["summary"]["true_false"]["accuracy"], 0.5);
    assert!(beta["summary"].get("multiple_choice").is_none());

    let short = &alpha["summary"]["short_answer"];
    assert_eq!(short["exact_match"], 1.0);
    assert!(short["bert_score_f1"].is_null());
    assert_eq!(short["unscored"]["bert_score_f1"], 1);
}

#[tokio::test]
async fn test_batch_resume_skips_existing_outputs() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    let out = dir.path().join("eval");
    fs::create_dir_all(&out).unwrap();

    let existing = "{\"summary\": {\"true_false\": {\"accuracy\": 0.25, \"count\": 4}}}";
    fs::write(out.join("evaluation_beta.json"), existing).unwrap();

    let gt = dir.path().join("ground_truth.jsonl");
    let results = dir.path().join("results");
    let outcome = runner(false).evaluate_batch(&gt, &results, &out).await.unwrap();
    assert_eq!(outcome.evaluated, vec!["alpha"]);
    assert_eq!(outcome.skipped, vec!["beta"]);
    assert_eq!(fs::read_to_string(out.join("evaluation_beta.json")).unwrap(), existing);

    let comprehensive = read_json(&out.join(COMPREHENSIVE_RESULTS_FILE));
    assert_eq!(comprehensive["beta"]["true_false"]["accuracy"], 0.25);
    assert_eq!(comprehensive["alpha"]["true_false"]["accuracy"], 1.0);

    let first = fs::read(out.join(COMPREHENSIVE_RESULTS_FILE)).unwrap();
    let alpha_first = fs::read(out.join("evaluation_alpha.json")).unwrap();
    let rerun = runner(false).evaluate_batch(&gt, &results, &out).await.unwrap();
    assert!(rerun.evaluated.is_empty());
    assert_eq!(rerun.skipped, vec!["alpha", "beta"]);
    assert_eq!(fs::read(out.join(COMPREHENSIVE_RESULTS_FILE)).unwrap(), first);
    assert_eq!(fs::read(out.join("evaluation_alpha.json")).unwrap(), alpha_first);
}

#[tokio::test]
async fn test_repeated_runs_are_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    let gt = dir.path().join("ground_truth.jsonl");
    let results = dir.path().join("results");

    for out in ["first", "second"] {
        runner(true)
            .evaluate_batch(&gt, &results, &dir.path().join(out))
            .await
            .unwrap();
    }
    for file in ["evaluation_alpha.json", "evaluation_beta.json", COMPREHENSIVE_RESULTS_FILE] {
        assert_eq!(
            fs::read(dir.path().join("first").join(file)).unwrap(),
            fs::read(dir.path().join("second").join(file)).unwrap(),
            "{} differs between runs",
            file
        );
    }
}

#[tokio::test]
async fn test_missing_results_dir_fails() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    let result = runner(false)
        .evaluate_batch(
            &dir.path().join("ground_truth.jsonl"),
            &dir.path().join("no-such-dir"),
            &dir.path().join("eval"),
        )
        .await;
    assert!(result.is_err());
    assert!(!dir.path().join("eval").join(COMPREHENSIVE_RESULTS_FILE).exists());
}

/// Backend answering from a fixed script, recording how often it was called
struct ScriptedBackend {
    replies: Mutex<VecDeque<&'static str>>,
    calls: Mutex<usize>,
}

impl ScriptedBackend {
    fn new(replies: &[&'static str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().copied().collect()),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl LLMProvider for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "org/scripted-7b"
    }

    async fn complete(&self, _request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
        *self.calls.lock().unwrap() += 1;
        match self.replies.lock().unwrap().pop_front() {
            Some(content) => Ok(CompletionResponse {
                content: content.to_string(),
                model: "org/scripted-7b".into(),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: "stop".into(),
                latency_ms: 0,
            }),
            None => Err(ProviderError::Api {
                status: 500,
                message: "script exhausted".into(),
            }),
        }
    }
}

fn generation_settings() -> GenerationConfig {
    GenerationConfig {
        retry_count: 0,
        retry_delay_ms: 1,
        max_retry_delay_ms: 1,
        ..GenerationConfig::default()
    }
}

#[tokio::test]
async fn test_generate_collect_evaluate() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    let gt_path = dir.path().join("ground_truth.jsonl");
    let dataset = load_ground_truth(&gt_path).unwrap();
    let store = ResultStore::new(dir.path().join("generation"));
    let kinds = [TaskKind::MultipleChoice];

    // Items 1 and 2 carry multiple_choice; the first reply is not a valid choice
    let backend = Arc::new(ScriptedBackend::new(&["I am not sure", "Answer: b", "정답: a"]));
    let generator = GenerationRunner::new(
        backend.clone(),
        store.clone(),
        generation_settings(),
        ExperimentVariant::Base,
    );
    let stats = generator.run(&dataset, &kinds, None).await.unwrap();
    assert_eq!(stats.generated, 2);
    assert_eq!(backend.calls(), 3);

    // A second run resumes from the artifacts without calling the backend
    let idle = Arc::new(ScriptedBackend::new(&[]));
    let resumed = GenerationRunner::new(idle.clone(), store.clone(), generation_settings(), ExperimentVariant::Base)
        .run(&dataset, &kinds, None)
        .await
        .unwrap();
    assert_eq!(idle.calls(), 0);
    assert_eq!(resumed.generated, 0);
    assert_eq!(resumed.resumed, 2);

    let predictions = dir.path().join("collected").join("org_scripted-7b.jsonl");
    let written = store
        .collect(ExperimentVariant::Base, "org/scripted-7b", &predictions)
        .unwrap();
    assert_eq!(written, 2);

    let (_, output) = runner(false)
        .evaluate_single(&gt_path, &predictions, &dir.path().join("eval"))
        .await
        .unwrap();
    let mc = &output.summary[&TaskKind::MultipleChoice];
    assert_eq!(mc.count, 2);
    assert_eq!(mc.metric("accuracy"), Some(1.0));
    assert!(dir.path().join("eval").join("evaluation_org_scripted-7b.json").exists());
}
