//! Scholar Benchmark CLI

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scholar_benchmark::{
    analysis::{ComparisonReporter, ScoreEngine},
    config::Config,
    providers::create_provider,
    reporting::{
        json_array_to_jsonl, model_name, print_console_summary, render_text_report,
        write_comparison_report, ResultStore, COMPREHENSIVE_RESULTS_FILE, EVALUATION_REPORT_FILE,
        MODEL_COMPARISON_FILE,
    },
    runner::{ConsoleProgress, EvaluationRunner, GenerationRunner},
    tasks::{load_ground_truth, parse_task_list, ExperimentVariant, TaskKind},
};

#[derive(Parser)]
#[command(name = "scholar-benchmark")]
#[command(about = "Answer generation and scoring for scholarly QA and summarization benchmarks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate answers for every item of a dataset, resuming saved work
    Generate {
        /// Dataset JSONL file (default: paths.ground_truth_file)
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Model identifier passed to the backend (default: provider.model)
        #[arg(short, long)]
        model: Option<String>,

        /// Prompt variant
        #[arg(long, value_enum, default_value = "base")]
        variant: ExperimentVariant,

        /// Comma-separated task kinds (default: all)
        #[arg(short, long)]
        tasks: Option<String>,

        /// Only process the first N items
        #[arg(short, long)]
        limit: Option<usize>,

        /// Artifact directory (default: paths.generation_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge per-item artifacts (or a JSON array file) into one predictions JSONL
    Collect {
        /// Model whose artifacts are collected (default: provider.model)
        #[arg(short, long)]
        model: Option<String>,

        /// Prompt variant of the artifacts
        #[arg(long, value_enum, default_value = "base")]
        variant: ExperimentVariant,

        /// JSON array result file to convert instead of an artifact directory
        #[arg(long)]
        json_array: Option<PathBuf>,

        /// Output predictions file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Evaluate one model's predictions
    Evaluate {
        /// Ground truth JSONL file
        #[arg(short, long)]
        ground_truth: Option<PathBuf>,

        /// Predictions JSONL file
        #[arg(short, long)]
        predictions: PathBuf,

        /// Output directory for the evaluation file
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Include per-category summaries and raw value sequences
        #[arg(long)]
        detailed: bool,
    },

    /// Evaluate every predictions file in a directory, skipping finished models
    Batch {
        #[command(flatten)]
        paths: BatchPaths,
    },

    /// Run a batch evaluation, then compare models and write the text report
    Report {
        #[command(flatten)]
        paths: BatchPaths,
    },

    /// Generate sample configuration
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config/benchmark.toml")]
        output: PathBuf,
    },

    /// Print the effective configuration and the metrics of each task kind
    Config,

    /// Check configuration values and required input paths
    Validate,
}

#[derive(clap::Args)]
struct BatchPaths {
    /// Ground truth JSONL file
    #[arg(short, long)]
    ground_truth: Option<PathBuf>,

    /// Directory of predictions JSONL files
    #[arg(short, long)]
    results_dir: Option<PathBuf>,

    /// Output directory for evaluation files
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Include per-category summaries and raw value sequences
    #[arg(long)]
    detailed: bool,
}

impl BatchPaths {
    /// Resolve flags over environment over file configuration
    fn apply(self, config: &mut Config) {
        if let Some(path) = self.ground_truth {
            config.paths.ground_truth_file = path;
        }
        if let Some(path) = self.results_dir {
            config.paths.results_dir = path;
        }
        if let Some(path) = self.output_dir {
            config.paths.output_dir = path;
        }
        config.evaluation.detailed |= self.detailed;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("scholar_benchmark=debug,info")
    } else {
        EnvFilter::new("scholar_benchmark=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load_or_default(),
    }
    .with_env_overrides();

    match cli.command {
        Commands::Generate {
            dataset,
            model,
            variant,
            tasks,
            limit,
            output,
        } => {
            generate(config, dataset, model, variant, tasks, limit, output).await?;
        }

        Commands::Collect {
            model,
            variant,
            json_array,
            output,
        } => {
            collect(&config, model, variant, json_array, output)?;
        }

        Commands::Evaluate {
            ground_truth,
            predictions,
            output_dir,
            detailed,
        } => {
            let mut config = config;
            if let Some(path) = ground_truth {
                config.paths.ground_truth_file = path;
            }
            if let Some(path) = output_dir {
                config.paths.output_dir = path;
            }
            config.evaluation.detailed |= detailed;
            evaluate(&config, &predictions).await?;
        }

        Commands::Batch { paths } => {
            let mut config = config;
            paths.apply(&mut config);
            batch(&config).await?;
        }

        Commands::Report { paths } => {
            let mut config = config;
            paths.apply(&mut config);
            report(&config).await?;
        }

        Commands::InitConfig { output } => {
            init_config(output)?;
        }

        Commands::Config => {
            show_config(&config)?;
        }

        Commands::Validate => {
            validate(&config);
        }
    }

    Ok(())
}

/// Print a diagnostic and exit when a required input is missing
fn require_path(path: &Path, what: &str) {
    if !path.exists() {
        eprintln!("Error: {} not found: {}", what, path.display());
        std::process::exit(1);
    }
}

async fn generate(
    config: Config,
    dataset: Option<PathBuf>,
    model: Option<String>,
    variant: ExperimentVariant,
    tasks: Option<String>,
    limit: Option<usize>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    let dataset_path = dataset.unwrap_or_else(|| config.paths.ground_truth_file.clone());
    require_path(&dataset_path, "Dataset file");

    let kinds = match tasks {
        Some(list) => parse_task_list(&list)?,
        None => TaskKind::all(),
    };
    if kinds.is_empty() {
        eprintln!("Error: No task kinds selected");
        std::process::exit(1);
    }

    let dataset = load_ground_truth(&dataset_path)?;
    let provider = create_provider(&config, model.as_deref())?;
    let store = ResultStore::new(output.unwrap_or_else(|| config.paths.generation_dir.clone()));

    println!("=== Answer Generation ===");
    println!("Dataset: {} ({} items)", dataset_path.display(), dataset.len());
    println!("Provider: {} / {}", provider.name(), provider.default_model());
    println!("Variant: {}", variant);
    println!(
        "Tasks: {}",
        kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
    );
    println!();

    let runner = GenerationRunner::new(provider, store.clone(), config.generation.clone(), variant)
        .with_progress(Arc::new(ConsoleProgress));
    let stats = runner.run(&dataset, &kinds, limit).await?;

    println!("\n=== Generation Summary ===");
    println!("Items processed: {}", stats.items);
    println!("Answers generated: {}", stats.generated);
    println!("Answers resumed: {}", stats.resumed);
    println!("Failures recorded: {}", stats.failed);
    println!(
        "Artifacts: {}",
        store.artifact_dir(variant, runner.model()).display()
    );
    Ok(())
}

fn collect(
    config: &Config,
    model: Option<String>,
    variant: ExperimentVariant,
    json_array: Option<PathBuf>,
    output: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let written = match json_array {
        Some(input) => {
            require_path(&input, "Result file");
            json_array_to_jsonl(&input, &output)?
        }
        None => {
            let model = model.unwrap_or_else(|| config.provider.model.clone());
            let store = ResultStore::new(config.paths.generation_dir.clone());
            require_path(&store.artifact_dir(variant, &model), "Artifact directory");
            store.collect(variant, &model, &output)?
        }
    };

    println!("Wrote {} records to: {}", written, output.display());
    Ok(())
}

fn evaluation_runner(config: &Config) -> Result<EvaluationRunner, Box<dyn std::error::Error>> {
    config.validate()?;
    let engine = ScoreEngine::from_config(config)?;
    Ok(EvaluationRunner::new(engine, config.evaluation.detailed))
}

async fn evaluate(config: &Config, predictions: &Path) -> Result<(), Box<dyn std::error::Error>> {
    require_path(&config.paths.ground_truth_file, "Ground truth file");
    require_path(predictions, "Predictions file");

    let runner = evaluation_runner(config)?;
    let (path, output) = runner
        .evaluate_single(&config.paths.ground_truth_file, predictions, &config.paths.output_dir)
        .await?;

    print_console_summary(&model_name(predictions), &output.summary);
    println!("\nEvaluation written to: {}", path.display());
    Ok(())
}

async fn run_batch(
    config: &Config,
) -> Result<scholar_benchmark::runner::BatchOutcome, Box<dyn std::error::Error>> {
    require_path(&config.paths.ground_truth_file, "Ground truth file");
    require_path(&config.paths.results_dir, "Results directory");

    let runner = evaluation_runner(config)?;
    let outcome = runner
        .evaluate_batch(
            &config.paths.ground_truth_file,
            &config.paths.results_dir,
            &config.paths.output_dir,
        )
        .await?;

    println!("\n=== Batch Evaluation ===");
    println!("Evaluated: {}", outcome.evaluated.len());
    println!("Skipped (already evaluated): {}", outcome.skipped.len());
    for (model, error) in &outcome.failed {
        println!("Failed: {} ({})", model, error);
    }
    println!(
        "Comprehensive results: {}",
        config.paths.output_dir.join(COMPREHENSIVE_RESULTS_FILE).display()
    );
    Ok(outcome)
}

async fn batch(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = run_batch(config).await?;
    for model in &outcome.evaluated {
        if let Some(summary) = outcome.summaries.get(model) {
            print_console_summary(model, summary);
        }
    }
    Ok(())
}

async fn report(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = run_batch(config).await?;
    if outcome.summaries.is_empty() {
        eprintln!("Error: No evaluated models to compare");
        std::process::exit(1);
    }

    let comparison = ComparisonReporter::compare(&outcome.summaries);
    write_comparison_report(&config.paths.output_dir, &comparison)?;

    println!();
    print!("{}", render_text_report(&comparison));
    println!(
        "\nComparison written to: {}",
        config.paths.output_dir.join(MODEL_COMPARISON_FILE).display()
    );
    println!(
        "Report written to: {}",
        config.paths.output_dir.join(EVALUATION_REPORT_FILE).display()
    );
    Ok(())
}

fn init_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    // Ensure parent directory exists
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    config.save_toml(&output)?;
    println!("Configuration written to: {}", output.display());
    Ok(())
}

fn show_config(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Effective Configuration ===\n");
    print!("{}", toml::to_string_pretty(config)?);

    println!("\n=== Metrics by Task ===");
    println!("{:-<50}", "");
    for kind in TaskKind::all() {
        println!("{:<18} {}", kind.as_str(), kind.metric_names().join(", "));
    }
    Ok(())
}

fn validate(config: &Config) {
    let mut problems = Vec::new();
    if let Err(e) = config.validate() {
        problems.push(e.to_string());
    }
    let required = [
        (&config.paths.ground_truth_file, "Ground truth file"),
        (&config.paths.results_dir, "Results directory"),
    ];
    for (path, what) in required {
        if !path.exists() {
            problems.push(format!("{} not found: {}", what, path.display()));
        }
    }

    if problems.is_empty() {
        println!("Configuration is valid");
        return;
    }
    for problem in &problems {
        eprintln!("Error: {}", problem);
    }
    std::process::exit(1);
}
