//! Beverage quality CLI module
//!
//! Command-line interface for splitting, training, prediction and raw data
//! diagnostics.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::analysis::{analyze, augment, AugmentConfig};
use crate::artifacts::ArtifactStore;
use crate::config::{PipelineConfig, WineObjective};
use crate::dataset::DatasetDescriptor;
use crate::inference::InferenceService;
use crate::pipeline::{TrainingPipeline, TrainingReport};
use crate::preprocessing::FeatureRecord;
use crate::utils::{DataLoader, DataSaver};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString { s.truecolor(100, 210, 120) }
fn warn(s: &str) -> ColoredString { s.truecolor(230, 180, 80) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: impl std::fmt::Display) {
    println!("  {:<18} {}", muted(key), val.to_string().white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "beverage-quality")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Grade milk, wine and water quality from physicochemical measurements")]
#[command(long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory holding the raw <dataset>.csv files
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Directory receiving the split files
    #[arg(long, global = true)]
    pub split_dir: Option<PathBuf>,

    /// Directory holding artifact bundles and training reports
    #[arg(long, global = true)]
    pub artifact_dir: Option<PathBuf>,

    /// Also write daily-rolling log files here
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Persist the raw/train/test split of a dataset
    Split {
        /// Dataset name (milk, wine, water)
        #[arg(short, long)]
        dataset: String,
    },

    /// Split, preprocess, select a model and save the artifact bundle
    Train {
        /// Dataset name (milk, wine, water)
        #[arg(short, long)]
        dataset: String,

        /// JSON pipeline configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Train the wine model as a regressor on the quality score
        #[arg(long)]
        regression: bool,
    },

    /// Predict the quality label of one record
    Predict {
        /// Dataset name (milk, wine, water)
        #[arg(short, long)]
        dataset: String,

        /// Feature value as name=value; repeat for every feature
        #[arg(short, long = "feature")]
        features: Vec<String>,

        /// Feature record as a flat JSON object
        #[arg(long, conflicts_with = "features")]
        json: Option<String>,
    },

    /// Report duplicates, conflicting near-duplicates and target leakage
    Analyze {
        /// Input CSV file
        #[arg(short, long)]
        input: PathBuf,

        /// Target column name
        #[arg(short, long)]
        target: String,
    },

    /// Write a larger noisy copy of a table
    Augment {
        /// Input CSV file
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,

        /// Target column name, never perturbed
        #[arg(short, long)]
        target: String,

        /// Rows in the output table
        #[arg(long, default_value = "1000")]
        rows: usize,

        /// Noise std as a fraction of each column's std
        #[arg(long, default_value = "0.1")]
        noise: f64,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

impl GlobalArgs {
    /// Base configuration with the directory overrides applied
    pub fn pipeline_config(&self, file: Option<&Path>) -> anyhow::Result<PipelineConfig> {
        let mut config = match file {
            Some(path) => PipelineConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => PipelineConfig::new(),
        };
        if let Some(dir) = &self.data_dir {
            config = config.with_data_dir(dir);
        }
        if let Some(dir) = &self.split_dir {
            config = config.with_split_dir(dir);
        }
        if let Some(dir) = &self.artifact_dir {
            config = config.with_artifact_dir(dir);
        }
        Ok(config)
    }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

pub fn cmd_split(global: &GlobalArgs, dataset: &str) -> anyhow::Result<()> {
    let descriptor = DatasetDescriptor::from_name(dataset)?;
    let pipeline = TrainingPipeline::new(global.pipeline_config(None)?)?;

    section(&format!("Split {}", descriptor.name()));
    step_run("Splitting");
    let outcome = pipeline.splitter().split(&descriptor)?;
    if outcome.reused {
        step_done("already present");
    } else {
        step_done(&format!("{:?}", outcome.elapsed));
    }
    kv("Train", outcome.train_path.display());
    kv("Test", outcome.test_path.display());
    if let (Some(train), Some(test)) = (outcome.train_rows, outcome.test_rows) {
        kv("Rows", format!("{} train / {} test", train, test));
    }
    println!();
    Ok(())
}

pub fn cmd_train(global: &GlobalArgs, dataset: &str, config: Option<&Path>, regression: bool) -> anyhow::Result<()> {
    let descriptor = DatasetDescriptor::from_name(dataset)?;
    let mut config = global.pipeline_config(config)?;
    if regression {
        config = config.with_wine_objective(WineObjective::Regression);
    }
    let pipeline = TrainingPipeline::new(config)?;

    section(&format!("Train {}", descriptor.name()));
    step_run("Searching models");
    let start = Instant::now();
    let report = pipeline
        .run(&descriptor)
        .with_context(|| format!("training {}", descriptor.name()))?;
    step_done(&format!("{:?}", start.elapsed()));

    print_training_report(&report);
    Ok(())
}

fn print_training_report(report: &TrainingReport) {
    let selection = &report.selection;
    println!();
    kv("Model", selection.model_name.cyan());
    kv("Test accuracy", format!("{:.4}", selection.test_accuracy).bold());
    kv("Weighted F1", format!("{:.4}", selection.weighted_f1));
    kv("Rows", format!("{} train / {} test", report.train_rows, report.test_rows));
    kv("Bundle version", report.bundle_version);
    kv("Report", report.report_path.display());

    if !selection.candidate_scores.is_empty() {
        section("Candidates");
        for score in &selection.candidate_scores {
            let params = score.best_params.as_deref().unwrap_or("");
            println!(
                "  {:<28} {}  {}",
                score.candidate,
                format!("{:.4}", score.mean_cv_accuracy).white(),
                dim(params)
            );
        }
    }
    for failure in &selection.failures {
        println!("  {} {}", warn("!"), failure);
    }

    section("Classification report");
    for line in selection.classification_report.lines() {
        println!("  {}", line);
    }
    println!();
}

pub fn cmd_predict(
    global: &GlobalArgs,
    dataset: &str,
    features: &[String],
    json: Option<&str>,
) -> anyhow::Result<()> {
    let descriptor = DatasetDescriptor::from_name(dataset)?;
    let config = global.pipeline_config(None)?;
    let record = match json {
        Some(json) => FeatureRecord::from_json(json)?,
        None => FeatureRecord::from_pairs(features)?,
    };

    let service = InferenceService::try_new(descriptor, &ArtifactStore::new(config.artifact_dir))
        .context("loading artifact bundle")?;
    let prediction = service.predict(&record)?;

    section("Prediction");
    kv("Label", prediction.label.bold());
    match prediction.confidence {
        Some(c) => kv("Confidence", format!("{:.3}", c)),
        None => kv("Confidence", dim("n/a")),
    }
    kv("Raw label", &prediction.raw_label);
    println!();
    Ok(())
}

pub fn cmd_analyze(input: &Path, target: &str) -> anyhow::Result<()> {
    let df = DataLoader::new().load_csv(input)?;
    let report = analyze(&df, target)?;

    section("Data analysis");
    kv("Rows", report.rows);
    kv("Duplicate rows", report.duplicate_rows);
    kv("Near-duplicates", report.conflicting_near_duplicates);
    if report.leakage_features.is_empty() {
        kv("Leakage", ok("none"));
    } else {
        kv("Leakage", warn(&report.leakage_features.join(", ")));
    }
    if let Some(note) = &report.note {
        println!("  {}", dim(note));
    }
    println!();
    Ok(())
}

pub fn cmd_augment(
    input: &Path,
    output: &Path,
    target: &str,
    config: &AugmentConfig,
) -> anyhow::Result<()> {
    section("Augment");
    step_run("Generating rows");
    let start = Instant::now();
    let df = DataLoader::new().load_csv(input)?;
    let mut augmented = augment(&df, target, config)?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    DataSaver::save_csv(&mut augmented, output)?;
    step_done(&format!("{} rows in {:?}", augmented.height(), start.elapsed()));
    kv("Output", output.display());
    println!();
    Ok(())
}
