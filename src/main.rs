//! Kanji Classifier CLI
//!
//! Trains, evaluates and queries the directory-labelled image classifier
//! without going through the HTTP server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use kanji_classifier::backend::{backend_name, TrainingBackend};
use kanji_classifier::dataset::{load_samples, DatasetStats, DatasetSplits};
use kanji_classifier::utils::logging::{init_logging, LogConfig};
use kanji_classifier::{
    run_evaluation, AppConfig, Architecture, BurnEngine, ClassifierEngine, InferenceService,
    TrainingOrchestrator,
};

/// Kanji image classification
///
/// Trains a CNN on `<assets>/<label>/<image>` folders and packages it as
/// `KanjiClassifier.zip`.
#[derive(Parser, Debug)]
#[command(name = "kanji_classifier")]
#[command(version)]
#[command(about = "Directory-labelled Kanji classification with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Optional TOML configuration file
    #[arg(short, long, global = true, env = "KANJI_CONFIG")]
    config: Option<PathBuf>,

    /// Project root holding `assets/` and the artifact
    #[arg(short, long, global = true, env = "KANJI_PROJECT_DIR")]
    project_dir: Option<PathBuf>,

    /// Artifact location, relative to the project root unless absolute
    #[arg(short, long, global = true, env = "KANJI_ARTIFACT")]
    artifact: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train on the assets directory and overwrite the artifact
    Train {
        /// Number of training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Batch size for training
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Learning rate
        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Backbone preset (compact, standard, wide)
        #[arg(long)]
        architecture: Option<Architecture>,

        /// Square input resolution fed to the network
        #[arg(long)]
        input_size: Option<usize>,

        /// Seed for the dataset split
        #[arg(long, conflicts_with = "random_seed")]
        seed: Option<u64>,

        /// Draw a fresh split seed from the OS
        #[arg(long, default_value = "false")]
        random_seed: bool,

        /// Neither read nor write the feature cache
        #[arg(long, default_value = "false")]
        no_cache: bool,
    },

    /// Evaluate the saved artifact on the held-out test split
    Evaluate {
        /// Maximum number of test images to predict
        #[arg(short, long)]
        max_samples: Option<usize>,
    },

    /// Classify a single image with the saved artifact
    Classify {
        /// Path to the input image
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Show dataset statistics
    Stats {
        /// Show the train/validation/test split sizes
        #[arg(long, default_value = "false")]
        show_splits: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_sources(
        cli.config.as_deref(),
        cli.project_dir.clone(),
        cli.artifact.clone(),
    )
    .context("Failed to load configuration")?;

    if cli.verbose {
        config.logging = LogConfig::verbose();
    }
    init_logging(&config.logging)?;

    print_banner();
    info!("Using backend: {}", backend_name());

    match cli.command {
        Commands::Train {
            epochs,
            batch_size,
            learning_rate,
            architecture,
            input_size,
            seed,
            random_seed,
            no_cache,
        } => {
            let training = &mut config.training;
            if let Some(epochs) = epochs {
                training.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                training.batch_size = batch_size;
            }
            if let Some(learning_rate) = learning_rate {
                training.learning_rate = learning_rate;
            }
            if let Some(architecture) = architecture {
                training.architecture = architecture;
            }
            if let Some(input_size) = input_size {
                training.input_size = input_size;
            }
            if no_cache {
                training.reuse_train_cache = false;
                training.reuse_validation_cache = false;
            }
            if random_seed {
                config.split.seed = None;
            } else if seed.is_some() {
                config.split.seed = seed;
            }
            config.validate()?;
            cmd_train(config)
        }
        Commands::Evaluate { max_samples } => {
            if let Some(max_samples) = max_samples {
                config.evaluation.max_samples = max_samples;
            }
            config.validate()?;
            cmd_evaluate(&config)
        }
        Commands::Classify { input } => cmd_classify(&config, &input),
        Commands::Stats { show_splits } => cmd_stats(&config, show_splits),
    }
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════╗
 ║   Kanji Classifier                           ║
 ║   Image classification with Burn + Rust      ║
 ╚══════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_train(config: AppConfig) -> Result<()> {
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Assets:        {:?}", config.assets_dir());
    println!("  Artifact:      {:?}", config.artifact_path());
    println!("  Architecture:  {}", config.training.architecture);
    println!("  Epochs:        {}", config.training.epochs);
    println!("  Batch size:    {}", config.training.batch_size);
    println!("  Learning rate: {}", config.training.learning_rate);
    println!("  Input size:    {}", config.training.input_size);
    match config.split.seed {
        Some(seed) => println!("  Split seed:    {}", seed),
        None => println!("  Split seed:    random"),
    }
    println!();

    let engine = Arc::new(BurnEngine::<TrainingBackend>::default());
    let summary = TrainingOrchestrator::new(config, engine)
        .run()
        .context("Training failed")?;

    println!();
    println!("{}", "Training complete!".green().bold());
    println!("{}", summary);
    Ok(())
}

fn cmd_evaluate(config: &AppConfig) -> Result<()> {
    let artifact_path = config.artifact_path();
    if !artifact_path.exists() {
        println!(
            "{} No trained model at {:?}. Run `kanji_classifier train` first.",
            "Error:".red(),
            artifact_path
        );
        return Ok(());
    }

    let engine = BurnEngine::<TrainingBackend>::default();
    let report = run_evaluation(config, &engine).context("Evaluation failed")?;

    println!();
    println!("{}", "Evaluation Results:".cyan().bold());
    println!("  {}", report);
    if report.skipped > 0 {
        println!(
            "  {} {} test images could not be read and were skipped",
            "Warning:".yellow(),
            report.skipped
        );
    }
    Ok(())
}

fn cmd_classify(config: &AppConfig, input: &Path) -> Result<()> {
    let engine = BurnEngine::<TrainingBackend>::default();
    let service = load_service(&engine, config)?;

    let bytes = std::fs::read(input).with_context(|| format!("Failed to read {:?}", input))?;
    let prediction = service
        .classify_bytes(&bytes)
        .with_context(|| format!("Failed to classify {:?}", input))?;

    println!("{}", "Prediction:".cyan().bold());
    println!("  Image:      {}", input.display());
    println!("  Label:      {}", prediction.predicted_label.green().bold());
    println!("  Confidence: {:.1}%", prediction.confidence * 100.0);
    Ok(())
}

fn load_service(engine: &dyn ClassifierEngine, config: &AppConfig) -> Result<InferenceService> {
    let artifact_path = config.artifact_path();
    let service = InferenceService::from_artifact_path(engine, &artifact_path)
        .with_context(|| format!("Failed to load model from {:?}", artifact_path))?;
    info!("Loaded model with {} labels", service.labels().len());
    Ok(service)
}

fn cmd_stats(config: &AppConfig, show_splits: bool) -> Result<()> {
    let assets_dir = config.assets_dir();
    info!("Computing dataset statistics for: {:?}", assets_dir);

    if !assets_dir.exists() {
        println!(
            "{} Assets directory not found: {:?}",
            "Error:".red(),
            assets_dir
        );
        println!();
        println!("Expected layout: <assets>/<label>/<image>");
        return Ok(());
    }

    let samples = load_samples(&assets_dir, &config.scan)?;
    let stats = DatasetStats::from_samples(&samples);
    println!("{}", stats);

    if show_splits && !samples.is_empty() {
        let splits = DatasetSplits::from_samples(samples, &config.split)?;
        println!("{}", "Split Configuration:".yellow().bold());
        println!("{}", splits.stats());
    }
    Ok(())
}
