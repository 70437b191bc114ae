//! # Kanji Classifier
//!
//! Directory-labelled image classification built on the Burn framework.
//!
//! ## Modules
//!
//! - `dataset`: Directory scanning, label keying, train/validation/test splits and Burn batching
//! - `model`: CNN architecture built with Burn
//! - `engine`: The train/predict capability behind the pipeline
//! - `artifact`: The persisted `KanjiClassifier.zip`
//! - `training`: Orchestrates a full training run
//! - `inference`: Upload normalisation and the shared predictor service
//! - `evaluation`: Accuracy over the held-out test split
//! - `config`: TOML-backed application configuration
//! - `utils`: Logging and error handling
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kanji_classifier::{AppConfig, BurnEngine, TrainingBackend, TrainingOrchestrator};
//!
//! let config = AppConfig::for_project(".");
//! let engine = Arc::new(BurnEngine::<TrainingBackend>::default());
//! let summary = TrainingOrchestrator::new(config, engine).run()?;
//! println!("{summary}");
//! ```

pub mod artifact;
pub mod backend;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod evaluation;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use artifact::{ArtifactSchema, ModelArtifact};
pub use backend::TrainingBackend;
pub use config::AppConfig;
pub use dataset::{DatasetSplits, LabelMap, Sample, ScanOptions, SplitConfig};
pub use engine::{BurnEngine, ClassifierEngine, LabelPredictor, TrainingOptions};
pub use evaluation::{evaluate, run_evaluation, EvaluationReport};
pub use inference::{InferenceService, Prediction};
pub use model::{Architecture, KanjiClassifier, KanjiClassifierConfig};
pub use training::{TrainingOrchestrator, TrainingSummary};
pub use utils::error::{KanjiError, Result};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
