//! Training orchestration
//!
//! Wires the dataset scan, label keying and split into the engine, then
//! persists the resulting artifact. Nothing is written unless every step
//! before the save succeeds.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::AppConfig;
use crate::dataset::{load_samples, DatasetSplits, DatasetStats, LabelMap};
use crate::engine::ClassifierEngine;
use crate::utils::error::{KanjiError, Result};
use crate::utils::format_duration;

/// What a completed training run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub total_samples: usize,
    pub train_samples: usize,
    pub validation_samples: usize,
    pub test_samples: usize,
    pub num_labels: usize,
    pub split_seed: u64,
    pub validation_accuracy: Option<f64>,
    pub artifact_path: PathBuf,
    pub duration_secs: f64,
}

impl std::fmt::Display for TrainingSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Training Summary:")?;
        writeln!(f, "  Samples: {} ({} labels)", self.total_samples, self.num_labels)?;
        writeln!(
            f,
            "  Split: {} train / {} validation / {} test (seed {})",
            self.train_samples, self.validation_samples, self.test_samples, self.split_seed
        )?;
        match self.validation_accuracy {
            Some(acc) => writeln!(f, "  Validation accuracy: {:.2}%", acc * 100.0)?,
            None => writeln!(f, "  Validation accuracy: n/a")?,
        }
        writeln!(f, "  Artifact: {}", self.artifact_path.display())?;
        write!(
            f,
            "  Duration: {}",
            format_duration(Duration::from_secs_f64(self.duration_secs))
        )
    }
}

/// Runs the full scan, split, train, save pipeline
#[derive(Clone)]
pub struct TrainingOrchestrator {
    config: AppConfig,
    engine: Arc<dyn ClassifierEngine>,
}

impl TrainingOrchestrator {
    pub fn new(config: AppConfig, engine: Arc<dyn ClassifierEngine>) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Train on the configured assets and overwrite the artifact
    pub fn run(&self) -> Result<TrainingSummary> {
        self.run_inner().map_err(|e| {
            error!(
                "Training run over {:?} failed: {}",
                self.config.assets_dir(),
                e
            );
            e
        })
    }

    fn run_inner(&self) -> Result<TrainingSummary> {
        let started = Instant::now();
        let assets_dir = self.config.assets_dir();

        let samples = load_samples(&assets_dir, &self.config.scan)?;
        if samples.is_empty() {
            return Err(KanjiError::Training(format!(
                "no samples found under {}",
                assets_dir.display()
            )));
        }
        info!("{}", DatasetStats::from_samples(&samples));

        let labels = LabelMap::from_samples(&samples);
        let total_samples = samples.len();

        let splits = DatasetSplits::from_samples(samples, &self.config.split)?;
        info!("{}", splits.stats());

        let options = self.config.training_options();
        let mut artifact =
            self.engine
                .train(&splits.train, &splits.validation, &labels, &options)?;
        artifact.schema.split_seed = splits.seed;
        artifact.schema.validate()?;

        let artifact_path = self.config.artifact_path();
        artifact.save(&artifact_path)?;

        let summary = TrainingSummary {
            total_samples,
            train_samples: splits.train.len(),
            validation_samples: splits.validation.len(),
            test_samples: splits.test.len(),
            num_labels: labels.len(),
            split_seed: splits.seed,
            validation_accuracy: artifact.schema.validation_accuracy,
            artifact_path,
            duration_secs: started.elapsed().as_secs_f64(),
        };
        info!("{}", summary);
        Ok(summary)
    }
}
