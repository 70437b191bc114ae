//! Classifier engine abstraction
//!
//! The pipeline talks to the learning backend only through these two traits,
//! so the orchestrator, evaluator and HTTP service stay independent of Burn.

pub mod burn_engine;

use std::path::PathBuf;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::artifact::ModelArtifact;
use crate::dataset::{LabelMap, Sample};
use crate::inference::Prediction;
use crate::model::Architecture;
use crate::utils::error::{KanjiError, Result};

pub use burn_engine::{BurnEngine, BurnPredictor};

/// Hyperparameters and caching switches for one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingOptions {
    pub architecture: Architecture,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Side length images are resized to before entering the network
    pub input_size: usize,
    /// Read back cached preprocessed tensors for the train set
    pub reuse_train_cache: bool,
    /// Read back cached preprocessed tensors for the validation set
    pub reuse_validation_cache: bool,
    /// Location of the feature cache; `None` disables caching entirely
    pub cache_dir: Option<PathBuf>,
    /// Seed for the per-epoch shuffle of the train set
    pub seed: u64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            architecture: Architecture::default(),
            epochs: 10,
            batch_size: 32,
            learning_rate: 1e-3,
            input_size: 64,
            reuse_train_cache: true,
            reuse_validation_cache: true,
            cache_dir: None,
            seed: 42,
        }
    }
}

impl TrainingOptions {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(KanjiError::Config("epochs must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(KanjiError::Config("batch_size must be at least 1".to_string()));
        }
        // Four 2x2 poolings need at least 16 pixels per side
        if self.input_size < 16 {
            return Err(KanjiError::Config(format!(
                "input_size must be at least 16, got {}",
                self.input_size
            )));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(KanjiError::Config(
                "learning_rate must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Something that maps an image to one of the trained labels.
///
/// Implementations may keep internal buffers, so callers sharing one
/// predictor across threads must serialise access.
pub trait LabelPredictor: Send {
    fn predict(&self, image: &DynamicImage) -> Result<Prediction>;

    /// Labels this predictor can return
    fn labels(&self) -> &LabelMap;
}

/// Train and load capability backing the pipeline
pub trait ClassifierEngine: Send + Sync {
    /// Fit a classifier on `train`, reporting accuracy on `validation` as it goes
    fn train(
        &self,
        train: &[Sample],
        validation: &[Sample],
        labels: &LabelMap,
        options: &TrainingOptions,
    ) -> Result<ModelArtifact>;

    fn load_predictor(&self, artifact: &ModelArtifact) -> Result<Box<dyn LabelPredictor>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_valid() {
        assert!(TrainingOptions::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_options() {
        let zero_epochs = TrainingOptions {
            epochs: 0,
            ..TrainingOptions::default()
        };
        assert!(zero_epochs.validate().is_err());

        let tiny = TrainingOptions {
            input_size: 8,
            ..TrainingOptions::default()
        };
        assert!(tiny.validate().is_err());

        let bad_lr = TrainingOptions {
            learning_rate: f64::NAN,
            ..TrainingOptions::default()
        };
        assert!(bad_lr.validate().is_err());
    }

    #[test]
    fn test_options_from_partial_toml() {
        let options: TrainingOptions = toml::from_str("epochs = 3\narchitecture = \"wide\"").unwrap();
        assert_eq!(options.epochs, 3);
        assert_eq!(options.architecture, Architecture::Wide);
        assert_eq!(options.batch_size, 32);
    }
}
