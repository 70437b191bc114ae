//! Burn implementation of the classifier engine
//!
//! A plain training loop (Adam + cross-entropy) over preprocessed batches,
//! with validation accuracy reported after every epoch.

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::{AutodiffModule, Module},
    nn::loss::CrossEntropyLossConfig,
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion,
    },
};
use chrono::Utc;
use image::DynamicImage;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactSchema, ModelArtifact, FORMAT_VERSION};
use crate::dataset::burn_dataset::image_to_chw;
use crate::dataset::{
    load_encoded, FeatureCache, KanjiBatch, KanjiBatcher, KanjiBurnDataset, LabelMap, Sample,
};
use crate::inference::Prediction;
use crate::model::{KanjiClassifier, KanjiClassifierConfig};
use crate::utils::error::{KanjiError, Result};
use crate::utils::format_duration;

use super::{ClassifierEngine, LabelPredictor, TrainingOptions};

/// Weight recorder shared by training and loading
type WeightsRecorder = NamedMpkBytesRecorder<FullPrecisionSettings>;

/// Engine training `KanjiClassifier` on an autodiff backend
#[derive(Debug, Clone)]
pub struct BurnEngine<B: AutodiffBackend> {
    device: B::Device,
}

impl<B: AutodiffBackend> BurnEngine<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

impl<B: AutodiffBackend> Default for BurnEngine<B> {
    fn default() -> Self {
        Self::new(B::Device::default())
    }
}

impl<B: AutodiffBackend> ClassifierEngine for BurnEngine<B> {
    fn train(
        &self,
        train: &[Sample],
        validation: &[Sample],
        labels: &LabelMap,
        options: &TrainingOptions,
    ) -> Result<ModelArtifact> {
        options.validate()?;
        if labels.is_empty() {
            return Err(KanjiError::Training("no labels to train on".to_string()));
        }
        if train.is_empty() {
            return Err(KanjiError::Training("training split is empty".to_string()));
        }

        let started = std::time::Instant::now();
        let input_size = options.input_size;

        let cache = options
            .cache_dir
            .as_ref()
            .map(FeatureCache::open)
            .transpose()?;
        let train_cache = cache.as_ref().filter(|_| options.reuse_train_cache);
        let validation_cache = cache.as_ref().filter(|_| options.reuse_validation_cache);

        let (train_dataset, train_usage) =
            KanjiBurnDataset::prepare(&load_encoded(train, labels)?, input_size, train_cache)?;
        let (validation_dataset, validation_usage) = KanjiBurnDataset::prepare(
            &load_encoded(validation, labels)?,
            input_size,
            validation_cache,
        )?;
        let usage = train_usage.merge(validation_usage);
        debug!(
            "Feature cache totals: {} hits, {} misses",
            usage.hits, usage.misses
        );

        let model_config =
            KanjiClassifierConfig::for_architecture(options.architecture, labels.len(), input_size);
        let mut model: KanjiClassifier<B> = model_config.init(&self.device);

        let mut optimizer = AdamConfig::new()
            .with_weight_decay(Some(WeightDecayConfig::new(1e-4)))
            .init();

        let batcher = KanjiBatcher::new(input_size);
        let mut epoch_rng = ChaCha8Rng::seed_from_u64(options.seed);

        info!(
            "Training {} backbone on {} samples ({} validation, {} classes) for {} epochs",
            options.architecture,
            train_dataset.len(),
            validation_dataset.len(),
            labels.len(),
            options.epochs
        );

        let mut best_val_acc: Option<f64> = None;
        let mut last_val_acc: Option<f64> = None;

        for epoch in 0..options.epochs {
            let mut indices: Vec<usize> = (0..train_dataset.len()).collect();
            indices.shuffle(&mut epoch_rng);

            let mut epoch_loss = 0.0f64;
            let mut correct = 0usize;
            let mut seen = 0usize;
            let num_batches = indices.len().div_ceil(options.batch_size);

            for chunk in indices.chunks(options.batch_size) {
                let items: Vec<_> = chunk.iter().filter_map(|&i| train_dataset.get(i)).collect();
                if items.is_empty() {
                    continue;
                }

                let batch: KanjiBatch<B> = batcher.batch(items, &self.device);
                let batch_size = batch.targets.dims()[0];

                let output = model.forward(batch.images);
                let loss = CrossEntropyLossConfig::new()
                    .init(&output.device())
                    .forward(output.clone(), batch.targets.clone());

                let loss_value: f64 = loss.clone().into_scalar().elem();
                if !loss_value.is_finite() {
                    return Err(KanjiError::Training(format!(
                        "loss diverged at epoch {}",
                        epoch + 1
                    )));
                }
                epoch_loss += loss_value;

                let batch_correct: i64 = output
                    .argmax(1)
                    .reshape([batch_size])
                    .equal(batch.targets)
                    .int()
                    .sum()
                    .into_scalar()
                    .elem();
                correct += batch_correct as usize;
                seen += batch_size;

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optimizer.step(options.learning_rate, model, grads);
            }

            let avg_loss = epoch_loss / num_batches.max(1) as f64;
            let train_acc = 100.0 * correct as f64 / seen.max(1) as f64;

            let val_acc = accuracy(
                &model.valid(),
                &validation_dataset,
                &batcher,
                options.batch_size,
                &self.device,
            );
            last_val_acc = val_acc;

            let is_best = match (val_acc, best_val_acc) {
                (Some(v), Some(best)) => v > best,
                (Some(_), None) => true,
                _ => false,
            };
            if is_best {
                best_val_acc = val_acc;
            }

            info!(
                "Epoch {}/{}: loss {:.4} | train acc {:.2}% | val acc {}{}",
                epoch + 1,
                options.epochs,
                avg_loss,
                train_acc,
                val_acc
                    .map(|v| format!("{:.2}%", v * 100.0))
                    .unwrap_or_else(|| "n/a".to_string()),
                if is_best { " (best)" } else { "" }
            );
        }

        if validation_dataset.is_empty() {
            warn!("Validation split is empty; no validation accuracy recorded");
        }

        let weights = WeightsRecorder::default()
            .record(model.valid().into_record(), ())
            .map_err(|e| KanjiError::Training(format!("Failed to record weights: {e:?}")))?;

        info!(
            "Training finished in {}",
            format_duration(started.elapsed())
        );

        Ok(ModelArtifact::new(
            ArtifactSchema {
                format_version: FORMAT_VERSION,
                labels: labels.clone(),
                model: model_config,
                architecture: options.architecture,
                input_size,
                // Filled in by the orchestrator, which owns the split
                split_seed: 0,
                trained_at: Utc::now(),
                validation_accuracy: last_val_acc,
            },
            weights,
        ))
    }

    fn load_predictor(&self, artifact: &ModelArtifact) -> Result<Box<dyn LabelPredictor>> {
        let predictor = BurnPredictor::<B::InnerBackend>::from_artifact(artifact, &self.device)?;
        Ok(Box::new(predictor))
    }
}

/// Fraction of `dataset` classified correctly; `None` for an empty dataset
fn accuracy<B: Backend>(
    model: &KanjiClassifier<B>,
    dataset: &KanjiBurnDataset,
    batcher: &KanjiBatcher,
    batch_size: usize,
    device: &B::Device,
) -> Option<f64> {
    if dataset.is_empty() {
        return None;
    }

    let mut correct = 0usize;
    let mut total = 0usize;

    for chunk in dataset.items().chunks(batch_size) {
        let batch: KanjiBatch<B> = batcher.batch(chunk.to_vec(), device);
        let n = chunk.len();

        let batch_correct: i64 = model
            .forward(batch.images)
            .argmax(1)
            .reshape([n])
            .equal(batch.targets)
            .int()
            .sum()
            .into_scalar()
            .elem();

        correct += batch_correct as usize;
        total += n;
    }

    Some(correct as f64 / total as f64)
}

/// Predictor over a trained `KanjiClassifier`
#[derive(Debug)]
pub struct BurnPredictor<B: Backend> {
    model: KanjiClassifier<B>,
    labels: LabelMap,
    batcher: KanjiBatcher,
    input_size: usize,
    device: B::Device,
}

impl<B: Backend> BurnPredictor<B> {
    /// Rebuild the network described by `artifact` and load its weights
    pub fn from_artifact(artifact: &ModelArtifact, device: &B::Device) -> Result<Self> {
        let schema = &artifact.schema;
        schema.validate()?;

        let record = WeightsRecorder::default()
            .load(artifact.weights.clone(), device)
            .map_err(|e| KanjiError::Schema(format!("Failed to load model weights: {e:?}")))?;
        let model = schema.model.init::<B>(device).load_record(record);

        Ok(Self {
            model,
            labels: schema.labels.clone(),
            batcher: KanjiBatcher::new(schema.input_size),
            input_size: schema.input_size,
            device: device.clone(),
        })
    }

    /// Class probabilities for one image, indexed by label key
    pub fn probabilities(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let data = image_to_chw(image, self.input_size);
        let images = self.batcher.images::<B>(data, 1, &self.device);

        let probs: Vec<f32> = self
            .model
            .forward_softmax(images)
            .into_data()
            .iter::<f32>()
            .collect();

        if probs.len() != self.labels.len() {
            return Err(KanjiError::Prediction(format!(
                "model produced {} scores for {} labels",
                probs.len(),
                self.labels.len()
            )));
        }
        Ok(probs)
    }
}

impl<B: Backend> LabelPredictor for BurnPredictor<B> {
    fn predict(&self, image: &DynamicImage) -> Result<Prediction> {
        let probs = self.probabilities(image)?;

        let (key, confidence) = probs
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, p)| p.is_finite())
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| KanjiError::Prediction("model produced no finite scores".to_string()))?;

        let label = self
            .labels
            .label(key)
            .ok_or_else(|| KanjiError::Prediction(format!("class index {key} out of range")))?;

        Ok(Prediction::new(label, confidence))
    }

    fn labels(&self) -> &LabelMap {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;

    use crate::inference::InferenceService;
    use crate::model::Architecture;

    type TestBackend = Autodiff<NdArray>;

    fn artifact_for(labels: &[&str]) -> ModelArtifact {
        let labels = LabelMap::new(labels.iter().copied());
        let config = KanjiClassifierConfig::for_architecture(Architecture::Compact, labels.len(), 16);
        let device = Default::default();
        let model: KanjiClassifier<NdArray> = config.init(&device);
        let weights = WeightsRecorder::default()
            .record(model.into_record(), ())
            .unwrap();

        ModelArtifact::new(
            ArtifactSchema {
                format_version: FORMAT_VERSION,
                labels,
                model: config,
                architecture: Architecture::Compact,
                input_size: 16,
                split_seed: 1,
                trained_at: Utc::now(),
                validation_accuracy: None,
            },
            weights,
        )
    }

    #[test]
    fn test_predictor_returns_known_label() {
        let artifact = artifact_for(&["上", "下"]);
        let engine = BurnEngine::<TestBackend>::default();
        let predictor = engine.load_predictor(&artifact).unwrap();

        let image = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            40,
            30,
            image::Rgb([12, 200, 80]),
        ));
        let prediction = predictor.predict(&image).unwrap();

        assert!(predictor.labels().key(&prediction.predicted_label).is_some());
        assert!((0.0..=1.0).contains(&prediction.confidence));
    }

    #[test]
    fn test_same_artifact_same_prediction() {
        let artifact = artifact_for(&["a", "b", "c"]);
        let device = Default::default();
        let first = BurnPredictor::<NdArray>::from_artifact(&artifact, &device).unwrap();
        let second = BurnPredictor::<NdArray>::from_artifact(&artifact, &device).unwrap();

        let image = DynamicImage::ImageLuma8(image::GrayImage::from_fn(20, 20, |x, y| {
            image::Luma([((x * 13 + y * 7) % 255) as u8])
        }));

        assert_eq!(
            first.probabilities(&image).unwrap(),
            second.probabilities(&image).unwrap()
        );
        assert_eq!(
            first.predict(&image).unwrap().predicted_label,
            second.predict(&image).unwrap().predicted_label
        );
    }

    #[test]
    fn test_corrupt_weights_rejected() {
        let mut artifact = artifact_for(&["a", "b"]);
        artifact.weights = vec![0u8; 8];
        let device = Default::default();
        let result = BurnPredictor::<NdArray>::from_artifact(&artifact, &device);
        assert!(matches!(result, Err(KanjiError::Schema(_))));
    }

    #[test]
    fn test_truncated_weights_rejected() {
        let mut artifact = artifact_for(&["a", "b"]);
        let half = artifact.weights.len() / 2;
        artifact.weights.truncate(half);

        let engine = BurnEngine::<TestBackend>::default();
        assert!(matches!(
            engine.load_predictor(&artifact),
            Err(KanjiError::Schema(_))
        ));
    }

    #[test]
    fn test_corrupt_weights_on_disk_fail_service_load() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("KanjiClassifier.zip");
        let mut artifact = artifact_for(&["a", "b"]);
        artifact.weights = vec![0u8; 8];
        artifact.save(&path).unwrap();

        let engine = BurnEngine::<TestBackend>::default();
        let result = InferenceService::from_artifact_path(&engine, &path);
        assert!(matches!(result, Err(KanjiError::Schema(_))));
    }

    #[test]
    fn test_train_rejects_empty_split() {
        let engine = BurnEngine::<TestBackend>::default();
        let labels = LabelMap::new(["a"]);
        let result = engine.train(&[], &[], &labels, &TrainingOptions::default());
        assert!(matches!(result, Err(KanjiError::Training(_))));
    }
}
