//! Process-wide inference service
//!
//! Owns the single predictor built from the persisted artifact. Prediction
//! calls are serialised through a mutex because the predictor is not
//! assumed to be safe for concurrent use.

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::artifact::ModelArtifact;
use crate::dataset::{LabelMap, Sample};
use crate::engine::{ClassifierEngine, LabelPredictor};
use crate::utils::error::{IoContext, Result};

use super::preprocess;
use super::Prediction;

pub struct InferenceService {
    predictor: Mutex<Box<dyn LabelPredictor>>,
    labels: LabelMap,
    trained_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for InferenceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceService")
            .field("labels", &self.labels.len())
            .field("trained_at", &self.trained_at)
            .finish()
    }
}

impl InferenceService {
    /// Wrap an already loaded predictor
    pub fn new(predictor: Box<dyn LabelPredictor>) -> Self {
        let labels = predictor.labels().clone();
        Self {
            predictor: Mutex::new(predictor),
            labels,
            trained_at: None,
        }
    }

    pub fn from_artifact(engine: &dyn ClassifierEngine, artifact: &ModelArtifact) -> Result<Self> {
        let predictor = engine.load_predictor(artifact)?;
        let mut service = Self::new(predictor);
        service.trained_at = Some(artifact.schema.trained_at);
        Ok(service)
    }

    /// Load the artifact at `path` and build the predictor once
    pub fn from_artifact_path<P: AsRef<Path>>(engine: &dyn ClassifierEngine, path: P) -> Result<Self> {
        let path = path.as_ref();
        let artifact = ModelArtifact::load(path)?;
        let service = Self::from_artifact(engine, &artifact)?;
        info!(
            "Loaded model from {:?} ({} labels)",
            path,
            service.labels.len()
        );
        Ok(service)
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    pub fn trained_at(&self) -> Option<DateTime<Utc>> {
        self.trained_at
    }

    /// Normalise an upload and predict its label
    pub fn classify_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        let started = Instant::now();

        let normalized = preprocess::normalize_upload(bytes)?;
        let image = preprocess::decode(&normalized)?;

        let prediction = {
            // A panic inside an earlier call leaves the predictor itself intact
            let predictor = self
                .predictor
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            predictor.predict(&image)?
        };

        debug!(
            "Predicted '{}' ({:.1}%) in {:.1} ms",
            prediction.predicted_label,
            prediction.confidence * 100.0,
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(prediction)
    }

    /// Classify a labelled sample from disk, recording path and ground truth
    pub fn classify_sample(&self, sample: &Sample) -> Result<Prediction> {
        let bytes = std::fs::read(&sample.path).at_path("Failed to read", &sample.path)?;
        Ok(self
            .classify_bytes(&bytes)?
            .with_image_path(&sample.path)
            .with_actual_label(&sample.label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    use image::DynamicImage;

    use crate::utils::error::KanjiError;

    /// Predicts by image width parity, so results are easy to assert on
    struct WidthParity {
        labels: LabelMap,
    }

    impl LabelPredictor for WidthParity {
        fn predict(&self, image: &DynamicImage) -> Result<Prediction> {
            let key = (image.width() % 2) as usize;
            Ok(Prediction::new(self.labels.label(key).unwrap_or("?"), 1.0))
        }

        fn labels(&self) -> &LabelMap {
            &self.labels
        }
    }

    fn service() -> InferenceService {
        InferenceService::new(Box::new(WidthParity {
            labels: LabelMap::new(["even", "odd"]),
        }))
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::new_rgb8(width, height)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_classify_bytes_predicts_on_resized_image() {
        let service = service();
        assert_eq!(service.classify_bytes(&png(10, 4)).unwrap().predicted_label, "even");
        assert_eq!(service.classify_bytes(&png(11, 4)).unwrap().predicted_label, "odd");
        // 448x100 shrinks to 224x50
        assert_eq!(service.classify_bytes(&png(448, 100)).unwrap().predicted_label, "even");
    }

    #[test]
    fn test_bad_upload_then_recovery() {
        let service = service();
        let err = service.classify_bytes(b"random bytes").unwrap_err();
        assert!(matches!(err, KanjiError::Decode(_)));

        assert!(service.classify_bytes(&png(3, 3)).is_ok());
    }

    #[test]
    fn test_concurrent_calls() {
        let service = Arc::new(service());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = Arc::clone(&service);
                std::thread::spawn(move || {
                    let width = 20 + i;
                    let expected = if width % 2 == 0 { "even" } else { "odd" };
                    let prediction = service.classify_bytes(&png(width, 8)).unwrap();
                    assert_eq!(prediction.predicted_label, expected);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_classify_sample_records_truth() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let dir = temp_dir.path().join("odd");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("x.png");
        std::fs::write(&path, png(5, 5)).unwrap();

        let prediction = service()
            .classify_sample(&Sample::from_path(path.clone()).unwrap())
            .unwrap();
        assert_eq!(prediction.image_path.as_deref(), Some(path.as_path()));
        assert_eq!(prediction.is_correct(), Some(true));
    }
}
