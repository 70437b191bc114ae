//! Evaluation reporter
//!
//! Runs a loaded predictor over the held-out test split and reports how
//! many predictions matched the directory label.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::artifact::ModelArtifact;
use crate::config::AppConfig;
use crate::dataset::{load_samples, DatasetSplits, Sample};
use crate::engine::{ClassifierEngine, LabelPredictor};
use crate::inference::preprocess;
use crate::utils::error::{KanjiError, Result};

/// Upper bound on the number of test samples evaluated per run
pub const DEFAULT_EVALUATION_CAP: usize = 2000;

/// Outcome of an evaluation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub correct: usize,
    pub total: usize,
    /// Samples that could not be read or decoded
    pub skipped: usize,
}

impl EvaluationReport {
    /// Share of correct predictions; `None` when nothing was evaluated
    pub fn accuracy(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.correct as f64 / self.total as f64)
        }
    }
}

impl std::fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.accuracy() {
            Some(accuracy) => write!(
                f,
                "Accuracy: {:.2}% (Correct Predictions: {}, Total Predictions: {})",
                accuracy * 100.0,
                self.correct,
                self.total
            ),
            None => write!(f, "Accuracy: n/a (no test samples evaluated)"),
        }
    }
}

/// Predict up to `cap` samples and compare against their labels
pub fn evaluate(predictor: &dyn LabelPredictor, samples: &[Sample], cap: usize) -> EvaluationReport {
    let mut report = EvaluationReport::default();

    for sample in samples.iter().take(cap) {
        let prediction = std::fs::read(&sample.path)
            .map_err(KanjiError::from)
            .and_then(|bytes| preprocess::normalize_upload(&bytes))
            .and_then(|bytes| preprocess::decode(&bytes))
            .and_then(|image| predictor.predict(&image));

        match prediction {
            Ok(prediction) => {
                let prediction = prediction
                    .with_image_path(&sample.path)
                    .with_actual_label(&sample.label);
                info!("{}", prediction);

                report.total += 1;
                if prediction.is_correct() == Some(true) {
                    report.correct += 1;
                }
            }
            Err(e) => {
                warn!("Skipping {:?}: {}", sample.path, e);
                report.skipped += 1;
            }
        }
    }

    if samples.len() > cap {
        info!(
            "Evaluated the first {} of {} test samples",
            cap,
            samples.len()
        );
    }
    info!("{}", report);
    report
}

/// Rebuild the test split used at training time and evaluate the saved artifact on it
pub fn run_evaluation(config: &AppConfig, engine: &dyn ClassifierEngine) -> Result<EvaluationReport> {
    let artifact = ModelArtifact::load(config.artifact_path())?;
    let predictor = engine.load_predictor(&artifact)?;

    let samples = load_samples(config.assets_dir(), &config.scan)?;
    let split_config = config.split.clone().with_seed(artifact.schema.split_seed);
    let splits = DatasetSplits::from_samples(samples, &split_config)?;
    info!(
        "Evaluating on {} test samples (split seed {})",
        splits.test.len(),
        splits.seed
    );

    Ok(evaluate(
        predictor.as_ref(),
        &splits.test,
        config.evaluation.max_samples,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::Path;

    use image::DynamicImage;
    use tempfile::TempDir;

    use crate::dataset::LabelMap;
    use crate::inference::Prediction;

    /// Always answers with the same label
    struct Constant {
        labels: LabelMap,
    }

    impl LabelPredictor for Constant {
        fn predict(&self, _image: &DynamicImage) -> Result<Prediction> {
            Ok(Prediction::new("A", 1.0))
        }

        fn labels(&self) -> &LabelMap {
            &self.labels
        }
    }

    fn constant() -> Constant {
        Constant {
            labels: LabelMap::new(["A", "B"]),
        }
    }

    fn write_png(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::new_rgb8(4, 4)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        std::fs::write(path, buf.into_inner()).unwrap();
    }

    #[test]
    fn test_empty_test_split() {
        let report = evaluate(&constant(), &[], DEFAULT_EVALUATION_CAP);
        assert_eq!(report.total, 0);
        assert_eq!(report.accuracy(), None);
        assert!(report.to_string().contains("n/a"));
    }

    #[test]
    fn test_counts_exact_matches() {
        let temp_dir = TempDir::new().unwrap();
        let samples: Vec<Sample> = ["A/1.png", "A/2.png", "B/1.png", "B/2.png"]
            .iter()
            .map(|rel| {
                let path = temp_dir.path().join(rel);
                write_png(&path);
                Sample::from_path(path).unwrap()
            })
            .collect();

        let report = evaluate(&constant(), &samples, DEFAULT_EVALUATION_CAP);
        assert_eq!(report.correct, 2);
        assert_eq!(report.total, 4);
        assert_eq!(report.accuracy(), Some(0.5));
        assert_eq!(
            report.to_string(),
            "Accuracy: 50.00% (Correct Predictions: 2, Total Predictions: 4)"
        );
    }

    #[test]
    fn test_cap_limits_evaluated_samples() {
        let temp_dir = TempDir::new().unwrap();
        let samples: Vec<Sample> = (0..5)
            .map(|i| {
                let path = temp_dir.path().join("A").join(format!("{i}.png"));
                write_png(&path);
                Sample::from_path(path).unwrap()
            })
            .collect();

        let report = evaluate(&constant(), &samples, 3);
        assert_eq!(report.total, 3);
        assert_eq!(report.correct, 3);
    }

    #[test]
    fn test_unreadable_samples_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let good = temp_dir.path().join("A").join("ok.png");
        write_png(&good);
        let bad = temp_dir.path().join("B").join("notes.png");
        std::fs::create_dir_all(bad.parent().unwrap()).unwrap();
        std::fs::write(&bad, "not really a png").unwrap();

        let samples = vec![
            Sample::from_path(good).unwrap(),
            Sample::from_path(bad).unwrap(),
            Sample::from_path(temp_dir.path().join("B").join("missing.png")).unwrap(),
        ];

        let report = evaluate(&constant(), &samples, DEFAULT_EVALUATION_CAP);
        assert_eq!(report.total, 1);
        assert_eq!(report.skipped, 2);
    }
}
