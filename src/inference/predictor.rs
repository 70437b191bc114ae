//! Prediction results

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Outcome of classifying one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Source file, absent for ad-hoc uploads
    pub image_path: Option<PathBuf>,
    /// Ground-truth label when known (evaluation runs)
    pub actual_label: Option<String>,
    pub predicted_label: String,
    /// Probability assigned to `predicted_label`
    pub confidence: f32,
}

impl Prediction {
    pub fn new(predicted_label: impl Into<String>, confidence: f32) -> Self {
        Self {
            image_path: None,
            actual_label: None,
            predicted_label: predicted_label.into(),
            confidence,
        }
    }

    pub fn with_image_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    pub fn with_actual_label(mut self, label: impl Into<String>) -> Self {
        self.actual_label = Some(label.into());
        self
    }

    /// Exact label match against the ground truth, if there is one
    pub fn is_correct(&self) -> Option<bool> {
        self.actual_label
            .as_deref()
            .map(|actual| actual == self.predicted_label)
    }
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self
            .image_path
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        write!(
            f,
            "Image: {} | Actual Value: {} | Predicted Value: {}",
            name,
            self.actual_label.as_deref().unwrap_or(""),
            self.predicted_label
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_correct() {
        let unknown = Prediction::new("水", 0.9);
        assert_eq!(unknown.is_correct(), None);

        assert_eq!(unknown.clone().with_actual_label("水").is_correct(), Some(true));
        assert_eq!(unknown.with_actual_label("火").is_correct(), Some(false));
    }

    #[test]
    fn test_display_uses_file_name() {
        let prediction = Prediction::new("B", 0.4)
            .with_image_path("/assets/A/img1.jpg")
            .with_actual_label("A");
        assert_eq!(
            prediction.to_string(),
            "Image: img1.jpg | Actual Value: A | Predicted Value: B"
        );
    }
}
