//! Dataset module
//!
//! This module provides functionality for:
//! - Scanning a directory tree of labelled images
//! - Mapping label strings to dense integer keys
//! - Shuffling and splitting samples into train/validation/test partitions
//! - Feeding decoded images to Burn through `Dataset` and `Batcher`

pub mod burn_dataset;
pub mod feature_cache;
pub mod loader;
pub mod split;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// Re-export main types for convenience
pub use burn_dataset::{KanjiBatch, KanjiBatcher, KanjiBurnDataset, KanjiItem};
pub use feature_cache::FeatureCache;
pub use loader::{
    load_encoded, load_samples, scan_samples, DatasetStats, EncodedSample, Sample, SampleScanner,
    ScanOptions,
};
pub use split::{DatasetSplits, SplitConfig, SplitStats};

/// Bidirectional mapping between label strings and dense integer keys.
///
/// Keys follow the lexicographic order of the labels, so the same set of
/// labels always produces the same mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct LabelMap {
    labels: Vec<String>,
    keys: HashMap<String, usize>,
}

impl LabelMap {
    /// Build from any collection of label names; duplicates are collapsed
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        labels.sort();
        labels.dedup();
        Self::from(labels)
    }

    /// Collect the distinct labels of a sample set
    pub fn from_samples(samples: &[Sample]) -> Self {
        Self::new(samples.iter().map(|s| s.label.clone()))
    }

    pub fn key(&self, label: &str) -> Option<usize> {
        self.keys.get(label).copied()
    }

    pub fn label(&self, key: usize) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl From<Vec<String>> for LabelMap {
    fn from(labels: Vec<String>) -> Self {
        let keys = labels
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        Self { labels, keys }
    }
}

impl From<LabelMap> for Vec<String> {
    fn from(map: LabelMap) -> Self {
        map.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_follow_sorted_order() {
        let map = LabelMap::new(["火", "水", "木", "水"]);
        assert_eq!(map.len(), 3);

        let mut sorted = vec!["火", "水", "木"];
        sorted.sort();
        for (idx, label) in sorted.iter().enumerate() {
            assert_eq!(map.key(label), Some(idx));
            assert_eq!(map.label(idx), Some(*label));
        }
    }

    #[test]
    fn test_unknown_label() {
        let map = LabelMap::new(["a", "b"]);
        assert_eq!(map.key("c"), None);
        assert_eq!(map.label(2), None);
    }

    #[test]
    fn test_serde_as_plain_list() {
        let map = LabelMap::new(["b", "a"]);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"["a","b"]"#);

        let back: LabelMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
        assert_eq!(back.key("b"), Some(1));
    }
}
