//! Train / validation / test split planning
//!
//! Samples are shuffled once and cut in two steps:
//! 1. **Train** keeps `1 - test_fraction` of the shuffled data, the rest is the holdout.
//! 2. The holdout is cut again: `validation_fraction` of it becomes the
//!    **validation** set, the remainder the **test** set.
//!
//! With the defaults (0.3 / 0.5) this gives roughly 70 / 15 / 15.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::utils::error::{KanjiError, Result};

/// Default share of the data held out from training
pub const DEFAULT_TEST_FRACTION: f64 = 0.3;

/// Default share of the holdout used for validation
pub const DEFAULT_VALIDATION_FRACTION: f64 = 0.5;

/// Default shuffle seed
pub const DEFAULT_SEED: u64 = 42;

/// Configuration for dataset splitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of all samples held out from training
    pub test_fraction: f64,
    /// Fraction of the holdout that becomes the validation set
    pub validation_fraction: f64,
    /// Shuffle seed; `None` draws a fresh seed from the OS on every split
    pub seed: Option<u64>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: DEFAULT_TEST_FRACTION,
            validation_fraction: DEFAULT_VALIDATION_FRACTION,
            seed: Some(DEFAULT_SEED),
        }
    }
}

impl SplitConfig {
    /// Create a split configuration, validating the fractions
    pub fn new(test_fraction: f64, validation_fraction: f64, seed: Option<u64>) -> Result<Self> {
        let config = Self {
            test_fraction,
            validation_fraction,
            seed,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.test_fraction) {
            return Err(KanjiError::Config(
                "Test fraction must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.validation_fraction) {
            return Err(KanjiError::Config(
                "Validation fraction must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(())
    }

    /// Same fractions, pinned to `seed`
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// The three disjoint partitions of a sample set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSplits<T> {
    pub train: Vec<T>,
    pub validation: Vec<T>,
    pub test: Vec<T>,
    /// Seed the shuffle actually used
    pub seed: u64,
}

impl<T> DatasetSplits<T> {
    /// Shuffle `items` and cut them into train / validation / test
    pub fn from_samples(mut items: Vec<T>, config: &SplitConfig) -> Result<Self> {
        config.validate()?;

        let seed = config.seed.unwrap_or_else(|| ChaCha8Rng::from_entropy().next_u64());
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        items.shuffle(&mut rng);

        let n = items.len();
        let n_holdout = fraction_of(n, config.test_fraction);
        let n_validation = fraction_of(n_holdout, config.validation_fraction);

        let mut holdout = items.split_off(n - n_holdout);
        let test = holdout.split_off(n_validation);

        Ok(Self {
            train: items,
            validation: holdout,
            test,
            seed,
        })
    }

    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    pub fn stats(&self) -> SplitStats {
        SplitStats {
            total: self.total(),
            train_size: self.train.len(),
            validation_size: self.validation.len(),
            test_size: self.test.len(),
            seed: self.seed,
        }
    }
}

fn fraction_of(n: usize, fraction: f64) -> usize {
    ((n as f64 * fraction).round() as usize).min(n)
}

/// Statistics about dataset splits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitStats {
    pub total: usize,
    pub train_size: usize,
    pub validation_size: usize,
    pub test_size: usize,
    pub seed: u64,
}

impl std::fmt::Display for SplitStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pct = |n: usize| 100.0 * n as f64 / self.total.max(1) as f64;
        writeln!(f, "Dataset Split Statistics (seed {}):", self.seed)?;
        writeln!(f, "  Total samples: {}", self.total)?;
        writeln!(f, "  Train: {} ({:.1}%)", self.train_size, pct(self.train_size))?;
        writeln!(
            f,
            "  Validation: {} ({:.1}%)",
            self.validation_size,
            pct(self.validation_size)
        )?;
        writeln!(f, "  Test: {} ({:.1}%)", self.test_size, pct(self.test_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn items(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn test_default_ratios() {
        let splits = DatasetSplits::from_samples(items(1000), &SplitConfig::default()).unwrap();
        assert_eq!(splits.train.len(), 700);
        assert_eq!(splits.validation.len(), 150);
        assert_eq!(splits.test.len(), 150);
    }

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        for n in [0, 1, 2, 3, 7, 10, 33, 101] {
            let splits = DatasetSplits::from_samples(items(n), &SplitConfig::default()).unwrap();
            assert_eq!(splits.total(), n);

            let mut seen = HashSet::new();
            for item in splits.train.iter().chain(&splits.validation).chain(&splits.test) {
                assert!(seen.insert(*item), "item {item} appears twice for n={n}");
            }
            assert_eq!(seen.len(), n);
        }
    }

    #[test]
    fn test_empty_input() {
        let splits = DatasetSplits::<usize>::from_samples(Vec::new(), &SplitConfig::default()).unwrap();
        assert!(splits.train.is_empty());
        assert!(splits.validation.is_empty());
        assert!(splits.test.is_empty());
    }

    #[test]
    fn test_same_seed_same_partitions() {
        let config = SplitConfig::default().with_seed(7);
        let a = DatasetSplits::from_samples(items(200), &config).unwrap();
        let b = DatasetSplits::from_samples(items(200), &config).unwrap();
        assert_eq!(a.train, b.train);
        assert_eq!(a.validation, b.validation);
        assert_eq!(a.test, b.test);
    }

    #[test]
    fn test_unseeded_split_records_seed() {
        let config = SplitConfig {
            seed: None,
            ..SplitConfig::default()
        };
        let first = DatasetSplits::from_samples(items(50), &config).unwrap();
        let replay =
            DatasetSplits::from_samples(items(50), &config.clone().with_seed(first.seed)).unwrap();
        assert_eq!(first.test, replay.test);
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        assert!(SplitConfig::new(1.5, 0.5, None).is_err());
        assert!(SplitConfig::new(0.3, -0.1, None).is_err());
        assert!(SplitConfig::new(0.3, 0.5, Some(1)).is_ok());
    }
}
