//! Model module for CNN architectures using the Burn framework
//!
//! This module provides:
//! - The CNN classifier and its configuration
//! - Named backbone presets selectable from configuration

pub mod cnn;

use serde::{Deserialize, Serialize};

// Re-export main types for convenience
pub use cnn::{KanjiClassifier, KanjiClassifierConfig};

/// Named backbone presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    /// Few filters, quick to train on CPU
    Compact,
    #[default]
    Standard,
    Wide,
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Architecture::Compact => write!(f, "compact"),
            Architecture::Standard => write!(f, "standard"),
            Architecture::Wide => write!(f, "wide"),
        }
    }
}

impl std::str::FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(Architecture::Compact),
            "standard" => Ok(Architecture::Standard),
            "wide" => Ok(Architecture::Wide),
            other => Err(format!("unknown architecture '{other}'")),
        }
    }
}
