//! Error Handling Module
//!
//! Defines the error type shared by the dataset, training, artifact and
//! inference layers. Uses thiserror for ergonomic error definitions.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Main error type for the classification pipeline
#[derive(Error, Debug)]
pub enum KanjiError {
    /// Uploaded or stored bytes could not be decoded as an image
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Artifact could not be read back or does not match the expected layout
    #[error("Schema error: {0}")]
    Schema(String),

    /// Failure reported by the training backend
    #[error("Training error: {0}")]
    Training(String),

    /// Failure reported by the inference backend
    #[error("Prediction error: {0}")]
    Prediction(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl KanjiError {
    /// True when the failure was caused by the caller's input rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(self, KanjiError::Decode(_))
    }
}

impl From<image::ImageError> for KanjiError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => KanjiError::Io(e),
            other => KanjiError::Decode(other.to_string()),
        }
    }
}

impl From<zip::result::ZipError> for KanjiError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => KanjiError::Io(e),
            other => KanjiError::Schema(other.to_string()),
        }
    }
}

impl From<walkdir::Error> for KanjiError {
    fn from(err: walkdir::Error) -> Self {
        let message = err.to_string();
        match err.into_io_error() {
            Some(io) => KanjiError::Io(std::io::Error::new(io.kind(), message)),
            None => KanjiError::Dataset(message),
        }
    }
}

/// Convenience Result type for pipeline operations
pub type Result<T> = std::result::Result<T, KanjiError>;

/// Attach the path being touched to an IO failure, keeping its kind
pub trait IoContext<T> {
    fn at_path(self, action: &str, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for std::result::Result<T, std::io::Error> {
    fn at_path(self, action: &str, path: &Path) -> Result<T> {
        self.map_err(|e| {
            KanjiError::Io(std::io::Error::new(
                e.kind(),
                format!("{} {}: {}", action, path.display(), e),
            ))
        })
    }
}
