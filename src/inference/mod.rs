//! Inference module
//!
//! - Upload normalisation (decode, bounded resize, JPEG re-encode)
//! - The `Prediction` result type
//! - `InferenceService`, the shared predictor used by the CLI and HTTP server

pub mod predictor;
pub mod preprocess;
pub mod service;

pub use predictor::Prediction;
pub use preprocess::{normalize_upload, resize_max, MAX_DIMENSION};
pub use service::InferenceService;
