//! Application state for the Kanji server
//!
//! Holds the configuration, the engine used for training and prediction, and
//! the currently loaded model.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, RwLock};
use tracing::info;

use kanji_classifier::{AppConfig, ClassifierEngine, InferenceService, Result};

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    pub engine: Arc<dyn ClassifierEngine>,
    /// Model answering classification requests, if one has been loaded
    model: RwLock<Option<Arc<InferenceService>>>,
    /// Held for the duration of a training run
    pub training_lock: Arc<Mutex<()>>,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, engine: Arc<dyn ClassifierEngine>) -> Self {
        Self {
            config,
            engine,
            model: RwLock::new(None),
            training_lock: Arc::new(Mutex::new(())),
            started_at: Instant::now(),
        }
    }

    /// Currently loaded model
    pub async fn service(&self) -> Option<Arc<InferenceService>> {
        self.model.read().await.clone()
    }

    /// Replace the loaded model; requests already holding the old one finish on it
    pub async fn install(&self, service: InferenceService) -> Arc<InferenceService> {
        let service = Arc::new(service);
        *self.model.write().await = Some(service.clone());
        service
    }

    /// Read the artifact from disk. Blocking.
    pub fn load_service(&self) -> Result<InferenceService> {
        let path = self.config.artifact_path();
        let service = InferenceService::from_artifact_path(self.engine.as_ref(), &path)?;
        info!(
            "Loaded model from {:?} ({} labels)",
            path,
            service.labels().len()
        );
        Ok(service)
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
