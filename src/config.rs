//! Application configuration shared by the CLI and the HTTP server.
//!
//! Values come from (lowest to highest precedence) built-in defaults, an
//! optional TOML file and command-line flags / environment variables applied
//! by the binaries. Relative paths are resolved against `project_dir`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::artifact::ARTIFACT_FILE_NAME;
use crate::dataset::{ScanOptions, SplitConfig};
use crate::engine::TrainingOptions;
use crate::evaluation::DEFAULT_EVALUATION_CAP;
use crate::utils::error::{KanjiError, Result};
use crate::utils::logging::LogConfig;

/// Directory holding `<label>/<image>` training files
pub const ASSETS_DIR_NAME: &str = "assets";
/// Scratch directory for caches
pub const WORKSPACE_DIR_NAME: &str = "workspace";
/// Sub-directory of the workspace holding preprocessed tensors
pub const FEATURE_CACHE_DIR_NAME: &str = "feature_cache";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root every relative path is resolved against
    pub project_dir: PathBuf,
    /// Training images; defaults to `<project>/assets`
    pub assets_dir: Option<PathBuf>,
    /// Defaults to `<project>/workspace`
    pub workspace_dir: Option<PathBuf>,
    /// Defaults to `<project>/KanjiClassifier.zip`
    pub artifact_path: Option<PathBuf>,
    pub scan: ScanOptions,
    pub split: SplitConfig,
    pub training: TrainingOptions,
    pub evaluation: EvaluationConfig,
    pub server: ServerConfig,
    pub logging: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            assets_dir: None,
            workspace_dir: None,
            artifact_path: None,
            scan: ScanOptions::default(),
            split: SplitConfig::default(),
            training: TrainingOptions::default(),
            evaluation: EvaluationConfig::default(),
            server: ServerConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

/// Evaluation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Maximum number of test samples predicted per run
    pub max_samples: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            max_samples: DEFAULT_EVALUATION_CAP,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body in bytes
    pub max_upload_bytes: usize,
    /// Try to load the artifact at startup; a missing artifact is not fatal
    pub load_model_on_startup: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_upload_bytes: 10 * 1024 * 1024,
            load_model_on_startup: true,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl AppConfig {
    /// Defaults rooted at `project_dir`
    pub fn for_project<P: Into<PathBuf>>(project_dir: P) -> Self {
        Self {
            project_dir: project_dir.into(),
            ..Self::default()
        }
    }

    /// Read a TOML file; missing sections keep their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = load_toml_config(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults or the given TOML file, with directory overrides from the command line applied
    pub fn from_sources(
        config_path: Option<&Path>,
        project_dir: Option<PathBuf>,
        artifact_path: Option<PathBuf>,
    ) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(dir) = project_dir {
            config.project_dir = dir;
        }
        if let Some(path) = artifact_path {
            config.artifact_path = Some(path);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.split.validate()?;
        self.training.validate()?;
        if self.evaluation.max_samples == 0 {
            return Err(KanjiError::Config(
                "evaluation.max_samples must be at least 1".to_string(),
            ));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(KanjiError::Config(
                "server.max_upload_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.resolve(
            self.assets_dir
                .as_deref()
                .unwrap_or(Path::new(ASSETS_DIR_NAME)),
        )
    }

    pub fn workspace_dir(&self) -> PathBuf {
        self.resolve(
            self.workspace_dir
                .as_deref()
                .unwrap_or(Path::new(WORKSPACE_DIR_NAME)),
        )
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.resolve(
            self.artifact_path
                .as_deref()
                .unwrap_or(Path::new(ARTIFACT_FILE_NAME)),
        )
    }

    pub fn feature_cache_dir(&self) -> PathBuf {
        self.workspace_dir().join(FEATURE_CACHE_DIR_NAME)
    }

    /// Training options with the cache directory resolved
    pub fn training_options(&self) -> TrainingOptions {
        let mut options = self.training.clone();
        options.cache_dir = Some(
            options
                .cache_dir
                .as_deref()
                .map(|dir| self.resolve(dir))
                .unwrap_or_else(|| self.feature_cache_dir()),
        );
        options
    }
}

/// Deserialize a TOML file into `T`
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)
        .map_err(|e| KanjiError::Config(format!("Failed to read config {}: {e}", path.display())))?;

    toml::from_str(&content)
        .map_err(|e| KanjiError::Config(format!("Failed to parse config {}: {e}", path.display())))
}
