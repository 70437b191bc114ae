//! Persisted model artifact.
//!
//! A zip archive holding two entries:
//! - `schema.json`: labels, model configuration and training provenance
//! - `model.mpk`: the network weights as a named MessagePack record

use std::fs::{self, File};
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;

use crate::dataset::LabelMap;
use crate::model::{Architecture, KanjiClassifierConfig};
use crate::utils::error::{IoContext, KanjiError, Result};

/// Default file name of the artifact
pub const ARTIFACT_FILE_NAME: &str = "KanjiClassifier.zip";

/// Current layout version; bumped whenever the schema changes incompatibly
pub const FORMAT_VERSION: u32 = 1;

const SCHEMA_ENTRY: &str = "schema.json";
const WEIGHTS_ENTRY: &str = "model.mpk";

/// Everything needed to rebuild the predictor besides the weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSchema {
    pub format_version: u32,
    /// Key-to-label mapping applied to the network output
    pub labels: LabelMap,
    pub model: KanjiClassifierConfig,
    pub architecture: Architecture,
    pub input_size: usize,
    /// Seed of the split used for training, so evaluation can rebuild the test set
    pub split_seed: u64,
    pub trained_at: DateTime<Utc>,
    pub validation_accuracy: Option<f64>,
}

impl ArtifactSchema {
    /// Check the schema is one this build can serve
    pub fn validate(&self) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(KanjiError::Schema(format!(
                "Unsupported artifact format version {} (expected {})",
                self.format_version, FORMAT_VERSION
            )));
        }
        if self.labels.is_empty() {
            return Err(KanjiError::Schema("Artifact has no labels".to_string()));
        }
        if self.labels.len() != self.model.num_classes {
            return Err(KanjiError::Schema(format!(
                "Artifact lists {} labels but the model head has {} outputs",
                self.labels.len(),
                self.model.num_classes
            )));
        }
        if self.input_size != self.model.input_size {
            return Err(KanjiError::Schema(format!(
                "Artifact input size {} does not match model input size {}",
                self.input_size, self.model.input_size
            )));
        }
        Ok(())
    }
}

/// Trained classifier: schema plus serialized weights
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub schema: ArtifactSchema,
    pub weights: Vec<u8>,
}

impl ModelArtifact {
    pub fn new(schema: ArtifactSchema, weights: Vec<u8>) -> Self {
        Self { schema, weights }
    }

    /// Write the archive to `writer`
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let schema = serde_json::to_vec_pretty(&self.schema)
            .map_err(|e| KanjiError::Schema(format!("Failed to serialize schema: {e}")))?;

        let mut zip = zip::ZipWriter::new(writer);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        zip.start_file(SCHEMA_ENTRY, options)?;
        zip.write_all(&schema)?;
        zip.start_file(WEIGHTS_ENTRY, options)?;
        zip.write_all(&self.weights)?;
        zip.finish()?;
        Ok(())
    }

    /// Read and validate an archive
    pub fn read_from<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(reader)?;

        let schema_bytes = read_entry(&mut archive, SCHEMA_ENTRY)?;
        let schema: ArtifactSchema = serde_json::from_slice(&schema_bytes)
            .map_err(|e| KanjiError::Schema(format!("Invalid {SCHEMA_ENTRY}: {e}")))?;
        schema.validate()?;

        let weights = read_entry(&mut archive, WEIGHTS_ENTRY)?;
        if weights.is_empty() {
            return Err(KanjiError::Schema(format!("{WEIGHTS_ENTRY} is empty")));
        }

        Ok(Self { schema, weights })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_to(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read_from(Cursor::new(bytes))
    }

    /// Persist to `path`, replacing any previous artifact.
    ///
    /// The archive is written to a sibling temporary file first and renamed
    /// into place, so readers see either the old or the new artifact.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = temp_sibling(path);
        let result = File::create(&tmp)
            .map_err(KanjiError::from)
            .and_then(|file| self.write_to(file))
            .and_then(|_| fs::rename(&tmp, path).map_err(KanjiError::from));

        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result?;

        info!(
            "Saved model artifact to {:?} ({} labels, {} weight bytes)",
            path,
            self.schema.labels.len(),
            self.weights.len()
        );
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(KanjiError::PathNotFound(path.to_path_buf()));
        }

        let file = File::open(path).at_path("Failed to open artifact", path)?;
        let artifact = Self::read_from(file)?;
        debug!(
            "Loaded artifact {:?} trained at {}",
            path, artifact.schema.trained_at
        );
        Ok(artifact)
    }
}

fn read_entry<R: Read + Seek>(archive: &mut zip::ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut entry = archive.by_name(name).map_err(|e| match e {
        zip::result::ZipError::FileNotFound => {
            KanjiError::Schema(format!("Artifact is missing {name}"))
        }
        other => other.into(),
    })?;

    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ARTIFACT_FILE_NAME.to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_artifact() -> ModelArtifact {
        let labels = LabelMap::new(["一", "二", "三"]);
        let model = KanjiClassifierConfig::for_architecture(Architecture::Compact, labels.len(), 32);
        ModelArtifact::new(
            ArtifactSchema {
                format_version: FORMAT_VERSION,
                labels,
                model,
                architecture: Architecture::Compact,
                input_size: 32,
                split_seed: 42,
                trained_at: Utc::now(),
                validation_accuracy: Some(0.5),
            },
            vec![1, 2, 3, 4],
        )
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join(ARTIFACT_FILE_NAME);

        let artifact = sample_artifact();
        artifact.save(&path).unwrap();
        assert!(fs::metadata(&path).unwrap().len() > 0);
        assert!(!temp_sibling(&path).exists());

        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded.weights, artifact.weights);
        assert_eq!(loaded.schema.labels, artifact.schema.labels);
        assert_eq!(loaded.schema.split_seed, 42);
        assert_eq!(loaded.schema.architecture, Architecture::Compact);
    }

    #[test]
    fn test_save_overwrites_previous() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(ARTIFACT_FILE_NAME);

        sample_artifact().save(&path).unwrap();
        let mut second = sample_artifact();
        second.weights = vec![9; 16];
        second.save(&path).unwrap();

        assert_eq!(ModelArtifact::load(&path).unwrap().weights, vec![9; 16]);
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = ModelArtifact::load(temp_dir.path().join("absent.zip"));
        assert!(matches!(result, Err(KanjiError::PathNotFound(_))));
    }

    #[test]
    fn test_not_a_zip_is_schema_error() {
        assert!(matches!(
            ModelArtifact::from_bytes(b"plain text"),
            Err(KanjiError::Schema(_))
        ));
    }

    #[test]
    fn test_label_count_mismatch_rejected() {
        let mut artifact = sample_artifact();
        artifact.schema.model.num_classes = 5;
        let bytes = artifact.to_bytes().unwrap();

        let err = ModelArtifact::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, KanjiError::Schema(_)));
        assert!(err.to_string().contains("5 outputs"));
    }

    #[test]
    fn test_future_version_rejected() {
        let mut artifact = sample_artifact();
        artifact.schema.format_version = FORMAT_VERSION + 1;
        let bytes = artifact.to_bytes().unwrap();
        assert!(matches!(
            ModelArtifact::from_bytes(&bytes),
            Err(KanjiError::Schema(_))
        ));
    }

    #[test]
    fn test_missing_weights_entry() {
        let artifact = sample_artifact();
        let schema = serde_json::to_vec(&artifact.schema).unwrap();

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            zip.start_file(SCHEMA_ENTRY, SimpleFileOptions::default()).unwrap();
            zip.write_all(&schema).unwrap();
            zip.finish().unwrap();
        }

        let err = ModelArtifact::from_bytes(cursor.get_ref()).unwrap_err();
        assert!(err.to_string().contains(WEIGHTS_ENTRY));
    }
}
