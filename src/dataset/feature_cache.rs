//! On-disk cache of preprocessed image tensors.
//!
//! Entries are keyed by the SHA-256 of the encoded image bytes together with
//! the input size, so a retrain over unchanged assets skips decoding.
//! Each entry is a flat little-endian `f32` file.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::utils::error::{IoContext, Result};

const ENTRY_EXTENSION: &str = "f32";

#[derive(Debug, Clone)]
pub struct FeatureCache {
    dir: PathBuf,
}

impl FeatureCache {
    /// Open (creating if needed) a cache rooted at `dir`
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).at_path("Failed to create feature cache", &dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache key for an encoded image preprocessed at `image_size`
    pub fn key(bytes: &[u8], image_size: usize) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hasher.update((image_size as u64).to_le_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{ENTRY_EXTENSION}"))
    }

    /// Look up an entry; entries of the wrong length are treated as missing
    pub fn get(&self, key: &str, expected_len: usize) -> Option<Vec<f32>> {
        let bytes = fs::read(self.entry_path(key)).ok()?;
        if bytes.len() != expected_len * 4 {
            warn!("Ignoring corrupt feature cache entry {}", key);
            return None;
        }

        Some(
            bytes
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect(),
        )
    }

    /// Store an entry, replacing any previous value
    pub fn put(&self, key: &str, values: &[f32]) -> Result<()> {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();

        // Write then rename so readers never see a partial entry
        let path = self.entry_path(key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;

        debug!("Cached features for {}", key);
        Ok(())
    }

    /// Number of entries currently stored
    pub fn len(&self) -> usize {
        fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| {
                        e.path()
                            .extension()
                            .map(|ext| ext == ENTRY_EXTENSION)
                            .unwrap_or(false)
                    })
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
