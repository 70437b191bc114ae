//! Dataset Loader
//!
//! Scans an assets directory whose sub-directories name the classes and
//! produces `(path, label)` samples lazily.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::utils::error::{IoContext, KanjiError, Result};
use crate::utils::logging::ProgressLogger;

use super::LabelMap;

/// File extensions treated as images when filtering is enabled
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

/// A single image sample with its label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    /// Path to the image file
    pub path: PathBuf,
    /// Name of the directory that directly contains the file
    pub label: String,
}

impl Sample {
    /// Build a sample, deriving the label from the parent directory name
    pub fn from_path(path: PathBuf) -> Option<Self> {
        let label = path.parent()?.file_name()?.to_string_lossy().into_owned();
        Some(Self { path, label })
    }
}

/// Options controlling which files become samples
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Only yield files with a known image extension
    pub image_extensions_only: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            image_extensions_only: true,
        }
    }
}

impl ScanOptions {
    /// Yield every regular file regardless of extension
    pub fn all_files() -> Self {
        Self {
            image_extensions_only: false,
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        if !self.image_extensions_only {
            return true;
        }
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }
}

/// Lazy iterator over the samples below a root directory.
///
/// The walk is consumed as it is iterated; call [`scan_samples`] again to rescan.
pub struct SampleScanner {
    walker: walkdir::IntoIter,
    options: ScanOptions,
    skipped: usize,
}

impl std::fmt::Debug for SampleScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleScanner")
            .field("options", &self.options)
            .field("skipped", &self.skipped)
            .finish()
    }
}

impl SampleScanner {
    /// Number of files passed over by the extension filter so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for SampleScanner {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.into_path();
            if !self.options.accepts(&path) {
                debug!("Skipping non-image file {:?}", path);
                self.skipped += 1;
                continue;
            }

            match Sample::from_path(path) {
                Some(sample) => return Some(Ok(sample)),
                None => continue,
            }
        }
    }
}

/// Start a scan of `root`.
///
/// Fails immediately if the root is missing, is not a directory or cannot be read.
pub fn scan_samples<P: AsRef<Path>>(root: P, options: &ScanOptions) -> Result<SampleScanner> {
    let root = root.as_ref();

    if !root.exists() {
        return Err(KanjiError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Assets directory not found: {}", root.display()),
        )));
    }
    if !root.is_dir() {
        return Err(KanjiError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Not a directory: {}", root.display()),
        )));
    }
    // Surface permission problems before the first item is pulled
    std::fs::read_dir(root).at_path("Cannot read assets directory", root)?;

    Ok(SampleScanner {
        walker: WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter(),
        options: options.clone(),
        skipped: 0,
    })
}

/// Scan `root` and collect every sample, stopping at the first walk error
pub fn load_samples<P: AsRef<Path>>(root: P, options: &ScanOptions) -> Result<Vec<Sample>> {
    let root = root.as_ref();
    info!("Scanning dataset directory {:?}", root);

    let mut scanner = scan_samples(root, options)?;
    let samples = scanner.by_ref().collect::<Result<Vec<_>>>()?;

    if scanner.skipped() > 0 {
        warn!(
            "Ignored {} files without an image extension under {:?}",
            scanner.skipped(),
            root
        );
    }
    info!("Files loaded: {}", samples.len());

    Ok(samples)
}

/// A sample whose raw bytes have been read and whose label has been keyed
#[derive(Debug, Clone)]
pub struct EncodedSample {
    pub sample: Sample,
    /// Dense integer key of `sample.label`
    pub key: usize,
    /// Raw (still encoded) file contents
    pub bytes: Vec<u8>,
}

/// Read the raw bytes of every sample into memory
pub fn load_encoded(samples: &[Sample], labels: &LabelMap) -> Result<Vec<EncodedSample>> {
    let mut progress = ProgressLogger::new("Loading image bytes", samples.len());
    let mut encoded = Vec::with_capacity(samples.len());

    for sample in samples {
        let key = labels.key(&sample.label).ok_or_else(|| {
            KanjiError::Dataset(format!("Label '{}' missing from label map", sample.label))
        })?;
        let bytes = std::fs::read(&sample.path).at_path("Failed to read", &sample.path)?;
        encoded.push(EncodedSample {
            sample: sample.clone(),
            key,
            bytes,
        });
        progress.increment();
    }

    progress.finish();
    Ok(encoded)
}

/// Statistics about a scanned dataset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    /// Sample count per label, ordered by label
    pub class_counts: BTreeMap<String, usize>,
}

impl DatasetStats {
    pub fn from_samples(samples: &[Sample]) -> Self {
        let mut class_counts = BTreeMap::new();
        for sample in samples {
            *class_counts.entry(sample.label.clone()).or_insert(0) += 1;
        }
        Self {
            total_samples: samples.len(),
            class_counts,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.class_counts.len()
    }
}

impl std::fmt::Display for DatasetStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Dataset Statistics:")?;
        writeln!(f, "  Total samples: {}", self.total_samples)?;
        writeln!(f, "  Number of classes: {}", self.num_classes())?;
        for (label, count) in &self.class_counts {
            let bar_len = (*count as f32 / self.total_samples.max(1) as f32 * 40.0) as usize;
            writeln!(f, "    {:20} {:6} {}", label, count, "█".repeat(bar_len))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_image(path: &Path) {
        let img = image::ImageBuffer::from_fn(10, 10, |_, _| image::Rgb([255u8, 0u8, 0u8]));
        img.save(path).unwrap();
    }

    fn build_tree(root: &Path, layout: &[(&str, usize)]) {
        for (label, count) in layout {
            let dir = root.join(label);
            fs::create_dir_all(&dir).unwrap();
            for i in 0..*count {
                create_test_image(&dir.join(format!("img_{i}.png")));
            }
        }
    }

    #[test]
    fn test_sample_label_from_parent() {
        let sample = Sample::from_path(PathBuf::from("/assets/水/img1.jpg")).unwrap();
        assert_eq!(sample.label, "水");
    }

    #[test]
    fn test_scan_counts_every_file_with_parent_label() {
        let temp_dir = TempDir::new().unwrap();
        build_tree(temp_dir.path(), &[("A", 3), ("B", 2), ("C", 0)]);

        let samples = load_samples(temp_dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples.iter().filter(|s| s.label == "A").count(), 3);
        assert_eq!(samples.iter().filter(|s| s.label == "B").count(), 2);
    }

    #[test]
    fn test_nested_files_take_immediate_parent() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("A").join("inner");
        fs::create_dir_all(&nested).unwrap();
        create_test_image(&nested.join("deep.png"));

        let samples = load_samples(temp_dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].label, "inner");
    }

    #[test]
    fn test_extension_filter() {
        let temp_dir = TempDir::new().unwrap();
        build_tree(temp_dir.path(), &[("A", 2)]);
        fs::write(temp_dir.path().join("A").join("notes.txt"), "text").unwrap();

        let mut scanner = scan_samples(temp_dir.path(), &ScanOptions::default()).unwrap();
        let filtered: Vec<_> = scanner.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(filtered.len(), 2);
        assert_eq!(scanner.skipped(), 1);

        let all = load_samples(temp_dir.path(), &ScanOptions::all_files()).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_scanner_is_exhausted_after_iteration() {
        let temp_dir = TempDir::new().unwrap();
        build_tree(temp_dir.path(), &[("A", 2)]);

        let mut scanner = scan_samples(temp_dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(scanner.by_ref().count(), 2);
        assert!(scanner.next().is_none());
    }

    #[test]
    fn test_missing_root_fails() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("does-not-exist");
        match scan_samples(&missing, &ScanOptions::default()) {
            Err(KanjiError::Io(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::NotFound);
                assert!(e.to_string().contains("does-not-exist"));
            }
            other => panic!("expected a not-found IO error, got {other:?}"),
        }
    }

    #[test]
    fn test_file_root_fails() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.png");
        create_test_image(&file);
        assert!(matches!(
            scan_samples(&file, &ScanOptions::default()),
            Err(KanjiError::Io(_))
        ));
    }

    #[test]
    fn test_load_encoded_reads_bytes_and_keys() {
        let temp_dir = TempDir::new().unwrap();
        build_tree(temp_dir.path(), &[("B", 1), ("A", 1)]);

        let samples = load_samples(temp_dir.path(), &ScanOptions::default()).unwrap();
        let labels = LabelMap::from_samples(&samples);
        let encoded = load_encoded(&samples, &labels).unwrap();

        assert_eq!(encoded.len(), 2);
        for item in &encoded {
            assert!(!item.bytes.is_empty());
            assert_eq!(labels.label(item.key), Some(item.sample.label.as_str()));
        }
    }

    #[test]
    fn test_stats() {
        let samples = vec![
            Sample { path: "a/1.png".into(), label: "a".into() },
            Sample { path: "a/2.png".into(), label: "a".into() },
            Sample { path: "b/1.png".into(), label: "b".into() },
        ];
        let stats = DatasetStats::from_samples(&samples);
        assert_eq!(stats.total_samples, 3);
        assert_eq!(stats.num_classes(), 2);
        assert_eq!(stats.class_counts["a"], 2);
    }
}
