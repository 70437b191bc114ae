//! Burn Dataset Integration
//!
//! Implements Burn's `Dataset` and `Batcher` traits over preprocessed
//! kanji images so training and evaluation can share one pipeline.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::utils::error::{KanjiError, Result};
use crate::utils::logging::ProgressLogger;

use super::feature_cache::FeatureCache;
use super::loader::EncodedSample;

/// ImageNet channel means applied by the batcher
pub const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations applied by the batcher
pub const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// A single preprocessed image ready for Burn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KanjiItem {
    /// Image data as flattened CHW float array [3 * H * W] in [0, 1]
    pub image: Vec<f32>,
    /// Dense label key
    pub label: usize,
    /// Image path (for logging)
    pub path: String,
}

impl KanjiItem {
    /// Decode `bytes` and preprocess them into a square CHW tensor
    pub fn from_bytes(bytes: &[u8], label: usize, path: String, image_size: usize) -> Result<Self> {
        let img = image::load_from_memory(bytes)?;
        Ok(Self::from_image(&img, label, path, image_size))
    }

    pub fn from_image(img: &DynamicImage, label: usize, path: String, image_size: usize) -> Self {
        Self {
            image: image_to_chw(img, image_size),
            label,
            path,
        }
    }
}

/// Resize to `image_size` x `image_size` and lay the RGB planes out as CHW in [0, 1]
pub fn image_to_chw(img: &DynamicImage, image_size: usize) -> Vec<f32> {
    let img = img
        .resize_exact(image_size as u32, image_size as u32, FilterType::Triangle)
        .to_rgb8();

    let plane = image_size * image_size;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in img.enumerate_pixels() {
        let offset = y as usize * image_size + x as usize;
        data[offset] = pixel[0] as f32 / 255.0;
        data[plane + offset] = pixel[1] as f32 / 255.0;
        data[2 * plane + offset] = pixel[2] as f32 / 255.0;
    }

    data
}

/// How many items were served from the feature cache while preparing a dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheUsage {
    pub hits: usize,
    pub misses: usize,
}

impl CacheUsage {
    pub fn merge(self, other: CacheUsage) -> CacheUsage {
        CacheUsage {
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
        }
    }
}

/// In-memory dataset of preprocessed items
#[derive(Debug, Clone, Default)]
pub struct KanjiBurnDataset {
    items: Vec<KanjiItem>,
}

impl KanjiBurnDataset {
    pub fn new(items: Vec<KanjiItem>) -> Self {
        Self { items }
    }

    /// Preprocess every encoded sample, reusing cached tensors when a cache is given.
    ///
    /// Decode failures abort the whole preparation.
    pub fn prepare(
        samples: &[EncodedSample],
        image_size: usize,
        cache: Option<&FeatureCache>,
    ) -> Result<(Self, CacheUsage)> {
        let mut progress = ProgressLogger::new("Preprocessing images", samples.len());
        let mut usage = CacheUsage::default();
        let mut items = Vec::with_capacity(samples.len());
        let expected_len = 3 * image_size * image_size;

        for encoded in samples {
            let path = encoded.sample.path.to_string_lossy().into_owned();

            let key = cache.map(|_| FeatureCache::key(&encoded.bytes, image_size));
            let cached = cache
                .zip(key.as_deref())
                .and_then(|(cache, key)| cache.get(key, expected_len));

            let item = match cached {
                Some(image) => {
                    usage.hits += 1;
                    KanjiItem {
                        image,
                        label: encoded.key,
                        path,
                    }
                }
                None => {
                    usage.misses += 1;
                    let item = KanjiItem::from_bytes(&encoded.bytes, encoded.key, path, image_size)
                        .map_err(|e| match e {
                            KanjiError::Decode(msg) => KanjiError::Dataset(format!(
                                "{}: {}",
                                encoded.sample.path.display(),
                                msg
                            )),
                            other => other,
                        })?;
                    if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
                        cache.put(key, &item.image)?;
                    }
                    item
                }
            };

            items.push(item);
            progress.increment();
        }

        progress.finish();
        if cache.is_some() {
            info!(
                "Feature cache: {} reused, {} computed",
                usage.hits, usage.misses
            );
        } else {
            debug!("Feature cache disabled, computed {} items", usage.misses);
        }

        Ok((Self { items }, usage))
    }

    pub fn items(&self) -> &[KanjiItem] {
        &self.items
    }
}

impl Dataset<KanjiItem> for KanjiBurnDataset {
    fn get(&self, index: usize) -> Option<KanjiItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A batch of kanji images
#[derive(Clone, Debug)]
pub struct KanjiBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Batch of label keys with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher stacking preprocessed items and applying channel normalization
#[derive(Clone, Debug)]
pub struct KanjiBatcher {
    image_size: usize,
}

impl KanjiBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }

    /// Stack raw CHW buffers into a normalized image tensor
    pub fn images<B: Backend>(&self, data: Vec<f32>, batch_size: usize, device: &B::Device) -> Tensor<B, 4> {
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(data, [batch_size, 3, self.image_size, self.image_size]),
            device,
        );

        let mean = Tensor::<B, 4>::from_floats(
            TensorData::new(CHANNEL_MEAN.to_vec(), [1, 3, 1, 1]),
            device,
        );
        let std = Tensor::<B, 4>::from_floats(
            TensorData::new(CHANNEL_STD.to_vec(), [1, 3, 1, 1]),
            device,
        );

        (images - mean) / std
    }
}

impl<B: Backend> Batcher<B, KanjiItem, KanjiBatch<B>> for KanjiBatcher {
    fn batch(&self, items: Vec<KanjiItem>, device: &B::Device) -> KanjiBatch<B> {
        let batch_size = items.len();

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let images_data: Vec<f32> = items.into_iter().flat_map(|item| item.image).collect();

        let images = self.images::<B>(images_data, batch_size, device);
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        KanjiBatch { images, targets }
    }
}
