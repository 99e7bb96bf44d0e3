//! Burn Dataset Integration for ImageFolder Trees
//!
//! This module implements Burn's Dataset trait and Batcher for the
//! fine-tuning loop, plus an epoch loader that reshuffles, decodes in
//! parallel and batches the samples of one phase.

use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::{DynamicImage, ImageReader};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::warn;

use super::image_folder::{ImageFolder, ImageSample};
use super::transforms::{ImageTransform, IMAGENET_MEAN, IMAGENET_STD};
use crate::utils::error::{FinetuneError, Result};

/// A decoded image that has not been transformed yet
#[derive(Clone)]
pub struct RawImageItem {
    /// Decoded source image
    pub image: DynamicImage,
    /// Class label
    pub label: usize,
    /// Image path (for debugging/logging)
    pub path: PathBuf,
}

impl RawImageItem {
    /// Decode an image from disk
    pub fn from_sample(sample: &ImageSample) -> Result<Self> {
        let image = ImageReader::open(&sample.path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| {
                FinetuneError::Image(format!("Failed to decode {:?}: {}", sample.path, e))
            })?;

        Ok(Self {
            image,
            label: sample.label,
            path: sample.path.clone(),
        })
    }
}

impl std::fmt::Debug for RawImageItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawImageItem")
            .field("label", &self.label)
            .field("path", &self.path)
            .field(
                "image_size",
                &format!("{}x{}", self.image.width(), self.image.height()),
            )
            .finish()
    }
}

/// A raw item paired with the seed of its random transform
#[derive(Clone, Debug)]
pub struct SeededItem {
    pub item: RawImageItem,
    pub seed: u64,
}

/// ImageFolder samples exposed through Burn's Dataset trait
///
/// Images are decoded lazily on access.
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    samples: Vec<ImageSample>,
    classes: Vec<String>,
}

impl ImageFolderDataset {
    /// Build from a scanned folder
    pub fn from_folder(folder: ImageFolder) -> Self {
        let classes = folder.classes().to_vec();
        Self {
            samples: folder.into_samples(),
            classes,
        }
    }

    /// Scan `root` and build the dataset
    pub fn open<P: AsRef<std::path::Path>>(root: P) -> Result<Self> {
        Ok(Self::from_folder(ImageFolder::open(root)?))
    }

    /// Class names, index = label
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Number of classes
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Decode the item at `index`, reporting failures
    pub fn load(&self, index: usize) -> Result<RawImageItem> {
        let sample = self.samples.get(index).ok_or_else(|| {
            FinetuneError::Dataset(format!(
                "Index {} out of range for dataset of {} samples",
                index,
                self.samples.len()
            ))
        })?;
        RawImageItem::from_sample(sample)
    }
}

impl Dataset<RawImageItem> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<RawImageItem> {
        match self.load(index) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping sample {}: {}", index, e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images for training or evaluation
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher applying a phase transform and ImageNet normalisation
#[derive(Clone, Debug)]
pub struct TransformBatcher<B: Backend> {
    transform: ImageTransform,
    _backend: PhantomData<B>,
}

impl<B: Backend> TransformBatcher<B> {
    /// Create a batcher for the given transform
    pub fn new(transform: ImageTransform) -> Self {
        Self {
            transform,
            _backend: PhantomData,
        }
    }

    /// Output side length of the images
    pub fn image_size(&self) -> usize {
        self.transform.size() as usize
    }
}

impl<B: Backend> Batcher<B, SeededItem, ImageBatch<B>> for TransformBatcher<B> {
    fn batch(&self, items: Vec<SeededItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let channels = 3;
        let size = self.image_size();

        // Transform each image with its own seeded RNG
        let processed: Vec<(Vec<f32>, i64)> = items
            .into_par_iter()
            .map(|seeded| {
                let mut rng = ChaCha8Rng::seed_from_u64(seeded.seed);
                let data = self.transform.preprocess(seeded.item.image, &mut rng);
                (data, seeded.item.label as i64)
            })
            .collect();

        let mut images_data = Vec::with_capacity(batch_size * channels * size * size);
        let mut targets_data = Vec::with_capacity(batch_size);
        for (data, label) in processed {
            images_data.extend(data);
            targets_data.push(label);
        }

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, size, size]),
            device,
        );

        // ImageNet normalization: (x - mean) / std
        let mean = Tensor::<B, 4>::from_floats(
            TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]),
            device,
        );
        let std = Tensor::<B, 4>::from_floats(
            TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]),
            device,
        );
        let images = (images - mean) / std;

        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        ImageBatch { images, targets }
    }
}

/// Options of an epoch loader
#[derive(Clone, Debug)]
pub struct LoaderOptions {
    pub batch_size: usize,
    pub shuffle: bool,
    pub num_workers: usize,
    pub seed: u64,
}

/// Produces the batches of one phase, reshuffled every epoch
pub struct EpochLoader<B: Backend> {
    dataset: Arc<ImageFolderDataset>,
    batcher: TransformBatcher<B>,
    options: LoaderOptions,
    rng: ChaCha8Rng,
    pool: Arc<rayon::ThreadPool>,
    device: B::Device,
}

impl<B: Backend> EpochLoader<B> {
    /// Create a loader over `dataset`
    pub fn new(
        dataset: Arc<ImageFolderDataset>,
        batcher: TransformBatcher<B>,
        options: LoaderOptions,
        device: B::Device,
    ) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(FinetuneError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.num_workers.max(1))
            .build()
            .map_err(|e| FinetuneError::Dataset(format!("Failed to start loader workers: {}", e)))?;

        Ok(Self {
            dataset,
            batcher,
            rng: ChaCha8Rng::seed_from_u64(options.seed),
            options,
            pool: Arc::new(pool),
            device,
        })
    }

    /// Number of samples in the underlying dataset
    pub fn dataset_len(&self) -> usize {
        self.dataset.len()
    }

    /// Number of batches per epoch
    pub fn num_batches(&self) -> usize {
        self.dataset_len().div_ceil(self.options.batch_size)
    }

    /// Number of classes in the underlying dataset
    pub fn num_classes(&self) -> usize {
        self.dataset.num_classes()
    }

    /// Start a new epoch
    pub fn epoch(&mut self) -> EpochIter<'_, B> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.options.shuffle {
            order.shuffle(&mut self.rng);
        }
        EpochIter {
            loader: self,
            order,
            cursor: 0,
        }
    }

    fn load_batch(&mut self, indices: &[usize]) -> Result<ImageBatch<B>> {
        let seeds: Vec<u64> = indices.iter().map(|_| self.rng.gen()).collect();
        let dataset = &self.dataset;
        let batcher = &self.batcher;
        let device = &self.device;

        self.pool.install(|| {
            let items = indices
                .par_iter()
                .zip(seeds.par_iter())
                .map(|(&index, &seed)| dataset.load(index).map(|item| SeededItem { item, seed }))
                .collect::<Result<Vec<_>>>()?;

            Ok(batcher.batch(items, device))
        })
    }
}

/// Iterator over the batches of one epoch
pub struct EpochIter<'a, B: Backend> {
    loader: &'a mut EpochLoader<B>,
    order: Vec<usize>,
    cursor: usize,
}

impl<B: Backend> Iterator for EpochIter<'_, B> {
    type Item = Result<ImageBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }

        let end = (self.cursor + self.loader.options.batch_size).min(self.order.len());
        let indices = self.order[self.cursor..end].to_vec();
        self.cursor = end;

        Some(self.loader.load_batch(&indices))
    }
}
