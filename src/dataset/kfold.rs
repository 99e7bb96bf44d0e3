//! K-Fold Split Layout
//!
//! A k-fold dataset lives on disk as one ImageFolder pair per split:
//!
//! ```text
//! data_dir/
//! ├── split_1/
//! │   ├── train/<class>/*.jpg
//! │   └── val/<class>/*.jpg
//! ├── split_2/
//! └── ...
//! ```
//!
//! `get_k_fold_data` turns that layout into per-split loaders, and
//! `write_folds` produces it from a single ImageFolder with a stratified,
//! seeded fold assignment.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::tensor::backend::AutodiffBackend;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::burn_dataset::{EpochLoader, ImageFolderDataset, LoaderOptions, TransformBatcher};
use super::image_folder::ImageFolder;
use super::transforms::ImageTransform;
use super::Phase;
use crate::utils::error::{FinetuneError, Result};

/// Directory of split `split_id` under `data_dir`
pub fn split_dir(data_dir: &Path, split_id: usize) -> PathBuf {
    data_dir.join(format!("split_{}", split_id))
}

/// Directory of one phase of one split
pub fn phase_dir(data_dir: &Path, split_id: usize, phase: Phase) -> PathBuf {
    split_dir(data_dir, split_id).join(phase.dir_name())
}

/// Loading options shared by every split
#[derive(Clone, Debug)]
pub struct KFoldOptions {
    pub num_splits: usize,
    pub input_size: usize,
    pub batch_size: usize,
    pub num_workers: usize,
    pub seed: u64,
}

/// Train and validation loaders of one split
pub struct SplitLoaders<B: AutodiffBackend> {
    /// 1-based split identifier
    pub split_id: usize,
    /// Training loader (autodiff backend)
    pub train: EpochLoader<B>,
    /// Validation loader (inner backend, no gradients)
    pub val: EpochLoader<B::InnerBackend>,
    /// Class names shared by both phases
    pub classes: Vec<String>,
}

impl<B: AutodiffBackend> SplitLoaders<B> {
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Dataset size of a phase
    pub fn dataset_len(&self, phase: Phase) -> usize {
        match phase {
            Phase::Train => self.train.dataset_len(),
            Phase::Val => self.val.dataset_len(),
        }
    }
}

/// Build the loaders of one split
pub fn load_split<B: AutodiffBackend>(
    data_dir: &Path,
    split_id: usize,
    options: &KFoldOptions,
    device: &B::Device,
) -> Result<SplitLoaders<B>> {
    let split_root = split_dir(data_dir, split_id);
    if !split_root.is_dir() {
        return Err(FinetuneError::PathNotFound(split_root));
    }

    let train_dataset = ImageFolderDataset::open(phase_dir(data_dir, split_id, Phase::Train))?;
    let val_dataset = ImageFolderDataset::open(phase_dir(data_dir, split_id, Phase::Val))?;

    if train_dataset.classes() != val_dataset.classes() {
        return Err(FinetuneError::Dataset(format!(
            "split_{}: train classes {:?} differ from val classes {:?}",
            split_id,
            train_dataset.classes(),
            val_dataset.classes()
        )));
    }
    let classes = train_dataset.classes().to_vec();

    let size = options.input_size as u32;
    let loader_options = |phase_offset: u64| LoaderOptions {
        batch_size: options.batch_size,
        shuffle: true,
        num_workers: options.num_workers,
        seed: options
            .seed
            .wrapping_add((split_id as u64) * 1_000)
            .wrapping_add(phase_offset),
    };

    let train = EpochLoader::new(
        Arc::new(train_dataset),
        TransformBatcher::new(ImageTransform::for_phase(Phase::Train, size)),
        loader_options(0),
        device.clone(),
    )?;

    let val = EpochLoader::new(
        Arc::new(val_dataset),
        TransformBatcher::new(ImageTransform::for_phase(Phase::Val, size)),
        loader_options(1),
        device.clone(),
    )?;

    info!(
        "split_{}: {} train / {} val images, {} classes",
        split_id,
        train.dataset_len(),
        val.dataset_len(),
        classes.len()
    );

    Ok(SplitLoaders {
        split_id,
        train,
        val,
        classes,
    })
}

/// Build the loaders of every split `1..=num_splits`
pub fn get_k_fold_data<B: AutodiffBackend>(
    data_dir: &Path,
    options: &KFoldOptions,
    device: &B::Device,
) -> Result<Vec<SplitLoaders<B>>> {
    (1..=options.num_splits)
        .map(|split_id| load_split::<B>(data_dir, split_id, options, device))
        .collect()
}

/// Per-split image counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitSummary {
    pub split_id: usize,
    pub classes: Vec<String>,
    pub train_counts: Vec<usize>,
    pub val_counts: Vec<usize>,
}

/// Count images per class in every split without decoding them
pub fn summarize_splits(data_dir: &Path, num_splits: usize) -> Result<Vec<SplitSummary>> {
    (1..=num_splits)
        .map(|split_id| {
            let train = ImageFolder::open(phase_dir(data_dir, split_id, Phase::Train))?;
            let val = ImageFolder::open(phase_dir(data_dir, split_id, Phase::Val))?;
            Ok(SplitSummary {
                split_id,
                classes: train.classes().to_vec(),
                train_counts: train.class_counts(),
                val_counts: val.class_counts(),
            })
        })
        .collect()
}

/// Result of writing a k-fold layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldStats {
    pub num_splits: usize,
    pub num_classes: usize,
    pub total_images: usize,
    /// Validation images per split
    pub val_sizes: Vec<usize>,
}

/// Write a stratified k-fold layout of `source` into `dest`
///
/// Images of each class are shuffled with `seed` and dealt round-robin into
/// `k` folds. Split `f + 1` validates on fold `f` and trains on the rest.
/// Fails before copying anything if a class has fewer than `k` images.
pub fn write_folds(source: &Path, dest: &Path, k: usize, seed: u64) -> Result<FoldStats> {
    if k < 2 {
        return Err(FinetuneError::Config(format!(
            "k-fold splitting needs at least 2 folds, got {}",
            k
        )));
    }

    let folder = ImageFolder::open(source)?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut by_class: BTreeMap<usize, Vec<PathBuf>> = BTreeMap::new();
    for sample in folder.samples() {
        by_class
            .entry(sample.label)
            .or_default()
            .push(sample.path.clone());
    }

    // Every val split needs at least one image of every class
    for (label, paths) in &by_class {
        if paths.len() < k {
            return Err(FinetuneError::Dataset(format!(
                "Class '{}' has {} images, fewer than {} folds",
                folder.classes()[*label],
                paths.len(),
                k
            )));
        }
    }

    let mut val_sizes = vec![0usize; k];

    for (label, mut paths) in by_class {
        let class_name = &folder.classes()[label];
        paths.shuffle(&mut rng);

        for (position, path) in paths.iter().enumerate() {
            let fold = position % k;
            let file_name = unique_file_name(source, path);

            for split in 0..k {
                let phase = if split == fold { Phase::Val } else { Phase::Train };
                let target_dir = phase_dir(dest, split + 1, phase).join(class_name);
                fs::create_dir_all(&target_dir)?;
                fs::copy(path, target_dir.join(&file_name))?;
            }
            val_sizes[fold] += 1;
        }
    }

    info!(
        "Wrote {} folds of {} images ({} classes) to {:?}",
        k,
        folder.len(),
        folder.num_classes(),
        dest
    );

    Ok(FoldStats {
        num_splits: k,
        num_classes: folder.num_classes(),
        total_images: folder.len(),
        val_sizes,
    })
}

/// Flatten a path below its class directory into one file name
fn unique_file_name(source: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(source).unwrap_or(path);
    let mut components: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    // Drop the class directory
    if components.len() > 1 {
        components.remove(0);
    }
    components.join("__")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::image_folder::tests::write_image;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn build_source(dir: &Path, per_class: usize) {
        for i in 0..per_class {
            write_image(&dir.join(format!("cats/{i}.png")), [200, 10, 10], (16, 16));
            write_image(&dir.join(format!("dogs/{i}.png")), [10, 10, 200], (16, 16));
        }
    }

    fn options(num_splits: usize) -> KFoldOptions {
        KFoldOptions {
            num_splits,
            input_size: 8,
            batch_size: 2,
            num_workers: 1,
            seed: 42,
        }
    }

    #[test]
    fn test_split_paths() {
        let root = Path::new("/data");
        assert_eq!(split_dir(root, 2), PathBuf::from("/data/split_2"));
        assert_eq!(
            phase_dir(root, 1, Phase::Val),
            PathBuf::from("/data/split_1/val")
        );
    }

    #[test]
    fn test_write_folds_is_stratified_partition() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        build_source(src.path(), 6);

        let stats = write_folds(src.path(), dst.path(), 3, 7).unwrap();
        assert_eq!(stats.total_images, 12);
        assert_eq!(stats.val_sizes, vec![4, 4, 4]);

        for split in 1..=3 {
            let train = ImageFolder::open(phase_dir(dst.path(), split, Phase::Train)).unwrap();
            let val = ImageFolder::open(phase_dir(dst.path(), split, Phase::Val)).unwrap();
            assert_eq!(train.len() + val.len(), 12);
            assert_eq!(val.class_counts(), vec![2, 2]);

            assert_eq!(train.len(), 8);

            let key = |s: &crate::dataset::image_folder::ImageSample| {
                (s.label, s.path.file_name().map(|n| n.to_owned()))
            };
            for sample in val.samples() {
                let leaked = train.samples().iter().any(|t| key(t) == key(sample));
                assert!(!leaked, "validation image leaked into training set");
            }
        }
    }

    #[test]
    fn test_write_folds_requires_two_folds() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        build_source(src.path(), 2);
        assert!(write_folds(src.path(), dst.path(), 1, 0).is_err());
    }

    #[test]
    fn test_write_folds_rejects_class_smaller_than_k() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        for i in 0..5 {
            write_image(&src.path().join(format!("ants/{i}.png")), [200, 10, 10], (16, 16));
        }
        for i in 0..2 {
            write_image(&src.path().join(format!("bees/{i}.png")), [10, 10, 200], (16, 16));
        }

        let result = write_folds(src.path(), dst.path(), 3, 0);
        match result {
            Err(FinetuneError::Dataset(msg)) => assert!(msg.contains("bees")),
            other => panic!("expected a dataset error, got {:?}", other),
        }
        assert!(!split_dir(dst.path(), 1).exists());

        // Exactly k images per class is enough for every split to load
        write_folds(src.path(), dst.path(), 2, 0).unwrap();
        let splits =
            get_k_fold_data::<TestBackend>(dst.path(), &options(2), &Default::default()).unwrap();
        assert!(splits.iter().all(|s| s.num_classes() == 2));
    }

    #[test]
    fn test_get_k_fold_data() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        build_source(src.path(), 4);
        write_folds(src.path(), dst.path(), 2, 1).unwrap();

        let splits =
            get_k_fold_data::<TestBackend>(dst.path(), &options(2), &Default::default()).unwrap();
        assert_eq!(splits.len(), 2);
        assert_eq!(splits[0].split_id, 1);
        assert_eq!(splits[1].split_id, 2);
        assert_eq!(splits[0].dataset_len(Phase::Train), 4);
        assert_eq!(splits[0].dataset_len(Phase::Val), 4);
        assert_eq!(splits[0].classes, vec!["cats".to_string(), "dogs".to_string()]);
    }

    #[test]
    fn test_both_phases_use_the_given_device() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        build_source(src.path(), 2);
        write_folds(src.path(), dst.path(), 2, 1).unwrap();

        let device = burn_ndarray::NdArrayDevice::Cpu;
        let mut split = load_split::<TestBackend>(dst.path(), 1, &options(2), &device).unwrap();

        let train_batch = split.train.epoch().next().unwrap().unwrap();
        let val_batch = split.val.epoch().next().unwrap().unwrap();
        assert_eq!(train_batch.images.device(), device);
        assert_eq!(val_batch.images.device(), device);
    }

    #[test]
    fn test_missing_split_is_reported() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        build_source(src.path(), 2);
        write_folds(src.path(), dst.path(), 2, 1).unwrap();

        let result = get_k_fold_data::<TestBackend>(dst.path(), &options(3), &Default::default());
        assert!(matches!(result, Err(FinetuneError::PathNotFound(_))));
    }

    #[test]
    fn test_summarize_splits() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        build_source(src.path(), 4);
        write_folds(src.path(), dst.path(), 2, 3).unwrap();

        let summaries = summarize_splits(dst.path(), 2).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].train_counts, vec![2, 2]);
        assert_eq!(summaries[0].val_counts, vec![2, 2]);
    }
}
