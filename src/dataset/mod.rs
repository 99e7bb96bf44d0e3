//! Dataset module for k-fold image classification data
//!
//! This module provides functionality for:
//! - Scanning ImageFolder trees (one sub-directory per class)
//! - Train/val image transforms with ImageNet normalisation
//! - Burn dataset, batcher and per-epoch loaders
//! - Reading and writing the `split_<k>/{train,val}` k-fold layout

pub mod burn_dataset;
pub mod image_folder;
pub mod kfold;
pub mod transforms;

use std::fmt;

// Re-export main types for convenience
pub use burn_dataset::{
    EpochLoader, ImageBatch, ImageFolderDataset, LoaderOptions, RawImageItem, TransformBatcher,
};
pub use image_folder::{ImageFolder, ImageSample};
pub use kfold::{get_k_fold_data, write_folds, FoldStats, KFoldOptions, SplitLoaders};
pub use transforms::{ImageTransform, TransformConfig};

/// Phase of an epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Train,
    Val,
}

impl Phase {
    /// Both phases in the order an epoch runs them
    pub const ALL: [Phase; 2] = [Phase::Train, Phase::Val];

    /// Directory name of the phase inside a split
    pub fn dir_name(&self) -> &'static str {
        match self {
            Phase::Train => "train",
            Phase::Val => "val",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_and_names() {
        assert_eq!(Phase::ALL, [Phase::Train, Phase::Val]);
        assert_eq!(Phase::Train.to_string(), "train");
        assert_eq!(Phase::Val.dir_name(), "val");
    }
}
