//! ImageNet Weights Import
//!
//! Loads the torchvision `resnet18` state dict (`resnet18-f37072fd.pth`) into
//! [`ResNet`]. The only key difference between the two layouts is the
//! shortcut projection, stored as `downsample.0`/`downsample.1` by PyTorch.

use std::path::Path;

use burn::module::Module;
use burn::record::{FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use tracing::info;

use super::resnet::{ResNet, ResNetConfig, ResNetRecord, IMAGENET_CLASSES};
use crate::utils::error::{FinetuneError, Result};

/// Download location of the torchvision ResNet-18 ImageNet weights
pub const RESNET18_WEIGHTS_URL: &str = "https://download.pytorch.org/models/resnet18-f37072fd.pth";

/// Channel width the ImageNet weights were trained with
pub const PRETRAINED_BASE_WIDTH: usize = 64;

/// Load ImageNet weights, returning a network with the 1000-class head
pub fn load_pretrained<B: Backend>(path: &Path, device: &B::Device) -> Result<ResNet<B>> {
    if !path.is_file() {
        return Err(FinetuneError::Model(format!(
            "Pretrained weights not found at {} (download {})",
            path.display(),
            RESNET18_WEIGHTS_URL
        )));
    }

    let load_args = LoadArgs::new(path.to_path_buf())
        .with_key_remap(r"(.+)\.downsample\.0\.(.+)", "$1.downsample.conv.$2")
        .with_key_remap(r"(.+)\.downsample\.1\.(.+)", "$1.downsample.bn.$2");

    let record: ResNetRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
        .load(load_args, device)
        .map_err(|e| {
            FinetuneError::Model(format!(
                "Failed to load pretrained weights from {}: {}",
                path.display(),
                e
            ))
        })?;

    let model = ResNetConfig::new()
        .with_num_classes(IMAGENET_CLASSES)
        .with_base_width(PRETRAINED_BASE_WIDTH)
        .init::<B>(device)
        .load_record(record);

    info!("Loaded ImageNet weights from {:?}", path);
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    #[test]
    fn test_missing_weights_file() {
        let device = Default::default();
        let result = load_pretrained::<NdArray>(Path::new("/no/such/resnet18.pth"), &device);
        match result {
            Err(FinetuneError::Model(msg)) => assert!(msg.contains("resnet18-f37072fd.pth")),
            other => panic!("expected model error, got {:?}", other.map(|_| ())),
        }
    }
}
