//! Model Initialisation
//!
//! Builds the network for a run: optionally load ImageNet weights, freeze
//! the backbone when feature extracting, then replace the classifier with a
//! new head sized for the dataset.

use burn::module::Module;
use burn::tensor::backend::Backend;
use tracing::info;

use super::pretrained::{load_pretrained, PRETRAINED_BASE_WIDTH};
use super::resnet::{ResNet, ResNetConfig, IMAGENET_CLASSES};
use crate::config::{ModelName, ModelSettings};
use crate::utils::error::{FinetuneError, Result};

/// Freeze every parameter of `model` when feature extracting
///
/// Frozen parameters get no gradients, so the optimizer leaves them untouched.
pub fn set_parameter_requires_grad<B: Backend, M: Module<B>>(model: M, feature_extract: bool) -> M {
    if feature_extract {
        model.no_grad()
    } else {
        model
    }
}

/// Number of parameters the optimizer will update
pub fn count_trainable_params<B: Backend>(model: &ResNet<B>, feature_extract: bool) -> usize {
    if feature_extract {
        model.fc.num_params()
    } else {
        model.num_params()
    }
}

/// Build the network described by `settings`
///
/// Returns the model together with the input resolution it expects.
pub fn initialize_model<B: Backend>(
    model_name: ModelName,
    settings: &ModelSettings,
    device: &B::Device,
) -> Result<(ResNet<B>, usize)> {
    let input_size = settings
        .input_size
        .unwrap_or_else(|| model_name.input_size());

    let model = match model_name {
        ModelName::Resnet => {
            let backbone = if settings.use_pretrained {
                if settings.base_width != PRETRAINED_BASE_WIDTH {
                    return Err(FinetuneError::Config(format!(
                        "Pretrained weights need base_width {}, got {}",
                        PRETRAINED_BASE_WIDTH, settings.base_width
                    )));
                }
                let path = settings.pretrained_weights.as_deref().ok_or_else(|| {
                    FinetuneError::Model(
                        "use_pretrained is set but no pretrained_weights path is configured"
                            .to_string(),
                    )
                })?;
                load_pretrained::<B>(path, device)?
            } else {
                ResNetConfig::new()
                    .with_num_classes(IMAGENET_CLASSES)
                    .with_base_width(settings.base_width)
                    .init::<B>(device)
            };

            set_parameter_requires_grad::<B, _>(backbone, settings.feature_extract)
                .replace_head(settings.num_classes, device)
        }
    };

    info!(
        "Initialized {} ({} classes, pretrained: {}, feature extract: {}): {} of {} parameters trainable",
        model_name,
        settings.num_classes,
        settings.use_pretrained,
        settings.feature_extract,
        count_trainable_params(&model, settings.feature_extract),
        model.num_params()
    );

    Ok((model, input_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray>;

    fn scratch_settings(feature_extract: bool) -> ModelSettings {
        ModelSettings {
            num_classes: 3,
            feature_extract,
            use_pretrained: false,
            pretrained_weights: None,
            input_size: Some(32),
            base_width: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_initialize_from_scratch() {
        let device = Default::default();
        let (model, input_size) =
            initialize_model::<TestBackend>(ModelName::Resnet, &scratch_settings(false), &device)
                .unwrap();

        assert_eq!(input_size, 32);
        assert_eq!(model.num_classes(), 3);
        assert_eq!(
            count_trainable_params(&model, false),
            model.num_params()
        );
    }

    #[test]
    fn test_default_input_size() {
        let device = Default::default();
        let settings = ModelSettings {
            input_size: None,
            ..scratch_settings(true)
        };
        let (_, input_size) =
            initialize_model::<TestBackend>(ModelName::Resnet, &settings, &device).unwrap();
        assert_eq!(input_size, 224);
    }

    #[test]
    fn test_feature_extract_only_head_gets_gradients() {
        let device = Default::default();
        let (model, _) =
            initialize_model::<TestBackend>(ModelName::Resnet, &scratch_settings(true), &device)
                .unwrap();
        assert_eq!(count_trainable_params(&model, true), 32 * 3 + 3);

        let input = Tensor::<TestBackend, 4>::ones([2, 3, 32, 32], &device);
        let grads = model.forward(input).sum().backward();

        assert!(model.fc.weight.val().grad(&grads).is_some());
        assert!(model.conv1.weight.val().grad(&grads).is_none());
        assert!(model.layer4[1].conv2.weight.val().grad(&grads).is_none());
    }

    #[test]
    fn test_fine_tune_backbone_gets_gradients() {
        let device = Default::default();
        let (model, _) =
            initialize_model::<TestBackend>(ModelName::Resnet, &scratch_settings(false), &device)
                .unwrap();

        let input = Tensor::<TestBackend, 4>::ones([2, 3, 32, 32], &device);
        let grads = model.forward(input).sum().backward();

        assert!(model.conv1.weight.val().grad(&grads).is_some());
        assert!(model.fc.weight.val().grad(&grads).is_some());
    }

    #[test]
    fn test_pretrained_requires_weights_file() {
        let device = Default::default();
        let settings = ModelSettings {
            use_pretrained: true,
            base_width: 64,
            pretrained_weights: Some("/missing/resnet18.pth".into()),
            ..scratch_settings(true)
        };
        let result = initialize_model::<TestBackend>(ModelName::Resnet, &settings, &device);
        assert!(matches!(result, Err(FinetuneError::Model(_))));
    }

    #[test]
    fn test_pretrained_rejects_custom_width() {
        let device = Default::default();
        let settings = ModelSettings {
            use_pretrained: true,
            ..scratch_settings(true)
        };
        let result = initialize_model::<TestBackend>(ModelName::Resnet, &settings, &device);
        assert!(matches!(result, Err(FinetuneError::Config(_))));
    }
}
