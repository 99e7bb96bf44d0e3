//! Model module for fine-tuning image classifiers with Burn
//!
//! This module provides:
//! - The ResNet-18 architecture
//! - Import of torchvision ImageNet weights
//! - Model initialisation with head replacement and backbone freezing
//!
//! Every trainable network implements [`ImageClassifier`], which is all the
//! training loop needs to know about a model.

pub mod factory;
pub mod pretrained;
pub mod resnet;

use burn::module::Module;
use burn::tensor::{backend::Backend, Tensor};

// Re-export main types for convenience
pub use factory::{count_trainable_params, initialize_model, set_parameter_requires_grad};
pub use pretrained::{load_pretrained, RESNET18_WEIGHTS_URL};
pub use resnet::{ResNet, ResNetConfig};

/// Logits produced in training mode
#[derive(Debug, Clone)]
pub struct ClassifierOutput<B: Backend> {
    /// Main classifier logits [batch_size, num_classes]
    pub logits: Tensor<B, 2>,
    /// Auxiliary classifier logits, for networks with a side head
    pub aux_logits: Option<Tensor<B, 2>>,
}

/// A network mapping images to class logits
pub trait ImageClassifier<B: Backend>: Module<B> {
    /// Evaluation forward pass: [batch_size, 3, H, W] -> [batch_size, num_classes]
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Training forward pass, including auxiliary logits when the network has them
    fn forward_train(&self, images: Tensor<B, 4>) -> ClassifierOutput<B> {
        ClassifierOutput {
            logits: self.forward(images),
            aux_logits: None,
        }
    }
}
