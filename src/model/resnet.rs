//! ResNet-18 Architecture
//!
//! The torchvision `resnet18` layout built with Burn modules. Field names
//! follow the torchvision state dict (`conv1`, `bn1`, `layer1..layer4`, `fc`)
//! so ImageNet weights can be imported directly.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::{ClassifierOutput, ImageClassifier};

/// Residual blocks per stage of ResNet-18
pub const RESNET18_BLOCKS: [usize; 4] = [2, 2, 2, 2];

/// Number of ImageNet classes of the pretrained head
pub const IMAGENET_CLASSES: usize = 1000;

/// Configuration for ResNet-18
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Number of output classes
    #[config(default = "1000")]
    pub num_classes: usize,

    /// Channels of the first stage, doubled at every later stage
    #[config(default = "64")]
    pub base_width: usize,
}

impl ResNetConfig {
    /// Width of the pooled feature vector fed to `fc`
    pub fn num_features(&self) -> usize {
        self.base_width * 8
    }

    /// Initialize a randomly weighted network
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        let width = self.base_width;

        let conv1 = Conv2dConfig::new([3, width], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);
        let bn1 = BatchNormConfig::new(width).init(device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        // Stage widths: w -> 2w -> 4w -> 8w
        let layer1 = make_stage(width, width, RESNET18_BLOCKS[0], 1, device);
        let layer2 = make_stage(width, width * 2, RESNET18_BLOCKS[1], 2, device);
        let layer3 = make_stage(width * 2, width * 4, RESNET18_BLOCKS[2], 2, device);
        let layer4 = make_stage(width * 4, width * 8, RESNET18_BLOCKS[3], 2, device);

        let avgpool = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let fc = LinearConfig::new(self.num_features(), self.num_classes).init(device);

        ResNet {
            conv1,
            bn1,
            maxpool,
            layer1,
            layer2,
            layer3,
            layer4,
            avgpool,
            fc,
        }
    }
}

/// 1x1 projection on the shortcut of a block that changes shape
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [1, 1])
            .with_stride([stride, stride])
            .with_bias(false)
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);
        Self { conv, bn }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Two 3x3 convolutions with an identity (or projected) shortcut
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B, 2>,
    pub downsample: Option<Downsample<B>>,
}

impl<B: Backend> BasicBlock<B> {
    /// Create a block; a shortcut projection is added when the shape changes
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);
        let bn1 = BatchNormConfig::new(out_channels).init(device);

        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);
        let bn2 = BatchNormConfig::new(out_channels).init(device);

        let downsample = if stride != 1 || in_channels != out_channels {
            Some(Downsample::new(in_channels, out_channels, stride, device))
        } else {
            None
        };

        Self {
            conv1,
            bn1,
            conv2,
            bn2,
            downsample,
        }
    }

    /// Forward pass through the block
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(x.clone()),
            None => x.clone(),
        };

        let out = self.conv1.forward(x);
        let out = self.bn1.forward(out);
        let out = Relu::new().forward(out);

        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);

        Relu::new().forward(out + identity)
    }
}

fn make_stage<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    blocks: usize,
    stride: usize,
    device: &B::Device,
) -> Vec<BasicBlock<B>> {
    (0..blocks)
        .map(|i| {
            if i == 0 {
                BasicBlock::new(in_channels, out_channels, stride, device)
            } else {
                BasicBlock::new(out_channels, out_channels, 1, device)
            }
        })
        .collect()
}

/// ResNet-18 image classifier
///
/// Architecture:
/// - 7x7/2 stem convolution, BatchNorm, ReLU, 3x3/2 max pool
/// - Four stages of two basic blocks each
/// - Global average pooling
/// - Fully connected classifier (`fc`)
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub maxpool: MaxPool2d,
    pub layer1: Vec<BasicBlock<B>>,
    pub layer2: Vec<BasicBlock<B>>,
    pub layer3: Vec<BasicBlock<B>>,
    pub layer4: Vec<BasicBlock<B>>,
    pub avgpool: AdaptiveAvgPool2d,
    pub fc: Linear<B>,
}

impl<B: Backend> ResNet<B> {
    /// Pooled backbone features of shape [batch_size, num_features]
    pub fn features(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.bn1.forward(x);
        let x = Relu::new().forward(x);
        let x = self.maxpool.forward(x);

        let x = self
            .layer1
            .iter()
            .chain(&self.layer2)
            .chain(&self.layer3)
            .chain(&self.layer4)
            .fold(x, |x, block| block.forward(x));

        // [B, C, H, W] -> [B, C, 1, 1] -> [B, C]
        let x = self.avgpool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        x.reshape([batch_size, channels])
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.fc.forward(self.features(x))
    }

    /// Swap the classifier for a freshly initialised `num_features -> num_classes` layer
    ///
    /// The new layer is trainable even if the rest of the network is frozen.
    pub fn replace_head(mut self, num_classes: usize, device: &B::Device) -> Self {
        self.fc = LinearConfig::new(self.num_features(), num_classes).init(device);
        self
    }

    /// Number of output classes
    pub fn num_classes(&self) -> usize {
        // Linear weights are stored as [d_input, d_output]
        self.fc.weight.val().dims()[1]
    }

    /// Width of the pooled feature vector
    pub fn num_features(&self) -> usize {
        self.fc.weight.val().dims()[0]
    }
}

impl<B: Backend> ImageClassifier<B> for ResNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        ResNet::forward(self, images)
    }

    fn forward_train(&self, images: Tensor<B, 4>) -> ClassifierOutput<B> {
        ClassifierOutput {
            logits: ResNet::forward(self, images),
            aux_logits: None,
        }
    }
}
