//! Experiment Configuration
//!
//! Hyperparameters and paths for a k-fold fine-tuning run. The defaults
//! reproduce the reference run: ResNet-18, 2 classes, batch size 50, one
//! epoch per split, three splits, feature extraction on pretrained weights.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::error::{FinetuneError, Result};

/// Supported network architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelName {
    /// ResNet-18
    Resnet,
}

impl ModelName {
    /// Input resolution the architecture was pretrained at
    pub fn input_size(&self) -> usize {
        match self {
            ModelName::Resnet => 224,
        }
    }
}

impl FromStr for ModelName {
    type Err = FinetuneError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "resnet" | "resnet18" => Ok(ModelName::Resnet),
            other => Err(FinetuneError::InvalidModelName(other.to_string())),
        }
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelName::Resnet => write!(f, "resnet"),
        }
    }
}

/// Model construction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Architecture name ("resnet")
    pub model_name: String,
    /// Number of output classes of the new head
    pub num_classes: usize,
    /// Freeze the backbone and only train the new head
    pub feature_extract: bool,
    /// Start from ImageNet weights
    pub use_pretrained: bool,
    /// torchvision `resnet18` state dict (`.pth`)
    pub pretrained_weights: Option<PathBuf>,
    /// Override of the architecture's input resolution
    pub input_size: Option<usize>,
    /// Channel width of the first stage (64 for the standard network)
    pub base_width: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_name: "resnet".to_string(),
            num_classes: 2,
            feature_extract: true,
            use_pretrained: true,
            pretrained_weights: Some(PathBuf::from("weights/resnet18-f37072fd.pth")),
            input_size: None,
            base_width: 64,
        }
    }
}

/// Dataset location and loading settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Root holding `split_<k>/{train,val}/<class>/...`
    pub data_dir: PathBuf,
    /// Number of splits, read as `split_1..=split_<n>`
    pub num_splits: usize,
    /// Mini-batch size for both phases
    pub batch_size: usize,
    /// Worker threads used to decode and transform images
    pub num_workers: usize,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            num_splits: 3,
            batch_size: 50,
            num_workers: 4,
        }
    }
}

/// SGD settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    pub learning_rate: f64,
    pub momentum: f64,
    /// Weight of the auxiliary-head loss in the train phase
    pub aux_loss_weight: f64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            momentum: 0.9,
            aux_loss_weight: 0.4,
        }
    }
}

/// Run-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Epochs per split
    pub num_epochs: usize,
    /// Root for `progress/` and `weights/`
    pub output_dir: PathBuf,
    /// Seed for shuffling and random augmentation
    pub seed: u64,
    /// Build a fresh model and optimizer for every split instead of
    /// continuing from the previous split's best weights
    pub reset_model_per_split: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            num_epochs: 1,
            output_dir: PathBuf::from("./output"),
            seed: 42,
            reset_model_per_split: false,
        }
    }
}

/// Full configuration of a k-fold fine-tuning experiment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub model: ModelSettings,
    pub data: DataSettings,
    pub optimizer: OptimizerSettings,
    pub run: RunSettings,
}

impl ExperimentConfig {
    /// Load a configuration from a TOML file; missing keys take defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FinetuneError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Parsed architecture name
    pub fn model_name(&self) -> Result<ModelName> {
        self.model.model_name.parse()
    }

    /// Input resolution for the configured architecture
    pub fn input_size(&self) -> Result<usize> {
        match self.model.input_size {
            Some(size) => Ok(size),
            None => Ok(self.model_name()?.input_size()),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.model_name()?;

        if self.model.num_classes == 0 {
            return Err(FinetuneError::Config(
                "num_classes must be greater than 0".to_string(),
            ));
        }
        if self.model.base_width == 0 {
            return Err(FinetuneError::Config(
                "base_width must be greater than 0".to_string(),
            ));
        }
        if let Some(size) = self.model.input_size {
            if size < 32 {
                return Err(FinetuneError::Config(
                    "input_size must be at least 32".to_string(),
                ));
            }
        }
        if self.data.batch_size == 0 {
            return Err(FinetuneError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.data.num_splits == 0 {
            return Err(FinetuneError::Config(
                "num_splits must be greater than 0".to_string(),
            ));
        }
        if self.optimizer.learning_rate <= 0.0 {
            return Err(FinetuneError::Config(
                "learning_rate must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.optimizer.momentum) {
            return Err(FinetuneError::Config(
                "momentum must be in range [0.0, 1.0)".to_string(),
            ));
        }
        Ok(())
    }
}
