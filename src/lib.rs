//! # resnet_kfold
//!
//! K-fold fine-tuning of a ResNet-18 image classifier with the Burn framework.
//!
//! For every split of a `split_<k>/{train,val}/<class>` dataset tree, a
//! model is initialised (optionally from ImageNet weights, optionally with a
//! frozen backbone), trained with SGD, and the weights with the best
//! validation accuracy are written next to the per-epoch training curves.
//!
//! ## Modules
//!
//! - `config`: Experiment configuration (TOML)
//! - `dataset`: ImageFolder scanning, transforms, loaders and k-fold layout
//! - `model`: ResNet-18, ImageNet weight import and model initialisation
//! - `training`: The epoch/phase training loop
//! - `output`: Progress CSVs, weights and run summary
//! - `experiment`: Runs every split of a configuration
//! - `utils`: Logging, errors and formatting helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use resnet_kfold::backend::{default_device, TrainingBackend};
//! use resnet_kfold::{run_experiment, ExperimentConfig, RunOptions};
//!
//! let config = ExperimentConfig::load("experiment.toml".as_ref())?;
//! let summary = run_experiment::<TrainingBackend>(&config, &default_device(), &RunOptions::default())?;
//! println!("mean best acc: {:.4}", summary.mean_best_acc());
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod experiment;
pub mod model;
pub mod output;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::{ExperimentConfig, ModelName};
pub use dataset::{get_k_fold_data, write_folds, ImageFolder, Phase, SplitLoaders};
pub use experiment::{run_experiment, RunOptions};
pub use model::{initialize_model, set_parameter_requires_grad, ImageClassifier, ResNet};
pub use output::{write_progress_csv, ExperimentSummary};
pub use training::{train_model, TrainOutcome, TrainingHistory};
pub use utils::error::{FinetuneError, Result};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
