//! K-Fold Experiment Driver
//!
//! Runs [`train_model`] once per split and persists the curves, the best
//! weights and a JSON summary of the whole run.

use burn::optim::momentum::MomentumConfig;
use burn::optim::SgdConfig;
use burn::tensor::backend::AutodiffBackend;
use chrono::Utc;
use tracing::{info, warn};

use crate::config::ExperimentConfig;
use crate::dataset::kfold::{get_k_fold_data, KFoldOptions};
use crate::dataset::Phase;
use crate::model::{initialize_model, ResNet};
use crate::output::{save_weights, write_progress_csv, ExperimentSummary, OutputLayout, SplitReport};
use crate::training::{train_model, TrainSettings};
use crate::utils::error::{FinetuneError, Result};
use crate::utils::format_duration;

/// Options of a run that are not part of the experiment configuration
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Draw batch progress bars
    pub show_progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            show_progress: true,
        }
    }
}

/// SGD with momentum and no dampening
pub fn build_sgd_config(config: &ExperimentConfig) -> SgdConfig {
    SgdConfig::new().with_momentum(Some(
        MomentumConfig::new()
            .with_momentum(config.optimizer.momentum)
            .with_dampening(0.0),
    ))
}

/// Fine-tune on every split of `config.data.data_dir`
///
/// By default one model and one optimizer (momentum buffers included) run
/// through all splits, each split starting from the previous split's best
/// weights. `reset_model_per_split` starts every split from scratch.
pub fn run_experiment<B: AutodiffBackend>(
    config: &ExperimentConfig,
    device: &B::Device,
    options: &RunOptions,
) -> Result<ExperimentSummary> {
    config.validate()?;
    let model_name = config.model_name()?;
    let input_size = config.input_size()?;

    let layout = OutputLayout::new(&config.run.output_dir);
    layout.prepare()?;

    let kfold_options = KFoldOptions {
        num_splits: config.data.num_splits,
        input_size,
        batch_size: config.data.batch_size,
        num_workers: config.data.num_workers,
        seed: config.run.seed,
    };

    // Every split is checked before any training starts
    let mut splits = get_k_fold_data::<B>(&config.data.data_dir, &kfold_options, device)?;

    for loaders in &splits {
        if loaders.num_classes() != config.model.num_classes {
            return Err(FinetuneError::Config(format!(
                "split_{} has {} classes {:?} but num_classes is {}",
                loaders.split_id,
                loaders.num_classes(),
                loaders.classes,
                config.model.num_classes
            )));
        }
    }

    let settings = TrainSettings::from_config(config).with_progress(options.show_progress);
    let mut summary = ExperimentSummary::new(&model_name.to_string());

    let reset = config.run.reset_model_per_split;
    if !reset {
        warn!("Model and optimizer carry over between splits; later splits have trained on their validation images");
    }

    let mut model = initialize_model::<B>(model_name, &config.model, device)?.0;
    let mut optimizer = build_sgd_config(config).init::<B, ResNet<B>>();

    let num_splits = splits.len();
    for (index, loaders) in splits.iter_mut().enumerate() {
        info!("Split {}/{}", loaders.split_id, num_splits);

        if reset && index > 0 {
            model = initialize_model::<B>(model_name, &config.model, device)?.0;
            optimizer = build_sgd_config(config).init::<B, ResNet<B>>();
        }

        let outcome = train_model(model, loaders, &mut optimizer, &settings)?;

        let progress_csv = layout.progress_path(loaders.split_id);
        write_progress_csv(
            &progress_csv,
            &outcome.history,
            outcome.best_acc,
            outcome.elapsed_secs,
        )?;
        let weights = save_weights::<B, _>(&outcome.model, &layout.weights_path(loaders.split_id))?;

        info!(
            "split_{} done in {}: best val acc {:.4}",
            loaders.split_id,
            format_duration(outcome.elapsed_secs),
            outcome.best_acc
        );

        summary.splits.push(SplitReport {
            split_id: loaders.split_id,
            best_acc: outcome.best_acc,
            best_epoch: outcome.best_epoch,
            epochs: outcome.history.epochs(),
            runtime_secs: outcome.elapsed_secs,
            train_size: loaders.dataset_len(Phase::Train),
            val_size: loaders.dataset_len(Phase::Val),
            progress_csv,
            weights,
        });
        summary.save(&layout.summary_path())?;

        model = outcome.model;
    }

    summary.finished_at = Some(Utc::now());
    summary.save(&layout.summary_path())?;

    info!(
        "Mean best val acc over {} splits: {:.4}",
        summary.splits.len(),
        summary.mean_best_acc()
    );

    Ok(summary)
}
