//! Epoch/Phase Training Loop
//!
//! Each epoch runs a training phase on the autodiff backend followed by a
//! validation phase on the inner backend. The model with the highest
//! validation accuracy is kept and returned once all epochs are done.

use std::time::Instant;

use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use super::history::TrainingHistory;
use crate::config::ExperimentConfig;
use crate::dataset::{EpochLoader, Phase, SplitLoaders};
use crate::model::{ClassifierOutput, ImageClassifier};
use crate::utils::error::{FinetuneError, Result};
use crate::utils::logging::TrainingLogger;

/// Settings of one call to [`train_model`]
#[derive(Debug, Clone)]
pub struct TrainSettings {
    pub num_epochs: usize,
    pub learning_rate: f64,
    /// Weight of the auxiliary loss in the train phase
    pub aux_loss_weight: f64,
    /// Draw batch progress bars
    pub show_progress: bool,
}

impl Default for TrainSettings {
    fn default() -> Self {
        Self {
            num_epochs: 1,
            learning_rate: 0.01,
            aux_loss_weight: 0.4,
            show_progress: true,
        }
    }
}

impl TrainSettings {
    /// Settings taken from an experiment configuration
    pub fn from_config(config: &ExperimentConfig) -> Self {
        Self {
            num_epochs: config.run.num_epochs,
            learning_rate: config.optimizer.learning_rate,
            aux_loss_weight: config.optimizer.aux_loss_weight,
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }
}

/// Result of a training run
#[derive(Debug)]
pub struct TrainOutcome<M> {
    /// Model with the best validation accuracy
    pub model: M,
    pub history: TrainingHistory,
    /// Best validation accuracy, 0.0 if no epoch improved on it
    pub best_acc: f64,
    /// Epoch the returned model comes from, `None` for the incoming model
    pub best_epoch: Option<usize>,
    /// Wall time of the run in seconds
    pub elapsed_secs: f64,
}

/// Snapshot of the best model seen so far
#[derive(Debug, Clone)]
pub struct BestModel<M> {
    model: M,
    acc: f64,
    epoch: Option<usize>,
}

impl<M: Clone> BestModel<M> {
    /// Start from the incoming model with accuracy 0.0
    pub fn new(model: &M) -> Self {
        Self {
            model: model.clone(),
            acc: 0.0,
            epoch: None,
        }
    }

    /// Keep `model` if `acc` is strictly better than the current best
    pub fn offer(&mut self, model: &M, acc: f64, epoch: usize) -> bool {
        if acc > self.acc {
            self.model = model.clone();
            self.acc = acc;
            self.epoch = Some(epoch);
            true
        } else {
            false
        }
    }

    pub fn acc(&self) -> f64 {
        self.acc
    }

    pub fn epoch(&self) -> Option<usize> {
        self.epoch
    }

    pub fn into_model(self) -> M {
        self.model
    }
}

/// Running sums of one phase
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseStats {
    /// Sum of `batch_loss * batch_len`
    pub loss_sum: f64,
    pub corrects: usize,
    pub samples: usize,
}

impl PhaseStats {
    pub fn update(&mut self, batch_loss: f64, batch_corrects: usize, batch_len: usize) {
        self.loss_sum += batch_loss * batch_len as f64;
        self.corrects += batch_corrects;
        self.samples += batch_len;
    }

    /// Epoch loss and accuracy over a dataset of `dataset_len` samples
    pub fn finish(&self, dataset_len: usize) -> (f64, f64) {
        if dataset_len == 0 {
            return (0.0, 0.0);
        }
        let n = dataset_len as f64;
        (self.loss_sum / n, self.corrects as f64 / n)
    }
}

/// Number of rows whose argmax matches the target
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [batch_size, _] = logits.dims();
    let predictions = logits.argmax(1).reshape([batch_size]);
    let correct: i64 = predictions
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct as usize
}

/// Cross-entropy of the main logits, plus `aux_weight` times the auxiliary loss if present
pub fn compute_loss<B: Backend>(
    output: &ClassifierOutput<B>,
    targets: Tensor<B, 1, Int>,
    aux_weight: f64,
) -> Tensor<B, 1> {
    let loss_fn = CrossEntropyLossConfig::new().init(&output.logits.device());
    let loss = loss_fn.forward(output.logits.clone(), targets.clone());

    match &output.aux_logits {
        Some(aux_logits) => {
            let aux_loss = loss_fn.forward(aux_logits.clone(), targets);
            loss + aux_loss.mul_scalar(aux_weight)
        }
        None => loss,
    }
}

fn phase_progress(phase: Phase, num_batches: usize, show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let progress = ProgressBar::new(num_batches as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{prefix:>5} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(style.progress_chars("=>-"));
    }
    progress.set_prefix(phase.to_string());
    progress
}

/// One training pass over the train loader
fn train_epoch<B, M, O>(
    mut model: M,
    loader: &mut EpochLoader<B>,
    optimizer: &mut O,
    settings: &TrainSettings,
) -> Result<(M, PhaseStats)>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    let progress = phase_progress(Phase::Train, loader.num_batches(), settings.show_progress);
    let mut stats = PhaseStats::default();

    for batch in loader.epoch() {
        let batch = batch?;
        let batch_len = batch.targets.dims()[0];

        let output = model.forward_train(batch.images);
        let loss = compute_loss(&output, batch.targets.clone(), settings.aux_loss_weight);

        let loss_value: f64 = loss.clone().into_scalar().elem();
        if !loss_value.is_finite() {
            return Err(FinetuneError::Training(format!(
                "Loss diverged to {}",
                loss_value
            )));
        }
        let corrects = count_correct(output.logits, batch.targets);
        stats.update(loss_value, corrects, batch_len);

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optimizer.step(settings.learning_rate, model, grads);

        progress.inc(1);
        progress.set_message(format!("loss {:.4}", loss_value));
    }

    progress.finish_and_clear();
    Ok((model, stats))
}

/// One evaluation pass over the val loader (no gradients, eval-mode layers)
fn validate_epoch<B, M>(
    model: &M,
    loader: &mut EpochLoader<B>,
    show_progress: bool,
) -> Result<PhaseStats>
where
    B: Backend,
    M: ImageClassifier<B>,
{
    let progress = phase_progress(Phase::Val, loader.num_batches(), show_progress);
    let mut stats = PhaseStats::default();

    for batch in loader.epoch() {
        let batch = batch?;
        let batch_len = batch.targets.dims()[0];

        let logits = model.forward(batch.images);
        let loss = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), batch.targets.clone());

        let loss_value: f64 = loss.into_scalar().elem();
        let corrects = count_correct(logits, batch.targets);
        stats.update(loss_value, corrects, batch_len);

        progress.inc(1);
    }

    progress.finish_and_clear();
    Ok(stats)
}

/// Train `model` on one split, keeping the weights with the best validation accuracy
///
/// # Arguments
/// * `model` - Network to fine-tune (autodiff backend)
/// * `loaders` - Train and val loaders of the split
/// * `optimizer` - Optimizer updating the trainable parameters
/// * `settings` - Epoch count, learning rate and auxiliary loss weight
pub fn train_model<B, M, O>(
    model: M,
    loaders: &mut SplitLoaders<B>,
    optimizer: &mut O,
    settings: &TrainSettings,
) -> Result<TrainOutcome<M>>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + AutodiffModule<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    let start = Instant::now();
    let mut logger = TrainingLogger::new(settings.num_epochs);
    let mut history = TrainingHistory::new();
    let mut best = BestModel::new(&model);
    let mut model = model;

    for epoch in 0..settings.num_epochs {
        logger.start_epoch(epoch);

        for phase in Phase::ALL {
            let (loss, acc) = match phase {
                Phase::Train => {
                    let (trained, stats) =
                        train_epoch(model, &mut loaders.train, optimizer, settings)?;
                    model = trained;
                    stats.finish(loaders.train.dataset_len())
                }
                Phase::Val => {
                    let stats =
                        validate_epoch(&model.valid(), &mut loaders.val, settings.show_progress)?;
                    stats.finish(loaders.val.dataset_len())
                }
            };

            logger.end_phase(&phase.to_string(), loss, acc);
            history.record(phase, loss, acc);

            if phase == Phase::Val {
                let previous = best.acc();
                if best.offer(&model, acc, epoch) {
                    logger.log_new_best(previous, acc);
                }
            }
        }

        logger.end_epoch(epoch);
    }

    let elapsed_secs = start.elapsed().as_secs_f64();
    logger.log_complete(elapsed_secs, best.acc());
    debug!(
        "split_{}: returning weights from epoch {:?}",
        loaders.split_id,
        best.epoch()
    );

    Ok(TrainOutcome {
        best_acc: best.acc(),
        best_epoch: best.epoch(),
        model: best.into_model(),
        history,
        elapsed_secs,
    })
}
