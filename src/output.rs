//! Experiment Outputs
//!
//! Everything a run writes below its output directory:
//!
//! ```text
//! output/
//! ├── progress/split_<k>.csv   per-epoch curves
//! ├── weights/split_<k>.mpk    best weights (CompactRecorder)
//! └── summary.json             per-split results
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::backend::Backend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::training::TrainingHistory;
use crate::utils::error::{FinetuneError, Result};

/// One row of a progress CSV
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRow {
    pub train_loss: f64,
    pub train_acc: f64,
    pub val_loss: f64,
    pub val_acc: f64,
    pub best_acc: f64,
    #[serde(rename = "runtime(s)")]
    pub runtime_secs: f64,
}

/// Rows of a progress CSV; `best_acc` and runtime are repeated on every row
pub fn progress_rows(history: &TrainingHistory, best_acc: f64, runtime_secs: f64) -> Vec<ProgressRow> {
    (0..history.epochs())
        .filter_map(|epoch| history.epoch(epoch))
        .map(|(train_loss, train_acc, val_loss, val_acc)| ProgressRow {
            train_loss,
            train_acc,
            val_loss,
            val_acc,
            best_acc,
            runtime_secs,
        })
        .collect()
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Write the training curves of one split
pub fn write_progress_csv(
    path: &Path,
    history: &TrainingHistory,
    best_acc: f64,
    runtime_secs: f64,
) -> Result<()> {
    create_parent(path)?;

    let rows = progress_rows(history, best_acc, runtime_secs);
    let mut writer = csv::Writer::from_path(path)?;
    if rows.is_empty() {
        writer.write_record([
            "train_loss",
            "train_acc",
            "val_loss",
            "val_acc",
            "best_acc",
            "runtime(s)",
        ])?;
    }
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!("Progress for {} epochs saved to {:?}", rows.len(), path);
    Ok(())
}

/// Read a progress CSV back
pub fn read_progress_csv(path: &Path) -> Result<Vec<ProgressRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader
        .deserialize()
        .collect::<std::result::Result<Vec<ProgressRow>, csv::Error>>()?;
    Ok(rows)
}

/// Save model weights with Burn's `CompactRecorder`
///
/// The recorder appends `.mpk`; the returned path includes it.
pub fn save_weights<B: Backend, M: Module<B>>(model: &M, path: &Path) -> Result<PathBuf> {
    create_parent(path)?;

    let recorder = CompactRecorder::new();
    model
        .clone()
        .save_file(path, &recorder)
        .map_err(|e| FinetuneError::Model(format!("Failed to save weights to {:?}: {:?}", path, e)))?;

    let saved = path.with_extension("mpk");
    info!("Weights saved to {:?}", saved);
    Ok(saved)
}

/// Load weights saved by [`save_weights`] into `model`
pub fn load_weights<B: Backend, M: Module<B>>(model: M, path: &Path, device: &B::Device) -> Result<M> {
    let recorder = CompactRecorder::new();
    model
        .load_file(path, &recorder, device)
        .map_err(|e| FinetuneError::Model(format!("Failed to load weights from {:?}: {:?}", path, e)))
}

/// Locations of the files an experiment writes
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn progress_dir(&self) -> PathBuf {
        self.root.join("progress")
    }

    pub fn weights_dir(&self) -> PathBuf {
        self.root.join("weights")
    }

    /// `progress/split_<id>.csv`
    pub fn progress_path(&self, split_id: usize) -> PathBuf {
        self.progress_dir().join(format!("split_{}.csv", split_id))
    }

    /// `weights/split_<id>` (the recorder adds `.mpk`)
    pub fn weights_path(&self, split_id: usize) -> PathBuf {
        self.weights_dir().join(format!("split_{}", split_id))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.root.join("summary.json")
    }

    /// Create the output directories
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(self.progress_dir())?;
        fs::create_dir_all(self.weights_dir())?;
        Ok(())
    }
}

/// Result of one split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitReport {
    pub split_id: usize,
    pub best_acc: f64,
    pub best_epoch: Option<usize>,
    pub epochs: usize,
    pub runtime_secs: f64,
    pub train_size: usize,
    pub val_size: usize,
    pub progress_csv: PathBuf,
    pub weights: PathBuf,
}

/// Results of a whole k-fold run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub model_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub splits: Vec<SplitReport>,
}

impl ExperimentSummary {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            splits: Vec::new(),
        }
    }

    /// Mean of the per-split best accuracies
    pub fn mean_best_acc(&self) -> f64 {
        if self.splits.is_empty() {
            return 0.0;
        }
        self.splits.iter().map(|s| s.best_acc).sum::<f64>() / self.splits.len() as f64
    }

    /// Write as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        create_parent(path)?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("Summary saved to {:?}", path);
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
