//! Per-epoch loss and accuracy curves of one training run

use serde::{Deserialize, Serialize};

use crate::dataset::Phase;

/// Loss and accuracy of both phases, one entry per epoch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub train_loss: Vec<f64>,
    pub train_acc: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_acc: Vec<f64>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the epoch statistics of a phase
    pub fn record(&mut self, phase: Phase, loss: f64, acc: f64) {
        match phase {
            Phase::Train => {
                self.train_loss.push(loss);
                self.train_acc.push(acc);
            }
            Phase::Val => {
                self.val_loss.push(loss);
                self.val_acc.push(acc);
            }
        }
    }

    /// Number of completed epochs (epochs with both phases recorded)
    pub fn epochs(&self) -> usize {
        self.train_loss.len().min(self.val_loss.len())
    }

    /// Highest validation accuracy, 0.0 before any validation
    pub fn best_val_acc(&self) -> f64 {
        self.val_acc.iter().copied().fold(0.0, f64::max)
    }

    /// Statistics of epoch `epoch`: (train_loss, train_acc, val_loss, val_acc)
    pub fn epoch(&self, epoch: usize) -> Option<(f64, f64, f64, f64)> {
        Some((
            *self.train_loss.get(epoch)?,
            *self.train_acc.get(epoch)?,
            *self.val_loss.get(epoch)?,
            *self.val_acc.get(epoch)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_best() {
        let mut history = TrainingHistory::new();
        assert_eq!(history.epochs(), 0);
        assert_eq!(history.best_val_acc(), 0.0);

        history.record(Phase::Train, 0.9, 0.5);
        history.record(Phase::Val, 0.8, 0.6);
        history.record(Phase::Train, 0.7, 0.7);
        assert_eq!(history.epochs(), 1);

        history.record(Phase::Val, 0.75, 0.55);
        assert_eq!(history.epochs(), 2);
        assert_eq!(history.best_val_acc(), 0.6);
        assert_eq!(history.epoch(1), Some((0.7, 0.7, 0.75, 0.55)));
        assert_eq!(history.epoch(2), None);
    }
}
