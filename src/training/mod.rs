//! Training module for k-fold fine-tuning
//!
//! This module provides:
//! - The epoch/phase training loop with best-model tracking
//! - Per-epoch loss and accuracy history

pub mod history;
pub mod trainer;

// Re-export main types for convenience
pub use history::TrainingHistory;
pub use trainer::{train_model, TrainOutcome, TrainSettings};
