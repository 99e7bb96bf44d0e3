//! Logging Module
//!
//! Structured logging through the `tracing` crate, plus a small logger
//! that reports epoch and phase progress for the training loop.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::utils::format_duration;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Create a verbose logging config for debugging
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }

    /// Create a quiet logging config (errors only)
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Initialize logging with the given configuration
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(config.ansi_colors)
                .with_target(config.include_target)
                .with_thread_ids(config.include_thread_ids)
                .compact(),
        )
        .with(filter)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}

/// Epoch/phase logger for the fine-tuning loop
pub struct TrainingLogger {
    total_epochs: usize,
    epoch_start: Instant,
}

impl TrainingLogger {
    /// Create a new training logger
    pub fn new(total_epochs: usize) -> Self {
        Self {
            total_epochs,
            epoch_start: Instant::now(),
        }
    }

    /// Log start of an epoch (0-indexed, printed as `epoch/total-1`)
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch_start = Instant::now();
        tracing::info!(
            "Epoch {}/{}",
            epoch,
            self.total_epochs.saturating_sub(1)
        );
    }

    /// Log the summary line of one phase
    pub fn end_phase(&self, phase: &str, loss: f64, accuracy: f64) {
        tracing::info!("{} Loss: {:.4} Acc: {:.4}", phase, loss, accuracy);
    }

    /// Log the duration of the current epoch
    pub fn end_epoch(&self, epoch: usize) {
        tracing::debug!(
            "Epoch {} finished in {}",
            epoch,
            format_duration(self.epoch_start.elapsed().as_secs_f64())
        );
    }

    /// Log a new best model
    pub fn log_new_best(&self, previous: f64, accuracy: f64) {
        tracing::info!(
            "New best model: val acc {:.4} -> {:.4}",
            previous,
            accuracy
        );
    }

    /// Log training completion
    pub fn log_complete(&self, elapsed_secs: f64, best_accuracy: f64) {
        let minutes = (elapsed_secs / 60.0).floor();
        let seconds = elapsed_secs % 60.0;
        tracing::info!(
            "Training complete in {:.0}m {:.0}s",
            minutes,
            seconds
        );
        tracing::info!("{}", best_acc_line(best_accuracy));
    }
}

/// Final accuracy line, printed with six decimals
pub fn best_acc_line(best_accuracy: f64) -> String {
    format!("Best val Acc: {:.6}", best_accuracy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_display_is_filter_directive() {
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogLevel::Error.to_string(), "error");
    }

    #[test]
    fn test_best_acc_line_has_six_decimals() {
        assert_eq!(best_acc_line(0.875), "Best val Acc: 0.875000");
        assert_eq!(best_acc_line(2.0 / 3.0), "Best val Acc: 0.666667");
    }

    #[test]
    fn test_log_config_presets() {
        assert_eq!(LogConfig::default().level, LogLevel::Info);
        assert_eq!(LogConfig::verbose().level, LogLevel::Debug);
        assert_eq!(LogConfig::quiet().level, LogLevel::Error);
    }
}
