//! Error Handling Module
//!
//! Defines the error type shared by the fine-tuning library.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for k-fold fine-tuning operations
#[derive(Error, Debug)]
pub enum FinetuneError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error decoding or encoding an image
    #[error("Image error: {0}")]
    Image(String),

    /// Error with dataset layout or contents
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error building or loading a model
    #[error("Model error: {0}")]
    Model(String),

    /// Unsupported architecture name
    #[error("Invalid model name '{0}'")]
    InvalidModelName(String),

    /// Error during the training loop
    #[error("Training error: {0}")]
    Training(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<image::ImageError> for FinetuneError {
    fn from(err: image::ImageError) -> Self {
        FinetuneError::Image(err.to_string())
    }
}

impl From<serde_json::Error> for FinetuneError {
    fn from(err: serde_json::Error) -> Self {
        FinetuneError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for FinetuneError {
    fn from(err: toml::de::Error) -> Self {
        FinetuneError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for FinetuneError {
    fn from(err: toml::ser::Error) -> Self {
        FinetuneError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for FinetuneError {
    fn from(err: csv::Error) -> Self {
        FinetuneError::Serialization(err.to_string())
    }
}

impl From<walkdir::Error> for FinetuneError {
    fn from(err: walkdir::Error) -> Self {
        FinetuneError::Dataset(err.to_string())
    }
}

/// Convenience Result type for fine-tuning operations
pub type Result<T> = std::result::Result<T, FinetuneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FinetuneError::Dataset("no classes".to_string());
        assert_eq!(format!("{}", err), "Dataset error: no classes");
    }

    #[test]
    fn test_invalid_model_name_display() {
        let err = FinetuneError::InvalidModelName("alexnet".to_string());
        assert!(err.to_string().contains("alexnet"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: FinetuneError = io.into();
        assert!(matches!(err, FinetuneError::Io(_)));
    }

    #[test]
    fn test_path_not_found_display() {
        let err = FinetuneError::PathNotFound(PathBuf::from("/data/split_9"));
        assert!(format!("{}", err).contains("split_9"));
    }
}
