//! Estimator errors

use sox_core::EstimationError;
use thiserror::Error;

/// Estimator errors
#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("Estimation error: {0}")]
    Estimation(#[from] EstimationError),
    #[error("Sample time {current} does not follow previous sample time {previous}")]
    NonMonotonicTime { previous: f64, current: f64 },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, EstimatorError>;
