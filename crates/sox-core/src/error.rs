//! Error types shared by the models and filters

use thiserror::Error;

/// Estimation errors
///
/// Every variant is a precondition violation or a numerical failure of a
/// single deterministic computation. None of them is transient.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimationError {
    #[error("Dimension mismatch in {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("{what} must be square, got {rows}x{cols}")]
    NotSquare {
        what: &'static str,
        rows: usize,
        cols: usize,
    },
    #[error("RC branch count mismatch: {resistors} resistors, {capacitors} capacitors")]
    BranchCountMismatch { resistors: usize, capacitors: usize },
    #[error("Grid is not uniformly spaced (first deviation at index {index})")]
    NonUniformGrid { index: usize },
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Invalid smoothing window: length {window_length} with polynomial order {polyorder}")]
    InvalidSmoothingWindow { window_length: usize, polyorder: usize },
    #[error("Not enough samples: need at least {required}, got {got}")]
    InsufficientSamples { required: usize, got: usize },
    #[error("Covariance is not positive definite")]
    CovarianceNotPositiveDefinite,
    #[error("Innovation covariance is singular")]
    SingularInnovation,
}

/// Result alias for estimation operations
pub type Result<T> = std::result::Result<T, EstimationError>;
