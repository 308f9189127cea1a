//! Validated constructors for state vectors and covariance matrices
//!
//! Shapes are checked once, at the boundary. Nothing here reshapes a
//! mismatched input into something that happens to fit.

use nalgebra::{DMatrix, DVector};

use crate::error::{EstimationError, Result};

/// Build a column state vector from its components
pub fn state_vector(values: &[f64]) -> DVector<f64> {
    DVector::from_column_slice(values)
}

/// Build a diagonal covariance matrix from variances
pub fn covariance_from_diagonal(variances: &[f64]) -> DMatrix<f64> {
    DMatrix::from_diagonal(&DVector::from_column_slice(variances))
}

/// Check that a vector has the expected length
pub fn ensure_vector_len(what: &'static str, v: &DVector<f64>, expected: usize) -> Result<()> {
    if v.len() != expected {
        return Err(EstimationError::DimensionMismatch {
            what,
            expected,
            got: v.len(),
        });
    }
    Ok(())
}

/// Check that a matrix is square with side `n`
pub fn ensure_square(what: &'static str, m: &DMatrix<f64>, n: usize) -> Result<()> {
    if m.nrows() != m.ncols() {
        return Err(EstimationError::NotSquare {
            what,
            rows: m.nrows(),
            cols: m.ncols(),
        });
    }
    if m.nrows() != n {
        return Err(EstimationError::DimensionMismatch {
            what,
            expected: n,
            got: m.nrows(),
        });
    }
    Ok(())
}

/// Check that a matrix has the given shape
pub fn ensure_shape(what: &'static str, m: &DMatrix<f64>, rows: usize, cols: usize) -> Result<()> {
    if m.nrows() != rows {
        return Err(EstimationError::DimensionMismatch {
            what,
            expected: rows,
            got: m.nrows(),
        });
    }
    if m.ncols() != cols {
        return Err(EstimationError::DimensionMismatch {
            what,
            expected: cols,
            got: m.ncols(),
        });
    }
    Ok(())
}

/// Largest absolute asymmetry `|m[i,j] - m[j,i]|`
pub fn asymmetry(m: &DMatrix<f64>) -> f64 {
    (m - m.transpose()).amax()
}
