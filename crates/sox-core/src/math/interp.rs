//! Piecewise-linear interpolation with linear extrapolation

use serde::Serialize;

use crate::error::{EstimationError, Result};

/// Piecewise-linear interpolant over a strictly increasing grid
///
/// Queries outside the grid extend the first or last segment, so the
/// interpolant never fails for slightly out-of-range inputs.
#[derive(Debug, Clone, Serialize)]
pub struct LinearInterpolator {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl LinearInterpolator {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        if x.len() != y.len() {
            return Err(EstimationError::DimensionMismatch {
                what: "interpolation samples",
                expected: x.len(),
                got: y.len(),
            });
        }
        if x.len() < 2 {
            return Err(EstimationError::InsufficientSamples {
                required: 2,
                got: x.len(),
            });
        }
        if x.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(EstimationError::InvalidParameter(
                "interpolation grid must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { x, y })
    }

    /// Evaluate at `xq`
    pub fn eval(&self, xq: f64) -> f64 {
        let n = self.x.len();
        // Index of the segment [x[i], x[i+1]] used for xq, clamped so the
        // outermost segments also serve for extrapolation.
        let i = self
            .x
            .partition_point(|&xi| xi <= xq)
            .saturating_sub(1)
            .min(n - 2);

        let (x0, x1) = (self.x[i], self.x[i + 1]);
        let (y0, y1) = (self.y[i], self.y[i + 1]);
        y0 + (y1 - y0) * (xq - x0) / (x1 - x0)
    }

    pub fn grid(&self) -> &[f64] {
        &self.x
    }
}
