//! Savitzky-Golay smoothing and differentiation
//!
//! Fits a low-order polynomial to each window of uniformly spaced samples
//! by least squares and evaluates it (or its derivative) at the window
//! center. Derivatives come from differentiating the fitted polynomial
//! analytically, which is far less noise-sensitive than finite differences.
//!
//! The first and last `window_length / 2` samples have no centered window.
//! They are evaluated from the polynomial fitted to the first or last full
//! window, at their own positions inside it.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{EstimationError, Result};

/// Singular value cutoff for the least-squares fits
const PINV_EPS: f64 = 1e-12;

/// Savitzky-Golay filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SavitzkyGolay {
    /// Window length in samples (odd)
    pub window_length: usize,
    /// Order of the fitted polynomial (< window_length)
    pub polyorder: usize,
}

impl Default for SavitzkyGolay {
    fn default() -> Self {
        Self {
            window_length: 5,
            polyorder: 2,
        }
    }
}

impl SavitzkyGolay {
    pub fn new(window_length: usize, polyorder: usize) -> Result<Self> {
        let filter = Self {
            window_length,
            polyorder,
        };
        filter.validate()?;
        Ok(filter)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_length % 2 == 0 || self.window_length <= self.polyorder {
            return Err(EstimationError::InvalidSmoothingWindow {
                window_length: self.window_length,
                polyorder: self.polyorder,
            });
        }
        Ok(())
    }

    /// Smoothed samples
    pub fn smooth(&self, y: &[f64]) -> Result<Vec<f64>> {
        self.apply(y, 0, 1.0)
    }

    /// `deriv`-th derivative of the fitted polynomials, for samples spaced `delta` apart
    pub fn derivative(&self, y: &[f64], deriv: usize, delta: f64) -> Result<Vec<f64>> {
        self.apply(y, deriv, delta)
    }

    fn apply(&self, y: &[f64], deriv: usize, delta: f64) -> Result<Vec<f64>> {
        self.validate()?;
        let n = y.len();
        let w = self.window_length;
        if n < w {
            return Err(EstimationError::InsufficientSamples { required: w, got: n });
        }
        if !(delta.is_finite() && delta > 0.0) {
            return Err(EstimationError::InvalidParameter(format!(
                "sample spacing must be positive, got {delta}"
            )));
        }
        if deriv > self.polyorder {
            return Ok(vec![0.0; n]);
        }

        let h = w / 2;
        let scale = delta.powi(deriv as i32);
        let mut out = vec![0.0; n];

        // Interior: fixed convolution weights from the centered fit
        let centered: Vec<f64> = (0..w).map(|i| i as f64 - h as f64).collect();
        let pinv = pseudo_inverse(&vandermonde(&centered, self.polyorder))?;
        let gain = falling_factorial(deriv, deriv);
        let weights: Vec<f64> = (0..w).map(|i| gain * pinv[(deriv, i)]).collect();

        for k in h..n - h {
            let acc: f64 = weights
                .iter()
                .zip(&y[k - h..=k + h])
                .map(|(c, v)| c * v)
                .sum();
            out[k] = acc / scale;
        }

        // Edges: evaluate the fit of the outermost full windows
        let local: Vec<f64> = (0..w).map(|i| i as f64).collect();
        let edge_pinv = pseudo_inverse(&vandermonde(&local, self.polyorder))?;
        let head = &edge_pinv * DVector::from_column_slice(&y[..w]);
        let tail = &edge_pinv * DVector::from_column_slice(&y[n - w..]);

        for k in 0..h {
            out[k] = polynomial_derivative(&head, k as f64, deriv) / scale;
        }
        for k in n - h..n {
            out[k] = polynomial_derivative(&tail, (k + w - n) as f64, deriv) / scale;
        }

        Ok(out)
    }
}

/// Vandermonde matrix with columns `t^0 .. t^order`
fn vandermonde(t: &[f64], order: usize) -> DMatrix<f64> {
    DMatrix::from_fn(t.len(), order + 1, |i, j| t[i].powi(j as i32))
}

fn pseudo_inverse(a: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    a.clone()
        .pseudo_inverse(PINV_EPS)
        .map_err(|e| EstimationError::InvalidParameter(e.to_string()))
}

/// `j! / (j - d)!`
fn falling_factorial(j: usize, d: usize) -> f64 {
    ((j - d + 1)..=j).map(|k| k as f64).product()
}

/// `d`-th derivative at `t` of the polynomial with ascending coefficients
fn polynomial_derivative(coeffs: &DVector<f64>, t: f64, d: usize) -> f64 {
    (d..coeffs.len())
        .map(|j| coeffs[j] * falling_factorial(j, d) * t.powi((j - d) as i32))
        .sum()
}
