//! Merwe scaled sigma points
//!
//! `2n + 1` points placed at the mean and at `±` the columns of a matrix
//! square root of `(n + λ) P`, with `λ = α² (n + κ) - n`.

use nalgebra::{Cholesky, DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{EstimationError, Result};
use crate::math::{ensure_square, ensure_vector_len};

/// Merwe scaling parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MerweParams {
    /// Spread of the points around the mean (typically 1e-4 to 1)
    pub alpha: f64,
    /// Prior distribution knowledge (2 is optimal for Gaussians)
    pub beta: f64,
    /// Secondary scaling (typically 0 or 3 - n)
    pub kappa: f64,
}

impl Default for MerweParams {
    fn default() -> Self {
        Self {
            alpha: 1e-3,
            beta: 2.0,
            kappa: 0.0,
        }
    }
}

/// Sigma point generator with precomputed weights
#[derive(Debug, Clone)]
pub struct MerweScaledSigmaPoints {
    n: usize,
    params: MerweParams,
    wm: DVector<f64>,
    wc: DVector<f64>,
}

impl MerweScaledSigmaPoints {
    pub fn new(n: usize, alpha: f64, beta: f64, kappa: f64) -> Result<Self> {
        Self::with_params(n, MerweParams { alpha, beta, kappa })
    }

    pub fn with_params(n: usize, params: MerweParams) -> Result<Self> {
        if n == 0 {
            return Err(EstimationError::InvalidParameter(
                "sigma point dimension must be positive".to_string(),
            ));
        }
        if !(params.alpha.is_finite() && params.alpha > 0.0) {
            return Err(EstimationError::InvalidParameter(format!(
                "alpha must be positive, got {}",
                params.alpha
            )));
        }

        let nf = n as f64;
        let lambda = lambda(nf, &params);
        if !(nf + lambda > 0.0) {
            return Err(EstimationError::InvalidParameter(format!(
                "n + lambda must be positive, got {}",
                nf + lambda
            )));
        }

        let c = 0.5 / (nf + lambda);
        let mut wm = DVector::from_element(2 * n + 1, c);
        let mut wc = DVector::from_element(2 * n + 1, c);
        wm[0] = lambda / (nf + lambda);
        wc[0] = wm[0] + (1.0 - params.alpha * params.alpha + params.beta);

        Ok(Self { n, params, wm, wc })
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn num_sigmas(&self) -> usize {
        2 * self.n + 1
    }

    pub fn params(&self) -> &MerweParams {
        &self.params
    }

    pub fn lambda(&self) -> f64 {
        lambda(self.n as f64, &self.params)
    }

    /// Mean weights Wm
    pub fn mean_weights(&self) -> &DVector<f64> {
        &self.wm
    }

    /// Covariance weights Wc
    pub fn covariance_weights(&self) -> &DVector<f64> {
        &self.wc
    }

    /// Sigma points for `(x, P)` as the columns of an `n x (2n+1)` matrix
    ///
    /// Column 0 is `x`, columns `1..=n` are `x + U_i`, columns
    /// `n+1..=2n` are `x - U_i`, where `U` is the lower Cholesky factor
    /// of `(n + λ) P`. Fails if `P` is not positive definite.
    pub fn points(&self, x: &DVector<f64>, p: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let n = self.n;
        ensure_vector_len("sigma point mean", x, n)?;
        ensure_square("sigma point covariance", p, n)?;

        let scaled = p * (n as f64 + self.lambda());
        let u = Cholesky::new(scaled)
            .ok_or(EstimationError::CovarianceNotPositiveDefinite)?
            .unpack();

        let mut sigmas = DMatrix::zeros(n, self.num_sigmas());
        sigmas.set_column(0, x);
        for k in 0..n {
            let offset = u.column(k);
            sigmas.set_column(k + 1, &(x + &offset));
            sigmas.set_column(n + k + 1, &(x - &offset));
        }
        Ok(sigmas)
    }
}

fn lambda(n: f64, params: &MerweParams) -> f64 {
    params.alpha * params.alpha * (n + params.kappa) - n
}
