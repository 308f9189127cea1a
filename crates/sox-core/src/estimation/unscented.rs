//! Unscented transform
//!
//! Recovers a mean and covariance from weighted sigma points (stored as
//! matrix columns). Both the UKF prediction and update are built on it.

use nalgebra::{DMatrix, DVector};

use crate::error::{EstimationError, Result};
use crate::math::ensure_square;

/// Weighted mean and covariance of the columns of `sigmas`
///
/// `mean = Σ Wm_i s_i`, `cov = Σ Wc_i (s_i - mean)(s_i - mean)ᵀ + noise_cov`
pub fn unscented_transform(
    sigmas: &DMatrix<f64>,
    wm: &DVector<f64>,
    wc: &DVector<f64>,
    noise_cov: Option<&DMatrix<f64>>,
) -> Result<(DVector<f64>, DMatrix<f64>)> {
    check_weights(sigmas, wm, wc)?;

    let mean = sigmas * wm;
    let deviations = centered(sigmas, &mean);

    let mut cov = weighted(&deviations, wc) * deviations.transpose();
    if let Some(noise) = noise_cov {
        ensure_square("unscented transform noise", noise, sigmas.nrows())?;
        cov += noise;
    }

    Ok((mean, cov))
}

/// Cross-covariance `Σ Wc_i (x_i - x)(z_i - z)ᵀ` between two sigma sets
pub fn cross_covariance(
    sigmas_x: &DMatrix<f64>,
    x_mean: &DVector<f64>,
    sigmas_z: &DMatrix<f64>,
    z_mean: &DVector<f64>,
    wc: &DVector<f64>,
) -> Result<DMatrix<f64>> {
    if sigmas_x.ncols() != sigmas_z.ncols() {
        return Err(EstimationError::DimensionMismatch {
            what: "cross-covariance sigma count",
            expected: sigmas_x.ncols(),
            got: sigmas_z.ncols(),
        });
    }
    if wc.len() != sigmas_x.ncols() {
        return Err(EstimationError::DimensionMismatch {
            what: "covariance weights",
            expected: sigmas_x.ncols(),
            got: wc.len(),
        });
    }

    let dx = centered(sigmas_x, x_mean);
    let dz = centered(sigmas_z, z_mean);
    Ok(weighted(&dx, wc) * dz.transpose())
}

fn check_weights(sigmas: &DMatrix<f64>, wm: &DVector<f64>, wc: &DVector<f64>) -> Result<()> {
    let count = sigmas.ncols();
    for (what, w) in [("mean weights", wm), ("covariance weights", wc)] {
        if w.len() != count {
            return Err(EstimationError::DimensionMismatch {
                what,
                expected: count,
                got: w.len(),
            });
        }
    }
    Ok(())
}

/// Columns of `sigmas` minus `mean`
fn centered(sigmas: &DMatrix<f64>, mean: &DVector<f64>) -> DMatrix<f64> {
    let mut d = sigmas.clone();
    for mut col in d.column_iter_mut() {
        col -= mean;
    }
    d
}

/// Columns of `d` scaled by the matching weight
fn weighted(d: &DMatrix<f64>, w: &DVector<f64>) -> DMatrix<f64> {
    let mut out = d.clone();
    for (i, mut col) in out.column_iter_mut().enumerate() {
        col *= w[i];
    }
    out
}
