//! Unscented Kalman Filter (UKF) implementation
//!
//! Derivative-free recursive estimator: nonlinear transition and
//! measurement functions are applied to Merwe sigma points and the
//! resulting statistics are recovered with the unscented transform.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

use super::ekf::invert_innovation;
use super::sigma_points::MerweScaledSigmaPoints;
use super::unscented::{cross_covariance, unscented_transform};
use crate::error::{EstimationError, Result};
use crate::math::{ensure_square, ensure_vector_len};

/// Unscented Kalman Filter
#[derive(Debug, Clone)]
pub struct UnscentedKalmanFilter {
    x: DVector<f64>,
    p: DMatrix<f64>,
    x0: DVector<f64>,
    p0: DMatrix<f64>,
    /// Process noise covariance (n x n)
    q: DMatrix<f64>,
    /// Measurement noise covariance (k x k)
    r: DMatrix<f64>,
    sigma: MerweScaledSigmaPoints,
    /// Sigma points around the current prior, used by `update`
    sigmas_f: DMatrix<f64>,
    /// Sigma points regenerated from `(x0, P0)`
    initial_sigmas: DMatrix<f64>,
    /// Measurement sigma points from the last update
    sigmas_h: DMatrix<f64>,
}

impl UnscentedKalmanFilter {
    /// Create a new UKF
    ///
    /// Fails if the dimensions disagree or `P0` is not positive definite.
    pub fn new(
        x0: DVector<f64>,
        p0: DMatrix<f64>,
        q: DMatrix<f64>,
        r: DMatrix<f64>,
        sigma: MerweScaledSigmaPoints,
    ) -> Result<Self> {
        let n = x0.len();
        if sigma.dim() != n {
            return Err(EstimationError::DimensionMismatch {
                what: "sigma point dimension",
                expected: n,
                got: sigma.dim(),
            });
        }
        ensure_square("initial covariance", &p0, n)?;
        ensure_square("process noise", &q, n)?;
        ensure_square("measurement noise", &r, r.nrows())?;

        let initial_sigmas = sigma.points(&x0, &p0)?;
        let sigmas_h = DMatrix::zeros(r.nrows(), sigma.num_sigmas());

        debug!(
            state_dim = n,
            meas_dim = r.nrows(),
            alpha = sigma.params().alpha,
            beta = sigma.params().beta,
            kappa = sigma.params().kappa,
            "created UKF"
        );

        Ok(Self {
            x: x0.clone(),
            p: p0.clone(),
            x0,
            p0,
            q,
            r,
            sigma,
            sigmas_f: initial_sigmas.clone(),
            initial_sigmas,
            sigmas_h,
        })
    }

    /// Prediction step
    ///
    /// Propagates the sigma points of `(x, P)` through `fx`, recovers the
    /// prior with the unscented transform plus `Q` (or the `q` override),
    /// then regenerates the sigma points around the prior so that `update`
    /// sees the post-prediction covariance.
    pub fn predict<F>(&mut self, fx: F, q: Option<&DMatrix<f64>>) -> Result<()>
    where
        F: Fn(&DVector<f64>) -> Result<DVector<f64>>,
    {
        let n = self.state_dim();
        let q = q.unwrap_or(&self.q);
        ensure_square("process noise", q, n)?;

        let sigmas = self.sigma.points(&self.x, &self.p)?;
        let propagated = map_columns(&sigmas, n, "propagated sigma point", &fx)?;

        let (x, p) = unscented_transform(
            &propagated,
            self.sigma.mean_weights(),
            self.sigma.covariance_weights(),
            Some(q),
        )?;
        self.sigmas_f = self.sigma.points(&x, &p)?;
        self.x = x;
        self.p = p;

        trace!(x = ?self.x.as_slice(), "UKF predict");
        Ok(())
    }

    /// Update step with measurement `z`
    ///
    /// `r` overrides the stored measurement noise for this call only.
    pub fn update<H>(&mut self, z: &DVector<f64>, hx: H, r: Option<&DMatrix<f64>>) -> Result<()>
    where
        H: Fn(&DVector<f64>) -> Result<DVector<f64>>,
    {
        let k_dim = z.len();
        let r = r.unwrap_or(&self.r);
        ensure_square("measurement noise", r, k_dim)?;

        let sigmas_h = map_columns(&self.sigmas_f, k_dim, "measurement sigma point", &hx)?;

        let wc = self.sigma.covariance_weights();
        let (zp, s) = unscented_transform(&sigmas_h, self.sigma.mean_weights(), wc, Some(r))?;
        let s_inv = invert_innovation(&s)?;

        let pxz = cross_covariance(&self.sigmas_f, &self.x, &sigmas_h, &zp, wc)?;
        let k = pxz * s_inv;

        self.x += &k * (z - zp);
        self.p -= &k * s * k.transpose();
        self.sigmas_h = sigmas_h;

        trace!(x = ?self.x.as_slice(), "UKF update");
        Ok(())
    }

    /// Restore `(x0, P0)` and the sigma points derived from them
    pub fn reset(&mut self) {
        self.x = self.x0.clone();
        self.p = self.p0.clone();
        self.sigmas_f = self.initial_sigmas.clone();
        self.sigmas_h.fill(0.0);
        debug!("UKF reset");
    }

    pub fn state_estimate(&self) -> &DVector<f64> {
        &self.x
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.p
    }

    /// Sigma points of the current prior (columns)
    pub fn sigma_points(&self) -> &DMatrix<f64> {
        &self.sigmas_f
    }

    /// Measurement sigma points from the last update (columns)
    pub fn measurement_sigma_points(&self) -> &DMatrix<f64> {
        &self.sigmas_h
    }

    pub fn sigma_generator(&self) -> &MerweScaledSigmaPoints {
        &self.sigma
    }

    pub fn process_noise(&self) -> &DMatrix<f64> {
        &self.q
    }

    pub fn measurement_noise(&self) -> &DMatrix<f64> {
        &self.r
    }

    pub fn state_dim(&self) -> usize {
        self.x.len()
    }

    pub fn measurement_dim(&self) -> usize {
        self.r.nrows()
    }
}

/// Apply `f` to every column, checking each output has `rows` entries
fn map_columns<F>(
    sigmas: &DMatrix<f64>,
    rows: usize,
    what: &'static str,
    f: &F,
) -> Result<DMatrix<f64>>
where
    F: Fn(&DVector<f64>) -> Result<DVector<f64>>,
{
    let mut out = DMatrix::zeros(rows, sigmas.ncols());
    for (i, col) in sigmas.column_iter().enumerate() {
        let y = f(&col.into_owned())?;
        ensure_vector_len(what, &y, rows)?;
        out.set_column(i, &y);
    }
    Ok(out)
}
