//! Extended Kalman Filter (EKF) implementation
//!
//! Generic EKF over dynamic-size state. The prediction takes an exact
//! affine transition `x' = F x + B u` (the battery model supplies `F(dt)`
//! and `B(dt)` directly), so only the measurement side is linearized.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

use crate::dynamics::LinearTransition;
use crate::error::{EstimationError, Result};
use crate::math::{ensure_shape, ensure_square, ensure_vector_len};

/// EKF state container
#[derive(Debug, Clone, PartialEq)]
pub struct EkfState {
    /// State estimate
    pub x: DVector<f64>,
    /// Covariance matrix
    pub p: DMatrix<f64>,
}

impl EkfState {
    pub fn with_initial(x: DVector<f64>, p: DMatrix<f64>) -> Result<Self> {
        ensure_square("initial covariance", &p, x.len())?;
        Ok(Self { x, p })
    }
}

/// Generic Extended Kalman Filter
#[derive(Debug, Clone)]
pub struct ExtendedKalmanFilter {
    /// Current state estimate and covariance
    state: EkfState,
    /// Construction-time state, restored by `reset`
    initial: EkfState,
    /// Process noise covariance (Q)
    q: DMatrix<f64>,
    /// Measurement noise covariance (R)
    r: DMatrix<f64>,
}

impl ExtendedKalmanFilter {
    /// Create a new EKF from the initial estimate and noise covariances
    pub fn new(
        x0: DVector<f64>,
        p0: DMatrix<f64>,
        q: DMatrix<f64>,
        r: DMatrix<f64>,
    ) -> Result<Self> {
        let state = EkfState::with_initial(x0, p0)?;
        let n = state.x.len();
        ensure_square("process noise", &q, n)?;
        ensure_square("measurement noise", &r, r.nrows())?;

        debug!(state_dim = n, meas_dim = r.nrows(), "created EKF");

        Ok(Self {
            initial: state.clone(),
            state,
            q,
            r,
        })
    }

    /// Prediction step
    ///
    /// `x = F x + B u`, `P = F P Fᵀ + Q`. `q` overrides the stored process
    /// noise for this call only.
    pub fn predict(
        &mut self,
        transition: &LinearTransition,
        u: &DVector<f64>,
        q: Option<&DMatrix<f64>>,
    ) -> Result<()> {
        let n = self.state_dim();
        let f = &transition.f;
        let b = &transition.b;
        let q = q.unwrap_or(&self.q);

        ensure_square("transition matrix", f, n)?;
        ensure_shape("input matrix", b, n, u.len())?;
        ensure_square("process noise", q, n)?;

        self.state.x = f * &self.state.x + b * u;
        self.state.p = f * &self.state.p * f.transpose() + q;

        trace!(x = ?self.state.x.as_slice(), "EKF predict");
        Ok(())
    }

    /// Update step with measurement
    ///
    /// # Arguments
    /// * `z` - Measurement vector
    /// * `hx` - Measurement function: z = h(x)
    /// * `h_jacobian` - Jacobian of h at current state
    /// * `r` - Measurement noise override for this call
    ///
    /// The covariance uses the Joseph form
    /// `P = (I - KH) P (I - KH)ᵀ + K R Kᵀ`, which keeps `P` symmetric and
    /// positive semi-definite under round-off.
    pub fn update<H, J>(
        &mut self,
        z: &DVector<f64>,
        hx: H,
        h_jacobian: J,
        r: Option<&DMatrix<f64>>,
    ) -> Result<()>
    where
        H: Fn(&DVector<f64>) -> Result<DVector<f64>>,
        J: Fn(&DVector<f64>) -> Result<DMatrix<f64>>,
    {
        let n = self.state_dim();
        let k_dim = z.len();
        let r = r.unwrap_or(&self.r);
        ensure_square("measurement noise", r, k_dim)?;

        // Measurement prediction
        let z_pred = hx(&self.state.x)?;
        ensure_vector_len("predicted measurement", &z_pred, k_dim)?;

        // Innovation
        let y = z - z_pred;

        // Jacobian
        let h_mat = h_jacobian(&self.state.x)?;
        ensure_shape("measurement jacobian", &h_mat, k_dim, n)?;

        // Innovation covariance: S = H * P * H' + R
        let pht = &self.state.p * h_mat.transpose();
        let s = &h_mat * &pht + r;

        // Kalman gain: K = P * H' * S^(-1)
        let k = pht * invert_innovation(&s)?;

        // State update
        self.state.x += &k * y;

        // Covariance update (Joseph form)
        let i_kh = DMatrix::<f64>::identity(n, n) - &k * &h_mat;
        self.state.p = &i_kh * &self.state.p * i_kh.transpose() + &k * r * k.transpose();

        trace!(x = ?self.state.x.as_slice(), "EKF update");
        Ok(())
    }

    /// Restore the construction-time estimate and covariance
    pub fn reset(&mut self) {
        self.state = self.initial.clone();
        debug!("EKF reset");
    }

    /// Get current state estimate
    pub fn state_estimate(&self) -> &DVector<f64> {
        &self.state.x
    }

    /// Get current covariance
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.state.p
    }

    pub fn process_noise(&self) -> &DMatrix<f64> {
        &self.q
    }

    pub fn measurement_noise(&self) -> &DMatrix<f64> {
        &self.r
    }

    /// Get state dimension
    pub fn state_dim(&self) -> usize {
        self.state.x.len()
    }

    pub fn measurement_dim(&self) -> usize {
        self.r.nrows()
    }
}

/// Inverse of the innovation covariance
///
/// A 1x1 `S` (single voltage measurement) is a scalar reciprocal.
pub(crate) fn invert_innovation(s: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if s.nrows() == 1 && s.ncols() == 1 {
        let v = s[(0, 0)];
        if v == 0.0 || !v.is_finite() {
            return Err(EstimationError::SingularInnovation);
        }
        return Ok(DMatrix::from_element(1, 1, 1.0 / v));
    }
    s.clone()
        .try_inverse()
        .ok_or(EstimationError::SingularInnovation)
}
