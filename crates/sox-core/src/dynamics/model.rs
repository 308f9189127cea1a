//! Dynamics model interface consumed by the filters

use nalgebra::{DMatrix, DVector};

use crate::error::Result;

/// Exact discrete-time affine transition `x_{k+1} = F x_k + B u_k`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearTransition {
    /// State transition matrix (n x n)
    pub f: DMatrix<f64>,
    /// Control input matrix (n x p)
    pub b: DMatrix<f64>,
}

impl LinearTransition {
    pub fn state_dim(&self) -> usize {
        self.f.nrows()
    }

    pub fn input_dim(&self) -> usize {
        self.b.ncols()
    }
}

/// A battery dynamics model driven by a scalar current
///
/// Implementors are pure function providers: they hold parameters but no
/// estimation state. The state vector is `[soc, v_rc_1, ..., v_rc_m]`
/// and the measurement is the terminal voltage.
pub trait DynamicsModel {
    /// Length of the state vector
    fn state_dim(&self) -> usize;

    /// Propagate `x` over `dt` seconds at constant `current` (positive = discharge)
    fn transition(&self, x: &DVector<f64>, current: f64, dt: f64) -> Result<DVector<f64>>;

    /// `F(dt)` and `B(dt)` for the control input `u = [current]`
    fn transition_linear(&self, dt: f64) -> LinearTransition;

    /// Terminal voltage predicted for state `x` at `current`
    fn measure(&self, x: &DVector<f64>, current: f64) -> Result<f64>;

    /// Jacobian of [`DynamicsModel::measure`] with respect to the state (1 x n)
    fn measurement_jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>>;
}
