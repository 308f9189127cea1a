//! Isothermal Thevenin equivalent-circuit model
//!
//! A series resistance `R0` followed by `m` parallel RC branches and an
//! open-circuit voltage source that depends on SOC:
//!
//! ```text
//! soc_{k+1}  = soc_k - I dt / (3600 Cap)
//! v_i,{k+1}  = v_i,k exp(-dt / (R_i C_i)) + I R_i (1 - exp(-dt / (R_i C_i)))
//! V          = ocv(soc) - Σ v_i - R0 I
//! ```
//!
//! The transition is affine in the state for a fixed current and time
//! step, so `F(dt)` and `B(dt)` are exact rather than linearizations.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::model::{DynamicsModel, LinearTransition};
use super::ocv::OcvCurve;
use crate::error::{EstimationError, Result};
use crate::math::ensure_vector_len;
use crate::SECONDS_PER_HOUR;

/// Circuit parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TheveninParams {
    /// Series resistance R0 [Ohm]
    pub series_resistance: f64,
    /// RC branch resistances [Ohm]
    pub rc_resistances: Vec<f64>,
    /// RC branch capacitances [F]
    pub rc_capacitances: Vec<f64>,
    /// Cell capacity [A.h]
    pub capacity: f64,
}

impl Default for TheveninParams {
    fn default() -> Self {
        Self {
            series_resistance: 0.01,
            rc_resistances: vec![0.01],
            rc_capacitances: vec![1000.0],
            capacity: 10.0,
        }
    }
}

/// A single RC branch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RcBranch {
    /// Resistance [Ohm]
    pub resistance: f64,
    /// Capacitance [F]
    pub capacitance: f64,
}

impl RcBranch {
    /// Time constant R*C [s]
    pub fn time_constant(&self) -> f64 {
        self.resistance * self.capacitance
    }

    /// Fraction of overpotential left after `dt`: exp(-dt / RC)
    pub fn decay(&self, dt: f64) -> f64 {
        (-dt / self.time_constant()).exp()
    }
}

/// Isothermal Thevenin model
#[derive(Debug, Clone)]
pub struct IsothermalThevenin {
    ocv: OcvCurve,
    series_resistance: f64,
    branches: Vec<RcBranch>,
    capacity: f64,
}

impl IsothermalThevenin {
    /// Create a model from per-branch resistor and capacitor lists
    ///
    /// The lists must have the same length.
    pub fn new(
        ocv: OcvCurve,
        series_resistance: f64,
        rc_resistors: &[f64],
        rc_capacitors: &[f64],
        capacity: f64,
    ) -> Result<Self> {
        if rc_resistors.len() != rc_capacitors.len() {
            return Err(EstimationError::BranchCountMismatch {
                resistors: rc_resistors.len(),
                capacitors: rc_capacitors.len(),
            });
        }
        if !(series_resistance.is_finite() && series_resistance >= 0.0) {
            return Err(EstimationError::InvalidParameter(format!(
                "series resistance must be non-negative, got {series_resistance}"
            )));
        }
        if !(capacity.is_finite() && capacity > 0.0) {
            return Err(EstimationError::InvalidParameter(format!(
                "capacity must be positive, got {capacity}"
            )));
        }

        let branches = rc_resistors
            .iter()
            .zip(rc_capacitors)
            .map(|(&resistance, &capacitance)| {
                let branch = RcBranch {
                    resistance,
                    capacitance,
                };
                let tau = branch.time_constant();
                if resistance > 0.0 && capacitance > 0.0 && tau.is_finite() {
                    Ok(branch)
                } else {
                    Err(EstimationError::InvalidParameter(format!(
                        "RC branch needs positive R and C, got R={resistance}, C={capacitance}"
                    )))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            branches = branches.len(),
            series_resistance,
            capacity,
            "created isothermal Thevenin model"
        );

        Ok(Self {
            ocv,
            series_resistance,
            branches,
            capacity,
        })
    }

    pub fn from_params(ocv: OcvCurve, params: &TheveninParams) -> Result<Self> {
        Self::new(
            ocv,
            params.series_resistance,
            &params.rc_resistances,
            &params.rc_capacitances,
            params.capacity,
        )
    }

    pub fn num_branches(&self) -> usize {
        self.branches.len()
    }

    pub fn branches(&self) -> &[RcBranch] {
        &self.branches
    }

    pub fn series_resistance(&self) -> f64 {
        self.series_resistance
    }

    /// Capacity [A.h]
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn ocv_curve(&self) -> &OcvCurve {
        &self.ocv
    }

    /// `F(dt) = diag(1, exp(-dt/(R_1 C_1)), ..., exp(-dt/(R_m C_m)))`
    pub fn transition_matrix(&self, dt: f64) -> DMatrix<f64> {
        let diag = std::iter::once(1.0).chain(self.branches.iter().map(|b| b.decay(dt)));
        DMatrix::from_diagonal(&DVector::from_iterator(self.state_dim(), diag))
    }

    /// `B(dt) = [-dt/(3600 Cap), R_1 (1 - exp(-dt/(R_1 C_1))), ...]ᵀ`
    pub fn input_matrix(&self, dt: f64) -> DMatrix<f64> {
        let soc_gain = -dt / (SECONDS_PER_HOUR * self.capacity);
        let column = std::iter::once(soc_gain)
            .chain(self.branches.iter().map(|b| b.resistance * (1.0 - b.decay(dt))));
        DMatrix::from_iterator(self.state_dim(), 1, column)
    }
}

impl DynamicsModel for IsothermalThevenin {
    fn state_dim(&self) -> usize {
        1 + self.branches.len()
    }

    fn transition(&self, x: &DVector<f64>, current: f64, dt: f64) -> Result<DVector<f64>> {
        ensure_vector_len("state", x, self.state_dim())?;

        let mut next = DVector::zeros(self.state_dim());
        next[0] = x[0] - current * dt / (SECONDS_PER_HOUR * self.capacity);
        for (i, branch) in self.branches.iter().enumerate() {
            let decay = branch.decay(dt);
            next[i + 1] = x[i + 1] * decay + current * branch.resistance * (1.0 - decay);
        }
        Ok(next)
    }

    fn transition_linear(&self, dt: f64) -> LinearTransition {
        LinearTransition {
            f: self.transition_matrix(dt),
            b: self.input_matrix(dt),
        }
    }

    fn measure(&self, x: &DVector<f64>, current: f64) -> Result<f64> {
        ensure_vector_len("state", x, self.state_dim())?;
        let rc_drop: f64 = x.rows(1, self.branches.len()).sum();
        Ok(self.ocv.ocv(x[0]) - rc_drop - self.series_resistance * current)
    }

    fn measurement_jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>> {
        ensure_vector_len("state", x, self.state_dim())?;
        let mut h = DMatrix::from_element(1, self.state_dim(), -1.0);
        h[(0, 0)] = self.ocv.docv(x[0]);
        Ok(h)
    }
}
