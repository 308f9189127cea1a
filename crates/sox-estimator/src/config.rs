//! Estimator configuration
//!
//! Cell parameters, OCV table, filter tuning and sampling time. Every section
//! has defaults for a 10 A.h cell with one RC branch, so a TOML file only needs
//! the values it changes:
//!
//! ```toml
//! sampling_time = 1.0
//! kind = "ukf"
//!
//! [cell]
//! series_resistance = 0.015
//!
//! [sigma_points]
//! alpha = 0.1
//! ```
//!
//! Values are checked when an estimator is built, not when parsed.

use std::path::Path;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use sox_core::dynamics::{IsothermalThevenin, OcvCurve, TheveninParams};
use sox_core::estimation::{MerweParams, MerweScaledSigmaPoints};
use sox_core::math::{covariance_from_diagonal, state_vector, SavitzkyGolay};

use crate::error::{EstimatorError, Result};

/// Smooth monotone OCV curve [V] used by the default configuration
pub fn reference_ocv(soc: f64) -> f64 {
    3.3 + 0.8 * soc - 0.5 * soc * soc + 0.4 * soc * soc * soc
}

/// Which estimator `EstimatorConfig::build` creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    #[default]
    Ekf,
    Ukf,
    Coulomb,
}

/// Main estimator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Nominal sampling time [s], used for the first sample of a series
    pub sampling_time: f64,
    pub kind: EstimatorKind,
    pub cell: CellConfig,
    pub ocv: OcvConfig,
    pub filter: FilterConfig,
    pub sigma_points: SigmaPointConfig,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            sampling_time: 1.0,
            kind: EstimatorKind::default(),
            cell: CellConfig::default(),
            ocv: OcvConfig::default(),
            filter: FilterConfig::default(),
            sigma_points: SigmaPointConfig::default(),
        }
    }
}

impl EstimatorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading estimator config");
        Self::from_toml_str(&text)
    }

    /// Check everything that can be checked without building the model
    pub fn validate(&self) -> Result<()> {
        if !(self.sampling_time.is_finite() && self.sampling_time > 0.0) {
            return Err(EstimatorError::Config(format!(
                "sampling_time must be positive, got {}",
                self.sampling_time
            )));
        }
        self.filter.validate(self.cell.state_dim())
    }

    /// Smooth the OCV table and build the circuit model
    pub fn build_model(&self) -> Result<IsothermalThevenin> {
        let ocv = self.ocv.build()?;
        Ok(IsothermalThevenin::from_params(ocv, &self.cell.params())?)
    }
}

/// Equivalent-circuit parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellConfig {
    /// Series resistance R0 [Ohm]
    pub series_resistance: f64,
    /// RC branch resistances [Ohm]
    pub rc_resistances: Vec<f64>,
    /// RC branch capacitances [F]
    pub rc_capacitances: Vec<f64>,
    /// Capacity [A.h]
    pub capacity: f64,
}

impl Default for CellConfig {
    fn default() -> Self {
        let params = TheveninParams::default();
        Self {
            series_resistance: params.series_resistance,
            rc_resistances: params.rc_resistances,
            rc_capacitances: params.rc_capacitances,
            capacity: params.capacity,
        }
    }
}

impl CellConfig {
    pub fn params(&self) -> TheveninParams {
        TheveninParams {
            series_resistance: self.series_resistance,
            rc_resistances: self.rc_resistances.clone(),
            rc_capacitances: self.rc_capacitances.clone(),
            capacity: self.capacity,
        }
    }

    /// 1 + number of RC branches
    pub fn state_dim(&self) -> usize {
        1 + self.rc_resistances.len()
    }
}

/// Tabulated OCV curve and its smoothing filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcvConfig {
    /// SOC grid (uniform)
    pub soc: Vec<f64>,
    /// OCV at each grid point [V]
    pub ocv: Vec<f64>,
    /// Grid spacing; when set the grid is taken as uniform without checking
    pub step: Option<f64>,
    pub window_length: usize,
    pub polyorder: usize,
}

impl Default for OcvConfig {
    fn default() -> Self {
        let filter = SavitzkyGolay::default();
        let soc: Vec<f64> = (0..=100).map(|i| i as f64 * 0.01).collect();
        let ocv = soc.iter().map(|&s| reference_ocv(s)).collect();
        Self {
            soc,
            ocv,
            step: None,
            window_length: filter.window_length,
            polyorder: filter.polyorder,
        }
    }
}

impl OcvConfig {
    pub fn filter(&self) -> Result<SavitzkyGolay> {
        Ok(SavitzkyGolay::new(self.window_length, self.polyorder)?)
    }

    pub fn build(&self) -> Result<OcvCurve> {
        let filter = self.filter()?;
        let curve = match self.step {
            Some(step) => OcvCurve::with_step(self.soc.clone(), self.ocv.clone(), step, filter)?,
            None => OcvCurve::from_samples(self.soc.clone(), self.ocv.clone(), filter)?,
        };
        Ok(curve)
    }
}

/// Initial estimate and noise tuning shared by the Kalman filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Initial state [SOC, v_rc_1, ..., v_rc_m]
    pub initial_state: Vec<f64>,
    /// Diagonal of the initial covariance P0
    pub initial_covariance: Vec<f64>,
    /// Diagonal of the process noise Q
    pub process_noise: Vec<f64>,
    /// Voltage measurement variance R [V^2]
    pub measurement_noise: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            initial_state: vec![0.79, 0.0],
            initial_covariance: vec![2.5e-4, 1e-4],
            process_noise: vec![1e-10, 1e-8],
            measurement_noise: 1e-6,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self, state_dim: usize) -> Result<()> {
        let lengths = [
            ("initial_state", self.initial_state.len()),
            ("initial_covariance", self.initial_covariance.len()),
            ("process_noise", self.process_noise.len()),
        ];
        for (name, len) in lengths {
            if len != state_dim {
                return Err(EstimatorError::Config(format!(
                    "{name} has {len} entries, the cell model has {state_dim} states"
                )));
            }
        }

        let variances = self
            .initial_covariance
            .iter()
            .chain(&self.process_noise)
            .chain(std::iter::once(&self.measurement_noise));
        if let Some(v) = variances.copied().find(|v| !(v.is_finite() && *v >= 0.0)) {
            return Err(EstimatorError::Config(format!(
                "variances must be non-negative, got {v}"
            )));
        }
        if self.measurement_noise == 0.0 {
            return Err(EstimatorError::Config(
                "measurement_noise must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn initial_state(&self) -> DVector<f64> {
        state_vector(&self.initial_state)
    }

    pub fn initial_covariance(&self) -> DMatrix<f64> {
        covariance_from_diagonal(&self.initial_covariance)
    }

    pub fn process_noise(&self) -> DMatrix<f64> {
        covariance_from_diagonal(&self.process_noise)
    }

    pub fn measurement_noise(&self) -> DMatrix<f64> {
        DMatrix::from_element(1, 1, self.measurement_noise)
    }
}

/// Merwe sigma point scaling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmaPointConfig {
    pub alpha: f64,
    pub beta: f64,
    pub kappa: f64,
}

impl Default for SigmaPointConfig {
    fn default() -> Self {
        let params = MerweParams::default();
        Self {
            alpha: params.alpha,
            beta: params.beta,
            kappa: params.kappa,
        }
    }
}

impl SigmaPointConfig {
    pub fn build(&self, n: usize) -> Result<MerweScaledSigmaPoints> {
        let params = MerweParams {
            alpha: self.alpha,
            beta: self.beta,
            kappa: self.kappa,
        };
        Ok(MerweScaledSigmaPoints::with_params(n, params)?)
    }
}
