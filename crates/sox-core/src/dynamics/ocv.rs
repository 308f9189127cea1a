//! Open-circuit voltage curve
//!
//! Builds `ocv(soc)` and `docv(soc)` from a tabulated curve on a uniform SOC
//! grid. The table is first smoothed with a Savitzky-Golay filter; the
//! derivative samples come from the same filter in derivative mode applied
//! to the smoothed table. Both sample sets are then linearly interpolated
//! (and extrapolated outside the grid).

use serde::Serialize;
use tracing::debug;

use crate::error::{EstimationError, Result};
use crate::math::{LinearInterpolator, SavitzkyGolay};

/// SOC spacing used when sampling an OCV function over [0, 1]
pub const DEFAULT_SOC_STEP: f64 = 0.001;

/// Relative tolerance on grid spacing when checking uniformity
const GRID_TOLERANCE: f64 = 1e-6;

/// Smoothed open-circuit voltage curve and its SOC derivative
///
/// Only constructible through the checked builders below.
#[derive(Debug, Clone, Serialize)]
pub struct OcvCurve {
    ocv: LinearInterpolator,
    docv: LinearInterpolator,
    step: f64,
}

impl OcvCurve {
    /// Build from tabulated samples, verifying the SOC grid is uniform
    pub fn from_samples(soc: Vec<f64>, ocv: Vec<f64>, filter: SavitzkyGolay) -> Result<Self> {
        let step = uniform_step(&soc)?;
        Self::with_step(soc, ocv, step, filter)
    }

    /// Build from tabulated samples on a grid known to be uniform with spacing `step`
    ///
    /// The spacing is taken as given and not verified.
    pub fn with_step(
        soc: Vec<f64>,
        ocv: Vec<f64>,
        step: f64,
        filter: SavitzkyGolay,
    ) -> Result<Self> {
        if soc.len() != ocv.len() {
            return Err(EstimationError::DimensionMismatch {
                what: "OCV table",
                expected: soc.len(),
                got: ocv.len(),
            });
        }

        let smoothed = filter.smooth(&ocv)?;
        let derivative = filter.derivative(&smoothed, 1, step)?;

        debug!(
            samples = soc.len(),
            step,
            window_length = filter.window_length,
            polyorder = filter.polyorder,
            "built OCV curve"
        );

        Ok(Self {
            ocv: LinearInterpolator::new(soc.clone(), smoothed)?,
            docv: LinearInterpolator::new(soc, derivative)?,
            step,
        })
    }

    /// Sample `f` on the grid `0, step, 2*step, ..., 1` and build the curve
    ///
    /// `step` must divide 1 and leave at least one smoothing window of samples.
    pub fn from_fn<F>(f: F, step: f64, filter: SavitzkyGolay) -> Result<Self>
    where
        F: Fn(f64) -> f64,
    {
        if !(step.is_finite() && step > 0.0) {
            return Err(EstimationError::InvalidParameter(format!(
                "SOC step must be positive, got {step}"
            )));
        }
        let ratio = 1.0 / step;
        if (ratio - ratio.round()).abs() > GRID_TOLERANCE * ratio {
            return Err(EstimationError::InvalidParameter(format!(
                "SOC step must divide 1, got {step}"
            )));
        }
        let intervals = ratio.round() as usize;
        if intervals + 1 < filter.window_length {
            return Err(EstimationError::InvalidParameter(format!(
                "SOC step {step} gives {} samples, fewer than the window of {}",
                intervals + 1,
                filter.window_length
            )));
        }
        let soc: Vec<f64> = (0..=intervals).map(|i| i as f64 * step).collect();
        let ocv: Vec<f64> = soc.iter().map(|&s| f(s)).collect();
        Self::with_step(soc, ocv, step, filter)
    }

    /// Open-circuit voltage [V]
    pub fn ocv(&self, soc: f64) -> f64 {
        self.ocv.eval(soc)
    }

    /// dOCV/dSOC [V per unit SOC]
    pub fn docv(&self, soc: f64) -> f64 {
        self.docv.eval(soc)
    }

    /// SOC grid spacing
    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn grid(&self) -> &[f64] {
        self.ocv.grid()
    }
}

/// Spacing of a uniform grid, or the first index where spacing deviates
fn uniform_step(x: &[f64]) -> Result<f64> {
    if x.len() < 2 {
        return Err(EstimationError::InsufficientSamples {
            required: 2,
            got: x.len(),
        });
    }
    let step = x[1] - x[0];
    if !(step > 0.0) {
        return Err(EstimationError::InvalidParameter(
            "SOC grid must be increasing".to_string(),
        ));
    }
    for (i, w) in x.windows(2).enumerate() {
        if ((w[1] - w[0]) - step).abs() > GRID_TOLERANCE * step {
            return Err(EstimationError::NonUniformGrid { index: i + 1 });
        }
    }
    Ok(step)
}
