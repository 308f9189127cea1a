//! # SOX Core
//!
//! Battery state-of-charge estimation - Core library
//!
//! Estimates the hidden state of a cell (state of charge and RC-branch
//! overpotentials) from noisy current and terminal-voltage samples with
//! recursive Bayesian filters.
//!
//! ## Modules
//!
//! - [`math`]: Numerical helpers (Savitzky-Golay, interpolation, shape checks)
//! - [`dynamics`]: OCV curve and the isothermal Thevenin equivalent circuit
//! - [`estimation`]: EKF, UKF with Merwe sigma points, Coulomb counting
//!
//! A driver calls `predict` then `update` for every sample:
//!
//! ```
//! use nalgebra::{DMatrix, DVector};
//! use sox_core::dynamics::{DynamicsModel, IsothermalThevenin, OcvCurve, DEFAULT_SOC_STEP};
//! use sox_core::estimation::ExtendedKalmanFilter;
//! use sox_core::math::SavitzkyGolay;
//!
//! let ocv = OcvCurve::from_fn(|s| 3.4 + 0.7 * s, DEFAULT_SOC_STEP, SavitzkyGolay::default())?;
//! let model = IsothermalThevenin::new(ocv, 0.01, &[0.01], &[1000.0], 10.0)?;
//!
//! let mut ekf = ExtendedKalmanFilter::new(
//!     DVector::from_vec(vec![0.79, 0.0]),
//!     DMatrix::from_diagonal(&DVector::from_vec(vec![1e-4, 1e-4])),
//!     DMatrix::from_diagonal(&DVector::from_vec(vec![1e-10, 1e-8])),
//!     DMatrix::from_element(1, 1, 1e-6),
//! )?;
//!
//! let (current, voltage, dt) = (10.0, 3.85, 1.0);
//! ekf.predict(&model.transition_linear(dt), &DVector::from_element(1, current), None)?;
//! ekf.update(
//!     &DVector::from_element(1, voltage),
//!     |x| model.measure(x, current).map(|v| DVector::from_element(1, v)),
//!     |x| model.measurement_jacobian(x),
//!     None,
//! )?;
//! # Ok::<(), sox_core::EstimationError>(())
//! ```

pub mod dynamics;
pub mod error;
pub mod estimation;
pub mod math;

pub use error::{EstimationError, Result};

/// Seconds per hour, converting A.h capacities to coulombs
pub const SECONDS_PER_HOUR: f64 = 3600.0;
