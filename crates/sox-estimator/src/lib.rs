//! SOX Estimator
//!
//! Online battery state-of-charge estimation on top of `sox-core`.
//!
//! # Components
//!
//! - [`config`]: Cell, OCV, filter and sigma-point configuration (TOML)
//! - [`estimator`]: EKF, UKF and Coulomb-counting SOC estimators
//! - [`driver`]: Feeds timestamped samples, deriving `dt` per sample
//! - [`scenarios`]: Synthetic drive cycles with seeded measurement noise
//!
//! ```
//! use sox_estimator::{driver, scenarios, EstimatorConfig};
//!
//! let config = EstimatorConfig::default();
//! let model = config.build_model()?;
//! let cycle = scenarios::constant_current(&model, 10.0, &scenarios::ScenarioParams {
//!     steps: 120,
//!     ..Default::default()
//! })?;
//!
//! let mut estimator = config.build()?;
//! let estimates = driver::run(estimator.as_mut(), &cycle.samples, config.sampling_time)?;
//! assert_eq!(estimates.len(), 120);
//! # Ok::<(), sox_estimator::EstimatorError>(())
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod estimator;
pub mod scenarios;

// Re-exports
pub use config::{EstimatorConfig, EstimatorKind};
pub use driver::{run, Sample, TimeSeriesDriver};
pub use error::{EstimatorError, Result};
pub use estimator::{
    CoulombSocEstimator, EkfSocEstimator, SocEstimate, SocEstimator, UkfSocEstimator,
};
pub use scenarios::Scenario;
