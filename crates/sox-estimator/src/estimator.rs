//! SOC estimators
//!
//! Each estimator binds the isothermal Thevenin model to a filter and
//! consumes one `(current, voltage, dt)` sample per `step`. The model has no
//! mutable state; the filter owns `(x, P)`.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace, warn};

use sox_core::dynamics::{DynamicsModel, IsothermalThevenin};
use sox_core::estimation::{CoulombCounter, ExtendedKalmanFilter, UnscentedKalmanFilter};
use sox_core::EstimationError;

use crate::config::{EstimatorConfig, EstimatorKind};
use crate::error::{EstimatorError, Result};

/// Posterior after one sample
#[derive(Debug, Clone, PartialEq)]
pub struct SocEstimate {
    /// State of charge
    pub soc: f64,
    /// RC branch overpotentials [V]
    pub rc_voltages: Vec<f64>,
    /// Variance of the SOC estimate, if the estimator tracks one
    pub soc_variance: Option<f64>,
    /// Full state covariance, if the estimator tracks one
    pub covariance: Option<DMatrix<f64>>,
}

impl SocEstimate {
    fn from_posterior(x: &DVector<f64>, p: &DMatrix<f64>) -> Self {
        Self {
            soc: x[0],
            rc_voltages: x.iter().skip(1).copied().collect(),
            soc_variance: Some(p[(0, 0)]),
            covariance: Some(p.clone()),
        }
    }

    /// One standard deviation of SOC
    pub fn soc_std(&self) -> Option<f64> {
        self.soc_variance.map(|v| v.max(0.0).sqrt())
    }
}

/// Online SOC estimator
pub trait SocEstimator {
    fn name(&self) -> &'static str;

    /// Consume one sample: `current` [A] (positive = discharge), measured
    /// terminal `voltage` [V], and `dt` [s] since the previous sample
    ///
    /// On error the estimate is left as it was before the call.
    fn step(&mut self, current: f64, voltage: f64, dt: f64) -> Result<SocEstimate>;

    fn estimate(&self) -> SocEstimate;

    /// Restore the initial estimate
    fn reset(&mut self);
}

fn check_time_step(dt: f64) -> Result<()> {
    if dt.is_finite() && dt > 0.0 {
        Ok(())
    } else {
        let msg = format!("time step must be positive, got {dt}");
        Err(EstimationError::InvalidParameter(msg).into())
    }
}

fn check_filter_dims(model: &IsothermalThevenin, state_dim: usize, meas_dim: usize) -> Result<()> {
    if state_dim != model.state_dim() {
        return Err(EstimationError::DimensionMismatch {
            what: "filter state",
            expected: model.state_dim(),
            got: state_dim,
        }
        .into());
    }
    if meas_dim != 1 {
        return Err(EstimationError::DimensionMismatch {
            what: "measurement noise",
            expected: 1,
            got: meas_dim,
        }
        .into());
    }
    Ok(())
}

/// Logs when the SOC estimate leaves or re-enters [0, 1]
#[derive(Debug, Clone, Default)]
struct SocRangeMonitor {
    outside: bool,
}

impl SocRangeMonitor {
    fn observe(&mut self, estimator: &'static str, soc: f64) {
        let outside = !(0.0..=1.0).contains(&soc);
        if outside && !self.outside {
            warn!(estimator, soc, "SOC estimate left [0, 1]");
        } else if !outside && self.outside {
            debug!(estimator, soc, "SOC estimate back in [0, 1]");
        }
        self.outside = outside;
    }
}

/// EKF-based estimator
///
/// Prediction uses the model's exact `F(dt)` and `B(dt)` with `u = [current]`,
/// so only the measurement is linearized.
#[derive(Debug, Clone)]
pub struct EkfSocEstimator {
    model: IsothermalThevenin,
    filter: ExtendedKalmanFilter,
    monitor: SocRangeMonitor,
}

impl EkfSocEstimator {
    pub fn new(model: IsothermalThevenin, filter: ExtendedKalmanFilter) -> Result<Self> {
        check_filter_dims(&model, filter.state_dim(), filter.measurement_dim())?;
        Ok(Self {
            model,
            filter,
            monitor: SocRangeMonitor::default(),
        })
    }

    pub fn from_config(config: &EstimatorConfig) -> Result<Self> {
        config.validate()?;
        let model = config.build_model()?;
        let f = &config.filter;
        let filter = ExtendedKalmanFilter::new(
            f.initial_state(),
            f.initial_covariance(),
            f.process_noise(),
            f.measurement_noise(),
        )?;
        Self::new(model, filter)
    }

    pub fn model(&self) -> &IsothermalThevenin {
        &self.model
    }

    pub fn filter(&self) -> &ExtendedKalmanFilter {
        &self.filter
    }
}

impl SocEstimator for EkfSocEstimator {
    fn name(&self) -> &'static str {
        "ekf"
    }

    fn step(&mut self, current: f64, voltage: f64, dt: f64) -> Result<SocEstimate> {
        check_time_step(dt)?;
        let model = &self.model;
        let snapshot = self.filter.clone();

        let cycle = self
            .filter
            .predict(
                &model.transition_linear(dt),
                &DVector::from_element(1, current),
                None,
            )
            .and_then(|()| {
                self.filter.update(
                    &DVector::from_element(1, voltage),
                    |x| model.measure(x, current).map(|v| DVector::from_element(1, v)),
                    |x| model.measurement_jacobian(x),
                    None,
                )
            });
        if let Err(err) = cycle {
            self.filter = snapshot;
            return Err(err.into());
        }

        let estimate = self.estimate();
        trace!(current, voltage, dt, soc = estimate.soc, "EKF step");
        let name = self.name();
        self.monitor.observe(name, estimate.soc);
        Ok(estimate)
    }

    fn estimate(&self) -> SocEstimate {
        SocEstimate::from_posterior(self.filter.state_estimate(), self.filter.covariance())
    }

    fn reset(&mut self) {
        self.filter.reset();
        self.monitor = SocRangeMonitor::default();
    }
}

/// UKF-based estimator
///
/// Sigma points go through the nonlinear `transition` and `measure` directly.
#[derive(Debug, Clone)]
pub struct UkfSocEstimator {
    model: IsothermalThevenin,
    filter: UnscentedKalmanFilter,
    monitor: SocRangeMonitor,
}

impl UkfSocEstimator {
    pub fn new(model: IsothermalThevenin, filter: UnscentedKalmanFilter) -> Result<Self> {
        check_filter_dims(&model, filter.state_dim(), filter.measurement_dim())?;
        Ok(Self {
            model,
            filter,
            monitor: SocRangeMonitor::default(),
        })
    }

    pub fn from_config(config: &EstimatorConfig) -> Result<Self> {
        config.validate()?;
        let model = config.build_model()?;
        let f = &config.filter;
        let filter = UnscentedKalmanFilter::new(
            f.initial_state(),
            f.initial_covariance(),
            f.process_noise(),
            f.measurement_noise(),
            config.sigma_points.build(model.state_dim())?,
        )?;
        Self::new(model, filter)
    }

    pub fn model(&self) -> &IsothermalThevenin {
        &self.model
    }

    pub fn filter(&self) -> &UnscentedKalmanFilter {
        &self.filter
    }
}

impl SocEstimator for UkfSocEstimator {
    fn name(&self) -> &'static str {
        "ukf"
    }

    fn step(&mut self, current: f64, voltage: f64, dt: f64) -> Result<SocEstimate> {
        check_time_step(dt)?;
        let model = &self.model;
        let snapshot = self.filter.clone();

        let cycle = self
            .filter
            .predict(|x| model.transition(x, current, dt), None)
            .and_then(|()| {
                self.filter.update(
                    &DVector::from_element(1, voltage),
                    |x| model.measure(x, current).map(|v| DVector::from_element(1, v)),
                    None,
                )
            });
        if let Err(err) = cycle {
            self.filter = snapshot;
            return Err(err.into());
        }

        let estimate = self.estimate();
        trace!(current, voltage, dt, soc = estimate.soc, "UKF step");
        let name = self.name();
        self.monitor.observe(name, estimate.soc);
        Ok(estimate)
    }

    fn estimate(&self) -> SocEstimate {
        SocEstimate::from_posterior(self.filter.state_estimate(), self.filter.covariance())
    }

    fn reset(&mut self) {
        self.filter.reset();
        self.monitor = SocRangeMonitor::default();
    }
}

/// Open-loop Coulomb counting baseline
///
/// Ignores the voltage and reports neither RC voltages nor uncertainty.
#[derive(Debug, Clone)]
pub struct CoulombSocEstimator {
    counter: CoulombCounter,
    monitor: SocRangeMonitor,
}

impl CoulombSocEstimator {
    pub fn new(counter: CoulombCounter) -> Self {
        Self {
            counter,
            monitor: SocRangeMonitor::default(),
        }
    }

    pub fn from_config(config: &EstimatorConfig) -> Result<Self> {
        config.validate()?;
        let initial_soc = config
            .filter
            .initial_state
            .first()
            .copied()
            .ok_or_else(|| EstimatorError::Config("initial_state is empty".to_string()))?;
        if !(config.cell.capacity.is_finite() && config.cell.capacity > 0.0) {
            return Err(EstimatorError::Config(format!(
                "capacity must be positive, got {}",
                config.cell.capacity
            )));
        }
        Ok(Self::new(CoulombCounter::new(
            initial_soc,
            config.cell.capacity,
            config.sampling_time,
        )))
    }

    pub fn counter(&self) -> &CoulombCounter {
        &self.counter
    }
}

impl SocEstimator for CoulombSocEstimator {
    fn name(&self) -> &'static str {
        "coulomb"
    }

    fn step(&mut self, current: f64, _voltage: f64, dt: f64) -> Result<SocEstimate> {
        check_time_step(dt)?;
        self.counter.sampling_time = dt;
        self.counter.predict(current);

        let estimate = self.estimate();
        trace!(current, dt, soc = estimate.soc, "Coulomb step");
        let name = self.name();
        self.monitor.observe(name, estimate.soc);
        Ok(estimate)
    }

    fn estimate(&self) -> SocEstimate {
        SocEstimate {
            soc: self.counter.soc(),
            rc_voltages: Vec::new(),
            soc_variance: None,
            covariance: None,
        }
    }

    fn reset(&mut self) {
        self.counter.reset();
        self.monitor = SocRangeMonitor::default();
    }
}

impl EstimatorConfig {
    /// Build the estimator selected by `kind`
    pub fn build(&self) -> Result<Box<dyn SocEstimator>> {
        let estimator: Box<dyn SocEstimator> = match self.kind {
            EstimatorKind::Ekf => Box::new(EkfSocEstimator::from_config(self)?),
            EstimatorKind::Ukf => Box::new(UkfSocEstimator::from_config(self)?),
            EstimatorKind::Coulomb => Box::new(CoulombSocEstimator::from_config(self)?),
        };
        debug!(estimator = estimator.name(), "built SOC estimator");
        Ok(estimator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sox_core::estimation::MerweScaledSigmaPoints;

    fn config() -> EstimatorConfig {
        EstimatorConfig::default()
    }

    #[test]
    fn test_initial_estimate_matches_config() {
        let ekf = EkfSocEstimator::from_config(&config()).unwrap();
        let est = ekf.estimate();
        assert_eq!(est.soc, 0.79);
        assert_eq!(est.rc_voltages, vec![0.0]);
        assert_eq!(est.soc_variance, Some(2.5e-4));
        assert_relative_eq!(est.soc_std().unwrap(), 0.0158113883, epsilon = 1e-9);
    }

    #[test]
    fn test_rejects_filter_of_wrong_dimension() {
        let cfg = config();
        let model = cfg.build_model().unwrap();
        let filter = ExtendedKalmanFilter::new(
            DVector::from_vec(vec![0.5, 0.0, 0.0]),
            DMatrix::identity(3, 3),
            DMatrix::identity(3, 3),
            DMatrix::identity(1, 1),
        )
        .unwrap();
        let err = EkfSocEstimator::new(model, filter).unwrap_err();
        assert!(matches!(
            err,
            EstimatorError::Estimation(EstimationError::DimensionMismatch {
                expected: 2,
                got: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_two_dimensional_measurement() {
        let cfg = config();
        let model = cfg.build_model().unwrap();
        let filter = UnscentedKalmanFilter::new(
            DVector::from_vec(vec![0.5, 0.0]),
            DMatrix::identity(2, 2),
            DMatrix::identity(2, 2),
            DMatrix::identity(2, 2),
            MerweScaledSigmaPoints::new(2, 0.1, 2.0, 0.0).unwrap(),
        )
        .unwrap();
        assert!(UkfSocEstimator::new(model, filter).is_err());
    }

    #[test]
    fn test_ekf_step_matches_manual_cycle() {
        let cfg = config();
        let mut est = EkfSocEstimator::from_config(&cfg).unwrap();
        let model = cfg.build_model().unwrap();
        let f = &cfg.filter;
        let mut ekf = ExtendedKalmanFilter::new(
            f.initial_state(),
            f.initial_covariance(),
            f.process_noise(),
            f.measurement_noise(),
        )
        .unwrap();

        let (current, voltage, dt) = (10.0, 3.78, 1.0);
        let out = est.step(current, voltage, dt).unwrap();

        ekf.predict(&model.transition_linear(dt), &DVector::from_element(1, current), None)
            .unwrap();
        ekf.update(
            &DVector::from_element(1, voltage),
            |x| model.measure(x, current).map(|v| DVector::from_element(1, v)),
            |x| model.measurement_jacobian(x),
            None,
        )
        .unwrap();

        assert_relative_eq!(out.soc, ekf.state_estimate()[0], epsilon = 1e-15);
        assert_relative_eq!(out.rc_voltages[0], ekf.state_estimate()[1], epsilon = 1e-15);
        assert_relative_eq!(
            *out.covariance.as_ref().unwrap(),
            *ekf.covariance(),
            epsilon = 1e-15
        );
    }

    #[test]
    fn test_reset_restores_initial_estimate() {
        let mut cfg = config();
        cfg.sigma_points.alpha = 0.1;
        let mut estimators: Vec<Box<dyn SocEstimator>> = vec![
            Box::new(EkfSocEstimator::from_config(&cfg).unwrap()),
            Box::new(UkfSocEstimator::from_config(&cfg).unwrap()),
            Box::new(CoulombSocEstimator::from_config(&cfg).unwrap()),
        ];
        for est in estimators.iter_mut() {
            let initial = est.estimate();
            for _ in 0..10 {
                est.step(10.0, 3.8, 1.0).unwrap();
            }
            assert_ne!(est.estimate().soc, initial.soc, "{}", est.name());
            est.reset();
            assert_eq!(est.estimate(), initial, "{}", est.name());
        }
    }

    #[test]
    fn test_coulomb_estimator_uses_per_sample_dt() {
        let mut est = CoulombSocEstimator::from_config(&config()).unwrap();
        est.step(10.0, 0.0, 1.0).unwrap();
        let out = est.step(10.0, 0.0, 2.0).unwrap();
        assert_relative_eq!(out.soc, 0.79 - 30.0 / 36000.0, epsilon = 1e-12);
        assert!(out.rc_voltages.is_empty());
        assert_eq!(out.soc_variance, None);
        assert_eq!(out.soc_std(), None);
    }

    #[test]
    fn test_rejects_non_positive_dt() {
        let mut est = EkfSocEstimator::from_config(&config()).unwrap();
        assert!(est.step(10.0, 3.8, 0.0).is_err());
        assert!(est.step(10.0, 3.8, f64::NAN).is_err());
        // a rejected sample leaves the estimate untouched
        assert_eq!(est.estimate().soc, 0.79);
    }

    #[test]
    fn test_failed_update_rolls_back_prediction() {
        let model = config().build_model().unwrap();
        // zero P, Q and R make the innovation covariance exactly zero
        let filter = ExtendedKalmanFilter::new(
            DVector::from_vec(vec![0.8, 0.0]),
            DMatrix::zeros(2, 2),
            DMatrix::zeros(2, 2),
            DMatrix::zeros(1, 1),
        )
        .unwrap();
        let mut est = EkfSocEstimator::new(model, filter).unwrap();
        let before = est.estimate();

        let err = est.step(10.0, 3.8, 1.0).unwrap_err();
        assert!(matches!(
            err,
            EstimatorError::Estimation(EstimationError::SingularInnovation)
        ));
        assert_eq!(est.estimate(), before);
    }

    #[test]
    fn test_build_dispatches_on_kind() {
        let mut cfg = config();
        for (kind, name) in [
            (EstimatorKind::Ekf, "ekf"),
            (EstimatorKind::Ukf, "ukf"),
            (EstimatorKind::Coulomb, "coulomb"),
        ] {
            cfg.kind = kind;
            assert_eq!(cfg.build().unwrap().name(), name);
        }
    }

    #[test]
    fn test_range_monitor_tracks_transitions() {
        let mut monitor = SocRangeMonitor::default();
        monitor.observe("test", 0.5);
        assert!(!monitor.outside);
        monitor.observe("test", -0.01);
        assert!(monitor.outside);
        monitor.observe("test", 1.0);
        assert!(!monitor.outside);
    }
}
