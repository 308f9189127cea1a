//! Time-series driver
//!
//! Feeds chronologically ordered samples to an estimator, deriving each `dt`
//! from consecutive timestamps.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EstimatorError, Result};
use crate::estimator::{SocEstimate, SocEstimator};

/// One measurement sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Timestamp [s]
    pub time: f64,
    /// Current [A], positive = discharge
    pub current: f64,
    /// Terminal voltage [V]
    pub voltage: f64,
    /// Cell temperature [K]; carried through, the model is isothermal
    #[serde(default)]
    pub temperature: Option<f64>,
}

impl Sample {
    pub fn new(time: f64, current: f64, voltage: f64) -> Self {
        Self {
            time,
            current,
            voltage,
            temperature: None,
        }
    }
}

/// Streaming driver
///
/// The first sample is integrated over the nominal `sampling_time`; every
/// later one over the time since its predecessor.
#[derive(Debug, Clone)]
pub struct TimeSeriesDriver {
    sampling_time: f64,
    last_time: Option<f64>,
}

impl TimeSeriesDriver {
    pub fn new(sampling_time: f64) -> Result<Self> {
        if !(sampling_time.is_finite() && sampling_time > 0.0) {
            return Err(EstimatorError::Config(format!(
                "sampling_time must be positive, got {sampling_time}"
            )));
        }
        Ok(Self {
            sampling_time,
            last_time: None,
        })
    }

    /// Time step for `sample`, rejecting timestamps that do not increase
    pub fn time_step(&self, sample: &Sample) -> Result<f64> {
        match self.last_time {
            None => Ok(self.sampling_time),
            Some(previous) if sample.time > previous => Ok(sample.time - previous),
            Some(previous) => Err(EstimatorError::NonMonotonicTime {
                previous,
                current: sample.time,
            }),
        }
    }

    pub fn feed<E>(&mut self, estimator: &mut E, sample: &Sample) -> Result<SocEstimate>
    where
        E: SocEstimator + ?Sized,
    {
        let dt = self.time_step(sample)?;
        let estimate = estimator.step(sample.current, sample.voltage, dt)?;
        self.last_time = Some(sample.time);
        Ok(estimate)
    }

    /// Forget the previous timestamp
    pub fn reset(&mut self) {
        self.last_time = None;
    }

    pub fn sampling_time(&self) -> f64 {
        self.sampling_time
    }
}

/// Run `estimator` over `samples`, returning one estimate per sample
pub fn run<E>(estimator: &mut E, samples: &[Sample], sampling_time: f64) -> Result<Vec<SocEstimate>>
where
    E: SocEstimator + ?Sized,
{
    let mut driver = TimeSeriesDriver::new(sampling_time)?;
    let estimates = samples
        .iter()
        .map(|sample| driver.feed(&mut *estimator, sample))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        estimator = estimator.name(),
        samples = samples.len(),
        "finished time series"
    );
    Ok(estimates)
}
