//! Synthetic drive cycles
//!
//! Ground-truth sample sequences generated from the circuit model itself,
//! with Gaussian voltage noise from a seeded generator owned by each
//! scenario. Sample `k` is stamped `k * dt`; its voltage is measured on the
//! true state after the `k + 1`-th transition, matching a driver that uses
//! the nominal sampling time for the first sample.

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use sox_core::dynamics::DynamicsModel;
use sox_core::math::{ensure_vector_len, state_vector};

use crate::driver::Sample;
use crate::error::{EstimatorError, Result};

/// Common scenario parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioParams {
    /// True initial state [SOC, v_rc_1, ..., v_rc_m]
    pub initial_state: Vec<f64>,
    /// Time step [s]
    pub dt: f64,
    /// Number of samples
    pub steps: usize,
    /// Standard deviation of the voltage noise [V]
    pub voltage_noise_std: f64,
    pub seed: u64,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            initial_state: vec![0.8, 0.0],
            dt: 1.0,
            steps: 3600,
            voltage_noise_std: 1e-3,
            seed: 42,
        }
    }
}

/// Rectangular current pulses separated by rest
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseParams {
    /// Current during a pulse [A]
    pub amplitude: f64,
    /// Pulse length [s]
    pub on_duration: f64,
    /// Rest length [s]
    pub off_duration: f64,
}

impl Default for PulseParams {
    fn default() -> Self {
        Self {
            amplitude: 10.0,
            on_duration: 60.0,
            off_duration: 60.0,
        }
    }
}

impl PulseParams {
    /// Current at time `t` [s]
    pub fn current(&self, t: f64) -> f64 {
        let period = self.on_duration + self.off_duration;
        if t.rem_euclid(period) < self.on_duration {
            self.amplitude
        } else {
            0.0
        }
    }
}

/// Zero-mean Gaussian noise drawn from a seeded generator
#[derive(Debug, Clone)]
pub struct GaussianNoise {
    normal: Normal<f64>,
    rng: StdRng,
}

impl GaussianNoise {
    pub fn new(std_dev: f64, seed: u64) -> Result<Self> {
        if !(std_dev.is_finite() && std_dev >= 0.0) {
            return Err(EstimatorError::Config(format!(
                "noise standard deviation must be non-negative, got {std_dev}"
            )));
        }
        let normal = Normal::new(0.0, std_dev)
            .map_err(|e| EstimatorError::Config(format!("invalid noise distribution: {e}")))?;
        Ok(Self {
            normal,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn sample(&mut self) -> f64 {
        self.rng.sample(self.normal)
    }

    pub fn std_dev(&self) -> f64 {
        self.normal.std_dev()
    }
}

/// Noisy samples with the true state behind each one
#[derive(Debug, Clone)]
pub struct Scenario {
    pub samples: Vec<Sample>,
    /// True state after each sample's transition
    pub truth: Vec<DVector<f64>>,
}

impl Scenario {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn true_soc(&self) -> impl Iterator<Item = f64> + '_ {
        self.truth.iter().map(|x| x[0])
    }
}

/// Simulate `model` under an arbitrary current profile `current(t)`
pub fn from_current_profile<M, F>(
    model: &M,
    params: &ScenarioParams,
    current: F,
) -> Result<Scenario>
where
    M: DynamicsModel,
    F: Fn(f64) -> f64,
{
    if !(params.dt.is_finite() && params.dt > 0.0) {
        return Err(EstimatorError::Config(format!(
            "scenario dt must be positive, got {}",
            params.dt
        )));
    }
    let mut x = state_vector(&params.initial_state);
    ensure_vector_len("initial state", &x, model.state_dim())?;
    let mut noise = GaussianNoise::new(params.voltage_noise_std, params.seed)?;

    let mut samples = Vec::with_capacity(params.steps);
    let mut truth = Vec::with_capacity(params.steps);
    for k in 0..params.steps {
        let time = k as f64 * params.dt;
        let i = current(time);
        x = model.transition(&x, i, params.dt)?;
        let voltage = model.measure(&x, i)? + noise.sample();

        samples.push(Sample::new(time, i, voltage));
        truth.push(x.clone());
    }

    debug!(
        steps = params.steps,
        dt = params.dt,
        seed = params.seed,
        "generated scenario"
    );
    Ok(Scenario { samples, truth })
}

/// Constant-current discharge (or charge, if `current` is negative)
pub fn constant_current<M>(model: &M, current: f64, params: &ScenarioParams) -> Result<Scenario>
where
    M: DynamicsModel,
{
    from_current_profile(model, params, |_| current)
}

/// Pulsed discharge with rest periods
pub fn pulse<M>(model: &M, pulse: &PulseParams, params: &ScenarioParams) -> Result<Scenario>
where
    M: DynamicsModel,
{
    if !(pulse.on_duration > 0.0 && pulse.off_duration >= 0.0) {
        return Err(EstimatorError::Config(format!(
            "pulse needs a positive on duration, got on={} off={}",
            pulse.on_duration, pulse.off_duration
        )));
    }
    from_current_profile(model, params, |t| pulse.current(t))
}
