//! Coulomb counting
//!
//! Open-loop SOC integration, used as a baseline for the Kalman filters.

use serde::{Deserialize, Serialize};

use crate::SECONDS_PER_HOUR;

/// Coulomb counter with fixed capacity and sampling time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoulombCounter {
    /// Initial state of charge
    pub initial_soc: f64,
    /// Cell capacity [A.h]
    pub capacity: f64,
    /// Sampling time [s]
    pub sampling_time: f64,
    soc: f64,
}

impl CoulombCounter {
    pub fn new(initial_soc: f64, capacity: f64, sampling_time: f64) -> Self {
        Self {
            initial_soc,
            capacity,
            sampling_time,
            soc: initial_soc,
        }
    }

    /// Integrate one sample of `current` [A] (positive = discharge)
    pub fn predict(&mut self, current: f64) {
        self.soc -= current * self.sampling_time / (self.capacity * SECONDS_PER_HOUR);
    }

    pub fn soc(&self) -> f64 {
        self.soc
    }

    pub fn reset(&mut self) {
        self.soc = self.initial_soc;
    }
}

/// Coulomb counter whose capacity is supplied with every sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableCapacityCoulombCounter {
    pub initial_soc: f64,
    /// Sampling time [s]
    pub sampling_time: f64,
    soc: f64,
}

impl VariableCapacityCoulombCounter {
    pub fn new(initial_soc: f64, sampling_time: f64) -> Self {
        Self {
            initial_soc,
            sampling_time,
            soc: initial_soc,
        }
    }

    /// Integrate one sample of `current` [A] against `capacity` [A.h]
    pub fn predict(&mut self, current: f64, capacity: f64) {
        self.soc -= current * self.sampling_time / (capacity * SECONDS_PER_HOUR);
    }

    pub fn soc(&self) -> f64 {
        self.soc
    }

    pub fn reset(&mut self) {
        self.soc = self.initial_soc;
    }
}
