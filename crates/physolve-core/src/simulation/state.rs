//! Simulation state and time-series snapshots

use crate::events::Event;
use crate::expr::SymbolTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Convergence of the step loop at one instant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceInfo {
    pub is_converged: bool,
    /// Largest absolute change of any variable over the last step
    pub residual: f64,
    pub tolerance: f64,
    /// Ratio of this residual to the previous one
    pub convergence_rate: f64,
}

/// Values of the conserved-quantity expressions
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Observed {
    pub energy: Option<f64>,
    pub momentum: Option<f64>,
    pub angular_momentum: Option<f64>,
}

/// The system at one simulated instant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub time: f64,
    /// Every symbol value: integrated, derived and fixed
    pub variables: BTreeMap<String, f64>,
    /// Time derivatives of the integrated variables
    pub derivatives: BTreeMap<String, f64>,
    pub events: Vec<Event>,
    pub convergence: ConvergenceInfo,
    pub observed: Observed,
}

impl SimulationState {
    pub fn new(time: f64) -> Self {
        Self {
            time,
            ..Default::default()
        }
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.variables.get(name).copied()
    }

    pub fn derivative(&self, name: &str) -> Option<f64> {
        self.derivatives.get(name).copied()
    }

    /// Position of a declared object, missing axes read as 0
    pub fn position_of(&self, object: &str) -> [f64; 3] {
        self.vector(object, ["x", "y", "z"])
    }

    /// Velocity of a declared object, missing axes read as 0
    pub fn velocity_of(&self, object: &str) -> [f64; 3] {
        self.vector(object, ["vx", "vy", "vz"])
    }

    /// Acceleration of a declared object from the velocity derivatives
    pub fn acceleration_of(&self, object: &str) -> [f64; 3] {
        ["vx", "vy", "vz"].map(|axis| {
            self.derivative(&format!("{}_{}", object, axis))
                .unwrap_or(0.0)
        })
    }

    fn vector(&self, object: &str, axes: [&str; 3]) -> [f64; 3] {
        axes.map(|axis| self.value(&format!("{}_{}", object, axis)).unwrap_or(0.0))
    }

    /// Name of the first variable holding NaN or infinity
    pub fn first_non_finite(&self) -> Option<&str> {
        self.variables
            .iter()
            .find(|(_, v)| !v.is_finite())
            .map(|(k, _)| k.as_str())
    }

    /// Linear blend of two states at `fraction` of the way to `other`
    ///
    /// Events and convergence come from `other`.
    pub fn interpolate(&self, other: &SimulationState, fraction: f64) -> SimulationState {
        let lerp = |a: f64, b: f64| a + (b - a) * fraction;
        let blend = |from: &BTreeMap<String, f64>, to: &BTreeMap<String, f64>| {
            to.iter()
                .map(|(k, b)| (k.clone(), lerp(from.get(k).copied().unwrap_or(*b), *b)))
                .collect()
        };
        SimulationState {
            time: lerp(self.time, other.time),
            variables: blend(&self.variables, &other.variables),
            derivatives: blend(&self.derivatives, &other.derivatives),
            events: other.events.clone(),
            convergence: other.convergence.clone(),
            observed: other.observed,
        }
    }
}

impl SymbolTable for SimulationState {
    fn lookup(&self, name: &str) -> Option<f64> {
        match name {
            "t" => Some(self.time),
            _ => self.value(name),
        }
    }
}

/// Euclidean norm of a 3-vector
pub fn magnitude(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Euclidean distance between two points
pub fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    magnitude([a[0] - b[0], a[1] - b[1], a[2] - b[2]])
}

/// One entry of the output time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub time: f64,
    pub variables: BTreeMap<String, f64>,
    pub derivatives: BTreeMap<String, f64>,
    pub energy: Option<f64>,
    pub momentum: Option<f64>,
    pub angular_momentum: Option<f64>,
}

impl From<&SimulationState> for TimeSeriesPoint {
    fn from(state: &SimulationState) -> Self {
        Self {
            time: state.time,
            variables: state.variables.clone(),
            derivatives: state.derivatives.clone(),
            energy: state.observed.energy,
            momentum: state.observed.momentum,
            angular_momentum: state.observed.angular_momentum,
        }
    }
}

impl SymbolTable for TimeSeriesPoint {
    fn lookup(&self, name: &str) -> Option<f64> {
        match name {
            "t" => Some(self.time),
            _ => self.variables.get(name).copied(),
        }
    }
}
