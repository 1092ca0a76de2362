//! Numerical integrators
//!
//! Every integrator advances the variables that have a rate in the
//! [`EquationSystem`] and leaves the rest to [`EquationSystem::refresh`].
//!
//! | Method   | Order | Rate evaluations per step |
//! |----------|-------|---------------------------|
//! | Euler    | 1     | 1                         |
//! | RK4      | 4     | 4                         |
//! | Adaptive | 4     | 12 (step doubling)        |

use crate::error::SimulationError;
use crate::simulation::state::SimulationState;
use crate::simulation::system::EquationSystem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Integration method, as named in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverMethod {
    Euler,
    #[default]
    Rk4,
    Adaptive,
}

impl SolverMethod {
    /// Build the integrator for this method
    ///
    /// `tolerance` bounds the local error of the adaptive method and is
    /// ignored by the fixed-step ones.
    pub fn solver(self, tolerance: f64) -> Box<dyn Solver> {
        match self {
            SolverMethod::Euler => Box::new(Euler),
            SolverMethod::Rk4 => Box::new(Rk4),
            SolverMethod::Adaptive => Box::new(Adaptive::new(Box::new(Rk4), tolerance)),
        }
    }
}

impl fmt::Display for SolverMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolverMethod::Euler => "euler",
            SolverMethod::Rk4 => "rk4",
            SolverMethod::Adaptive => "adaptive",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SolverMethod {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "euler" => Ok(SolverMethod::Euler),
            "rk4" | "runge_kutta" | "runge-kutta" | "runge_kutta_4" => Ok(SolverMethod::Rk4),
            "adaptive" => Ok(SolverMethod::Adaptive),
            other => Err(SimulationError::InvalidConfig(format!(
                "Unknown solver '{}'",
                other
            ))),
        }
    }
}

/// A single-step integrator
pub trait Solver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Advance `state` by `dt`
    ///
    /// The returned state has its derived variables, derivatives and
    /// observables refreshed.
    fn step(&self, state: &SimulationState, dt: f64, system: &EquationSystem) -> SimulationState;

    /// Whether `dt` is inside the method's stability region at `state`
    fn is_stable(&self, state: &SimulationState, dt: f64) -> bool;

    /// Largest step the method recommends at `state`
    fn optimal_step_size(&self, state: &SimulationState) -> f64;
}

/// Largest derivative magnitude, the stiffness proxy used by the step checks
fn max_rate(state: &SimulationState) -> f64 {
    state
        .derivatives
        .values()
        .fold(0.0_f64, |acc, d| acc.max(d.abs()))
}

/// `base + factor * rates` for the integrated variables only
fn offset(
    base: &BTreeMap<String, f64>,
    rates: &BTreeMap<String, f64>,
    factor: f64,
) -> BTreeMap<String, f64> {
    let mut values = base.clone();
    for (name, rate) in rates {
        let entry = values.entry(name.clone()).or_insert(0.0);
        *entry += factor * rate;
    }
    values
}

fn finish(
    state: &SimulationState,
    variables: BTreeMap<String, f64>,
    dt: f64,
    system: &EquationSystem,
) -> SimulationState {
    let mut next = SimulationState {
        time: state.time + dt,
        variables,
        convergence: state.convergence.clone(),
        ..Default::default()
    };
    system.refresh(&mut next);
    next
}

/// Forward Euler
#[derive(Debug, Clone, Copy, Default)]
pub struct Euler;

impl Euler {
    const MAX_STEP: f64 = 0.01;
}

impl Solver for Euler {
    fn name(&self) -> &'static str {
        "euler"
    }

    fn step(&self, state: &SimulationState, dt: f64, system: &EquationSystem) -> SimulationState {
        let k1 = system.rates(state.time, &state.variables);
        finish(state, offset(&state.variables, &k1, dt), dt, system)
    }

    fn is_stable(&self, state: &SimulationState, dt: f64) -> bool {
        dt * max_rate(state) < 1.0
    }

    fn optimal_step_size(&self, state: &SimulationState) -> f64 {
        let rate = max_rate(state);
        if rate > 0.0 {
            Self::MAX_STEP.min(0.5 / rate)
        } else {
            Self::MAX_STEP
        }
    }
}

/// Classical fourth-order Runge-Kutta
///
/// ```text
/// k1 = f(t, y)
/// k2 = f(t + dt/2, y + dt/2 * k1)
/// k3 = f(t + dt/2, y + dt/2 * k2)
/// k4 = f(t + dt, y + dt * k3)
/// y' = y + dt/6 * (k1 + 2 k2 + 2 k3 + k4)
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Rk4;

impl Rk4 {
    const OPTIMAL_STEP: f64 = 0.05;
    /// Real-axis extent of the RK4 stability region
    const STABILITY_LIMIT: f64 = 2.78;
}

impl Solver for Rk4 {
    fn name(&self) -> &'static str {
        "rk4"
    }

    fn step(&self, state: &SimulationState, dt: f64, system: &EquationSystem) -> SimulationState {
        let t = state.time;
        let y = &state.variables;
        let half = dt / 2.0;

        let k1 = system.rates(t, y);
        let k2 = system.rates(t + half, &offset(y, &k1, half));
        let k3 = system.rates(t + half, &offset(y, &k2, half));
        let k4 = system.rates(t + dt, &offset(y, &k3, dt));

        let combined: BTreeMap<String, f64> = k1
            .iter()
            .map(|(name, a)| {
                let b = k2.get(name).copied().unwrap_or(0.0);
                let c = k3.get(name).copied().unwrap_or(0.0);
                let d = k4.get(name).copied().unwrap_or(0.0);
                (name.clone(), (a + 2.0 * b + 2.0 * c + d) / 6.0)
            })
            .collect();

        finish(state, offset(y, &combined, dt), dt, system)
    }

    fn is_stable(&self, state: &SimulationState, dt: f64) -> bool {
        dt * max_rate(state) < Self::STABILITY_LIMIT
    }

    fn optimal_step_size(&self, _state: &SimulationState) -> f64 {
        Self::OPTIMAL_STEP
    }
}

/// Step-doubling error control around a fixed-step method
///
/// Each step is taken once at `dt` and twice at `dt / 2`. When the two
/// results differ by more than the tolerance the interval is split and
/// retried, down to [`Adaptive::MAX_DEPTH`] halvings.
pub struct Adaptive {
    base: Box<dyn Solver>,
    tolerance: f64,
}

impl Adaptive {
    pub const MAX_DEPTH: u32 = 8;

    pub fn new(base: Box<dyn Solver>, tolerance: f64) -> Self {
        Self {
            base,
            tolerance: tolerance.abs().max(f64::EPSILON),
        }
    }

    fn step_within(
        &self,
        state: &SimulationState,
        dt: f64,
        system: &EquationSystem,
        depth: u32,
    ) -> SimulationState {
        let full = self.base.step(state, dt, system);
        let midpoint = self.base.step(state, dt / 2.0, system);
        let refined = self.base.step(&midpoint, dt / 2.0, system);

        let error = refined
            .derivatives
            .keys()
            .filter_map(|name| Some((refined.value(name)? - full.value(name)?).abs()))
            .fold(0.0_f64, f64::max);

        if error <= self.tolerance || depth >= Self::MAX_DEPTH {
            if depth >= Self::MAX_DEPTH && error > self.tolerance {
                tracing::debug!(
                    "Local error {:.3e} above tolerance at t = {:.6} after {} halvings",
                    error,
                    state.time,
                    depth
                );
            }
            return refined;
        }

        let midpoint = self.step_within(state, dt / 2.0, system, depth + 1);
        self.step_within(&midpoint, dt / 2.0, system, depth + 1)
    }
}

impl Solver for Adaptive {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn step(&self, state: &SimulationState, dt: f64, system: &EquationSystem) -> SimulationState {
        self.step_within(state, dt, system, 0)
    }

    fn is_stable(&self, state: &SimulationState, dt: f64) -> bool {
        self.base.is_stable(state, dt)
    }

    fn optimal_step_size(&self, state: &SimulationState) -> f64 {
        self.base.optimal_step_size(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::model::{ModuleSpec, ParameterSpec, ProblemModel, SystemSpec};
    use crate::ir::{IrBuilder, SystemIr};

    async fn decay_ir() -> SystemIr {
        let model = ProblemModel {
            system: Some(SystemSpec {
                system_type: "custom".to_string(),
                parameters: vec![ParameterSpec::given("y", 1.0, "")],
                modules: vec![ModuleSpec {
                    id: "decay".to_string(),
                    equations: vec!["dy/dt = -y".to_string()],
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        };
        IrBuilder::new().convert(&model).await.ir.unwrap()
    }

    fn integrate(solver: &dyn Solver, ir: &SystemIr, dt: f64, steps: usize) -> f64 {
        let system = EquationSystem::compile(ir);
        let mut state = system.initial_state(ir);
        for _ in 0..steps {
            state = solver.step(&state, dt, &system);
        }
        state.value("y").unwrap()
    }

    #[tokio::test]
    async fn test_rk4_more_accurate_than_euler() {
        let ir = decay_ir().await;
        let exact = (-1.0_f64).exp();

        let euler = integrate(&Euler, &ir, 0.1, 10);
        let rk4 = integrate(&Rk4, &ir, 0.1, 10);

        assert!((euler - exact).abs() > 1e-2);
        assert!((rk4 - exact).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_adaptive_meets_tolerance() {
        let ir = decay_ir().await;
        let exact = (-1.0_f64).exp();
        let adaptive = Adaptive::new(Box::new(Euler), 1e-6);

        let y = integrate(&adaptive, &ir, 0.5, 2);
        assert!((y - exact).abs() < 1e-3, "got {}", y);
    }

    #[tokio::test]
    async fn test_step_advances_time_and_refreshes() {
        let ir = decay_ir().await;
        let system = EquationSystem::compile(&ir);
        let state = system.initial_state(&ir);
        let next = Rk4.step(&state, 0.1, &system);

        assert!((next.time - 0.1).abs() < 1e-15);
        let y = next.value("y").unwrap();
        assert_eq!(next.derivative("y"), Some(-y));
    }

    #[test]
    fn test_step_size_checks() {
        let mut state = SimulationState::new(0.0);
        state.derivatives.insert("x".to_string(), 200.0);

        assert!(!Euler.is_stable(&state, 0.01));
        assert!(Euler.is_stable(&state, 0.001));
        assert_eq!(Euler.optimal_step_size(&state), 0.0025);
        assert!(Rk4.is_stable(&state, 0.01));
        assert_eq!(Rk4.optimal_step_size(&state), 0.05);
        assert_eq!(Euler.optimal_step_size(&SimulationState::new(0.0)), 0.01);
    }

    #[test]
    fn test_method_names() {
        assert_eq!("RK4".parse::<SolverMethod>().unwrap(), SolverMethod::Rk4);
        assert_eq!(
            "runge-kutta".parse::<SolverMethod>().unwrap(),
            SolverMethod::Rk4
        );
        assert_eq!("euler".parse::<SolverMethod>().unwrap(), SolverMethod::Euler);
        assert!("verlet".parse::<SolverMethod>().is_err());
        assert_eq!(SolverMethod::Adaptive.to_string(), "adaptive");
        assert_eq!(SolverMethod::Adaptive.solver(1e-6).name(), "adaptive");
    }
}
