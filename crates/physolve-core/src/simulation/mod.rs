//! Numerical simulation
//!
//! The [`Simulator`] integrates a [`SystemIr`] through time. Each step is
//! fully finished before the next begins: solver, terminal-boundary check,
//! event detection, monitoring, convergence check, snapshot.
//!
//! # Example
//!
//! ```no_run
//! use physolve_core::ir::{IrBuilder, model::ProblemModel};
//! use physolve_core::simulation::Simulator;
//!
//! # async fn demo(model: ProblemModel) {
//! let ir = IrBuilder::new().convert(&model).await.ir.unwrap();
//! let result = Simulator::for_ir(&ir).run(&ir).await;
//! println!("{} steps, final t = {}", result.metrics.total_steps, result.final_state.time);
//! # }
//! ```

pub mod solver;
pub mod state;
pub mod system;

pub use solver::{Adaptive, Euler, Rk4, Solver, SolverMethod};
pub use state::{ConvergenceInfo, Observed, SimulationState, TimeSeriesPoint};
pub use system::EquationSystem;

use crate::config::{MonitorConfig, SimulationConfig};
use crate::error::SimulationError;
use crate::events::{detectors::boundary_event, CompositeDetector, Event};
use crate::expr::Comparison;
use crate::ir::{Constraint, ConstraintKind, SystemIr};
use crate::monitor::{MonitorReport, StateMonitor};
use crate::stats::{conservation_ratio, mean, smoothness};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Steps below this size abort the run
pub const MIN_STEP_SIZE: f64 = 1e-10;

/// Why the step loop stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum TerminationReason {
    Completed,
    MaxIterations,
    Converged,
    /// A terminal boundary was crossed; carries the constraint id
    BoundaryReached(String),
    StepSizeCollapse,
    NonFiniteState,
    InvalidConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationMetrics {
    pub total_steps: u64,
    pub average_step_size: f64,
    pub min_step_size: f64,
    pub max_step_size: f64,
    pub event_count: usize,
    /// Steps at which the convergence check passed
    pub convergence_iterations: u64,
    pub energy_conservation: f64,
    pub momentum_conservation: f64,
    /// Mean smoothness of the integrated variables, in `(0, 1]`
    pub stability_score: f64,
    pub termination: TerminationReason,
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self {
            total_steps: 0,
            average_step_size: 0.0,
            min_step_size: 0.0,
            max_step_size: 0.0,
            event_count: 0,
            convergence_iterations: 0,
            energy_conservation: 1.0,
            momentum_conservation: 1.0,
            stability_score: 1.0,
            termination: TerminationReason::Completed,
        }
    }
}

/// Everything a run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub success: bool,
    pub method: SolverMethod,
    pub time_series: Vec<TimeSeriesPoint>,
    pub events: Vec<Event>,
    pub final_state: SimulationState,
    pub metrics: SimulationMetrics,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Wall-clock seconds
    pub computation_time: f64,
    pub monitor_report: Option<MonitorReport>,
}

impl SimulationResult {
    /// Values of one variable across the time series
    pub fn series(&self, variable: &str) -> Vec<f64> {
        self.time_series
            .iter()
            .filter_map(|p| p.variables.get(variable).copied())
            .collect()
    }
}

/// Step sizes taken, excluding a final partial step cut short by a boundary
#[derive(Default)]
struct StepSizes {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl StepSizes {
    fn record(&mut self, dt: f64) {
        if self.count == 0 {
            self.min = dt;
            self.max = dt;
        } else {
            self.min = self.min.min(dt);
            self.max = self.max.max(dt);
        }
        self.count += 1;
        self.sum += dt;
    }
}

pub struct Simulator {
    config: SimulationConfig,
    solver: Box<dyn Solver>,
    detector: CompositeDetector,
    monitor: StateMonitor,
}

impl Simulator {
    /// A simulator with the standard detectors and a default monitor
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            solver: config.method.solver(config.tolerance),
            config,
            detector: CompositeDetector::standard(),
            monitor: StateMonitor::new(MonitorConfig::default()),
        }
    }

    /// A simulator using the settings the IR carries
    pub fn for_ir(ir: &SystemIr) -> Self {
        Self::new(ir.simulation.clone())
    }

    pub fn with_monitor_config(mut self, config: MonitorConfig) -> Self {
        self.monitor = StateMonitor::new(config);
        self
    }

    pub fn with_detector(mut self, detector: CompositeDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn detector_mut(&mut self) -> &mut CompositeDetector {
        &mut self.detector
    }

    pub fn monitor(&self) -> &StateMonitor {
        &self.monitor
    }

    /// Integrate the IR from `t = 0`
    ///
    /// Never fails: problems are reported in `errors` (run unusable) or
    /// `warnings` (run usable), and the time series collected so far is
    /// always returned.
    pub async fn run(&mut self, ir: &SystemIr) -> SimulationResult {
        let started = Instant::now();
        let config = self.config.clone();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if let Err(e) = config.validate() {
            tracing::warn!("Refusing to simulate: {}", e);
            return SimulationResult {
                success: false,
                method: config.method,
                time_series: Vec::new(),
                events: Vec::new(),
                final_state: SimulationState::default(),
                metrics: SimulationMetrics {
                    termination: TerminationReason::InvalidConfig,
                    ..Default::default()
                },
                errors: vec![e.to_string()],
                warnings,
                computation_time: started.elapsed().as_secs_f64(),
                monitor_report: None,
            };
        }
        if config.parallel_processing {
            tracing::debug!("parallel_processing is reserved; stepping sequentially");
        }

        let system = EquationSystem::compile(ir);
        warnings.extend(system.warnings().iter().cloned());
        self.monitor.reset();

        let terminal = terminal_boundaries(ir, &mut warnings);
        let adaptive = config.adaptive_step_size || config.method == SolverMethod::Adaptive;

        let mut state = system.initial_state(ir);
        state.convergence.tolerance = config.tolerance;
        let mut time_series = vec![TimeSeriesPoint::from(&state)];
        let mut events: Vec<Event> = Vec::new();
        let mut sizes = StepSizes::default();
        let mut steps: usize = 0;
        let mut converged_steps: u64 = 0;
        let mut previous_residual: Option<f64> = None;
        let end = config.duration * (1.0 - 1e-12);

        tracing::info!(
            "Simulating {} state variable(s) with {} for {} s (dt = {})",
            system.state_variables().len(),
            self.solver.name(),
            config.duration,
            config.time_step
        );

        let termination = loop {
            // A remainder shorter than the smallest step is accumulated round-off
            let remaining = config.duration - state.time;
            if state.time >= end || remaining < MIN_STEP_SIZE {
                break TerminationReason::Completed;
            }
            if steps >= config.max_iterations {
                warnings.push(format!(
                    "Stopped after {} iterations at t = {:.6}",
                    steps, state.time
                ));
                break TerminationReason::MaxIterations;
            }

            let step_started = Instant::now();
            let mut dt = config.time_step;
            if adaptive {
                dt = dt.min(self.solver.optimal_step_size(&state));
            }
            dt = dt.min(remaining);

            while !self.solver.is_stable(&state, dt) && dt >= MIN_STEP_SIZE {
                dt /= 2.0;
            }
            if dt < MIN_STEP_SIZE {
                let e = SimulationError::StepSizeCollapse {
                    time: state.time,
                    dt,
                };
                tracing::warn!("{}", e);
                warnings.push(e.to_string());
                break TerminationReason::StepSizeCollapse;
            }

            let mut next = self.solver.step(&state, dt, &system);
            steps += 1;
            warnings.extend(system.take_failures());

            if let Some(variable) = next.first_non_finite() {
                let e = SimulationError::NonFiniteState {
                    time: next.time,
                    variable: variable.to_string(),
                };
                tracing::warn!("{}", e);
                errors.push(e.to_string());
                break TerminationReason::NonFiniteState;
            }

            let crossing = earliest_crossing(&terminal, &state, &next);
            if let Some((_, fraction)) = crossing {
                next = state.interpolate(&next, fraction);
                system.refresh(&mut next);
            } else {
                sizes.record(dt);
            }

            let mut step_events = self.detector.detect(&state, &next, ir);
            if let Some((constraint, _)) = crossing {
                step_events.push(boundary_event(constraint, next.time));
            }
            next.events = step_events;
            events.extend(next.events.iter().cloned());

            let residual = next
                .variables
                .iter()
                .filter(|(name, _)| name.as_str() != "t")
                .map(|(name, value)| (value - state.value(name).unwrap_or(*value)).abs())
                .fold(0.0_f64, f64::max);
            next.convergence = ConvergenceInfo {
                is_converged: residual < config.tolerance,
                residual,
                tolerance: config.tolerance,
                convergence_rate: match previous_residual {
                    Some(prev) if prev > 0.0 => residual / prev,
                    _ => 0.0,
                },
            };
            previous_residual = Some(residual);
            if next.convergence.is_converged {
                converged_steps += 1;
            }

            self.monitor
                .update_with_elapsed(&next, step_started.elapsed());
            time_series.push(TimeSeriesPoint::from(&next));
            state = next;

            if let Some((constraint, _)) = crossing {
                tracing::info!(
                    "Boundary '{}' reached at t = {:.6}",
                    constraint.id,
                    state.time
                );
                break TerminationReason::BoundaryReached(constraint.id.clone());
            }
            if state.convergence.is_converged {
                tracing::info!("Converged at t = {:.6}", state.time);
                break TerminationReason::Converged;
            }
            if config.yield_interval > 0 && steps % config.yield_interval == 0 {
                tokio::task::yield_now().await;
            }
        };

        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        let metrics = SimulationMetrics {
            total_steps: steps as u64,
            average_step_size: if sizes.count == 0 {
                0.0
            } else {
                sizes.sum / sizes.count as f64
            },
            min_step_size: sizes.min,
            max_step_size: sizes.max,
            event_count: events.len(),
            convergence_iterations: converged_steps,
            energy_conservation: conserved(&time_series, |p| p.energy),
            momentum_conservation: conserved(&time_series, |p| p.momentum),
            stability_score: stability_score(&time_series, &system),
            termination: termination.clone(),
        };
        let computation_time = started.elapsed().as_secs_f64();

        tracing::info!(
            "Simulation finished ({:?}): {} steps to t = {:.6} in {:.3} s",
            termination,
            steps,
            state.time,
            computation_time
        );

        SimulationResult {
            success: errors.is_empty(),
            method: config.method,
            time_series,
            events,
            final_state: state,
            metrics,
            errors,
            warnings,
            computation_time,
            monitor_report: Some(self.monitor.report()),
        }
    }
}

/// Terminal boundary constraints with their parsed comparisons
fn terminal_boundaries<'a>(
    ir: &'a SystemIr,
    warnings: &mut Vec<String>,
) -> Vec<(&'a Constraint, Comparison)> {
    ir.system
        .boundary_conditions
        .iter()
        .chain(ir.system.constraints.iter())
        .filter(|c| c.terminal && c.kind == ConstraintKind::Boundary)
        .filter_map(|c| match Comparison::parse(&c.expression) {
            Ok(comparison) => Some((c, comparison)),
            Err(e) => {
                warnings.push(format!("Terminal boundary '{}' ignored: {}", c.id, e));
                None
            }
        })
        .collect()
}

/// First terminal boundary left during the step, with the step fraction
/// at which its margin reaches zero
fn earliest_crossing<'a>(
    terminal: &[(&'a Constraint, Comparison)],
    old: &SimulationState,
    new: &SimulationState,
) -> Option<(&'a Constraint, f64)> {
    terminal
        .iter()
        .filter_map(|(constraint, comparison)| {
            let before = comparison.margin(old).ok()?;
            let after = comparison.margin(new).ok()?;
            if before < 0.0 || after >= 0.0 {
                return None;
            }
            Some((*constraint, (before / (before - after)).clamp(0.0, 1.0)))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

fn conserved(series: &[TimeSeriesPoint], quantity: impl Fn(&TimeSeriesPoint) -> Option<f64>) -> f64 {
    let values: Vec<f64> = series.iter().filter_map(quantity).collect();
    match (values.first(), values.last()) {
        (Some(first), Some(last)) => conservation_ratio(*first, *last),
        _ => 1.0,
    }
}

fn stability_score(series: &[TimeSeriesPoint], system: &EquationSystem) -> f64 {
    let scores: Vec<f64> = system
        .state_variables()
        .into_iter()
        .map(|name| {
            let values: Vec<f64> = series
                .iter()
                .filter_map(|p| p.variables.get(name).copied())
                .collect();
            smoothness(&values)
        })
        .collect();
    if scores.is_empty() {
        1.0
    } else {
        mean(&scores)
    }
}
