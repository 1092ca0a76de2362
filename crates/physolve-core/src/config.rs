//! Engine configuration
//!
//! One [`EngineConfig`] carries the settings of every stage. It loads from
//! TOML or JSON; every section and field falls back to its default when
//! absent.

use crate::error::ConfigError;
use crate::simulation::SolverMethod;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for every stage of the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// IR builder options
    pub ir: IrOptions,

    /// Default simulation settings (problem settings override these)
    pub simulation: SimulationConfig,

    /// State monitor settings
    pub monitor: MonitorConfig,

    /// Physics validator settings
    pub physics_validation: PhysicsValidatorConfig,

    /// Result validator settings
    pub result_validation: ResultValidatorConfig,
}

impl EngineConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from JSON
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    ///
    /// `.json` files are read as JSON, anything else as TOML.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let config = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to a file as TOML
    pub fn to_file(&self, path: impl AsRef<Path>) -> crate::Result<()> {
        let content = self.to_toml_string()?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings no stage can run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.simulation.validate()?;
        if self.monitor.max_history_size == 0 {
            return Err(invalid("monitor.max_history_size", "must be at least 1"));
        }
        if self.ir.max_modules == 0 {
            return Err(invalid("ir.max_modules", "must be at least 1"));
        }
        if self.physics_validation.conservation_threshold <= 0.0 {
            return Err(invalid(
                "physics_validation.conservation_threshold",
                "must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.result_validation.min_score) {
            return Err(invalid("result_validation.min_score", "must lie in [0, 1]"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// IR builder options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IrOptions {
    /// Reuse conversions of identical inputs
    pub cache_enabled: bool,

    /// Maximum cached conversions
    pub cache_capacity: usize,

    /// Maximum number of detected modules kept
    pub max_modules: usize,

    /// Used when the problem does not specify a duration (s)
    pub default_duration: f64,

    /// Used when the problem does not specify a time step (s)
    pub default_time_step: f64,
}

impl Default for IrOptions {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_capacity: crate::ir::cache::DEFAULT_CACHE_CAPACITY,
            max_modules: 8,
            default_duration: 10.0,
            default_time_step: 0.01,
        }
    }
}

/// Numerical simulation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Integration scheme
    pub method: SolverMethod,

    /// Nominal step size (s)
    pub time_step: f64,

    /// Simulated time span (s)
    pub duration: f64,

    /// Convergence tolerance on the per-step residual
    ///
    /// The residual is the largest absolute change of any state variable
    /// over one step. It is not divided by the step size, so a variable
    /// moving at rate `r` shows a residual near `r * time_step`. Pick the
    /// tolerance below that product or a steadily moving system stops
    /// early as converged.
    pub tolerance: f64,

    /// Hard cap on steps
    pub max_iterations: usize,

    /// Clamp each step to the solver's optimal step size
    pub adaptive_step_size: bool,

    /// Reserved; the step loop is always sequential
    pub parallel_processing: bool,

    /// Yield to the async runtime every N steps
    pub yield_interval: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            method: SolverMethod::Rk4,
            time_step: 0.01,
            duration: 10.0,
            tolerance: 1e-6,
            max_iterations: 100_000,
            adaptive_step_size: false,
            parallel_processing: false,
            yield_interval: 64,
        }
    }
}

impl SimulationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: SolverMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_time_step(mut self, time_step: f64) -> Self {
        self.time_step = time_step;
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_adaptive_step_size(mut self, adaptive: bool) -> Self {
        self.adaptive_step_size = adaptive;
        self
    }

    /// Reject settings the step loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.time_step > 0.0 && self.time_step.is_finite()) {
            return Err(invalid("simulation.time_step", "must be positive and finite"));
        }
        if !(self.duration > 0.0 && self.duration.is_finite()) {
            return Err(invalid("simulation.duration", "must be positive and finite"));
        }
        if self.max_iterations == 0 {
            return Err(invalid("simulation.max_iterations", "must be at least 1"));
        }
        if self.tolerance < 0.0 {
            return Err(invalid("simulation.tolerance", "must not be negative"));
        }
        Ok(())
    }
}

/// State monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Cap on retained history, anomalies and reports (oldest evicted first)
    pub max_history_size: usize,

    /// Steps between periodic reports (0 disables them)
    pub report_interval: usize,

    /// Relative regression slope beyond which a variable is diverging
    pub divergence_threshold: f64,

    /// Fraction of local extrema beyond which a variable oscillates
    pub oscillation_threshold: f64,

    /// Average stability below which the run is unstable
    pub instability_threshold: f64,

    /// Relative energy loss per sample beyond which energy leaks
    pub energy_leak_threshold: f64,

    /// Per-step wall time budget (ms), 60 Hz by default
    pub frame_budget_ms: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_history_size: 1000,
            report_interval: 100,
            divergence_threshold: 0.1,
            oscillation_threshold: 0.3,
            instability_threshold: 0.5,
            energy_leak_threshold: 0.01,
            frame_budget_ms: 1000.0 / 60.0,
        }
    }
}

/// Physics validator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsValidatorConfig {
    pub check_conservation: bool,
    pub check_constraints: bool,
    pub check_stability: bool,
    pub check_dimensions: bool,
    pub check_causality: bool,

    /// Allowed relative drift of conserved quantities
    pub conservation_threshold: f64,

    /// Smallest acceptable step size
    pub min_step_size: f64,

    /// Midpoint deviation flagging a convergence problem
    pub convergence_tolerance: f64,

    /// Midpoint deviation flagging an oscillation problem
    pub oscillation_tolerance: f64,

    /// Unstable-point ratio failing the convergence sub-check
    pub max_convergence_failure_ratio: f64,

    /// Unstable-point ratio failing the oscillation sub-check
    pub max_oscillation_failure_ratio: f64,

    pub max_velocity: f64,
    pub max_acceleration: f64,
    pub max_position: f64,

    /// Overall score needed for success
    pub pass_score: f64,
}

impl Default for PhysicsValidatorConfig {
    fn default() -> Self {
        Self {
            check_conservation: true,
            check_constraints: true,
            check_stability: true,
            check_dimensions: true,
            check_causality: true,
            conservation_threshold: 0.01,
            min_step_size: 1e-10,
            convergence_tolerance: 1e-6,
            oscillation_tolerance: 1e-4,
            max_convergence_failure_ratio: 0.10,
            max_oscillation_failure_ratio: 0.05,
            max_velocity: 3e8,
            max_acceleration: 1e6,
            max_position: 1e6,
            pass_score: 0.8,
        }
    }
}

impl PhysicsValidatorConfig {
    /// Only the conservation audit enabled
    pub fn conservation_only() -> Self {
        Self {
            check_constraints: false,
            check_stability: false,
            check_dimensions: false,
            check_causality: false,
            ..Self::default()
        }
    }
}

/// Result validator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultValidatorConfig {
    /// Overall score needed for success
    pub min_score: f64,

    /// Minimum number of time-series points
    pub min_points: usize,

    /// Magnitudes beyond this count as absurd
    pub max_magnitude: f64,

    /// IQR multiplier for outlier fences
    pub outlier_iqr_factor: f64,

    /// Relative neighbour deviation classified as an anomaly
    pub anomaly_threshold: f64,

    /// Computation time (s) considered fully acceptable
    pub max_computation_time: f64,

    /// Memory footprint (bytes) considered fully acceptable
    pub max_memory_bytes: usize,
}

impl Default for ResultValidatorConfig {
    fn default() -> Self {
        Self {
            min_score: 0.8,
            min_points: 2,
            max_magnitude: 1e12,
            outlier_iqr_factor: 1.5,
            anomaly_threshold: 0.5,
            max_computation_time: 30.0,
            max_memory_bytes: 64 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            [simulation]
            method = "euler"
            time_step = 0.001

            [monitor]
            max_history_size = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.simulation.method, SolverMethod::Euler);
        assert_eq!(config.simulation.time_step, 0.001);
        assert_eq!(config.simulation.duration, 10.0);
        assert_eq!(config.monitor.max_history_size, 50);
        assert!(config.ir.cache_enabled);
    }

    #[test]
    fn test_partial_json() {
        let config =
            EngineConfig::from_json_str(r#"{"result_validation": {"min_score": 0.5}}"#).unwrap();
        assert_eq!(config.result_validation.min_score, 0.5);
        assert_eq!(config.simulation, SimulationConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = EngineConfig::from_toml_str("[simulation]\ntime_step = -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "simulation.time_step"));

        let err = EngineConfig::from_toml_str("[monitor]\nmax_history_size = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(
            EngineConfig::from_toml_str("[simulation\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str("{"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig {
            simulation: SimulationConfig::new()
                .with_method(SolverMethod::Adaptive)
                .with_duration(3.0),
            ..Default::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_conservation_only() {
        let config = PhysicsValidatorConfig::conservation_only();
        assert!(config.check_conservation);
        assert!(!config.check_constraints && !config.check_causality);
    }
}
