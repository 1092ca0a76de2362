//! Intermediate representation types
//!
//! A [`SystemIr`] is the solver-agnostic description of a physical system:
//! the selected modules, the merged parameter set, constraints, conservation
//! laws, and the hints the simulator uses to run it.

use crate::config::SimulationConfig;
use crate::dimension::Dimension;
use crate::ir::library::ModuleKind;
use crate::simulation::SolverMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// A value with its unit and dimension, always stored in SI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalQuantity {
    pub value: f64,
    /// SI unit string
    pub unit: String,
    /// `None` when the unit could not be resolved
    pub dimension: Option<Dimension>,
}

impl PhysicalQuantity {
    pub fn new(value: f64, unit: impl Into<String>, dimension: Option<Dimension>) -> Self {
        Self {
            value,
            unit: unit.into(),
            dimension,
        }
    }

    pub fn dimensionless(value: f64) -> Self {
        Self::new(value, "1", Some(Dimension::DIMENSIONLESS))
    }
}

/// How a parameter participates in the problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterRole {
    /// Supplied by the problem
    Given,
    /// To be solved for
    Unknown,
    /// A physical constant
    Constant,
    /// Computed from other parameters
    Derived,
}

impl fmt::Display for ParameterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParameterRole::Given => "given",
            ParameterRole::Unknown => "unknown",
            ParameterRole::Constant => "constant",
            ParameterRole::Derived => "derived",
        };
        write!(f, "{}", s)
    }
}

/// Where a parameter's value came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "from", content = "id", rename_all = "snake_case")]
pub enum ParameterSource {
    Problem,
    /// Default of the named module template
    Module(String),
    /// Constants table
    ConstantsTable,
    /// Synthesized from an object declaration
    Object(String),
}

/// A named physical quantity in the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub symbol: String,
    pub quantity: PhysicalQuantity,
    pub role: ParameterRole,
    pub description: String,
    /// Symbols this parameter is computed from
    pub dependencies: Vec<String>,
    pub source: ParameterSource,
}

impl Parameter {
    pub fn value(&self) -> f64 {
        self.quantity.value
    }

    /// True when the value should never be overwritten by the simulator
    pub fn is_fixed(&self) -> bool {
        matches!(self.role, ParameterRole::Given | ParameterRole::Constant)
    }
}

/// Algebraic or differential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquationKind {
    Algebraic,
    Differential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linearity {
    Linear,
    Nonlinear,
    Unknown,
}

/// A governing equation in string form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equation {
    pub id: String,
    pub kind: EquationKind,
    pub expression: String,
    pub variables: Vec<String>,
    /// Differential order, 0 for algebraic equations
    pub order: u32,
    pub linearity: Linearity,
}

/// Conservation laws a module can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConservationLaw {
    Energy,
    Momentum,
    AngularMomentum,
    Charge,
    Mass,
}

impl ConservationLaw {
    /// Parse a loosely written law name
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "energy" | "mechanical_energy" | "total_energy" => Some(ConservationLaw::Energy),
            "momentum" | "linear_momentum" => Some(ConservationLaw::Momentum),
            "angular_momentum" => Some(ConservationLaw::AngularMomentum),
            "charge" | "electric_charge" => Some(ConservationLaw::Charge),
            "mass" => Some(ConservationLaw::Mass),
            _ => None,
        }
    }
}

impl fmt::Display for ConservationLaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConservationLaw::Energy => "energy",
            ConservationLaw::Momentum => "momentum",
            ConservationLaw::AngularMomentum => "angular_momentum",
            ConservationLaw::Charge => "charge",
            ConservationLaw::Mass => "mass",
        };
        write!(f, "{}", s)
    }
}

/// Symmetries inferred from the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symmetry {
    TimeTranslation,
    SpatialTranslation,
    Rotational,
    Reflection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Basic,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalBehavior {
    Static,
    Dynamic,
    Periodic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicalScale {
    Atomic,
    Macroscopic,
    Astronomical,
}

/// Spatial, temporal and scale characteristics of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDescriptor {
    pub spatial_dimensions: u8,
    pub temporal: TemporalBehavior,
    pub scale: PhysicalScale,
}

/// Expressions for the conserved quantities a module can report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observables {
    pub energy: Option<String>,
    pub momentum: Option<String>,
    pub angular_momentum: Option<String>,
}

impl Observables {
    /// Fill each missing slot from `other`
    pub fn fill_from(&mut self, other: &Observables) {
        if self.energy.is_none() {
            self.energy = other.energy.clone();
        }
        if self.momentum.is_none() {
            self.momentum = other.momentum.clone();
        }
        if self.angular_momentum.is_none() {
            self.angular_momentum = other.angular_momentum.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Limits the state space; may end the run when terminal
    Boundary,
    /// Must hold throughout the run
    #[default]
    Physical,
    /// Applied once when the state is initialized
    Initial,
}

/// A constraint expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub id: String,
    pub kind: ConstraintKind,
    pub expression: String,
    pub tolerance: f64,
    pub terminal: bool,
    pub description: String,
    /// Module id, or `problem` for declared constraints
    pub source: String,
}

/// A self-contained physics building block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: String,
    pub kind: ModuleKind,
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub equations: Vec<Equation>,
    /// Ids of modules that must run before this one
    pub dependencies: Vec<String>,
    pub outputs: Vec<String>,
    pub conservation_laws: Vec<ConservationLaw>,
    pub assumptions: Vec<String>,
    pub limitations: Vec<String>,
    pub complexity: ComplexityTier,
    pub domain: DomainDescriptor,
    pub observables: Observables,
    pub constraints: Vec<Constraint>,
    /// Detection relevance, 1.0 for declared or structural modules
    pub relevance: f64,
}

/// A physical body with kinematic state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrObject {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub mass: f64,
    pub radius: f64,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    pub fixed: bool,
    pub properties: BTreeMap<String, f64>,
}

impl IrObject {
    /// Names of the integrated state variables for this object
    pub fn state_variables(&self) -> [String; 6] {
        ["x", "y", "z", "vx", "vy", "vz"].map(|axis| format!("{}_{}", self.id, axis))
    }
}

/// Ambient conditions in SI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub gravity: f64,
    pub air_resistance: f64,
    pub temperature: f64,
    pub pressure: f64,
    pub medium: String,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            gravity: 9.806_65,
            air_resistance: 0.0,
            temperature: 293.15,
            pressure: 101_325.0,
            medium: "air".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrMetadata {
    pub id: Uuid,
    pub problem_id: Option<String>,
    pub title: String,
    pub description: String,
    pub domain: String,
    pub difficulty: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// blake3 of the canonical problem model
    pub source_hash: String,
}

/// The physical content of the IR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrSystem {
    pub system_type: String,
    /// In execution order
    pub modules: Vec<Module>,
    pub objects: Vec<IrObject>,
    pub parameters: Vec<Parameter>,
    pub constraints: Vec<Constraint>,
    pub conservation_laws: Vec<ConservationLaw>,
    pub symmetries: Vec<Symmetry>,
    pub environment: Environment,
    pub boundary_conditions: Vec<Constraint>,
    /// Initial values of integrated variables
    pub initial_conditions: BTreeMap<String, f64>,
    pub observables: Observables,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub variables: Vec<String>,
    pub plots: Vec<String>,
}

/// Hints for the simulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationHints {
    pub execution_order: Vec<String>,
    /// Modules with no mutual dependencies, grouped by depth
    pub parallel_groups: Vec<Vec<String>>,
    pub suggested_method: SolverMethod,
    pub suggested_time_step: f64,
    pub state_variables: Vec<String>,
    pub derived_variables: Vec<String>,
    pub has_nonlinear_equations: bool,
}

/// Outcome of the builder's own consistency checks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub dimensionally_consistent: bool,
    pub dimension_mismatches: Vec<String>,
    /// Unknowns no equation determines
    pub unresolved_unknowns: Vec<String>,
}

/// Human oriented reading of the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsInterpretation {
    pub domains: Vec<String>,
    pub principles: Vec<String>,
    pub assumptions: Vec<String>,
    pub limitations: Vec<String>,
    pub complexity: ComplexityTier,
    /// Module id to relevance score, for every candidate that was scored
    pub module_relevance: BTreeMap<String, f64>,
    pub summary: String,
}

/// The intermediate representation of a physics problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemIr {
    pub metadata: IrMetadata,
    pub system: IrSystem,
    pub simulation: SimulationConfig,
    pub output: OutputConfig,
    pub optimization: OptimizationHints,
    pub validation: ValidationSummary,
    pub physics: PhysicsInterpretation,
}

impl SystemIr {
    /// Look up a merged parameter
    pub fn parameter(&self, symbol: &str) -> Option<&Parameter> {
        self.system.parameters.iter().find(|p| p.symbol == symbol)
    }

    pub fn module(&self, id: &str) -> Option<&Module> {
        self.system.modules.iter().find(|m| m.id == id)
    }

    /// Dimensions of every parameter with a resolved unit
    pub fn symbol_dimensions(&self) -> BTreeMap<String, Dimension> {
        let mut dims: BTreeMap<String, Dimension> = self
            .system
            .parameters
            .iter()
            .filter_map(|p| p.quantity.dimension.map(|d| (p.symbol.clone(), d)))
            .collect();
        dims.entry("t".to_string()).or_insert(Dimension::TIME);
        for object in &self.system.objects {
            let [x, y, z, vx, vy, vz] = object.state_variables();
            for name in [x, y, z] {
                dims.insert(name, Dimension::LENGTH);
            }
            for name in [vx, vy, vz] {
                dims.insert(name, Dimension::VELOCITY);
            }
        }
        dims
    }

    /// Whether the IR declares a given conservation law
    pub fn conserves(&self, law: ConservationLaw) -> bool {
        self.system.conservation_laws.contains(&law)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conservation_law_names() {
        assert_eq!(
            ConservationLaw::from_name("Angular Momentum"),
            Some(ConservationLaw::AngularMomentum)
        );
        assert_eq!(ConservationLaw::from_name("energy"), Some(ConservationLaw::Energy));
        assert_eq!(ConservationLaw::from_name("entropy"), None);
    }

    #[test]
    fn test_object_state_variables() {
        let object = IrObject {
            id: "ball".to_string(),
            name: "Ball".to_string(),
            kind: "sphere".to_string(),
            mass: 1.0,
            radius: 0.1,
            position: [0.0; 3],
            velocity: [0.0; 3],
            fixed: false,
            properties: BTreeMap::new(),
        };
        let vars = object.state_variables();
        assert_eq!(vars[0], "ball_x");
        assert_eq!(vars[4], "ball_vy");
    }

    #[test]
    fn test_observables_fill() {
        let mut a = Observables {
            energy: Some("E".into()),
            ..Default::default()
        };
        let b = Observables {
            energy: Some("other".into()),
            momentum: Some("p".into()),
            angular_momentum: None,
        };
        a.fill_from(&b);
        assert_eq!(a.energy.as_deref(), Some("E"));
        assert_eq!(a.momentum.as_deref(), Some("p"));
    }
}
