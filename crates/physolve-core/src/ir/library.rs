//! Physics module library
//!
//! Every detectable module is described by a static [`ModuleTemplate`]:
//! the symbols it owns with SI defaults, its governing equations, the
//! conserved quantities it can report and the vocabulary used to detect it.
//! [`ModuleTemplate::instantiate`] turns a template into a concrete
//! [`Module`] using whatever values the problem already supplies.
//!
//! Three kinds have no template: [`ModuleKind::ParticleKinematics`] is built
//! from declared objects, [`ModuleKind::Generic`] is the fallback when nothing
//! matches, and [`ModuleKind::Custom`] comes from explicit declarations.

use crate::dimension::{constant, resolve_unit};
use crate::expr::{EquationTarget, ParsedEquation};
use crate::ir::types::{
    ComplexityTier, ConservationLaw, Constraint, ConstraintKind, DomainDescriptor, Equation,
    EquationKind, IrObject, Linearity, Module, Observables, Parameter, ParameterRole,
    ParameterSource, PhysicalQuantity, PhysicalScale, TemporalBehavior,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Every module the engine knows how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    // Kinematics
    UniformMotion,
    UniformAcceleration,
    FreeFall,
    ProjectileMotion,
    CircularMotion,
    RelativeMotion,
    ParticleKinematics,
    // Dynamics
    NewtonSecondLaw,
    Friction,
    InclinedPlane,
    SpringOscillator,
    DampedOscillator,
    SimplePendulum,
    UniversalGravitation,
    OrbitalMotion,
    Collision,
    RotationalDynamics,
    SimpleMachines,
    DragForce,
    // Energy
    WorkEnergy,
    EnergyConservation,
    Power,
    Impulse,
    // Electromagnetism
    Electrostatics,
    ElectricCircuit,
    RcCircuit,
    Magnetism,
    ElectromagneticInduction,
    // Optics
    GeometricOptics,
    Refraction,
    // Waves
    WaveMotion,
    Acoustics,
    DopplerEffect,
    StandingWaves,
    // Fluids
    Pressure,
    Buoyancy,
    FluidFlow,
    // Thermal
    HeatTransfer,
    IdealGas,
    Thermodynamics,
    PhaseChange,
    ThermalExpansion,
    // Modern
    PhotoelectricEffect,
    SpecialRelativity,
    RadioactiveDecay,
    DeBroglie,
    // Structural
    Generic,
    Custom,
}

/// Broad physics domains, in execution priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicsDomain {
    Kinematics,
    Dynamics,
    Energy,
    Electromagnetism,
    Optics,
    Waves,
    Fluids,
    Thermal,
    Modern,
    General,
}

impl PhysicsDomain {
    /// Lower runs first among otherwise unordered modules
    pub fn priority(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for PhysicsDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhysicsDomain::Kinematics => "kinematics",
            PhysicsDomain::Dynamics => "dynamics",
            PhysicsDomain::Energy => "energy",
            PhysicsDomain::Electromagnetism => "electromagnetism",
            PhysicsDomain::Optics => "optics",
            PhysicsDomain::Waves => "waves",
            PhysicsDomain::Fluids => "fluids",
            PhysicsDomain::Thermal => "thermal",
            PhysicsDomain::Modern => "modern",
            PhysicsDomain::General => "general",
        };
        write!(f, "{}", s)
    }
}

impl ModuleKind {
    /// The static template, if this kind has one
    pub fn template(self) -> Option<&'static ModuleTemplate> {
        TEMPLATES.iter().find(|t| t.kind == self)
    }

    pub fn domain(self) -> PhysicsDomain {
        match self {
            ModuleKind::ParticleKinematics => PhysicsDomain::Kinematics,
            ModuleKind::Generic | ModuleKind::Custom => PhysicsDomain::General,
            other => other
                .template()
                .map(|t| t.domain_group)
                .unwrap_or(PhysicsDomain::General),
        }
    }

    /// Snake-case identifier used as the module id
    pub fn id(self) -> &'static str {
        match self {
            ModuleKind::ParticleKinematics => "particle_kinematics",
            ModuleKind::Generic => "generic",
            ModuleKind::Custom => "custom",
            other => other.template().map(|t| t.id).unwrap_or("custom"),
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// A parameter owned by a template
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamTemplate {
    pub symbol: &'static str,
    /// Default value in `unit`
    pub default: f64,
    pub unit: &'static str,
    pub role: ParameterRole,
    pub description: &'static str,
}

const fn param(
    symbol: &'static str,
    default: f64,
    unit: &'static str,
    role: ParameterRole,
    description: &'static str,
) -> ParamTemplate {
    ParamTemplate {
        symbol,
        default,
        unit,
        role,
        description,
    }
}

use ParameterRole::{Constant, Derived, Given, Unknown};

/// Static description of a detectable module
#[derive(Debug, Clone, Copy)]
pub struct ModuleTemplate {
    pub kind: ModuleKind,
    pub id: &'static str,
    pub name: &'static str,
    pub domain_group: PhysicsDomain,
    /// Normalized system type names that match exactly
    pub system_types: &'static [&'static str],
    /// Word stems matched against the problem text
    pub keywords: &'static [&'static str],
    /// At least one of these stems must be present (when non-empty)
    pub required_keywords: &'static [&'static str],
    pub parameters: &'static [ParamTemplate],
    pub equations: &'static [&'static str],
    pub conservation_laws: &'static [ConservationLaw],
    pub dependencies: &'static [ModuleKind],
    pub energy: Option<&'static str>,
    pub momentum: Option<&'static str>,
    pub angular_momentum: Option<&'static str>,
    /// Terminal boundary constraints as (id, expression)
    pub boundaries: &'static [(&'static str, &'static str)],
    pub assumptions: &'static [&'static str],
    pub limitations: &'static [&'static str],
    pub complexity: ComplexityTier,
    pub domain: DomainDescriptor,
    /// Minimum relevance for selection
    pub threshold: f64,
}

const DYNAMIC_1D: DomainDescriptor = DomainDescriptor {
    spatial_dimensions: 1,
    temporal: TemporalBehavior::Dynamic,
    scale: PhysicalScale::Macroscopic,
};
const DYNAMIC_2D: DomainDescriptor = DomainDescriptor {
    spatial_dimensions: 2,
    temporal: TemporalBehavior::Dynamic,
    scale: PhysicalScale::Macroscopic,
};
const PERIODIC_1D: DomainDescriptor = DomainDescriptor {
    spatial_dimensions: 1,
    temporal: TemporalBehavior::Periodic,
    scale: PhysicalScale::Macroscopic,
};
const STATIC_0D: DomainDescriptor = DomainDescriptor {
    spatial_dimensions: 0,
    temporal: TemporalBehavior::Static,
    scale: PhysicalScale::Macroscopic,
};
const ATOMIC: DomainDescriptor = DomainDescriptor {
    spatial_dimensions: 0,
    temporal: TemporalBehavior::Static,
    scale: PhysicalScale::Atomic,
};
const ASTRONOMICAL_2D: DomainDescriptor = DomainDescriptor {
    spatial_dimensions: 2,
    temporal: TemporalBehavior::Periodic,
    scale: PhysicalScale::Astronomical,
};

pub const DEFAULT_THRESHOLD: f64 = 0.7;

const BASE: ModuleTemplate = ModuleTemplate {
    kind: ModuleKind::Generic,
    id: "generic",
    name: "Generic",
    domain_group: PhysicsDomain::General,
    system_types: &[],
    keywords: &[],
    required_keywords: &[],
    parameters: &[],
    equations: &[],
    conservation_laws: &[],
    dependencies: &[],
    energy: None,
    momentum: None,
    angular_momentum: None,
    boundaries: &[],
    assumptions: &[],
    limitations: &[],
    complexity: ComplexityTier::Basic,
    domain: STATIC_0D,
    threshold: DEFAULT_THRESHOLD,
};

/// The template library
pub static TEMPLATES: &[ModuleTemplate] = &[
    // ---- Kinematics ----
    ModuleTemplate {
        kind: ModuleKind::UniformMotion,
        id: "uniform_motion",
        name: "Uniform Motion",
        domain_group: PhysicsDomain::Kinematics,
        system_types: &["uniform_motion", "constant_velocity", "linear_motion"],
        keywords: &["uniform", "constant", "velocity", "distance", "travel"],
        parameters: &[
            param("x", 0.0, "m", Given, "Position"),
            param("v", 1.0, "m/s", Given, "Constant velocity"),
            param("t", 0.0, "s", Unknown, "Elapsed time"),
        ],
        equations: &["dx/dt = v"],
        conservation_laws: &[ConservationLaw::Momentum],
        assumptions: &["No net force acts on the body"],
        domain: DYNAMIC_1D,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::UniformAcceleration,
        id: "uniform_acceleration",
        name: "Uniformly Accelerated Motion",
        domain_group: PhysicsDomain::Kinematics,
        system_types: &["kinematics", "uniform_acceleration", "accelerated_motion"],
        keywords: &["accelerat", "velocity", "distance", "brak", "initial"],
        parameters: &[
            param("x", 0.0, "m", Given, "Position"),
            param("v0", 0.0, "m/s", Given, "Initial velocity"),
            param("v", 0.0, "m/s", Unknown, "Velocity"),
            param("a", 1.0, "m/s^2", Given, "Constant acceleration"),
            param("t", 0.0, "s", Unknown, "Elapsed time"),
        ],
        equations: &["dx/dt = v", "dv/dt = a"],
        assumptions: &["Acceleration is constant"],
        domain: DYNAMIC_1D,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::FreeFall,
        id: "free_fall",
        name: "Free Fall",
        domain_group: PhysicsDomain::Kinematics,
        system_types: &["free_fall", "falling_object", "falling_body", "drop"],
        keywords: &["fall", "drop", "height", "ground", "gravity"],
        parameters: &[
            param("h", 10.0, "m", Given, "Height above the ground"),
            param("g", 9.806_65, "m/s^2", Constant, "Gravitational acceleration"),
            param("v", 0.0, "m/s", Unknown, "Downward speed"),
            param("t", 0.0, "s", Unknown, "Time of fall"),
            param("m", 1.0, "kg", Given, "Mass of the falling body"),
        ],
        equations: &["dh/dt = -v", "dv/dt = g"],
        conservation_laws: &[ConservationLaw::Energy],
        energy: Some("m*g*h + 0.5*m*v^2"),
        momentum: Some("m*v"),
        boundaries: &[("ground", "h >= 0")],
        assumptions: &["Air resistance is negligible", "Gravity is uniform"],
        limitations: &["Not valid at heights comparable to the planet radius"],
        domain: DYNAMIC_1D,
        threshold: 0.7,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::ProjectileMotion,
        id: "projectile_motion",
        name: "Projectile Motion",
        domain_group: PhysicsDomain::Kinematics,
        system_types: &["projectile", "projectile_motion", "ballistic"],
        keywords: &["projectile", "launch", "angle", "trajectory", "range"],
        parameters: &[
            param("x", 0.0, "m", Given, "Horizontal position"),
            param("y", 0.0, "m", Given, "Vertical position"),
            param("vx", 10.0, "m/s", Given, "Horizontal velocity"),
            param("vy", 10.0, "m/s", Given, "Vertical velocity"),
            param("g", 9.806_65, "m/s^2", Constant, "Gravitational acceleration"),
            param("t", 0.0, "s", Unknown, "Time of flight"),
            param("m", 1.0, "kg", Given, "Projectile mass"),
        ],
        equations: &["dx/dt = vx", "dy/dt = vy", "dvx/dt = 0", "dvy/dt = -g"],
        conservation_laws: &[ConservationLaw::Energy],
        energy: Some("m*g*y + 0.5*m*(vx^2 + vy^2)"),
        boundaries: &[("ground", "y >= 0")],
        assumptions: &["Air resistance is negligible", "Launch and landing heights are equal"],
        complexity: ComplexityTier::Intermediate,
        domain: DYNAMIC_2D,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::CircularMotion,
        id: "circular_motion",
        name: "Uniform Circular Motion",
        domain_group: PhysicsDomain::Kinematics,
        system_types: &["circular_motion", "uniform_circular_motion", "rotation"],
        keywords: &["circular", "circle", "centripetal", "radius", "revolution"],
        parameters: &[
            param("r", 1.0, "m", Given, "Radius"),
            param("v", 1.0, "m/s", Given, "Tangential speed"),
            param("m", 1.0, "kg", Given, "Mass"),
            param("omega", 0.0, "rad/s", Derived, "Angular velocity"),
            param("a_c", 0.0, "m/s^2", Derived, "Centripetal acceleration"),
            param("F_c", 0.0, "N", Derived, "Centripetal force"),
            param("period", 0.0, "s", Derived, "Period of revolution"),
        ],
        equations: &[
            "omega = v/r",
            "a_c = v^2/r",
            "F_c = m*v^2/r",
            "period = 2*pi*r/v",
        ],
        conservation_laws: &[ConservationLaw::Energy, ConservationLaw::AngularMomentum],
        energy: Some("0.5*m*v^2"),
        angular_momentum: Some("m*v*r"),
        assumptions: &["Speed is constant"],
        domain: PERIODIC_1D,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::RelativeMotion,
        id: "relative_motion",
        name: "Relative Motion",
        domain_group: PhysicsDomain::Kinematics,
        system_types: &["relative_motion", "relative_velocity"],
        keywords: &["relative", "frame", "observer", "river", "current"],
        parameters: &[
            param("v_a", 1.0, "m/s", Given, "Velocity of body A"),
            param("v_b", 0.0, "m/s", Given, "Velocity of body B"),
            param("v_rel", 0.0, "m/s", Derived, "Velocity of A relative to B"),
        ],
        equations: &["v_rel = v_a - v_b"],
        assumptions: &["Galilean relativity"],
        threshold: 0.75,
        ..BASE
    },
    // ---- Dynamics ----
    ModuleTemplate {
        kind: ModuleKind::NewtonSecondLaw,
        id: "newton_second_law",
        name: "Newton's Second Law",
        domain_group: PhysicsDomain::Dynamics,
        system_types: &["dynamics", "newton", "force", "newtons_second_law"],
        keywords: &["force", "newton", "push", "pull", "net"],
        parameters: &[
            param("F", 10.0, "N", Given, "Net force"),
            param("m", 1.0, "kg", Given, "Mass"),
            param("a", 0.0, "m/s^2", Derived, "Acceleration"),
        ],
        equations: &["a = F/m"],
        assumptions: &["Mass is constant", "Inertial reference frame"],
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::Friction,
        id: "friction",
        name: "Friction",
        domain_group: PhysicsDomain::Dynamics,
        system_types: &["friction", "sliding"],
        keywords: &["friction", "rough", "coefficient", "slide", "kinetic"],
        parameters: &[
            param("mu", 0.3, "1", Given, "Coefficient of friction"),
            param("m", 1.0, "kg", Given, "Mass"),
            param("g", 9.806_65, "m/s^2", Constant, "Gravitational acceleration"),
            param("F_N", 0.0, "N", Derived, "Normal force"),
            param("f", 0.0, "N", Derived, "Friction force"),
        ],
        equations: &["F_N = m*g", "f = mu*F_N"],
        dependencies: &[ModuleKind::NewtonSecondLaw],
        assumptions: &["Coulomb friction model", "Horizontal surface"],
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::InclinedPlane,
        id: "inclined_plane",
        name: "Inclined Plane",
        domain_group: PhysicsDomain::Dynamics,
        system_types: &["inclined_plane", "incline", "ramp"],
        keywords: &["incline", "ramp", "slope", "angle", "slide"],
        parameters: &[
            param("theta", 0.523_598_775_6, "rad", Given, "Incline angle"),
            param("mu", 0.0, "1", Given, "Coefficient of friction"),
            param("m", 1.0, "kg", Given, "Mass"),
            param("g", 9.806_65, "m/s^2", Constant, "Gravitational acceleration"),
            param("x", 0.0, "m", Given, "Distance along the incline"),
            param("v", 0.0, "m/s", Unknown, "Speed along the incline"),
            param("a", 0.0, "m/s^2", Derived, "Acceleration along the incline"),
        ],
        equations: &[
            "a = g*(sin(theta) - mu*cos(theta))",
            "dx/dt = v",
            "dv/dt = a",
        ],
        dependencies: &[ModuleKind::NewtonSecondLaw, ModuleKind::Friction],
        assumptions: &["Block does not tip", "Friction coefficient is constant"],
        complexity: ComplexityTier::Intermediate,
        domain: DYNAMIC_1D,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::SpringOscillator,
        id: "spring_oscillator",
        name: "Spring-Mass Oscillator",
        domain_group: PhysicsDomain::Dynamics,
        system_types: &[
            "harmonic_oscillator",
            "spring_mass",
            "spring_oscillator",
            "simple_harmonic_motion",
            "oscillator",
            "oscillatory",
        ],
        keywords: &["spring", "oscillat", "harmonic", "amplitude", "period"],
        parameters: &[
            param("m", 1.0, "kg", Given, "Mass"),
            param("k", 100.0, "N/m", Given, "Spring constant"),
            param("x", 0.1, "m", Given, "Displacement from equilibrium"),
            param("v", 0.0, "m/s", Unknown, "Velocity"),
            param("omega", 0.0, "rad/s", Derived, "Natural angular frequency"),
            param("period", 0.0, "s", Derived, "Oscillation period"),
        ],
        equations: &[
            "dx/dt = v",
            "dv/dt = -k/m*x",
            "omega = sqrt(k/m)",
            "period = 2*pi*sqrt(m/k)",
        ],
        conservation_laws: &[ConservationLaw::Energy],
        energy: Some("0.5*m*v^2 + 0.5*k*x^2"),
        momentum: Some("m*v"),
        assumptions: &["Ideal massless spring", "Hooke's law holds", "No damping"],
        limitations: &["Large displacements break linearity"],
        domain: PERIODIC_1D,
        threshold: 0.75,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::DampedOscillator,
        id: "damped_oscillator",
        name: "Damped Oscillator",
        domain_group: PhysicsDomain::Dynamics,
        system_types: &["damped_oscillator", "damped_harmonic_oscillator"],
        keywords: &["damp", "oscillat", "spring", "decay", "viscous"],
        required_keywords: &["damp"],
        parameters: &[
            param("m", 1.0, "kg", Given, "Mass"),
            param("k", 100.0, "N/m", Given, "Spring constant"),
            param("c", 0.5, "kg/s", Given, "Damping coefficient"),
            param("x", 0.1, "m", Given, "Displacement from equilibrium"),
            param("v", 0.0, "m/s", Unknown, "Velocity"),
        ],
        equations: &["dx/dt = v", "dv/dt = -k/m*x - c/m*v"],
        energy: Some("0.5*m*v^2 + 0.5*k*x^2"),
        assumptions: &["Linear viscous damping"],
        complexity: ComplexityTier::Intermediate,
        domain: PERIODIC_1D,
        threshold: 0.8,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::SimplePendulum,
        id: "simple_pendulum",
        name: "Simple Pendulum",
        domain_group: PhysicsDomain::Dynamics,
        system_types: &["pendulum", "simple_pendulum"],
        keywords: &["pendulum", "swing", "bob", "string"],
        parameters: &[
            param("L", 1.0, "m", Given, "Pendulum length"),
            param("g", 9.806_65, "m/s^2", Constant, "Gravitational acceleration"),
            param("theta", 0.1, "rad", Given, "Angular displacement"),
            param("w", 0.0, "rad/s", Unknown, "Angular velocity"),
            param("m", 1.0, "kg", Given, "Bob mass"),
            param("period", 0.0, "s", Derived, "Small-angle period"),
        ],
        equations: &[
            "dtheta/dt = w",
            "dw/dt = -g/L*sin(theta)",
            "period = 2*pi*sqrt(L/g)",
        ],
        conservation_laws: &[ConservationLaw::Energy],
        energy: Some("0.5*m*L^2*w^2 + m*g*L*(1 - cos(theta))"),
        assumptions: &["Massless rigid rod", "No friction at the pivot"],
        limitations: &["Period formula assumes small angles"],
        domain: PERIODIC_1D,
        threshold: 0.75,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::UniversalGravitation,
        id: "universal_gravitation",
        name: "Universal Gravitation",
        domain_group: PhysicsDomain::Dynamics,
        system_types: &["gravitation", "universal_gravitation", "gravity"],
        keywords: &["gravitation", "planet", "attraction", "celestial", "earth"],
        parameters: &[
            param("G", 6.674_30e-11, "m^3/(kg*s^2)", Constant, "Gravitational constant"),
            param("M", 5.972e24, "kg", Given, "Central mass"),
            param("m", 1.0, "kg", Given, "Orbiting mass"),
            param("r", 6.371e6, "m", Given, "Separation"),
            param("F_g", 0.0, "N", Derived, "Gravitational force"),
        ],
        equations: &["F_g = G*M*m/r^2"],
        assumptions: &["Point masses"],
        domain: DomainDescriptor {
            scale: PhysicalScale::Astronomical,
            ..STATIC_0D
        },
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::OrbitalMotion,
        id: "orbital_motion",
        name: "Orbital Motion",
        domain_group: PhysicsDomain::Dynamics,
        system_types: &["orbit", "orbital_motion", "satellite", "kepler"],
        keywords: &["orbit", "satellite", "planet", "kepler", "period"],
        parameters: &[
            param("G", 6.674_30e-11, "m^3/(kg*s^2)", Constant, "Gravitational constant"),
            param("M", 5.972e24, "kg", Given, "Central mass"),
            param("m", 1000.0, "kg", Given, "Satellite mass"),
            param("x", 7.0e6, "m", Given, "Position x"),
            param("y", 0.0, "m", Given, "Position y"),
            param("vx", 0.0, "m/s", Given, "Velocity x"),
            param("vy", 7546.0, "m/s", Given, "Velocity y"),
            param("r", 0.0, "m", Derived, "Orbital radius"),
        ],
        equations: &[
            "dx/dt = vx",
            "dy/dt = vy",
            "dvx/dt = -G*M*x/(x^2 + y^2)^1.5",
            "dvy/dt = -G*M*y/(x^2 + y^2)^1.5",
            "r = sqrt(x^2 + y^2)",
        ],
        conservation_laws: &[ConservationLaw::Energy, ConservationLaw::AngularMomentum],
        dependencies: &[ModuleKind::UniversalGravitation, ModuleKind::CircularMotion],
        energy: Some("0.5*m*(vx^2 + vy^2) - G*M*m/sqrt(x^2 + y^2)"),
        angular_momentum: Some("m*(x*vy - y*vx)"),
        assumptions: &["Central mass is fixed", "Two-body problem"],
        complexity: ComplexityTier::Advanced,
        domain: ASTRONOMICAL_2D,
        threshold: 0.75,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::Collision,
        id: "collision",
        name: "One-Dimensional Collision",
        domain_group: PhysicsDomain::Dynamics,
        system_types: &[
            "collision",
            "impact",
            "elastic_collision",
            "inelastic_collision",
        ],
        keywords: &["collision", "collide", "impact", "elastic", "bounce"],
        parameters: &[
            param("m1", 1.0, "kg", Given, "Mass of body 1"),
            param("m2", 1.0, "kg", Given, "Mass of body 2"),
            param("v1", 1.0, "m/s", Given, "Initial velocity of body 1"),
            param("v2", 0.0, "m/s", Given, "Initial velocity of body 2"),
            param("e", 1.0, "1", Given, "Coefficient of restitution"),
            param("v1f", 0.0, "m/s", Derived, "Final velocity of body 1"),
            param("v2f", 0.0, "m/s", Derived, "Final velocity of body 2"),
        ],
        equations: &[
            "v1f = ((m1 - e*m2)*v1 + (1 + e)*m2*v2)/(m1 + m2)",
            "v2f = ((m2 - e*m1)*v2 + (1 + e)*m1*v1)/(m1 + m2)",
        ],
        conservation_laws: &[ConservationLaw::Momentum],
        energy: Some("0.5*m1*v1^2 + 0.5*m2*v2^2"),
        momentum: Some("m1*v1 + m2*v2"),
        assumptions: &["Head-on collision", "Instantaneous impact"],
        complexity: ComplexityTier::Intermediate,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::RotationalDynamics,
        id: "rotational_dynamics",
        name: "Rotational Dynamics",
        domain_group: PhysicsDomain::Dynamics,
        system_types: &["rotational_dynamics", "torque", "rigid_body_rotation"],
        keywords: &["torque", "rotat", "inertia", "angular", "wheel"],
        parameters: &[
            param("I", 1.0, "kg*m^2", Given, "Moment of inertia"),
            param("tau", 1.0, "N*m", Given, "Applied torque"),
            param("alpha", 0.0, "rad/s^2", Derived, "Angular acceleration"),
            param("theta", 0.0, "rad", Given, "Angle"),
            param("w", 0.0, "rad/s", Unknown, "Angular velocity"),
        ],
        equations: &["alpha = tau/I", "dtheta/dt = w", "dw/dt = alpha"],
        energy: Some("0.5*I*w^2"),
        angular_momentum: Some("I*w"),
        assumptions: &["Rigid body about a fixed axis"],
        complexity: ComplexityTier::Intermediate,
        domain: DYNAMIC_1D,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::SimpleMachines,
        id: "simple_machines",
        name: "Simple Machines",
        domain_group: PhysicsDomain::Dynamics,
        system_types: &["simple_machine", "lever", "pulley"],
        keywords: &["lever", "pulley", "machine", "advantage", "fulcrum"],
        parameters: &[
            param("F_in", 10.0, "N", Given, "Input force"),
            param("F_out", 30.0, "N", Given, "Output force"),
            param("d_in", 3.0, "m", Given, "Input distance"),
            param("d_out", 0.9, "m", Given, "Output distance"),
            param("MA", 0.0, "1", Derived, "Mechanical advantage"),
            param("eff", 0.0, "1", Derived, "Efficiency"),
        ],
        equations: &["MA = F_out/F_in", "eff = (F_out*d_out)/(F_in*d_in)"],
        assumptions: &["Quasi-static operation"],
        threshold: 0.6,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::DragForce,
        id: "drag_force",
        name: "Quadratic Drag",
        domain_group: PhysicsDomain::Dynamics,
        system_types: &["terminal_velocity", "drag", "air_resistance"],
        keywords: &["drag", "terminal", "air", "resistance", "parachut"],
        parameters: &[
            param("m", 80.0, "kg", Given, "Mass"),
            param("g", 9.806_65, "m/s^2", Constant, "Gravitational acceleration"),
            param("b", 0.25, "kg/m", Given, "Quadratic drag coefficient"),
            param("v", 0.0, "m/s", Unknown, "Downward speed"),
            param("v_t", 0.0, "m/s", Derived, "Terminal velocity"),
        ],
        equations: &["dv/dt = g - b/m*v^2", "v_t = sqrt(m*g/b)"],
        assumptions: &["Drag is proportional to speed squared"],
        complexity: ComplexityTier::Intermediate,
        domain: DYNAMIC_1D,
        threshold: 0.75,
        ..BASE
    },
    // ---- Energy ----
    ModuleTemplate {
        kind: ModuleKind::WorkEnergy,
        id: "work_energy",
        name: "Work-Energy Theorem",
        domain_group: PhysicsDomain::Energy,
        system_types: &["work", "work_energy"],
        keywords: &["work", "kinetic", "energy", "joule", "displacement"],
        parameters: &[
            param("F", 10.0, "N", Given, "Applied force"),
            param("d", 1.0, "m", Given, "Displacement"),
            param("m", 1.0, "kg", Given, "Mass"),
            param("v", 0.0, "m/s", Unknown, "Speed"),
            param("W", 0.0, "J", Derived, "Work done"),
            param("KE", 0.0, "J", Derived, "Kinetic energy"),
        ],
        equations: &["W = F*d", "KE = 0.5*m*v^2"],
        dependencies: &[ModuleKind::NewtonSecondLaw],
        assumptions: &["Force is parallel to displacement"],
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::EnergyConservation,
        id: "energy_conservation",
        name: "Mechanical Energy Conservation",
        domain_group: PhysicsDomain::Energy,
        system_types: &["energy", "energy_conservation", "mechanical_energy"],
        keywords: &["energy", "conserv", "potential", "kinetic", "mechanical"],
        parameters: &[
            param("m", 1.0, "kg", Given, "Mass"),
            param("g", 9.806_65, "m/s^2", Constant, "Gravitational acceleration"),
            param("h", 0.0, "m", Given, "Height"),
            param("v", 0.0, "m/s", Given, "Speed"),
            param("KE", 0.0, "J", Derived, "Kinetic energy"),
            param("PE", 0.0, "J", Derived, "Potential energy"),
            param("E", 0.0, "J", Derived, "Mechanical energy"),
        ],
        equations: &["KE = 0.5*m*v^2", "PE = m*g*h", "E = KE + PE"],
        conservation_laws: &[ConservationLaw::Energy],
        energy: Some("0.5*m*v^2 + m*g*h"),
        assumptions: &["Only conservative forces do work"],
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::Power,
        id: "power",
        name: "Mechanical Power",
        domain_group: PhysicsDomain::Energy,
        system_types: &["power"],
        keywords: &["power", "watt", "rate", "horsepower", "engine"],
        parameters: &[
            param("F", 10.0, "N", Given, "Driving force"),
            param("v", 1.0, "m/s", Given, "Speed"),
            param("P", 0.0, "W", Derived, "Power"),
        ],
        equations: &["P = F*v"],
        dependencies: &[ModuleKind::WorkEnergy],
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::Impulse,
        id: "impulse",
        name: "Impulse and Momentum",
        domain_group: PhysicsDomain::Energy,
        system_types: &["impulse", "momentum"],
        keywords: &["impulse", "momentum", "kick", "hit", "strike"],
        parameters: &[
            param("m", 1.0, "kg", Given, "Mass"),
            param("v", 1.0, "m/s", Given, "Velocity"),
            param("F", 10.0, "N", Given, "Average force"),
            param("dt_c", 0.1, "s", Given, "Contact time"),
            param("p", 0.0, "kg*m/s", Derived, "Momentum"),
            param("J", 0.0, "N*s", Derived, "Impulse"),
        ],
        equations: &["p = m*v", "J = F*dt_c"],
        conservation_laws: &[ConservationLaw::Momentum],
        momentum: Some("m*v"),
        ..BASE
    },
    // ---- Electromagnetism ----
    ModuleTemplate {
        kind: ModuleKind::Electrostatics,
        id: "electrostatics",
        name: "Electrostatics",
        domain_group: PhysicsDomain::Electromagnetism,
        system_types: &["electrostatics", "coulomb", "electric_field", "charges"],
        keywords: &["charge", "coulomb", "electric", "attract", "repel"],
        parameters: &[
            param("k_e", 8.987_551_792_3e9, "N*m^2/C^2", Constant, "Coulomb constant"),
            param("q1", 1e-6, "C", Given, "Charge 1"),
            param("q2", 1e-6, "C", Given, "Charge 2"),
            param("r", 0.1, "m", Given, "Separation"),
            param("F_e", 0.0, "N", Derived, "Electrostatic force"),
            param("E_f", 0.0, "N/C", Derived, "Field of charge 1 at r"),
        ],
        equations: &["F_e = k_e*q1*q2/r^2", "E_f = k_e*q1/r^2"],
        conservation_laws: &[ConservationLaw::Charge],
        assumptions: &["Point charges in vacuum"],
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::ElectricCircuit,
        id: "electric_circuit",
        name: "DC Circuit",
        domain_group: PhysicsDomain::Electromagnetism,
        system_types: &["circuit", "electric_circuit", "dc_circuit", "ohm"],
        keywords: &["circuit", "resist", "current", "voltage", "battery", "ohm"],
        parameters: &[
            param("V", 12.0, "V", Given, "Source voltage"),
            param("R_c", 6.0, "ohm", Given, "Resistance"),
            param("I", 0.0, "A", Derived, "Current"),
            param("P_e", 0.0, "W", Derived, "Dissipated power"),
        ],
        equations: &["I = V/R_c", "P_e = V*I"],
        conservation_laws: &[ConservationLaw::Charge],
        assumptions: &["Ohmic resistors", "Ideal source"],
        threshold: 0.6,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::RcCircuit,
        id: "rc_circuit",
        name: "RC Circuit",
        domain_group: PhysicsDomain::Electromagnetism,
        system_types: &["rc_circuit", "capacitor", "charging_capacitor"],
        keywords: &["capacitor", "charging", "discharg", "rc", "farad"],
        parameters: &[
            param("V", 12.0, "V", Given, "Source voltage"),
            param("R_c", 1000.0, "ohm", Given, "Resistance"),
            param("C", 0.001, "F", Given, "Capacitance"),
            param("q", 0.0, "C", Unknown, "Capacitor charge"),
            param("I", 0.0, "A", Derived, "Current"),
            param("tau_rc", 0.0, "s", Derived, "Time constant"),
        ],
        equations: &[
            "dq/dt = (V - q/C)/R_c",
            "I = (V - q/C)/R_c",
            "tau_rc = R_c*C",
        ],
        dependencies: &[ModuleKind::ElectricCircuit],
        energy: Some("0.5*q^2/C"),
        assumptions: &["Ideal capacitor"],
        complexity: ComplexityTier::Intermediate,
        domain: DomainDescriptor {
            spatial_dimensions: 0,
            ..DYNAMIC_1D
        },
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::Magnetism,
        id: "magnetism",
        name: "Magnetic Force",
        domain_group: PhysicsDomain::Electromagnetism,
        system_types: &["magnetism", "magnetic_force", "lorentz_force", "magnetic_field"],
        keywords: &["magnet", "lorentz", "tesla", "field", "wire"],
        parameters: &[
            param("q_m", 1e-6, "C", Given, "Moving charge"),
            param("v", 100.0, "m/s", Given, "Charge speed"),
            param("B", 0.5, "T", Given, "Magnetic field"),
            param("theta_b", 1.570_796_326_8, "rad", Given, "Angle between v and B"),
            param("m", 1e-3, "kg", Given, "Particle mass"),
            param("F_m", 0.0, "N", Derived, "Magnetic force"),
            param("r_m", 0.0, "m", Derived, "Gyration radius"),
        ],
        equations: &["F_m = q_m*v*B*sin(theta_b)", "r_m = m*v/(q_m*B)"],
        assumptions: &["Uniform magnetic field"],
        complexity: ComplexityTier::Intermediate,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::ElectromagneticInduction,
        id: "electromagnetic_induction",
        name: "Electromagnetic Induction",
        domain_group: PhysicsDomain::Electromagnetism,
        system_types: &["induction", "electromagnetic_induction", "faraday", "generator"],
        keywords: &["induc", "faraday", "flux", "coil", "emf"],
        parameters: &[
            param("N_t", 100.0, "1", Given, "Number of turns"),
            param("B", 0.5, "T", Given, "Magnetic field"),
            param("A_coil", 0.01, "m^2", Given, "Coil area"),
            param("dB_dt", 0.1, "T/s", Given, "Field rate of change"),
            param("Phi", 0.0, "Wb", Derived, "Magnetic flux"),
            param("emf", 0.0, "V", Derived, "Induced EMF magnitude"),
        ],
        equations: &["Phi = B*A_coil", "emf = N_t*A_coil*dB_dt"],
        dependencies: &[ModuleKind::Magnetism],
        complexity: ComplexityTier::Advanced,
        ..BASE
    },
    // ---- Optics ----
    ModuleTemplate {
        kind: ModuleKind::GeometricOptics,
        id: "geometric_optics",
        name: "Thin Lens",
        domain_group: PhysicsDomain::Optics,
        system_types: &["lens", "mirror", "geometric_optics", "thin_lens"],
        keywords: &["lens", "mirror", "focal", "image", "magnif"],
        parameters: &[
            param("f_l", 0.1, "m", Given, "Focal length"),
            param("d_o", 0.3, "m", Given, "Object distance"),
            param("d_i", 0.0, "m", Derived, "Image distance"),
            param("M_l", 0.0, "1", Derived, "Magnification"),
        ],
        equations: &["d_i = 1/(1/f_l - 1/d_o)", "M_l = -d_i/d_o"],
        assumptions: &["Paraxial rays", "Thin lens"],
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::Refraction,
        id: "refraction",
        name: "Refraction",
        domain_group: PhysicsDomain::Optics,
        system_types: &["refraction", "snell", "snells_law"],
        keywords: &["refract", "snell", "index", "glass", "prism"],
        parameters: &[
            param("n1", 1.0, "1", Given, "Incident medium index"),
            param("n2", 1.5, "1", Given, "Refracting medium index"),
            param("theta1", 0.5, "rad", Given, "Angle of incidence"),
            param("theta2", 0.0, "rad", Derived, "Angle of refraction"),
        ],
        equations: &["theta2 = asin(n1*sin(theta1)/n2)"],
        limitations: &["Fails beyond the critical angle"],
        ..BASE
    },
    // ---- Waves ----
    ModuleTemplate {
        kind: ModuleKind::WaveMotion,
        id: "wave_motion",
        name: "Wave Motion",
        domain_group: PhysicsDomain::Waves,
        system_types: &["wave", "waves", "wave_motion"],
        keywords: &["wave", "wavelength", "frequency", "crest", "propagat"],
        parameters: &[
            param("f", 1.0, "Hz", Given, "Frequency"),
            param("lambda", 1.0, "m", Given, "Wavelength"),
            param("v_w", 0.0, "m/s", Derived, "Wave speed"),
            param("T_w", 0.0, "s", Derived, "Wave period"),
        ],
        equations: &["v_w = f*lambda", "T_w = 1/f"],
        domain: PERIODIC_1D,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::Acoustics,
        id: "acoustics",
        name: "Acoustics",
        domain_group: PhysicsDomain::Waves,
        system_types: &["sound", "acoustics"],
        keywords: &["sound", "echo", "decibel", "loud", "hear"],
        parameters: &[
            param("v_s", 343.0, "m/s", Given, "Speed of sound"),
            param("f", 440.0, "Hz", Given, "Frequency"),
            param("I_s", 1e-6, "W/m^2", Given, "Sound intensity"),
            param("I_0", 1e-12, "W/m^2", Constant, "Threshold of hearing"),
            param("lambda", 0.0, "m", Derived, "Wavelength"),
            param("beta", 0.0, "1", Derived, "Sound level in decibels"),
        ],
        equations: &["lambda = v_s/f", "beta = 10*log10(I_s/I_0)"],
        dependencies: &[ModuleKind::WaveMotion],
        threshold: 0.6,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::DopplerEffect,
        id: "doppler_effect",
        name: "Doppler Effect",
        domain_group: PhysicsDomain::Waves,
        system_types: &["doppler", "doppler_effect"],
        keywords: &["doppler", "siren", "approach", "reced", "pitch"],
        parameters: &[
            param("f_s", 440.0, "Hz", Given, "Source frequency"),
            param("v_s", 343.0, "m/s", Given, "Speed of sound"),
            param("v_o", 0.0, "m/s", Given, "Observer speed toward source"),
            param("v_src", 10.0, "m/s", Given, "Source speed toward observer"),
            param("f_o", 0.0, "Hz", Derived, "Observed frequency"),
        ],
        equations: &["f_o = f_s*(v_s + v_o)/(v_s - v_src)"],
        dependencies: &[ModuleKind::WaveMotion],
        limitations: &["Subsonic sources only"],
        complexity: ComplexityTier::Intermediate,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::StandingWaves,
        id: "standing_waves",
        name: "Standing Waves",
        domain_group: PhysicsDomain::Waves,
        system_types: &["standing_wave", "string_vibration", "resonance"],
        keywords: &["standing", "node", "antinode", "resonan", "fundamental"],
        parameters: &[
            param("L_s", 1.0, "m", Given, "String length"),
            param("n", 1.0, "1", Given, "Harmonic number"),
            param("v_w", 100.0, "m/s", Given, "Wave speed"),
            param("f_n", 0.0, "Hz", Derived, "Harmonic frequency"),
        ],
        equations: &["f_n = n*v_w/(2*L_s)"],
        dependencies: &[ModuleKind::WaveMotion],
        assumptions: &["Both ends fixed"],
        ..BASE
    },
    // ---- Fluids ----
    ModuleTemplate {
        kind: ModuleKind::Pressure,
        id: "pressure",
        name: "Hydrostatic Pressure",
        domain_group: PhysicsDomain::Fluids,
        system_types: &["pressure", "hydrostatics", "fluid_statics"],
        keywords: &["pressure", "depth", "fluid", "water", "pascal"],
        parameters: &[
            param("rho", 1000.0, "kg/m^3", Given, "Fluid density"),
            param("g", 9.806_65, "m/s^2", Constant, "Gravitational acceleration"),
            param("depth", 1.0, "m", Given, "Depth below the surface"),
            param("P0", 101_325.0, "Pa", Given, "Surface pressure"),
            param("P", 0.0, "Pa", Derived, "Pressure at depth"),
        ],
        equations: &["P = P0 + rho*g*depth"],
        assumptions: &["Incompressible fluid at rest"],
        threshold: 0.6,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::Buoyancy,
        id: "buoyancy",
        name: "Buoyancy",
        domain_group: PhysicsDomain::Fluids,
        system_types: &["buoyancy", "archimedes", "floating"],
        keywords: &["buoyan", "float", "submerg", "archimedes", "sink"],
        parameters: &[
            param("rho_f", 1000.0, "kg/m^3", Given, "Fluid density"),
            param("V_d", 0.001, "m^3", Given, "Displaced volume"),
            param("g", 9.806_65, "m/s^2", Constant, "Gravitational acceleration"),
            param("m", 1.0, "kg", Given, "Body mass"),
            param("F_b", 0.0, "N", Derived, "Buoyant force"),
            param("W_b", 0.0, "N", Derived, "Body weight"),
        ],
        equations: &["F_b = rho_f*V_d*g", "W_b = m*g"],
        dependencies: &[ModuleKind::Pressure],
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::FluidFlow,
        id: "fluid_flow",
        name: "Bernoulli Flow",
        domain_group: PhysicsDomain::Fluids,
        system_types: &["fluid_flow", "bernoulli", "fluid_dynamics"],
        keywords: &["flow", "pipe", "bernoulli", "continuity", "nozzle"],
        parameters: &[
            param("A1", 0.01, "m^2", Given, "Inlet area"),
            param("A2", 0.005, "m^2", Given, "Outlet area"),
            param("v1", 1.0, "m/s", Given, "Inlet speed"),
            param("rho", 1000.0, "kg/m^3", Given, "Fluid density"),
            param("P1", 101_325.0, "Pa", Given, "Inlet pressure"),
            param("v2", 0.0, "m/s", Derived, "Outlet speed"),
            param("P2", 0.0, "Pa", Derived, "Outlet pressure"),
        ],
        equations: &["v2 = A1*v1/A2", "P2 = P1 + 0.5*rho*(v1^2 - v2^2)"],
        conservation_laws: &[ConservationLaw::Mass],
        dependencies: &[ModuleKind::Pressure],
        assumptions: &["Steady, incompressible, inviscid flow"],
        complexity: ComplexityTier::Intermediate,
        ..BASE
    },
    // ---- Thermal ----
    ModuleTemplate {
        kind: ModuleKind::HeatTransfer,
        id: "heat_transfer",
        name: "Heat Transfer",
        domain_group: PhysicsDomain::Thermal,
        system_types: &["heat_transfer", "calorimetry", "cooling", "heating", "thermal"],
        keywords: &["heat", "temperature", "cool", "warm", "specific"],
        parameters: &[
            param("m", 1.0, "kg", Given, "Mass"),
            param("c_p", 4186.0, "J/(kg*K)", Given, "Specific heat capacity"),
            param("T", 350.0, "K", Given, "Body temperature"),
            param("T_env", 293.15, "K", Given, "Ambient temperature"),
            param("h_c", 0.01, "1/s", Given, "Cooling rate constant"),
            param("Q", 0.0, "J", Derived, "Heat content above ambient"),
        ],
        equations: &["dT/dt = -h_c*(T - T_env)", "Q = m*c_p*(T - T_env)"],
        assumptions: &["Newton's law of cooling", "Uniform body temperature"],
        domain: DomainDescriptor {
            spatial_dimensions: 0,
            ..DYNAMIC_1D
        },
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::IdealGas,
        id: "ideal_gas",
        name: "Ideal Gas",
        domain_group: PhysicsDomain::Thermal,
        system_types: &["ideal_gas", "gas", "gas_law"],
        keywords: &["gas", "ideal", "volume", "mole", "container"],
        parameters: &[
            param("P_g", 101_325.0, "Pa", Given, "Gas pressure"),
            param("V", 0.0224, "m^3", Given, "Volume"),
            param("n_mol", 1.0, "mol", Given, "Amount of gas"),
            param("R", 8.314_462_618, "J/(mol*K)", Constant, "Molar gas constant"),
            param("T_g", 0.0, "K", Derived, "Gas temperature"),
        ],
        equations: &["T_g = P_g*V/(n_mol*R)"],
        conservation_laws: &[ConservationLaw::Mass],
        assumptions: &["Ideal gas behaviour"],
        threshold: 0.75,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::Thermodynamics,
        id: "thermodynamics",
        name: "First Law and Heat Engines",
        domain_group: PhysicsDomain::Thermal,
        system_types: &["thermodynamics", "first_law", "heat_engine", "carnot"],
        keywords: &["internal", "engine", "carnot", "cycle", "entropy"],
        parameters: &[
            param("Q_in", 100.0, "J", Given, "Heat added"),
            param("W_out", 50.0, "J", Given, "Work done by the system"),
            param("T_hot", 500.0, "K", Given, "Hot reservoir temperature"),
            param("T_cold", 300.0, "K", Given, "Cold reservoir temperature"),
            param("dU", 0.0, "J", Derived, "Change in internal energy"),
            param("eta", 0.0, "1", Derived, "Carnot efficiency"),
        ],
        equations: &["dU = Q_in - W_out", "eta = 1 - T_cold/T_hot"],
        conservation_laws: &[ConservationLaw::Energy],
        dependencies: &[ModuleKind::IdealGas],
        complexity: ComplexityTier::Intermediate,
        threshold: 0.75,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::PhaseChange,
        id: "phase_change",
        name: "Phase Change",
        domain_group: PhysicsDomain::Thermal,
        system_types: &["phase_change", "melting", "boiling", "latent_heat"],
        keywords: &["melt", "boil", "freez", "latent", "vapor", "ice", "steam"],
        parameters: &[
            param("m", 1.0, "kg", Given, "Mass"),
            param("L_f", 334_000.0, "J/kg", Given, "Latent heat"),
            param("Q_p", 0.0, "J", Derived, "Heat for the phase change"),
        ],
        equations: &["Q_p = m*L_f"],
        dependencies: &[ModuleKind::HeatTransfer],
        assumptions: &["Phase change at constant temperature"],
        threshold: 0.6,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::ThermalExpansion,
        id: "thermal_expansion",
        name: "Thermal Expansion",
        domain_group: PhysicsDomain::Thermal,
        system_types: &["thermal_expansion", "expansion"],
        keywords: &["expan", "rod", "linear", "coefficient", "bridge"],
        parameters: &[
            param("L0", 1.0, "m", Given, "Initial length"),
            param("alpha_l", 1.2e-5, "1/K", Given, "Linear expansion coefficient"),
            param("dT_e", 10.0, "K", Given, "Temperature change"),
            param("dL", 0.0, "m", Derived, "Change in length"),
        ],
        equations: &["dL = alpha_l*L0*dT_e"],
        ..BASE
    },
    // ---- Modern ----
    ModuleTemplate {
        kind: ModuleKind::PhotoelectricEffect,
        id: "photoelectric_effect",
        name: "Photoelectric Effect",
        domain_group: PhysicsDomain::Modern,
        system_types: &["photoelectric", "photoelectric_effect"],
        keywords: &["photon", "photoelectric", "electron", "threshold", "emit"],
        parameters: &[
            param("h", 6.626_070_15e-34, "J*s", Constant, "Planck constant"),
            param("f_ph", 1e15, "Hz", Given, "Photon frequency"),
            param("phi_w", 2.3, "eV", Given, "Work function"),
            param("KE_max", 0.0, "J", Derived, "Maximum photoelectron energy"),
        ],
        equations: &["KE_max = h*f_ph - phi_w"],
        complexity: ComplexityTier::Advanced,
        domain: ATOMIC,
        threshold: 0.8,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::SpecialRelativity,
        id: "special_relativity",
        name: "Special Relativity",
        domain_group: PhysicsDomain::Modern,
        system_types: &["relativity", "special_relativity", "time_dilation"],
        keywords: &["relativ", "dilat", "contract", "spaceship", "einstein"],
        parameters: &[
            param("c", 299_792_458.0, "m/s", Constant, "Speed of light"),
            param("v_r", 1.5e8, "m/s", Given, "Relative speed"),
            param("t0", 1.0, "s", Given, "Proper time"),
            param("L_p", 1.0, "m", Given, "Proper length"),
            param("gamma", 0.0, "1", Derived, "Lorentz factor"),
            param("t_d", 0.0, "s", Derived, "Dilated time"),
            param("L_c", 0.0, "m", Derived, "Contracted length"),
        ],
        equations: &[
            "gamma = 1/sqrt(1 - v_r^2/c^2)",
            "t_d = gamma*t0",
            "L_c = L_p/gamma",
        ],
        limitations: &["Inertial frames only"],
        complexity: ComplexityTier::Advanced,
        threshold: 0.8,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::RadioactiveDecay,
        id: "radioactive_decay",
        name: "Radioactive Decay",
        domain_group: PhysicsDomain::Modern,
        system_types: &["radioactive_decay", "decay", "nuclear"],
        keywords: &["decay", "half", "radioactiv", "nucle", "isotope"],
        parameters: &[
            param("N_nuc", 1000.0, "1", Given, "Remaining nuclei"),
            param("lambda_d", 0.1, "1/s", Given, "Decay constant"),
            param("t_half", 0.0, "s", Derived, "Half-life"),
        ],
        equations: &["dN_nuc/dt = -lambda_d*N_nuc", "t_half = ln(2)/lambda_d"],
        complexity: ComplexityTier::Intermediate,
        domain: DomainDescriptor {
            spatial_dimensions: 0,
            temporal: TemporalBehavior::Dynamic,
            scale: PhysicalScale::Atomic,
        },
        threshold: 0.75,
        ..BASE
    },
    ModuleTemplate {
        kind: ModuleKind::DeBroglie,
        id: "de_broglie",
        name: "Matter Waves",
        domain_group: PhysicsDomain::Modern,
        system_types: &["de_broglie", "matter_wave", "quantum"],
        keywords: &["broglie", "matter", "wavelength", "particle", "quantum"],
        parameters: &[
            param("h", 6.626_070_15e-34, "J*s", Constant, "Planck constant"),
            param("m", 9.109_383_701_5e-31, "kg", Given, "Particle mass"),
            param("v", 1e6, "m/s", Given, "Particle speed"),
            param("lambda_db", 0.0, "m", Derived, "de Broglie wavelength"),
        ],
        equations: &["lambda_db = h/(m*v)"],
        complexity: ComplexityTier::Advanced,
        domain: ATOMIC,
        threshold: 0.8,
        ..BASE
    },
];

/// Build an IR equation from its text
///
/// `state` holds the symbols linearity is judged against.
pub fn build_equation(id: String, expression: &str, state: &BTreeSet<String>) -> Equation {
    match ParsedEquation::parse(expression) {
        Ok(parsed) => {
            let order = parsed.order();
            let mut variables = parsed.rhs.variables();
            match &parsed.target {
                EquationTarget::Derivative { variable, .. }
                | EquationTarget::Assignment { variable } => {
                    variables.insert(variable.clone());
                }
                EquationTarget::Relation => {
                    if let Some(lhs) = &parsed.lhs {
                        variables.extend(lhs.variables());
                    }
                }
            }
            let linearity = if parsed.rhs.is_linear_in(state) {
                Linearity::Linear
            } else {
                Linearity::Nonlinear
            };
            Equation {
                id,
                kind: if order > 0 {
                    EquationKind::Differential
                } else {
                    EquationKind::Algebraic
                },
                expression: expression.to_string(),
                variables: variables.into_iter().collect(),
                order,
                linearity,
            }
        }
        Err(_) => Equation {
            id,
            kind: if expression.contains("/dt") || expression.contains('\'') {
                EquationKind::Differential
            } else {
                EquationKind::Algebraic
            },
            expression: expression.to_string(),
            variables: Vec::new(),
            order: 0,
            linearity: Linearity::Unknown,
        },
    }
}

/// Build a parameter from a value in `unit`, normalizing to SI
pub fn make_parameter(
    symbol: &str,
    value: f64,
    unit: &str,
    role: ParameterRole,
    description: &str,
    source: ParameterSource,
) -> Parameter {
    let resolution = resolve_unit(unit);
    let (si_value, si_unit) = if resolution.is_known() {
        let dim = resolution.dimension.map(|d| d.to_string()).unwrap_or_default();
        (resolution.to_si(value), si_unit_label(unit, &dim, resolution.scale, resolution.offset))
    } else {
        (value, unit.to_string())
    };
    Parameter {
        symbol: symbol.to_string(),
        quantity: PhysicalQuantity::new(si_value, si_unit, resolution.dimension),
        role,
        description: description.to_string(),
        dependencies: Vec::new(),
        source,
    }
}

/// The unit label to store after conversion
///
/// Units that were already SI keep their spelling; converted values are
/// labelled with their dimension string.
fn si_unit_label(unit: &str, dimension: &str, scale: f64, offset: f64) -> String {
    if (scale - 1.0).abs() < 1e-12 && offset == 0.0 {
        unit.to_string()
    } else {
        format!("SI[{}]", dimension)
    }
}

impl ModuleTemplate {
    /// Turn the template into a module
    ///
    /// Values already present in `known` replace the template defaults.
    /// Parameters with the `Constant` role take their value from the
    /// constants table when the symbol is found there.
    pub fn instantiate(&self, known: &BTreeMap<String, Parameter>) -> Module {
        let source = ParameterSource::Module(self.id.to_string());
        let parameters: Vec<Parameter> = self
            .parameters
            .iter()
            .map(|p| {
                let mut parameter = match known.get(p.symbol) {
                    Some(existing) => {
                        let mut merged = existing.clone();
                        if existing.role != ParameterRole::Given {
                            merged.role = p.role;
                        }
                        if merged.quantity.dimension.is_none() {
                            let resolution = resolve_unit(p.unit);
                            if resolution.is_known() {
                                merged.quantity.unit = p.unit.to_string();
                                merged.quantity.dimension = resolution.dimension;
                            }
                        }
                        merged
                    }
                    None => {
                        let (value, unit, source) = match (p.role, constant(p.symbol)) {
                            (ParameterRole::Constant, Some(c)) => {
                                (c.value, c.unit, ParameterSource::ConstantsTable)
                            }
                            _ => (p.default, p.unit, source.clone()),
                        };
                        make_parameter(p.symbol, value, unit, p.role, p.description, source)
                    }
                };
                if parameter.description.is_empty() {
                    parameter.description = p.description.to_string();
                }
                parameter
            })
            .collect();

        let state: BTreeSet<String> = self
            .equations
            .iter()
            .filter_map(|e| match ParsedEquation::parse(e).ok()?.target {
                EquationTarget::Derivative { variable, .. } => Some(variable),
                _ => None,
            })
            .collect();

        let equations: Vec<Equation> = self
            .equations
            .iter()
            .enumerate()
            .map(|(i, e)| build_equation(format!("{}_eq{}", self.id, i + 1), e, &state))
            .collect();

        let outputs = parameters
            .iter()
            .filter(|p| matches!(p.role, ParameterRole::Unknown | ParameterRole::Derived))
            .map(|p| p.symbol.clone())
            .collect();

        let constraints = self
            .boundaries
            .iter()
            .map(|(id, expression)| Constraint {
                id: format!("{}_{}", self.id, id),
                kind: ConstraintKind::Boundary,
                expression: expression.to_string(),
                tolerance: 0.0,
                terminal: true,
                description: format!("{} boundary", self.name),
                source: self.id.to_string(),
            })
            .collect();

        Module {
            id: self.id.to_string(),
            kind: self.kind,
            name: self.name.to_string(),
            parameters,
            equations,
            dependencies: self.dependencies.iter().map(|d| d.id().to_string()).collect(),
            outputs,
            conservation_laws: self.conservation_laws.to_vec(),
            assumptions: self.assumptions.iter().map(|s| s.to_string()).collect(),
            limitations: self.limitations.iter().map(|s| s.to_string()).collect(),
            complexity: self.complexity,
            domain: self.domain,
            observables: Observables {
                energy: self.energy.map(str::to_string),
                momentum: self.momentum.map(str::to_string),
                angular_momentum: self.angular_momentum.map(str::to_string),
            },
            constraints,
            relevance: 0.0,
        }
    }
}

/// Kinematics for declared objects
///
/// Each free object integrates `<id>_x/y/z` from `<id>_vx/vy/vz`; gravity
/// acts along `-y`.
pub fn particle_module(objects: &[IrObject], gravity: f64) -> Module {
    let mut parameters = vec![make_parameter(
        "g",
        gravity,
        "m/s^2",
        ParameterRole::Constant,
        "Gravitational acceleration",
        ParameterSource::Object("environment".to_string()),
    )];
    let mut equations = Vec::new();
    let mut kinetic_terms = Vec::new();
    let mut potential_terms = Vec::new();
    let mut momentum_terms = [Vec::new(), Vec::new(), Vec::new()];

    for object in objects {
        let source = ParameterSource::Object(object.id.clone());
        let mass_symbol = format!("m_{}", object.id);
        parameters.push(make_parameter(
            &mass_symbol,
            object.mass,
            "kg",
            ParameterRole::Given,
            &format!("Mass of {}", object.name),
            source.clone(),
        ));

        let names = object.state_variables();
        let values = [
            object.position[0],
            object.position[1],
            object.position[2],
            object.velocity[0],
            object.velocity[1],
            object.velocity[2],
        ];
        for (i, (name, value)) in names.iter().zip(values).enumerate() {
            let unit = if i < 3 { "m" } else { "m/s" };
            parameters.push(make_parameter(
                name,
                value,
                unit,
                ParameterRole::Given,
                &format!("Kinematic state of {}", object.name),
                source.clone(),
            ));
        }

        if object.fixed {
            continue;
        }

        let [x, y, z, vx, vy, vz] = &names;
        equations.push(format!("d{}/dt = {}", x, vx));
        equations.push(format!("d{}/dt = {}", y, vy));
        equations.push(format!("d{}/dt = {}", z, vz));
        equations.push(format!("d{}/dt = 0", vx));
        equations.push(format!("d{}/dt = -g", vy));
        equations.push(format!("d{}/dt = 0", vz));

        kinetic_terms.push(format!(
            "0.5*{}*({}^2 + {}^2 + {}^2)",
            mass_symbol, vx, vy, vz
        ));
        potential_terms.push(format!("{}*g*{}", mass_symbol, y));
        for (axis, v) in [vx, vy, vz].into_iter().enumerate() {
            momentum_terms[axis].push(format!("{}*{}", mass_symbol, v));
        }
    }

    let state: BTreeSet<String> = objects
        .iter()
        .filter(|o| !o.fixed)
        .flat_map(|o| o.state_variables())
        .collect();
    let equations = equations
        .iter()
        .enumerate()
        .map(|(i, e)| build_equation(format!("particle_kinematics_eq{}", i + 1), e, &state))
        .collect();

    let observables = if kinetic_terms.is_empty() {
        Observables::default()
    } else {
        let energy = kinetic_terms
            .iter()
            .chain(potential_terms.iter())
            .cloned()
            .collect::<Vec<_>>()
            .join(" + ");
        let momentum = format!(
            "sqrt(({})^2 + ({})^2 + ({})^2)",
            momentum_terms[0].join(" + "),
            momentum_terms[1].join(" + "),
            momentum_terms[2].join(" + ")
        );
        Observables {
            energy: Some(energy),
            momentum: Some(momentum),
            angular_momentum: None,
        }
    };

    let mut conservation_laws = vec![ConservationLaw::Energy];
    if gravity == 0.0 {
        conservation_laws.push(ConservationLaw::Momentum);
    }

    Module {
        id: ModuleKind::ParticleKinematics.id().to_string(),
        kind: ModuleKind::ParticleKinematics,
        name: "Particle Kinematics".to_string(),
        parameters,
        equations,
        dependencies: Vec::new(),
        outputs: state.into_iter().collect(),
        conservation_laws,
        assumptions: vec![
            "Objects are point masses with finite collision radii".to_string(),
            "Collisions are detected but not resolved".to_string(),
        ],
        limitations: Vec::new(),
        complexity: ComplexityTier::Intermediate,
        domain: DomainDescriptor {
            spatial_dimensions: 3,
            temporal: TemporalBehavior::Dynamic,
            scale: PhysicalScale::Macroscopic,
        },
        observables,
        constraints: Vec::new(),
        relevance: 1.0,
    }
}

/// Fallback module carrying only the problem's own parameters
pub fn generic_module(parameters: &[Parameter]) -> Module {
    Module {
        id: ModuleKind::Generic.id().to_string(),
        kind: ModuleKind::Generic,
        name: "Generic Physics".to_string(),
        parameters: parameters.to_vec(),
        equations: Vec::new(),
        dependencies: Vec::new(),
        outputs: parameters
            .iter()
            .filter(|p| p.role == ParameterRole::Unknown)
            .map(|p| p.symbol.clone())
            .collect(),
        conservation_laws: Vec::new(),
        assumptions: vec!["No specific physics module matched the problem".to_string()],
        limitations: vec!["No governing equations; state stays constant".to_string()],
        complexity: ComplexityTier::Basic,
        domain: STATIC_0D,
        observables: Observables::default(),
        constraints: Vec::new(),
        relevance: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::analysis::check_equation;

    #[test]
    fn test_template_ids_unique() {
        let mut ids = BTreeSet::new();
        for t in TEMPLATES {
            assert!(ids.insert(t.id), "duplicate template id {}", t.id);
            assert_eq!(t.kind.id(), t.id);
        }
        assert!(TEMPLATES.len() >= 40);
    }

    #[test]
    fn test_all_template_equations_parse() {
        for t in TEMPLATES {
            for e in t.equations {
                assert!(ParsedEquation::parse(e).is_ok(), "{}: {}", t.id, e);
            }
            for e in [t.energy, t.momentum, t.angular_momentum].into_iter().flatten() {
                assert!(crate::expr::Expr::parse(e).is_ok(), "{}: {}", t.id, e);
            }
        }
    }

    #[test]
    fn test_all_template_units_resolve() {
        for t in TEMPLATES {
            for p in t.parameters {
                assert!(resolve_unit(p.unit).is_known(), "{}: {} [{}]", t.id, p.symbol, p.unit);
            }
        }
    }

    #[test]
    fn test_template_equations_dimensionally_consistent() {
        for t in TEMPLATES {
            let module = t.instantiate(&BTreeMap::new());
            let mut dims: BTreeMap<String, crate::dimension::Dimension> = module
                .parameters
                .iter()
                .filter_map(|p| p.quantity.dimension.map(|d| (p.symbol.clone(), d)))
                .collect();
            dims.insert("t".to_string(), crate::dimension::Dimension::TIME);
            for e in t.equations {
                let parsed = ParsedEquation::parse(e).unwrap();
                let verdict = check_equation(&parsed, &dims);
                assert!(verdict.is_consistent(), "{}: {} {:?}", t.id, e, verdict.mismatches);
            }
        }
    }

    #[test]
    fn test_dependencies_reference_templates() {
        for t in TEMPLATES {
            for d in t.dependencies {
                assert!(d.template().is_some(), "{} depends on {:?}", t.id, d);
            }
        }
    }

    #[test]
    fn test_instantiate_free_fall() {
        let module = ModuleKind::FreeFall.template().unwrap().instantiate(&BTreeMap::new());
        assert_eq!(module.id, "free_fall");
        let g = module.parameters.iter().find(|p| p.symbol == "g").unwrap();
        assert_eq!(g.role, ParameterRole::Constant);
        assert_eq!(g.source, ParameterSource::ConstantsTable);
        assert_eq!(module.constraints.len(), 1);
        assert!(module.constraints[0].terminal);
        assert_eq!(module.equations[0].kind, EquationKind::Differential);
        assert!(module.outputs.contains(&"v".to_string()));
    }

    #[test]
    fn test_instantiate_keeps_known_values() {
        let mut known = BTreeMap::new();
        known.insert(
            "h".to_string(),
            make_parameter("h", 20.0, "m", ParameterRole::Given, "", ParameterSource::Problem),
        );
        let module = ModuleKind::FreeFall.template().unwrap().instantiate(&known);
        let h = module.parameters.iter().find(|p| p.symbol == "h").unwrap();
        assert_eq!(h.value(), 20.0);
        assert_eq!(h.source, ParameterSource::Problem);
        assert_eq!(h.description, "Height above the ground");
    }

    #[test]
    fn test_instantiate_fills_missing_dimension() {
        let mut bare = make_parameter("h", 5.0, "", ParameterRole::Given, "", ParameterSource::Problem);
        bare.quantity.dimension = None;
        let mut known = BTreeMap::new();
        known.insert("h".to_string(), bare);

        let module = ModuleKind::FreeFall.template().unwrap().instantiate(&known);
        let h = module.parameters.iter().find(|p| p.symbol == "h").unwrap();
        assert_eq!(h.value(), 5.0);
        assert_eq!(h.quantity.dimension, Some(crate::dimension::Dimension::LENGTH));
        assert_eq!(h.quantity.unit, "m");
        assert_eq!(h.source, ParameterSource::Problem);
    }

    #[test]
    fn test_make_parameter_converts_to_si() {
        let p = make_parameter("d", 2.5, "km", ParameterRole::Given, "", ParameterSource::Problem);
        assert_eq!(p.value(), 2500.0);
        assert_eq!(p.quantity.unit, "SI[L]");

        let p = make_parameter("q", 3.0, "furlongs", ParameterRole::Given, "", ParameterSource::Problem);
        assert_eq!(p.value(), 3.0);
        assert!(p.quantity.dimension.is_none());
    }

    #[test]
    fn test_particle_module() {
        let ball = IrObject {
            id: "ball".to_string(),
            name: "Ball".to_string(),
            kind: "sphere".to_string(),
            mass: 2.0,
            radius: 0.1,
            position: [0.0, 5.0, 0.0],
            velocity: [1.0, 0.0, 0.0],
            fixed: false,
            properties: BTreeMap::new(),
        };
        let module = particle_module(&[ball], 9.81);
        assert_eq!(module.equations.len(), 6);
        assert!(module
            .equations
            .iter()
            .any(|e| e.expression == "dball_vy/dt = -g"));
        assert!(module.observables.energy.is_some());
        assert_eq!(module.conservation_laws, vec![ConservationLaw::Energy]);
    }

    #[test]
    fn test_domain_priority_order() {
        assert!(PhysicsDomain::Kinematics.priority() < PhysicsDomain::Dynamics.priority());
        assert!(PhysicsDomain::Energy.priority() < PhysicsDomain::Electromagnetism.priority());
        assert!(PhysicsDomain::Electromagnetism.priority() < PhysicsDomain::Optics.priority());
        assert_eq!(ModuleKind::FreeFall.domain(), PhysicsDomain::Kinematics);
    }
}
