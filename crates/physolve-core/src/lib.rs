//! Physolve Core - IR construction, numerical simulation and physics validation
//!
//! Physolve Core turns a declarative physics problem into something that can
//! be simulated, then checks whether the simulation obeyed physics.
//!
//! # Architecture
//!
//! The engine is a pipeline of independent stages:
//!
//! 1. **IR Builder** (`ir`): problem model to a module-based system IR
//! 2. **Simulator** (`simulation`): Euler, RK4 or adaptive integration of the IR
//! 3. **Event Detector** (`events`): collisions, boundary crossings, state changes
//! 4. **State Monitor** (`monitor`): rolling history, anomalies, reports
//! 5. **Validators** (`validation`): physics audit and result-quality audit
//!
//! Supporting modules: `dimension` (dimensions and units), `expr` (formula
//! parsing and evaluation), `config`, `error`, `stats` and `types`.
//!
//! # Quick Start
//!
//! ```
//! use physolve_core::config::PhysicsValidatorConfig;
//! use physolve_core::ir::model::{ParameterSpec, ProblemMetadata, ProblemModel, SystemSpec};
//! use physolve_core::ir::IrBuilder;
//! use physolve_core::simulation::Simulator;
//! use physolve_core::validation::PhysicsValidator;
//!
//! let model = ProblemModel {
//!     metadata: Some(ProblemMetadata {
//!         description: "A ball is dropped from a height of 20 m.".to_string(),
//!         ..Default::default()
//!     }),
//!     system: Some(SystemSpec {
//!         system_type: "free_fall".to_string(),
//!         parameters: vec![
//!             ParameterSpec::given("h", 20.0, "m"),
//!             ParameterSpec::given("g", 9.8, "m/s^2"),
//!             ParameterSpec::unknown("v", "m/s"),
//!         ],
//!         ..Default::default()
//!     }),
//!     ..Default::default()
//! };
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! runtime.block_on(async {
//!     let conversion = IrBuilder::new().convert(&model).await;
//!     let ir = conversion.ir.unwrap();
//!
//!     let result = Simulator::for_ir(&ir).run(&ir).await;
//!     println!("v = {:?}", result.final_state.value("v"));
//!
//!     let report = PhysicsValidator::new(PhysicsValidatorConfig::default())
//!         .validate(&result, Some(&ir));
//!     println!("Physics score: {:.2}", report.overall_score);
//! });
//! ```
//!
//! Stage entry points never return `Err`: failures are folded into the
//! `errors` and `warnings` of a structured, scored result.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, clippy::all)]

pub mod config;
pub mod dimension;
pub mod error;
pub mod events;
pub mod expr;
pub mod ir;
pub mod monitor;
pub mod simulation;
pub mod stats;
pub mod types;
pub mod validation;

// Re-exports for convenience
pub use config::EngineConfig;
pub use dimension::Dimension;
pub use error::{PhysolveError, Result};
pub use events::{CompositeDetector, Event, EventType};
pub use ir::{IrBuilder, ProblemModel, SystemIr};
pub use monitor::StateMonitor;
pub use simulation::{SimulationResult, Simulator, SolverMethod};
pub use validation::{PhysicsValidator, ResultValidator};

/// Version of Physolve Core
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the crate
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert_eq!(NAME, "physolve-core");
    }
}
