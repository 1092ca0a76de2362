//! E2E scenarios for the IR -> simulation -> validation pipeline

use physolve_core::config::{PhysicsValidatorConfig, ResultValidatorConfig, SimulationConfig};
use physolve_core::ir::model::{ModuleSpec, ParameterSpec, ProblemMetadata, ProblemModel, SystemSpec};
use physolve_core::ir::{ConservationLaw, IrBuilder, ModuleKind, SystemIr};
use physolve_core::simulation::{SimulationResult, Simulator, SolverMethod, TerminationReason};
use physolve_core::validation::{PhysicsValidator, ResultValidator};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn problem(text: &str, system_type: &str, parameters: Vec<ParameterSpec>) -> ProblemModel {
    ProblemModel {
        metadata: Some(ProblemMetadata {
            description: text.to_string(),
            ..Default::default()
        }),
        system: Some(SystemSpec {
            system_type: system_type.to_string(),
            parameters,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn with_modules(modules: Vec<ModuleSpec>, parameters: Vec<ParameterSpec>) -> ProblemModel {
    ProblemModel {
        system: Some(SystemSpec {
            system_type: "custom".to_string(),
            parameters,
            modules,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn module(id: &str, equations: &[&str], dependencies: &[&str]) -> ModuleSpec {
    ModuleSpec {
        id: id.to_string(),
        equations: equations.iter().map(|e| e.to_string()).collect(),
        dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        ..Default::default()
    }
}

async fn build(model: &ProblemModel) -> SystemIr {
    let result = IrBuilder::new().convert(model).await;
    assert!(result.success, "{:?}", result.errors);
    result.ir.expect("successful conversion carries an IR")
}

async fn oscillator_run() -> (SystemIr, SimulationResult) {
    let ir = build(&problem(
        "A 2 kg block on a frictionless surface is attached to a spring and released.",
        "harmonic_oscillator",
        vec![
            ParameterSpec::given("m", 2.0, "kg"),
            ParameterSpec::unknown("k", "N/m"),
            ParameterSpec::given("x", 0.1, "m"),
            ParameterSpec::unknown("v", "m/s"),
        ],
    ))
    .await;
    let config = SimulationConfig::default()
        .with_method(SolverMethod::Rk4)
        .with_time_step(0.01)
        .with_duration(10.0);
    let result = Simulator::new(config).run(&ir).await;
    (ir, result)
}

#[tokio::test]
async fn e2e_free_fall_reaches_ground_speed() {
    init_tracing();
    let ir = build(&problem(
        "A ball is dropped from a height of 20 m. Find its speed when it hits the ground.",
        "free_fall",
        vec![
            ParameterSpec::given("h", 20.0, "m"),
            ParameterSpec::given("g", 9.8, "m/s^2"),
            ParameterSpec::unknown("v", "m/s"),
            ParameterSpec::unknown("t", "s"),
        ],
    ))
    .await;
    assert_eq!(ir.system.modules[0].kind, ModuleKind::FreeFall);

    let config = SimulationConfig::default()
        .with_method(SolverMethod::Rk4)
        .with_duration(3.0);
    let result = Simulator::new(config).run(&ir).await;

    assert!(result.success, "{:?}", result.errors);
    let v = result.final_state.value("v").unwrap();
    let expected = (2.0_f64 * 9.8 * 20.0).sqrt();
    assert!((v - expected).abs() / expected < 0.05, "v = {}", v);
    assert!(matches!(
        result.metrics.termination,
        TerminationReason::BoundaryReached(_)
    ));
}

#[tokio::test]
async fn e2e_oscillator_conserves_energy() {
    init_tracing();
    let (ir, result) = oscillator_run().await;
    assert!(ir.conserves(ConservationLaw::Energy));
    assert_eq!(result.metrics.termination, TerminationReason::Completed);

    let energies: Vec<f64> = result.time_series.iter().filter_map(|p| p.energy).collect();
    assert_eq!(energies.len(), result.time_series.len());
    let initial = energies[0];
    assert!((initial - 0.5).abs() < 1e-9);
    let drift = energies
        .iter()
        .map(|e| (e - initial).abs() / initial)
        .fold(0.0, f64::max);
    assert!(drift < 0.01, "energy drift {}", drift);

    let report = PhysicsValidator::new(PhysicsValidatorConfig::default()).validate(&result, Some(&ir));
    let conservation = report.conservation.as_ref().unwrap();
    assert!(conservation.passed, "{:?}", conservation.details);
    let energy = report
        .conservation_laws
        .iter()
        .find(|audit| audit.law == ConservationLaw::Energy)
        .unwrap();
    assert!(energy.satisfied);
    assert!(energy.max_deviation < 0.01);
}

#[tokio::test]
async fn e2e_conservation_only_weighting() {
    let (ir, result) = oscillator_run().await;
    let validator = PhysicsValidator::new(PhysicsValidatorConfig::conservation_only());
    let report = validator.validate(&result, Some(&ir));

    let conservation = report.conservation.as_ref().unwrap();
    assert_eq!(report.overall_score, conservation.score);
    assert!(report.constraints.is_none());
    assert!(report.stability.is_none());
    assert!(report.dimensions.is_none());
    assert!(report.causality.is_none());
}

#[tokio::test]
async fn e2e_oscillator_result_quality() {
    let (_, result) = oscillator_run().await;
    let report = ResultValidator::new(ResultValidatorConfig::default()).validate(&result);

    assert!(report.success, "{:?}", report.warnings);
    assert!(report.overall_score > 0.9);
    assert!(report.completeness.passed);
    assert!(report.anomaly_list.is_empty());
}

#[tokio::test]
async fn e2e_time_is_monotonic() {
    let (ir, result) = oscillator_run().await;
    assert!(result.time_series.windows(2).all(|w| w[1].time >= w[0].time));
    assert!(result.events.windows(2).all(|w| w[1].time >= w[0].time));

    let report = PhysicsValidator::new(PhysicsValidatorConfig::default()).validate(&result, Some(&ir));
    assert!(report.causality.unwrap().passed);
}

#[tokio::test]
async fn e2e_dependencies_order_modules() {
    let model = with_modules(
        vec![
            module("c", &[], &["b"]),
            module("b", &[], &["a"]),
            module("a", &[], &[]),
        ],
        Vec::new(),
    );
    let ir = build(&model).await;

    assert_eq!(ir.optimization.execution_order, vec!["a", "b", "c"]);
    let ids: Vec<&str> = ir.system.modules.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn e2e_dependency_cycle_fails_conversion() {
    let model = with_modules(
        vec![module("a", &[], &["b"]), module("b", &[], &["a"])],
        Vec::new(),
    );
    let result = IrBuilder::new().convert(&model).await;

    assert!(!result.success);
    assert!(result.ir.is_none());
    assert!(result.errors[0].contains("Cyclic dependency"));
}

#[tokio::test]
async fn e2e_unresolvable_symbol_degrades_to_zero() {
    init_tracing();
    let model = with_modules(
        vec![module("model", &["dx/dt = ghost"], &[])],
        vec![ParameterSpec::given("x", 1.0, "")],
    );
    let ir = build(&model).await;
    let result = Simulator::new(SimulationConfig::default()).run(&ir).await;

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.final_state.value("x"), Some(1.0));
    assert!(result.warnings.iter().any(|w| w.contains("ghost")));
}

#[tokio::test]
async fn e2e_unmatched_problem_uses_generic_module() {
    let model = problem(
        "Tabulate the widgets.",
        "inventory",
        vec![
            ParameterSpec::given("widgets", 3.0, ""),
            ParameterSpec::unknown("bins", ""),
        ],
    );
    let result = IrBuilder::new().convert(&model).await;

    assert!(result.success, "{:?}", result.errors);
    let ir = result.ir.unwrap();
    assert_eq!(ir.system.modules.len(), 1);
    assert_eq!(ir.system.modules[0].kind, ModuleKind::Generic);
    assert!(result.warnings.iter().any(|w| w.contains("generic fallback")));
}
