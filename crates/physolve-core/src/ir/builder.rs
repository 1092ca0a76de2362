//! Lowering of a problem model into a [`SystemIr`]
//!
//! One [`Lowering`] handles one conversion. Missing sections are replaced by
//! fallbacks and recorded as warnings; the only fatal outcome is a module
//! dependency cycle.

use crate::config::{IrOptions, SimulationConfig};
use crate::dimension::analysis::check_equation;
use crate::dimension::resolve_unit;
use crate::error::IrError;
use crate::expr::{Comparison, EquationTarget, ParsedEquation};
use crate::ir::detection::{detect, Detection, ProblemContext};
use crate::ir::library::{build_equation, generic_module, make_parameter, particle_module, ModuleKind};
use crate::ir::model::{
    ConstraintSpec, EnvironmentSpec, ModuleSpec, ObjectSpec, ParameterSpec, ProblemModel,
    SystemSpec,
};
use crate::ir::ordering::ModuleGraph;
use crate::ir::types::{
    ComplexityTier, ConservationLaw, Constraint, ConstraintKind, DomainDescriptor, EquationKind,
    Environment, IrMetadata, IrObject, IrSystem, Linearity, Module, Observables,
    OptimizationHints, OutputConfig, Parameter, ParameterRole, ParameterSource,
    PhysicalScale, PhysicsInterpretation, Symmetry, SystemIr, TemporalBehavior,
    ValidationSummary,
};
use crate::simulation::SolverMethod;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

/// Tolerance for declared constraints that do not state one
pub const DEFAULT_CONSTRAINT_TOLERANCE: f64 = 1e-6;

/// System type fragments that mark an oscillatory system
const OSCILLATORY_MARKERS: &[&str] = &["oscillat", "spring", "pendulum", "harmonic", "vibrat", "wave"];

/// Samples per period when a period is known
const STEPS_PER_PERIOD: f64 = 100.0;

const FALLBACK_TITLE: &str = "Untitled problem";
const FALLBACK_DOMAIN: &str = "general";

/// Tolerance implied by a precision keyword
fn precision_tolerance(precision: &str) -> Option<f64> {
    match precision.trim().to_lowercase().as_str() {
        "low" => Some(1e-4),
        "medium" | "normal" => Some(1e-6),
        "high" => Some(1e-8),
        _ => None,
    }
}

/// A single model-to-IR conversion
pub(crate) struct Lowering<'a> {
    model: &'a ProblemModel,
    options: &'a IrOptions,
    warnings: Vec<String>,
}

impl<'a> Lowering<'a> {
    pub(crate) fn new(model: &'a ProblemModel, options: &'a IrOptions) -> Self {
        Self {
            model,
            options,
            warnings: Vec::new(),
        }
    }

    /// Run every lowering step
    ///
    /// Returns the IR and the accumulated warnings. Fails only on a module
    /// dependency cycle.
    pub(crate) fn run(mut self) -> Result<(SystemIr, Vec<String>), IrError> {
        let system = self.system_spec();
        let environment = self.environment(system.environment.as_ref());
        let (problem_parameters, valued) = self.problem_parameters(&system.parameters);
        let objects = self.objects(&system.objects);

        let context = ProblemContext::from_model(self.model);
        let detection = detect(&context, self.options.max_modules);
        tracing::debug!(
            "Detected {} module(s) out of {} candidates",
            detection.selected.len(),
            detection.all.len()
        );

        let modules = self.instantiate_modules(
            &detection,
            &problem_parameters,
            &valued,
            &objects,
            &environment,
            &system.modules,
        );

        let graph = ModuleGraph::from_modules(&modules);
        for (module, dependency) in graph.unknown_dependencies() {
            self.warn(
                IrError::UnknownDependency {
                    module: module.clone(),
                    dependency: dependency.clone(),
                }
                .to_string(),
            );
        }
        let execution_order = graph.execution_order()?;
        let parallel_groups = graph.parallel_groups()?;

        let mut by_id: HashMap<String, Module> =
            modules.into_iter().map(|m| (m.id.clone(), m)).collect();
        let mut modules: Vec<Module> = execution_order
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();

        let mut validation = ValidationSummary::default();
        self.exclude_unsupported_orders(&mut modules, &mut validation);

        let parameters = merge_parameters(problem_parameters, valued, &modules);

        let (constraints, boundary_conditions) = self.constraints(&system.constraints, &modules);

        let state_variables = state_variables(&modules);
        let derived_variables = derived_variables(&modules, &state_variables, &parameters);
        let initial_conditions =
            self.initial_conditions(&state_variables, &parameters, &constraints);

        let conservation_laws: Vec<ConservationLaw> = modules
            .iter()
            .flat_map(|m| m.conservation_laws.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let symmetries = symmetries(&system.system_type, &modules, &conservation_laws);

        let mut observables = Observables::default();
        for module in &modules {
            observables.fill_from(&module.observables);
        }

        let has_nonlinear_equations = modules
            .iter()
            .flat_map(|m| m.equations.iter())
            .any(|e| e.linearity == Linearity::Nonlinear);
        let suggested_method = if has_nonlinear_equations {
            SolverMethod::Adaptive
        } else {
            SolverMethod::Rk4
        };
        let simulation = self.simulation_config(suggested_method);
        let suggested_time_step = parameters
            .iter()
            .find(|p| p.symbol == "period" && p.value() > 0.0)
            .map(|p| (p.value() / STEPS_PER_PERIOD).min(simulation.time_step))
            .unwrap_or(simulation.time_step);

        let output = self.output_config(&state_variables, &modules);
        let physics = interpretation(&modules, &conservation_laws, &detection);
        let metadata = self.metadata(&modules);

        let mut ir = SystemIr {
            metadata,
            system: IrSystem {
                system_type: if system.system_type.trim().is_empty() {
                    FALLBACK_DOMAIN.to_string()
                } else {
                    system.system_type.clone()
                },
                modules,
                objects,
                parameters,
                constraints,
                conservation_laws,
                symmetries,
                environment,
                boundary_conditions,
                initial_conditions,
                observables,
            },
            simulation,
            output,
            optimization: OptimizationHints {
                execution_order,
                parallel_groups,
                suggested_method,
                suggested_time_step,
                state_variables: state_variables.iter().cloned().collect(),
                derived_variables,
                has_nonlinear_equations,
            },
            validation,
            physics,
        };

        self.check_dimensions(&mut ir);
        ir.validation.unresolved_unknowns = unresolved_unknowns(&ir);
        ir.validation.warnings = self.warnings.clone();
        ir.validation.is_valid = ir.validation.errors.is_empty();

        Ok((ir, self.warnings))
    }

    fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    fn system_spec(&mut self) -> SystemSpec {
        match &self.model.system {
            Some(system) => system.clone(),
            None => {
                self.warn("Problem has no system section; using an empty fallback system");
                SystemSpec::default()
            }
        }
    }

    fn metadata(&mut self, modules: &[Module]) -> IrMetadata {
        let source_hash = serde_json::to_string(self.model)
            .map(|json| blake3::hash(json.as_bytes()).to_hex().to_string())
            .unwrap_or_default();
        let first_domain = modules
            .first()
            .map(|m| m.kind.domain().to_string())
            .unwrap_or_else(|| FALLBACK_DOMAIN.to_string());

        let meta = match &self.model.metadata {
            Some(meta) => meta.clone(),
            None => {
                self.warn("Problem has no metadata section; using fallback metadata");
                Default::default()
            }
        };

        IrMetadata {
            id: Uuid::new_v4(),
            problem_id: meta.id,
            title: if meta.title.trim().is_empty() {
                FALLBACK_TITLE.to_string()
            } else {
                meta.title
            },
            description: meta.description,
            domain: meta.domain.unwrap_or(first_domain),
            difficulty: meta.difficulty,
            tags: meta.tags,
            created_at: chrono::Utc::now(),
            source_hash,
        }
    }

    fn environment(&mut self, spec: Option<&EnvironmentSpec>) -> Environment {
        let defaults = Environment::default();
        let Some(spec) = spec else {
            return defaults;
        };
        Environment {
            gravity: spec.gravity.unwrap_or(defaults.gravity),
            air_resistance: spec.air_resistance.unwrap_or(defaults.air_resistance),
            temperature: spec.temperature.unwrap_or(defaults.temperature),
            pressure: spec.pressure.unwrap_or(defaults.pressure),
            medium: spec.medium.clone().unwrap_or(defaults.medium),
        }
    }

    fn convert_parameter(&mut self, spec: &ParameterSpec, source: ParameterSource) -> Parameter {
        let role = spec.role.unwrap_or(if spec.value.is_some() {
            ParameterRole::Given
        } else {
            ParameterRole::Unknown
        });
        let mut parameter = make_parameter(
            spec.symbol.trim(),
            spec.value.unwrap_or(0.0),
            &spec.unit,
            role,
            &spec.description,
            source,
        );
        if spec.unit.trim().is_empty() {
            // No unit stated: let a module supply the dimension
            parameter.quantity.dimension = None;
        } else if !resolve_unit(&spec.unit).is_known() {
            self.warn(format!(
                "Unknown unit '{}' for parameter '{}'; value kept unscaled",
                spec.unit, spec.symbol
            ));
        }
        parameter
    }

    /// Problem parameters in declaration order, plus the symbols whose value is known
    fn problem_parameters(&mut self, specs: &[ParameterSpec]) -> (Vec<Parameter>, BTreeSet<String>) {
        let mut parameters: Vec<Parameter> = Vec::new();
        let mut valued = BTreeSet::new();

        for spec in specs {
            if spec.symbol.trim().is_empty() {
                self.warn("Skipping parameter without a symbol");
                continue;
            }
            let parameter = self.convert_parameter(spec, ParameterSource::Problem);
            let has_value = spec.value.is_some();

            match parameters.iter_mut().find(|p| p.symbol == parameter.symbol) {
                Some(existing) => {
                    if existing.role == ParameterRole::Given && parameter.role != ParameterRole::Given {
                        self.warn(format!(
                            "Parameter '{}' declared twice; keeping the given value",
                            parameter.symbol
                        ));
                        continue;
                    }
                    *existing = parameter;
                }
                None => parameters.push(parameter),
            }
            if has_value {
                valued.insert(spec.symbol.trim().to_string());
            }
        }

        (parameters, valued)
    }

    fn objects(&mut self, specs: &[ObjectSpec]) -> Vec<IrObject> {
        let mut seen = BTreeSet::new();
        let mut objects = Vec::new();
        for (i, spec) in specs.iter().enumerate() {
            let id = if spec.id.trim().is_empty() {
                format!("object_{}", i + 1)
            } else {
                spec.id.trim().to_string()
            };
            if !seen.insert(id.clone()) {
                self.warn(format!("Object '{}' declared twice; keeping the first", id));
                continue;
            }
            objects.push(IrObject {
                name: if spec.name.is_empty() { id.clone() } else { spec.name.clone() },
                kind: if spec.kind.is_empty() { "particle".to_string() } else { spec.kind.clone() },
                mass: spec.mass.unwrap_or(1.0),
                radius: spec.radius.unwrap_or(0.0),
                position: spec.position.unwrap_or([0.0; 3]),
                velocity: spec.velocity.unwrap_or([0.0; 3]),
                fixed: spec.fixed,
                properties: spec.properties.clone(),
                id,
            });
        }
        objects
    }

    fn instantiate_modules(
        &mut self,
        detection: &Detection,
        problem_parameters: &[Parameter],
        valued: &BTreeSet<String>,
        objects: &[IrObject],
        environment: &Environment,
        declared: &[ModuleSpec],
    ) -> Vec<Module> {
        // Only values the problem actually states override template defaults
        let known: BTreeMap<String, Parameter> = problem_parameters
            .iter()
            .filter(|p| valued.contains(&p.symbol))
            .map(|p| (p.symbol.clone(), p.clone()))
            .collect();

        let mut modules: Vec<Module> = detection
            .selected
            .iter()
            .filter_map(|score| {
                let mut module = score.kind.template()?.instantiate(&known);
                module.relevance = score.total;
                Some(module)
            })
            .collect();

        if objects.iter().any(|o| !o.fixed) {
            modules.push(particle_module(objects, environment.gravity));
        }

        for (i, spec) in declared.iter().enumerate() {
            let module = self.custom_module(i, spec);
            if modules.iter().any(|m| m.id == module.id) {
                self.warn(IrError::DuplicateModule(module.id).to_string());
                continue;
            }
            modules.push(module);
        }

        if modules.is_empty() {
            self.warn("No physics module matched the problem; using the generic fallback module");
            modules.push(generic_module(problem_parameters));
        }

        for module in &modules {
            tracing::debug!(
                "Module '{}' ({} equations, relevance {:.2})",
                module.id,
                module.equations.len(),
                module.relevance
            );
        }

        modules
    }

    fn custom_module(&mut self, index: usize, spec: &ModuleSpec) -> Module {
        let id = if spec.id.trim().is_empty() {
            format!("custom_{}", index + 1)
        } else {
            spec.id.trim().to_string()
        };

        let parameters: Vec<Parameter> = spec
            .parameters
            .iter()
            .filter(|p| !p.symbol.trim().is_empty())
            .map(|p| self.convert_parameter(p, ParameterSource::Module(id.clone())))
            .collect();

        let parsed: Vec<Option<ParsedEquation>> = spec
            .equations
            .iter()
            .map(|e| ParsedEquation::parse(e).ok())
            .collect();
        for (expression, eq) in spec.equations.iter().zip(&parsed) {
            if eq.is_none() {
                self.warn(format!(
                    "Equation '{}' in module '{}' could not be parsed",
                    expression, id
                ));
            }
        }

        let state: BTreeSet<String> = parsed
            .iter()
            .flatten()
            .filter_map(|eq| match &eq.target {
                EquationTarget::Derivative { variable, .. } => Some(variable.clone()),
                _ => None,
            })
            .collect();
        let mut outputs: BTreeSet<String> = state.clone();
        outputs.extend(parsed.iter().flatten().filter_map(|eq| match &eq.target {
            EquationTarget::Assignment { variable } => Some(variable.clone()),
            _ => None,
        }));

        let equations = spec
            .equations
            .iter()
            .enumerate()
            .map(|(i, e)| build_equation(format!("{}_eq{}", id, i + 1), e, &state))
            .collect();

        let mut conservation_laws = Vec::new();
        for name in &spec.conservation_laws {
            match ConservationLaw::from_name(name) {
                Some(law) => conservation_laws.push(law),
                None => self.warn(format!(
                    "Unknown conservation law '{}' in module '{}'",
                    name, id
                )),
            }
        }

        Module {
            name: if spec.module_type.is_empty() {
                id.clone()
            } else {
                spec.module_type.clone()
            },
            kind: ModuleKind::Custom,
            parameters,
            equations,
            dependencies: spec.dependencies.clone(),
            outputs: outputs.into_iter().collect(),
            conservation_laws,
            assumptions: Vec::new(),
            limitations: Vec::new(),
            complexity: ComplexityTier::Intermediate,
            domain: DomainDescriptor {
                spatial_dimensions: 1,
                temporal: if state.is_empty() {
                    TemporalBehavior::Static
                } else {
                    TemporalBehavior::Dynamic
                },
                scale: PhysicalScale::Macroscopic,
            },
            observables: Observables {
                energy: spec.energy.clone(),
                momentum: spec.momentum.clone(),
                angular_momentum: None,
            },
            constraints: Vec::new(),
            relevance: 1.0,
            id,
        }
    }

    /// Drop equations above second order, recording a validation error for each
    fn exclude_unsupported_orders(&mut self, modules: &mut [Module], validation: &mut ValidationSummary) {
        for module in modules.iter_mut() {
            let mut rejected = Vec::new();
            module.equations.retain(|eq| {
                if eq.kind == EquationKind::Differential && eq.order > 2 {
                    rejected.push(IrError::UnsupportedOrder {
                        equation: eq.id.clone(),
                        order: eq.order,
                    });
                    false
                } else {
                    true
                }
            });
            for error in rejected {
                self.warn(format!("{}; equation excluded", error));
                validation.errors.push(error.to_string());
            }
        }
    }

    fn constraints(
        &mut self,
        declared: &[ConstraintSpec],
        modules: &[Module],
    ) -> (Vec<Constraint>, Vec<Constraint>) {
        let mut all: Vec<Constraint> = declared
            .iter()
            .enumerate()
            .map(|(i, spec)| Constraint {
                id: spec.id.clone().unwrap_or_else(|| format!("constraint_{}", i + 1)),
                kind: spec.kind,
                expression: spec.expression.clone(),
                tolerance: spec.tolerance.unwrap_or(DEFAULT_CONSTRAINT_TOLERANCE),
                terminal: spec.terminal,
                description: spec.description.clone(),
                source: "problem".to_string(),
            })
            .collect();
        all.extend(modules.iter().flat_map(|m| m.constraints.iter().cloned()));

        let mut constraints = Vec::new();
        let mut boundaries = Vec::new();
        for constraint in all {
            let parses = match constraint.kind {
                ConstraintKind::Initial => matches!(
                    ParsedEquation::parse(&constraint.expression).map(|eq| eq.target),
                    Ok(EquationTarget::Assignment { .. })
                ),
                _ => Comparison::parse(&constraint.expression).is_ok(),
            };
            if !parses {
                self.warn(format!(
                    "Constraint '{}' has an unsupported expression '{}'; skipped",
                    constraint.id, constraint.expression
                ));
                continue;
            }
            match constraint.kind {
                ConstraintKind::Boundary => boundaries.push(constraint),
                _ => constraints.push(constraint),
            }
        }
        (constraints, boundaries)
    }

    fn initial_conditions(
        &mut self,
        state: &BTreeSet<String>,
        parameters: &[Parameter],
        constraints: &[Constraint],
    ) -> BTreeMap<String, f64> {
        let values: BTreeMap<String, f64> = parameters
            .iter()
            .map(|p| (p.symbol.clone(), p.value()))
            .collect();
        let mut initial: BTreeMap<String, f64> = state
            .iter()
            .map(|s| (s.clone(), values.get(s).copied().unwrap_or(0.0)))
            .collect();

        for constraint in constraints.iter().filter(|c| c.kind == ConstraintKind::Initial) {
            let Ok(eq) = ParsedEquation::parse(&constraint.expression) else {
                continue;
            };
            let EquationTarget::Assignment { variable } = eq.target else {
                continue;
            };
            let mut table = values.clone();
            table.extend(initial.iter().map(|(k, v)| (k.clone(), *v)));
            match eq.rhs.eval(&table) {
                Ok(value) => {
                    initial.insert(variable, value);
                }
                Err(e) => self.warn(format!(
                    "Initial condition '{}' could not be evaluated: {}",
                    constraint.expression, e
                )),
            }
        }
        initial
    }

    fn simulation_config(&mut self, suggested: SolverMethod) -> SimulationConfig {
        let mut config = SimulationConfig::default()
            .with_duration(self.options.default_duration)
            .with_time_step(self.options.default_time_step)
            .with_method(suggested);

        let Some(spec) = self.model.simulation.clone() else {
            return config;
        };

        match spec.duration {
            Some(d) if d > 0.0 && d.is_finite() => config.duration = d,
            Some(d) => self.warn(format!("Ignoring invalid duration {}", d)),
            None => {}
        }
        match spec.time_step {
            Some(dt) if dt > 0.0 && dt.is_finite() => config.time_step = dt,
            Some(dt) => self.warn(format!("Ignoring invalid time step {}", dt)),
            None => {}
        }
        if let Some(solver) = spec.solver.as_deref() {
            match solver.parse::<SolverMethod>() {
                Ok(method) => config.method = method,
                Err(e) => self.warn(format!("{}; using {}", e, suggested)),
            }
        }
        if let Some(precision) = spec.precision.as_deref() {
            match precision_tolerance(precision) {
                Some(tolerance) => config.tolerance = tolerance,
                None => self.warn(format!("Unknown precision '{}'", precision)),
            }
        }
        config
    }

    fn output_config(&self, state: &BTreeSet<String>, modules: &[Module]) -> OutputConfig {
        let spec = self.model.output.clone().unwrap_or_default();
        let variables = if spec.variables.is_empty() {
            let mut variables: Vec<String> = state.iter().cloned().collect();
            for output in modules.iter().flat_map(|m| m.outputs.iter()) {
                if !variables.contains(output) {
                    variables.push(output.clone());
                }
            }
            variables
        } else {
            spec.variables
        };
        OutputConfig {
            variables,
            plots: spec.plots,
        }
    }

    fn check_dimensions(&mut self, ir: &mut SystemIr) {
        let dims = ir.symbol_dimensions();
        let mut mismatches = Vec::new();
        for module in &ir.system.modules {
            for equation in &module.equations {
                let Ok(parsed) = ParsedEquation::parse(&equation.expression) else {
                    continue;
                };
                for mismatch in check_equation(&parsed, &dims).mismatches {
                    mismatches.push(format!("{} ({}): {}", equation.id, equation.expression, mismatch));
                }
            }
        }
        for mismatch in &mismatches {
            self.warn(format!("Dimensional mismatch in {}", mismatch));
        }
        ir.validation.dimensionally_consistent = mismatches.is_empty();
        ir.validation.dimension_mismatches = mismatches;
    }
}

/// Union of problem and module parameters
///
/// A value the problem stated is never replaced. Otherwise module metadata
/// wins, and a module value fills in for a problem unknown.
fn merge_parameters(
    problem: Vec<Parameter>,
    mut valued: BTreeSet<String>,
    modules: &[Module],
) -> Vec<Parameter> {
    let mut merged = problem;
    let mut index: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, p)| (p.symbol.clone(), i))
        .collect();

    for module in modules {
        for incoming in &module.parameters {
            match index.get(&incoming.symbol) {
                Some(&i) => {
                    let existing = &mut merged[i];
                    if !valued.contains(&incoming.symbol) {
                        existing.quantity.value = incoming.quantity.value;
                        existing.source = incoming.source.clone();
                    }
                    if existing.quantity.dimension.is_none() && incoming.quantity.dimension.is_some() {
                        existing.quantity.unit = incoming.quantity.unit.clone();
                        existing.quantity.dimension = incoming.quantity.dimension;
                    }
                    if existing.role != ParameterRole::Given {
                        existing.role = incoming.role;
                    }
                    if !incoming.description.is_empty() {
                        existing.description = incoming.description.clone();
                    }
                    if !incoming.dependencies.is_empty() {
                        existing.dependencies = incoming.dependencies.clone();
                    }
                }
                None => {
                    index.insert(incoming.symbol.clone(), merged.len());
                    merged.push(incoming.clone());
                }
            }
            if incoming.role != ParameterRole::Unknown {
                valued.insert(incoming.symbol.clone());
            }
        }
    }

    merged
}

/// Every variable some equation differentiates
fn state_variables(modules: &[Module]) -> BTreeSet<String> {
    modules
        .iter()
        .flat_map(|m| m.equations.iter())
        .filter_map(|e| match ParsedEquation::parse(&e.expression).ok()?.target {
            EquationTarget::Derivative { variable, .. } => Some(variable),
            _ => None,
        })
        .collect()
}

/// Assignment targets the simulator recomputes after each step
fn derived_variables(
    modules: &[Module],
    state: &BTreeSet<String>,
    parameters: &[Parameter],
) -> Vec<String> {
    let fixed: BTreeSet<&str> = parameters
        .iter()
        .filter(|p| p.is_fixed())
        .map(|p| p.symbol.as_str())
        .collect();
    let mut derived = Vec::new();
    for equation in modules.iter().flat_map(|m| m.equations.iter()) {
        let Ok(parsed) = ParsedEquation::parse(&equation.expression) else {
            continue;
        };
        if let EquationTarget::Assignment { variable } = parsed.target {
            if !state.contains(&variable)
                && !fixed.contains(variable.as_str())
                && !derived.contains(&variable)
            {
                derived.push(variable);
            }
        }
    }
    derived
}

fn symmetries(
    system_type: &str,
    modules: &[Module],
    laws: &[ConservationLaw],
) -> Vec<Symmetry> {
    let mut symmetries = BTreeSet::new();
    for law in laws {
        match law {
            ConservationLaw::Energy => {
                symmetries.insert(Symmetry::TimeTranslation);
            }
            ConservationLaw::Momentum => {
                symmetries.insert(Symmetry::SpatialTranslation);
            }
            ConservationLaw::AngularMomentum => {
                symmetries.insert(Symmetry::Rotational);
            }
            ConservationLaw::Charge | ConservationLaw::Mass => {}
        }
    }

    let system_type = system_type.to_lowercase();
    let oscillatory = OSCILLATORY_MARKERS.iter().any(|m| system_type.contains(m))
        || modules
            .iter()
            .any(|m| m.domain.temporal == TemporalBehavior::Periodic);
    if oscillatory {
        symmetries.insert(Symmetry::TimeTranslation);
        symmetries.insert(Symmetry::Reflection);
    }

    symmetries.into_iter().collect()
}

fn interpretation(
    modules: &[Module],
    laws: &[ConservationLaw],
    detection: &Detection,
) -> PhysicsInterpretation {
    let mut domains: Vec<String> = Vec::new();
    let mut principles: Vec<String> = Vec::new();
    let mut assumptions: Vec<String> = Vec::new();
    let mut limitations: Vec<String> = Vec::new();

    for module in modules {
        push_unique(&mut domains, module.kind.domain().to_string());
        push_unique(&mut principles, module.name.clone());
        for a in &module.assumptions {
            push_unique(&mut assumptions, a.clone());
        }
        for l in &module.limitations {
            push_unique(&mut limitations, l.clone());
        }
    }
    for law in laws {
        principles.push(format!("Conservation of {}", law.to_string().replace('_', " ")));
    }

    let module_relevance = detection
        .all
        .iter()
        .filter(|s| s.total > 0.0)
        .map(|s| (s.kind.id().to_string(), s.total))
        .collect();

    let complexity = modules
        .iter()
        .map(|m| m.complexity)
        .max()
        .unwrap_or(ComplexityTier::Basic);

    let summary = format!(
        "{} module(s) across {}: {}",
        modules.len(),
        domains.join(", "),
        modules
            .iter()
            .map(|m| m.id.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    PhysicsInterpretation {
        domains,
        principles,
        assumptions,
        limitations,
        complexity,
        module_relevance,
        summary,
    }
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

/// Unknowns no equation or object state determines
fn unresolved_unknowns(ir: &SystemIr) -> Vec<String> {
    let state = &ir.optimization.state_variables;
    let derived = &ir.optimization.derived_variables;
    ir.system
        .parameters
        .iter()
        .filter(|p| p.role == ParameterRole::Unknown)
        .filter(|p| p.symbol != "t")
        .filter(|p| !state.contains(&p.symbol) && !derived.contains(&p.symbol))
        .map(|p| p.symbol.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::model::{ProblemMetadata, SimulationSpec};

    fn lower(model: &ProblemModel) -> (SystemIr, Vec<String>) {
        Lowering::new(model, &IrOptions::default()).run().unwrap()
    }

    const FREE_FALL_TEXT: &str =
        "A ball is dropped from a height of 20 m. Find its speed when it hits the ground.";

    fn system(system_type: &str, parameters: Vec<ParameterSpec>) -> ProblemModel {
        described(system_type, "", parameters)
    }

    fn described(system_type: &str, text: &str, parameters: Vec<ParameterSpec>) -> ProblemModel {
        ProblemModel {
            metadata: (!text.is_empty()).then(|| ProblemMetadata {
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

    #[test]
    fn test_given_value_survives_merge() {
        let model = described(
            "free_fall",
            FREE_FALL_TEXT,
            vec![
                ParameterSpec::given("h", 20.0, "m"),
                ParameterSpec::given("g", 9.8, "m/s^2"),
                ParameterSpec::unknown("v", "m/s"),
            ],
        );
        let (ir, _) = lower(&model);

        let h = ir.parameter("h").unwrap();
        assert_eq!(h.value(), 20.0);
        assert_eq!(h.role, ParameterRole::Given);
        assert_eq!(h.source, ParameterSource::Problem);
        assert_eq!(ir.parameter("g").unwrap().value(), 9.8);
        // Template-only parameter completed from its default
        assert_eq!(ir.parameter("m").unwrap().value(), 1.0);
        assert_eq!(ir.system.initial_conditions.get("h"), Some(&20.0));
    }

    #[test]
    fn test_spring_stiffness_defaulted() {
        let model = described(
            "harmonic_oscillator",
            "A 1 kg block on a frictionless surface is attached to a spring and released.",
            vec![
                ParameterSpec::given("m", 2.0, "kg"),
                ParameterSpec::unknown("k", "N/m"),
                ParameterSpec::given("x", 0.1, "m"),
                ParameterSpec::unknown("v", "m/s"),
            ],
        );
        let (ir, _) = lower(&model);
        assert!(ir.module("spring_oscillator").is_some());
        let k = ir.parameter("k").unwrap();
        assert_eq!(k.value(), 100.0);
        assert_eq!(ir.parameter("m").unwrap().value(), 2.0);
        assert!(ir.system.symmetries.contains(&Symmetry::Reflection));
        assert!(ir.system.symmetries.contains(&Symmetry::TimeTranslation));
    }

    #[test]
    fn test_unitless_parameter_takes_module_dimension() {
        let model = described(
            "free_fall",
            FREE_FALL_TEXT,
            vec![ParameterSpec::given("h", 5.0, ""), ParameterSpec::unknown("v", "m/s")],
        );
        let (ir, _) = lower(&model);
        let h = ir.parameter("h").unwrap();
        assert_eq!(h.quantity.dimension, Some(crate::dimension::Dimension::LENGTH));
        assert!(ir.validation.dimensionally_consistent);
    }

    #[test]
    fn test_fallback_sections() {
        let (ir, warnings) = lower(&ProblemModel::default());
        assert_eq!(ir.metadata.title, FALLBACK_TITLE);
        assert_eq!(ir.system.modules.len(), 1);
        assert_eq!(ir.system.modules[0].kind, ModuleKind::Generic);
        assert!(warnings.iter().any(|w| w.contains("generic fallback")));
        assert!(warnings.iter().any(|w| w.contains("no system section")));
    }

    #[test]
    fn test_third_order_equation_excluded() {
        let mut model = system("custom", vec![ParameterSpec::given("x", 1.0, "m")]);
        if let Some(system) = model.system.as_mut() {
            system.modules.push(ModuleSpec {
                id: "jerk".to_string(),
                equations: vec!["d3x/dt3 = -x".to_string(), "dy/dt = 1".to_string()],
                ..Default::default()
            });
        }
        let (ir, _) = lower(&model);

        let module = ir.module("jerk").unwrap();
        assert_eq!(module.equations.len(), 1);
        assert!(!ir.validation.is_valid);
        assert!(ir.validation.errors[0].contains("order 3"));
    }

    #[test]
    fn test_declared_cycle_is_fatal() {
        let mut model = system("custom", Vec::new());
        if let Some(system) = model.system.as_mut() {
            system.modules = vec![
                ModuleSpec {
                    id: "a".to_string(),
                    dependencies: vec!["b".to_string()],
                    ..Default::default()
                },
                ModuleSpec {
                    id: "b".to_string(),
                    dependencies: vec!["a".to_string()],
                    ..Default::default()
                },
            ];
        }
        let err = Lowering::new(&model, &IrOptions::default()).run().unwrap_err();
        assert!(matches!(err, IrError::CyclicDependency { .. }));
    }

    #[test]
    fn test_simulation_settings() {
        let mut model = described(
            "free_fall",
            FREE_FALL_TEXT,
            vec![ParameterSpec::given("h", 20.0, "m"), ParameterSpec::unknown("v", "m/s")],
        );
        model.simulation = Some(SimulationSpec {
            duration: Some(3.0),
            time_step: Some(-1.0),
            solver: Some("euler".to_string()),
            precision: Some("high".to_string()),
        });
        let (ir, warnings) = lower(&model);

        assert_eq!(ir.simulation.duration, 3.0);
        assert_eq!(ir.simulation.time_step, IrOptions::default().default_time_step);
        assert_eq!(ir.simulation.method, SolverMethod::Euler);
        assert_eq!(ir.simulation.tolerance, 1e-8);
        assert!(warnings.iter().any(|w| w.contains("time step")));
    }

    #[test]
    fn test_initial_constraint_applied() {
        let mut model = system("custom", vec![ParameterSpec::given("v0", 3.0, "m/s")]);
        if let Some(system) = model.system.as_mut() {
            system.modules.push(ModuleSpec {
                id: "drift".to_string(),
                equations: vec!["dx/dt = v".to_string(), "dv/dt = 0".to_string()],
                ..Default::default()
            });
            system.constraints.push(ConstraintSpec {
                kind: ConstraintKind::Initial,
                expression: "v = 2*v0".to_string(),
                ..Default::default()
            });
        }
        let (ir, _) = lower(&model);
        assert_eq!(ir.system.initial_conditions.get("v"), Some(&6.0));
        assert_eq!(ir.system.initial_conditions.get("x"), Some(&0.0));
    }

    #[test]
    fn test_metadata_and_interpretation() {
        let mut model = described(
            "free_fall",
            FREE_FALL_TEXT,
            vec![ParameterSpec::given("h", 20.0, "m"), ParameterSpec::unknown("v", "m/s")],
        );
        if let Some(meta) = model.metadata.as_mut() {
            meta.title = "Dropped ball".to_string();
        }
        let (ir, _) = lower(&model);
        assert_eq!(ir.metadata.title, "Dropped ball");
        assert_eq!(ir.metadata.source_hash.len(), 64);
        assert!(ir.physics.module_relevance.contains_key("free_fall"));
        assert!(ir.physics.principles.iter().any(|p| p == "Conservation of energy"));
        assert_eq!(ir.optimization.execution_order[0], "free_fall");
        assert!(ir
            .system
            .boundary_conditions
            .iter()
            .any(|c| c.id == "free_fall_ground" && c.terminal));
    }
}
