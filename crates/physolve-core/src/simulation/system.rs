//! Executable form of the IR equations
//!
//! Compiles every module equation once into first-order rates and derived
//! assignments. Evaluation never fails: an equation whose right-hand side
//! cannot be evaluated contributes a zero derivative and is reported once.

use crate::expr::{EquationTarget, Expr, ParsedEquation, SymbolTable};
use crate::ir::{ParameterRole, SystemIr};
use crate::simulation::state::{Observed, SimulationState};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// Suffix of the auxiliary state introduced for second-order equations
pub const AUX_SUFFIX: &str = "_dot";

/// `d(variable)/dt = expr`
#[derive(Debug, Clone)]
struct Rate {
    variable: String,
    /// `None` when the right-hand side could not be parsed
    expr: Option<Expr>,
    source: String,
}

/// `variable = expr`, re-evaluated whenever the state changes
#[derive(Debug, Clone)]
struct Assignment {
    variable: String,
    expr: Expr,
    source: String,
}

/// Evaluation failures, each reported once per run
#[derive(Debug, Default)]
struct Diagnostics {
    seen: BTreeSet<String>,
    pending: Vec<String>,
}

/// Symbol values plus the current time
struct Scope<'a> {
    time: f64,
    values: &'a BTreeMap<String, f64>,
}

impl SymbolTable for Scope<'_> {
    fn lookup(&self, name: &str) -> Option<f64> {
        self.values
            .get(name)
            .copied()
            .or_else(|| (name == "t").then_some(self.time))
    }
}

/// The IR equations ready for integration
#[derive(Debug)]
pub struct EquationSystem {
    rates: Vec<Rate>,
    assignments: Vec<Assignment>,
    energy: Option<Expr>,
    momentum: Option<Expr>,
    angular_momentum: Option<Expr>,
    /// Auxiliary states and their initial values
    auxiliary: BTreeMap<String, f64>,
    warnings: Vec<String>,
    diagnostics: Mutex<Diagnostics>,
}

impl EquationSystem {
    /// Compile every equation of the IR
    ///
    /// Second-order equations are reduced to first order. When two
    /// equations define the same derivative, the first in execution order
    /// wins.
    pub fn compile(ir: &SystemIr) -> Self {
        let mut warnings = Vec::new();
        let mut first_order: Vec<Rate> = Vec::new();
        let mut second_order: Vec<Rate> = Vec::new();
        let mut assignments: Vec<Assignment> = Vec::new();

        let fixed: BTreeSet<&str> = ir
            .system
            .parameters
            .iter()
            .filter(|p| p.is_fixed())
            .map(|p| p.symbol.as_str())
            .collect();

        for module in &ir.system.modules {
            for equation in &module.equations {
                let parsed = match ParsedEquation::parse(&equation.expression) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warnings.push(format!(
                            "Equation '{}' ({}) could not be parsed: {}",
                            equation.id, equation.expression, e
                        ));
                        // Keep the derivative slot so the variable is still integrated
                        if let Some(variable) = derivative_target(&equation.expression) {
                            first_order.push(Rate {
                                variable,
                                expr: None,
                                source: equation.id.clone(),
                            });
                        }
                        continue;
                    }
                };

                match parsed.target {
                    EquationTarget::Derivative { variable, order: 1 } => first_order.push(Rate {
                        variable,
                        expr: Some(parsed.rhs),
                        source: equation.id.clone(),
                    }),
                    EquationTarget::Derivative { variable, order: 2 } => second_order.push(Rate {
                        variable,
                        expr: Some(parsed.rhs),
                        source: equation.id.clone(),
                    }),
                    EquationTarget::Derivative { order, .. } => warnings.push(format!(
                        "Equation '{}' has order {}; skipped",
                        equation.id, order
                    )),
                    EquationTarget::Assignment { variable } => {
                        if !fixed.contains(variable.as_str()) {
                            assignments.push(Assignment {
                                variable,
                                expr: parsed.rhs,
                                source: equation.id.clone(),
                            });
                        }
                    }
                    EquationTarget::Relation => {
                        tracing::debug!("Relation '{}' is not integrated", equation.id);
                    }
                }
            }
        }

        let mut rates: Vec<Rate> = Vec::new();
        for rate in first_order {
            push_rate(&mut rates, rate, &mut warnings);
        }

        let mut auxiliary = BTreeMap::new();
        for rate in second_order {
            // dx/dt = y already present: the second derivative drives y
            let velocity = rates.iter().find_map(|r| match (&r.variable, &r.expr) {
                (v, Some(Expr::Symbol(y))) if *v == rate.variable => Some(y.clone()),
                _ => None,
            });
            let target = match velocity {
                Some(y) => y,
                None => {
                    if let Some(existing) = rates.iter().find(|r| r.variable == rate.variable) {
                        warnings.push(format!(
                            "Derivative of '{}' already defined by '{}'; second-order equation '{}' dropped",
                            rate.variable, existing.source, rate.source
                        ));
                        continue;
                    }
                    let aux = format!("{}{}", rate.variable, AUX_SUFFIX);
                    rates.push(Rate {
                        variable: rate.variable.clone(),
                        expr: Some(Expr::Symbol(aux.clone())),
                        source: rate.source.clone(),
                    });
                    let initial = ir
                        .system
                        .initial_conditions
                        .get(&aux)
                        .copied()
                        .or_else(|| ir.parameter(&aux).map(|p| p.value()))
                        .unwrap_or(0.0);
                    auxiliary.insert(aux.clone(), initial);
                    aux
                }
            };
            push_rate(
                &mut rates,
                Rate {
                    variable: target,
                    expr: rate.expr,
                    source: rate.source,
                },
                &mut warnings,
            );
        }

        let integrated: BTreeSet<&str> = rates.iter().map(|r| r.variable.as_str()).collect();
        assignments.retain(|a| !integrated.contains(a.variable.as_str()));

        let mut observable = |label: &str, expression: &Option<String>| -> Option<Expr> {
            let expression = expression.as_ref()?;
            match Expr::parse(expression) {
                Ok(expr) => Some(expr),
                Err(e) => {
                    warnings.push(format!("{} expression '{}' is invalid: {}", label, expression, e));
                    None
                }
            }
        };
        let observables = &ir.system.observables;
        let energy = observable("Energy", &observables.energy);
        let momentum = observable("Momentum", &observables.momentum);
        let angular_momentum = observable("Angular momentum", &observables.angular_momentum);

        Self {
            rates,
            assignments,
            energy,
            momentum,
            angular_momentum,
            auxiliary,
            warnings,
            diagnostics: Mutex::new(Diagnostics::default()),
        }
    }

    /// Warnings raised while compiling
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Names of the integrated variables
    pub fn state_variables(&self) -> Vec<&str> {
        self.rates.iter().map(|r| r.variable.as_str()).collect()
    }

    pub fn derived_variables(&self) -> Vec<&str> {
        self.assignments.iter().map(|a| a.variable.as_str()).collect()
    }

    /// The state at `t = 0`
    ///
    /// Given, constant and derived parameters keep their values, unknowns
    /// start at zero, then the IR initial conditions apply.
    pub fn initial_state(&self, ir: &SystemIr) -> SimulationState {
        let mut state = SimulationState::new(0.0);
        for parameter in &ir.system.parameters {
            let value = match parameter.role {
                ParameterRole::Unknown => 0.0,
                _ => parameter.value(),
            };
            state.variables.insert(parameter.symbol.clone(), value);
        }
        for (name, value) in &ir.system.initial_conditions {
            state.variables.insert(name.clone(), *value);
        }
        for (name, value) in &self.auxiliary {
            state.variables.insert(name.clone(), *value);
        }
        for rate in &self.rates {
            state.variables.entry(rate.variable.clone()).or_insert(0.0);
        }
        self.refresh(&mut state);
        state
    }

    /// Time derivatives of every integrated variable
    pub fn rates(&self, time: f64, values: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        let mut values = values.clone();
        self.apply_assignments(time, &mut values);
        let scope = Scope {
            time,
            values: &values,
        };
        self.rates
            .iter()
            .map(|rate| {
                let value = match &rate.expr {
                    Some(expr) => match expr.eval(&scope) {
                        Ok(v) => v,
                        Err(e) => {
                            self.report(&rate.source, &e.to_string());
                            0.0
                        }
                    },
                    None => {
                        self.report(&rate.source, "unparseable right-hand side");
                        0.0
                    }
                };
                (rate.variable.clone(), value)
            })
            .collect()
    }

    /// Recompute everything that follows from the integrated variables
    pub fn refresh(&self, state: &mut SimulationState) {
        if let Some(t) = state.variables.get_mut("t") {
            *t = state.time;
        }
        self.apply_assignments(state.time, &mut state.variables);
        state.derivatives = self.rates(state.time, &state.variables);
        state.observed = self.observe(state);
    }

    /// Evaluate the conserved-quantity expressions
    pub fn observe(&self, state: &SimulationState) -> Observed {
        let scope = Scope {
            time: state.time,
            values: &state.variables,
        };
        let eval = |label: &str, expr: &Option<Expr>| {
            expr.as_ref().map(|e| match e.eval(&scope) {
                Ok(v) => v,
                Err(err) => {
                    self.report(label, &err.to_string());
                    0.0
                }
            })
        };
        Observed {
            energy: eval("energy", &self.energy),
            momentum: eval("momentum", &self.momentum),
            angular_momentum: eval("angular_momentum", &self.angular_momentum),
        }
    }

    /// Evaluation failures not yet collected
    pub fn take_failures(&self) -> Vec<String> {
        match self.diagnostics.lock() {
            Ok(mut diagnostics) => std::mem::take(&mut diagnostics.pending),
            Err(_) => Vec::new(),
        }
    }

    fn apply_assignments(&self, time: f64, values: &mut BTreeMap<String, f64>) {
        for assignment in &self.assignments {
            let result = assignment.expr.eval(&Scope {
                time,
                values: &*values,
            });
            match result {
                Ok(v) => {
                    values.insert(assignment.variable.clone(), v);
                }
                Err(e) => self.report(&assignment.source, &e.to_string()),
            }
        }
    }

    fn report(&self, source: &str, reason: &str) {
        let message = format!("'{}' could not be evaluated ({}); using 0", source, reason);
        if let Ok(mut diagnostics) = self.diagnostics.lock() {
            if diagnostics.seen.insert(message.clone()) {
                tracing::warn!("{}", message);
                diagnostics.pending.push(message);
            }
        }
    }
}

fn push_rate(rates: &mut Vec<Rate>, rate: Rate, warnings: &mut Vec<String>) {
    match rates.iter().find(|r| r.variable == rate.variable) {
        Some(existing) => warnings.push(format!(
            "Derivative of '{}' already defined by '{}'; '{}' dropped",
            rate.variable, existing.source, rate.source
        )),
        None => rates.push(rate),
    }
}

/// Derivative target of an equation whose right-hand side does not parse
fn derivative_target(expression: &str) -> Option<String> {
    let (lhs, _) = expression.split_once('=')?;
    match ParsedEquation::parse(&format!("{} = 0", lhs)).ok()?.target {
        EquationTarget::Derivative { variable, order: 1 } => Some(variable),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::library::{build_equation, generic_module, make_parameter};
    use crate::ir::{IrBuilder, Module, ParameterSource};
    use crate::ir::model::{ModuleSpec, ParameterSpec, ProblemModel, SystemSpec};

    async fn ir_with(equations: &[&str], parameters: Vec<ParameterSpec>) -> SystemIr {
        let model = ProblemModel {
            system: Some(SystemSpec {
                system_type: "custom".to_string(),
                parameters,
                modules: vec![ModuleSpec {
                    id: "test".to_string(),
                    equations: equations.iter().map(|e| e.to_string()).collect(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        };
        IrBuilder::new().convert(&model).await.ir.unwrap()
    }

    #[tokio::test]
    async fn test_second_order_reuses_velocity() {
        let ir = ir_with(
            &["dx/dt = v", "d2x/dt2 = -x"],
            vec![ParameterSpec::given("x", 1.0, "m")],
        )
        .await;
        let system = EquationSystem::compile(&ir);
        let mut states = system.state_variables();
        states.sort();
        assert_eq!(states, vec!["v", "x"]);

        let state = system.initial_state(&ir);
        assert_eq!(state.derivative("v"), Some(-1.0));
    }

    #[tokio::test]
    async fn test_second_order_introduces_auxiliary() {
        let ir = ir_with(&["d2x/dt2 = -4*x"], vec![ParameterSpec::given("x", 0.5, "m")]).await;
        let system = EquationSystem::compile(&ir);
        let state = system.initial_state(&ir);

        assert_eq!(state.value("x_dot"), Some(0.0));
        assert_eq!(state.derivative("x"), Some(0.0));
        assert_eq!(state.derivative("x_dot"), Some(-2.0));
    }

    #[tokio::test]
    async fn test_second_order_dropped_when_rate_is_not_a_symbol() {
        let ir = ir_with(
            &["d2x/dt2 = -x", "dx/dt = 5"],
            vec![ParameterSpec::given("x", 1.0, "m")],
        )
        .await;
        let system = EquationSystem::compile(&ir);
        assert_eq!(system.state_variables(), vec!["x"]);
        assert!(system.warnings().iter().any(|w| w.contains("second-order")));

        let state = system.initial_state(&ir);
        assert_eq!(state.value("x_dot"), None);
        assert_eq!(state.derivative("x"), Some(5.0));
    }

    #[tokio::test]
    async fn test_missing_symbol_yields_zero_and_warning() {
        let ir = ir_with(&["dx/dt = ghost * 2"], Vec::new()).await;
        let system = EquationSystem::compile(&ir);
        let state = system.initial_state(&ir);

        assert_eq!(state.derivative("x"), Some(0.0));
        let failures = system.take_failures();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("ghost"));

        // Reported once
        system.rates(1.0, &state.variables);
        assert!(system.take_failures().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_derivative_first_wins() {
        let state: BTreeSet<String> = ["x".to_string()].into();
        let mut first = generic_module(&[]);
        first.id = "first".to_string();
        first.equations = vec![build_equation("first_eq1".into(), "dx/dt = 1", &state)];
        let mut second: Module = first.clone();
        second.id = "second".to_string();
        second.equations = vec![build_equation("second_eq1".into(), "dx/dt = 2", &state)];

        let ir = system_ir(vec![first, second]).await;
        let system = EquationSystem::compile(&ir);
        assert_eq!(system.state_variables(), vec!["x"]);
        assert!(system.warnings()[0].contains("second_eq1"));
        let rates = system.rates(0.0, &BTreeMap::new());
        assert_eq!(rates.get("x"), Some(&1.0));
    }

    #[tokio::test]
    async fn test_unparseable_equation_keeps_variable() {
        let mut module = generic_module(&[]);
        module.equations = vec![build_equation(
            "bad_eq1".into(),
            "dx/dt = 3 $ y",
            &BTreeSet::new(),
        )];
        let ir = system_ir(vec![module]).await;
        let system = EquationSystem::compile(&ir);

        assert_eq!(system.state_variables(), vec!["x"]);
        assert_eq!(system.rates(0.0, &BTreeMap::new()).get("x"), Some(&0.0));
        assert_eq!(system.take_failures().len(), 1);
    }

    #[tokio::test]
    async fn test_assignments_follow_state() {
        let state: BTreeSet<String> = ["x".to_string()].into();
        let mut module = generic_module(&[make_parameter(
            "k",
            2.0,
            "",
            ParameterRole::Given,
            "",
            ParameterSource::Problem,
        )]);
        module.equations = vec![
            build_equation("eq1".into(), "dx/dt = 1", &state),
            build_equation("eq2".into(), "y = k*x", &state),
            build_equation("eq3".into(), "k = 99", &state),
        ];
        let mut ir = system_ir(vec![module.clone()]).await;
        ir.system.parameters = module.parameters.clone();
        let system = EquationSystem::compile(&ir);
        assert_eq!(system.derived_variables(), vec!["y"]);

        let mut state = system.initial_state(&ir);
        state.variables.insert("x".to_string(), 3.0);
        system.refresh(&mut state);
        assert_eq!(state.value("y"), Some(6.0));
        assert_eq!(state.value("k"), Some(2.0));
    }

    async fn system_ir(modules: Vec<Module>) -> SystemIr {
        let mut ir = IrBuilder::new()
            .convert(&ProblemModel::default())
            .await
            .ir
            .unwrap();
        ir.system.modules = modules;
        ir.system.parameters.clear();
        ir.system.initial_conditions.clear();
        ir.system.observables = Default::default();
        ir
    }
}
