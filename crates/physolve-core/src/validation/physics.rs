//! Physics validator
//!
//! Audits a finished run against physical law: conservation, physical
//! bounds, numerical stability, dimensional consistency and causality.

use super::{weighted_score, ValidationCheck};
use crate::config::PhysicsValidatorConfig;
use crate::dimension::analysis::check_equation;
use crate::dimension::Dimension;
use crate::expr::{Comparison, ParsedEquation};
use crate::ir::{ConservationLaw, ConstraintKind, SystemIr};
use crate::simulation::state::magnitude;
use crate::simulation::{SimulationResult, TerminationReason, TimeSeriesPoint};
use crate::types::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const CONSERVATION_WEIGHT: f64 = 0.30;
pub const CONSTRAINT_WEIGHT: f64 = 0.25;
pub const STABILITY_WEIGHT: f64 = 0.20;
pub const DIMENSION_WEIGHT: f64 = 0.15;
pub const CAUSALITY_WEIGHT: f64 = 0.10;

/// Laws audited when no IR says which ones apply
const DEFAULT_LAWS: [ConservationLaw; 3] = [
    ConservationLaw::Energy,
    ConservationLaw::Momentum,
    ConservationLaw::AngularMomentum,
];

/// One conserved quantity over the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConservationAudit {
    pub law: ConservationLaw,
    pub initial: f64,
    pub final_value: f64,
    /// Largest relative deviation from the initial value over the run
    pub max_deviation: f64,
    pub threshold: f64,
    pub satisfied: bool,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsValidationReport {
    pub generated_at: Timestamp,
    pub success: bool,
    pub overall_score: f64,
    pub conservation: Option<ValidationCheck>,
    pub conservation_laws: Vec<ConservationAudit>,
    pub constraints: Option<ValidationCheck>,
    pub stability: Option<ValidationCheck>,
    pub dimensions: Option<ValidationCheck>,
    pub causality: Option<ValidationCheck>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

pub struct PhysicsValidator {
    config: PhysicsValidatorConfig,
}

impl PhysicsValidator {
    pub fn new(config: PhysicsValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PhysicsValidatorConfig {
        &self.config
    }

    /// Run every enabled check
    ///
    /// `ir` selects the conservation laws to audit and supplies constraints
    /// and dimensions; without it those checks fall back to generic bounds.
    pub fn validate(
        &self,
        result: &SimulationResult,
        ir: Option<&SystemIr>,
    ) -> PhysicsValidationReport {
        let series = &result.time_series;
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut recommendations = Vec::new();

        if series.is_empty() {
            errors.push("Time series is empty".to_string());
        }
        if !result.success {
            errors.extend(result.errors.iter().map(|e| format!("Simulation failed: {}", e)));
        }

        let (conservation, conservation_laws) = if self.config.check_conservation {
            let (check, audits) = self.check_conservation(series, ir);
            if !check.passed {
                warnings.extend(check.details.iter().cloned());
                recommendations.push(format!(
                    "Conserved quantities drift beyond {:.2}%; use rk4 or a smaller time step",
                    self.config.conservation_threshold * 100.0
                ));
            }
            (Some(check), audits)
        } else {
            (None, Vec::new())
        };

        let constraints = self.config.check_constraints.then(|| {
            let check = self.check_constraints(series, ir);
            if !check.passed {
                warnings.push(format!(
                    "{} physical constraint violation(s)",
                    check.violations
                ));
                recommendations.push(
                    "State leaves physical bounds; check units and initial conditions".to_string(),
                );
            }
            check
        });

        let stability = self.config.check_stability.then(|| {
            let check = self.check_stability(result);
            if !check.passed {
                warnings.extend(check.details.iter().cloned());
                recommendations
                    .push("Reduce the time step or enable adaptive step sizing".to_string());
            }
            check
        });

        let dimensions = self.config.check_dimensions.then(|| {
            let check = self.check_dimensions(ir);
            if !check.passed {
                warnings.extend(check.details.iter().cloned());
                recommendations.push("Review equations with inconsistent dimensions".to_string());
            }
            check
        });

        let causality = self.config.check_causality.then(|| {
            let check = self.check_causality(result);
            if !check.passed {
                errors.push(format!(
                    "Causality violated at {} point(s)",
                    check.violations
                ));
                recommendations
                    .push("Time runs backwards in the output; check event ordering".to_string());
            }
            check
        });

        let overall_score = weighted_score(&[
            (CONSERVATION_WEIGHT, conservation.as_ref()),
            (CONSTRAINT_WEIGHT, constraints.as_ref()),
            (STABILITY_WEIGHT, stability.as_ref()),
            (DIMENSION_WEIGHT, dimensions.as_ref()),
            (CAUSALITY_WEIGHT, causality.as_ref()),
        ]);
        let success = overall_score >= self.config.pass_score && errors.is_empty();

        tracing::info!(
            "Physics validation: score {:.3}, {} error(s), {} warning(s)",
            overall_score,
            errors.len(),
            warnings.len()
        );

        PhysicsValidationReport {
            generated_at: Utc::now(),
            success,
            overall_score,
            conservation,
            conservation_laws,
            constraints,
            stability,
            dimensions,
            causality,
            errors,
            warnings,
            recommendations,
        }
    }

    /// Relative drift of each conserved quantity
    ///
    /// The check's score is the worst law's `1 - max_deviation / threshold`.
    pub fn check_conservation(
        &self,
        series: &[TimeSeriesPoint],
        ir: Option<&SystemIr>,
    ) -> (ValidationCheck, Vec<ConservationAudit>) {
        let mut check = ValidationCheck::new("conservation");
        let laws: Vec<ConservationLaw> = match ir {
            Some(ir) => ir.system.conservation_laws.clone(),
            None => DEFAULT_LAWS.to_vec(),
        };
        let threshold = self.config.conservation_threshold;
        let mut audits = Vec::new();

        for law in laws {
            let values: Vec<f64> = match law {
                ConservationLaw::Energy => series.iter().filter_map(|p| p.energy).collect(),
                ConservationLaw::Momentum => series.iter().filter_map(|p| p.momentum).collect(),
                ConservationLaw::AngularMomentum => {
                    series.iter().filter_map(|p| p.angular_momentum).collect()
                }
                ConservationLaw::Charge | ConservationLaw::Mass => {
                    check.detail(format!("{} is conserved by construction", law));
                    continue;
                }
            };
            let (Some(&initial), Some(&final_value)) = (values.first(), values.last()) else {
                check.detail(format!("No {} observable; not audited", law));
                continue;
            };

            let scale = if initial.abs() > 1e-12 {
                initial.abs()
            } else {
                values.iter().fold(0.0_f64, |m, v| m.max(v.abs()))
            };
            let max_deviation = if scale > 1e-12 {
                values
                    .iter()
                    .map(|v| (v - initial).abs() / scale)
                    .fold(0.0_f64, f64::max)
            } else {
                0.0
            };
            let satisfied = max_deviation <= threshold;
            let score = (1.0 - max_deviation / threshold).max(0.0);
            if !satisfied {
                check.detail(format!(
                    "{} drifted by {:.4}% (limit {:.2}%)",
                    law,
                    max_deviation * 100.0,
                    threshold * 100.0
                ));
            }
            audits.push(ConservationAudit {
                law,
                initial,
                final_value,
                max_deviation,
                threshold,
                satisfied,
                score,
            });
        }

        check.passed = audits.iter().all(|a| a.satisfied);
        check.violations = audits.iter().filter(|a| !a.satisfied).count();
        check.deviation = audits.iter().map(|a| a.max_deviation).fold(0.0, f64::max);
        let score = audits.iter().map(|a| a.score).fold(1.0, f64::min);
        (check.with_score(score), audits)
    }

    /// Speed, acceleration and position bounds plus declared physical constraints
    pub fn check_constraints(
        &self,
        series: &[TimeSeriesPoint],
        ir: Option<&SystemIr>,
    ) -> ValidationCheck {
        let mut check = ValidationCheck::new("constraints");
        let bounds = Bounds::from_ir(ir);
        let declared: Vec<(String, Comparison, f64)> = ir
            .map(|ir| {
                ir.system
                    .constraints
                    .iter()
                    .filter(|c| c.kind == ConstraintKind::Physical)
                    .filter_map(|c| {
                        Comparison::parse(&c.expression)
                            .ok()
                            .map(|cmp| (c.id.clone(), cmp, c.tolerance))
                    })
                    .collect()
            })
            .unwrap_or_default();

        for point in series {
            let mut exceeded = |kind: &str, subject: &str, value: f64, limit: f64| {
                if value > limit {
                    check.violations += 1;
                    check.deviation = check.deviation.max(value / limit);
                    if check.details.len() < 10 {
                        check.details.push(format!(
                            "t = {:.4}: {} of {} is {:.3e} (limit {:.1e})",
                            point.time, kind, subject, value, limit
                        ));
                    }
                }
            };

            for object in &bounds.objects {
                let vector = |suffixes: [&str; 3], from_derivatives: bool| {
                    magnitude(suffixes.map(|axis| {
                        let key = format!("{}_{}", object, axis);
                        let source = if from_derivatives {
                            &point.derivatives
                        } else {
                            &point.variables
                        };
                        source.get(&key).copied().unwrap_or(0.0)
                    }))
                };
                exceeded("speed", object, vector(["vx", "vy", "vz"], false), self.config.max_velocity);
                exceeded(
                    "acceleration",
                    object,
                    vector(["vx", "vy", "vz"], true),
                    self.config.max_acceleration,
                );
                exceeded("position", object, vector(["x", "y", "z"], false), self.config.max_position);
            }

            for name in &bounds.velocities {
                if let Some(v) = point.variables.get(name) {
                    exceeded("speed", name, v.abs(), self.config.max_velocity);
                }
                if let Some(a) = point.derivatives.get(name) {
                    exceeded("acceleration", name, a.abs(), self.config.max_acceleration);
                }
            }
            for name in &bounds.accelerations {
                if let Some(a) = point.variables.get(name) {
                    exceeded("acceleration", name, a.abs(), self.config.max_acceleration);
                }
            }
            for name in &bounds.positions {
                if let Some(x) = point.variables.get(name) {
                    exceeded("position", name, x.abs(), self.config.max_position);
                }
            }

            for (id, comparison, tolerance) in &declared {
                if let Ok(violation) = comparison.violation(point, *tolerance) {
                    if violation > 0.0 {
                        check.violations += 1;
                        if check.details.len() < 10 {
                            check.details.push(format!(
                                "t = {:.4}: constraint '{}' violated by {:.3e}",
                                point.time, id, violation
                            ));
                        }
                    }
                }
            }
        }

        check.passed = check.violations == 0;
        let score = ratio_score(check.violations, series.len());
        check.with_score(score)
    }

    /// Step-size floor, plus convergence and oscillation point ratios
    pub fn check_stability(&self, result: &SimulationResult) -> ValidationCheck {
        let mut check = ValidationCheck::new("stability");
        let metrics = &result.metrics;

        let collapsed = metrics.termination == TerminationReason::StepSizeCollapse
            || (metrics.total_steps > 0 && metrics.min_step_size < self.config.min_step_size);
        if collapsed {
            check.detail(format!(
                "Step size fell below {:e}",
                self.config.min_step_size
            ));
        }

        let variables: Vec<&String> = result
            .time_series
            .first()
            .map(|p| p.derivatives.keys().collect())
            .unwrap_or_default();
        let (mut convergence_ratio, mut oscillation_ratio) = (0.0_f64, 0.0_f64);
        for name in variables {
            let values: Vec<f64> = result
                .time_series
                .iter()
                .filter_map(|p| p.variables.get(name).copied())
                .collect();
            convergence_ratio =
                convergence_ratio.max(unstable_ratio(&values, self.config.convergence_tolerance));
            oscillation_ratio =
                oscillation_ratio.max(unstable_ratio(&values, self.config.oscillation_tolerance));
        }

        let converges = convergence_ratio <= self.config.max_convergence_failure_ratio;
        let calm = oscillation_ratio <= self.config.max_oscillation_failure_ratio;
        if !converges {
            check.detail(format!(
                "{:.1}% of points fail the convergence check (limit {:.0}%)",
                convergence_ratio * 100.0,
                self.config.max_convergence_failure_ratio * 100.0
            ));
        }
        if !calm {
            check.detail(format!(
                "{:.1}% of points oscillate (limit {:.0}%)",
                oscillation_ratio * 100.0,
                self.config.max_oscillation_failure_ratio * 100.0
            ));
        }

        let sub_scores = [
            if collapsed { 0.0 } else { 1.0 },
            if converges { 1.0 } else { 1.0 - convergence_ratio },
            if calm { 1.0 } else { 1.0 - oscillation_ratio },
        ];
        check.passed = !collapsed && converges && calm;
        check.violations = (!converges) as usize + (!calm) as usize + collapsed as usize;
        check.deviation = convergence_ratio.max(oscillation_ratio);
        check.with_score(sub_scores.iter().sum::<f64>() / sub_scores.len() as f64)
    }

    /// Dimensional consistency of every IR equation
    pub fn check_dimensions(&self, ir: Option<&SystemIr>) -> ValidationCheck {
        let mut check = ValidationCheck::new("dimensions");
        let Some(ir) = ir else {
            check.detail("No IR supplied; dimensions not checked");
            return check;
        };

        let symbols = ir.symbol_dimensions();
        let mut analysed = 0;
        for module in &ir.system.modules {
            for equation in &module.equations {
                let Ok(parsed) = ParsedEquation::parse(&equation.expression) else {
                    continue;
                };
                analysed += 1;
                let dims = check_equation(&parsed, &symbols);
                if !dims.is_consistent() {
                    check.violations += 1;
                    check.detail(format!(
                        "{}: {}",
                        equation.id,
                        dims.mismatches.join("; ")
                    ));
                }
            }
        }

        check.passed = check.violations == 0;
        check.deviation = check.violations as f64;
        let score = ratio_score(check.violations, analysed);
        check.with_score(score)
    }

    /// Time must never run backwards, in the series or in the events
    pub fn check_causality(&self, result: &SimulationResult) -> ValidationCheck {
        let mut check = ValidationCheck::new("causality");
        for pair in result.time_series.windows(2) {
            if pair[1].time < pair[0].time {
                check.violations += 1;
                check.deviation = check.deviation.max(pair[0].time - pair[1].time);
                check.detail(format!("t = {} follows t = {}", pair[1].time, pair[0].time));
            }
        }
        for pair in result.events.windows(2) {
            if pair[1].time < pair[0].time {
                check.violations += 1;
                check.detail(format!(
                    "Event '{}' at t = {} listed after t = {}",
                    pair[1].description, pair[1].time, pair[0].time
                ));
            }
        }

        check.passed = check.violations == 0;
        let score = ratio_score(check.violations, result.time_series.len());
        check.with_score(score)
    }
}

/// Variables to bound, grouped by what they measure
#[derive(Default)]
struct Bounds {
    objects: Vec<String>,
    velocities: Vec<String>,
    accelerations: Vec<String>,
    positions: Vec<String>,
}

impl Bounds {
    fn from_ir(ir: Option<&SystemIr>) -> Self {
        let Some(ir) = ir else {
            return Self::default();
        };
        let mut bounds = Bounds {
            objects: ir
                .system
                .objects
                .iter()
                .filter(|o| !o.fixed)
                .map(|o| o.id.clone())
                .collect(),
            ..Default::default()
        };
        let owned_by_object = |name: &str| {
            bounds
                .objects
                .iter()
                .any(|o| name.starts_with(&format!("{}_", o)))
        };
        let mut velocities = Vec::new();
        let mut accelerations = Vec::new();
        let mut positions = Vec::new();
        for (name, dimension) in ir.symbol_dimensions() {
            if owned_by_object(&name) {
                continue;
            }
            match dimension {
                d if d == Dimension::VELOCITY => velocities.push(name),
                d if d == Dimension::ACCELERATION => accelerations.push(name),
                d if d == Dimension::LENGTH => positions.push(name),
                _ => {}
            }
        }
        bounds.velocities = velocities;
        bounds.accelerations = accelerations;
        bounds.positions = positions;
        bounds
    }
}

fn ratio_score(violations: usize, total: usize) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (1.0 - violations as f64 / total as f64).max(0.0)
}

/// Fraction of interior points that stick out from both neighbours
///
/// A point is unstable when it deviates from the midpoint of its
/// neighbours by more than `tolerance` (relative to its magnitude) and by
/// more than the neighbours differ from each other.
fn unstable_ratio(values: &[f64], tolerance: f64) -> f64 {
    if values.len() < 3 {
        return 0.0;
    }
    let flagged = values
        .windows(3)
        .filter(|w| {
            let deviation = (w[1] - (w[0] + w[2]) / 2.0).abs();
            deviation > tolerance * (1.0 + w[1].abs()) && deviation > (w[2] - w[0]).abs()
        })
        .count();
    flagged as f64 / (values.len() - 2) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::SimulationMetrics;
    use crate::simulation::SolverMethod;
    use crate::simulation::SimulationState;
    use std::collections::BTreeMap;

    fn point(time: f64, vars: &[(&str, f64)], energy: Option<f64>) -> TimeSeriesPoint {
        let variables: BTreeMap<String, f64> =
            vars.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        let derivatives = variables.keys().map(|k| (k.clone(), 0.0)).collect();
        TimeSeriesPoint {
            time,
            variables,
            derivatives,
            energy,
            momentum: None,
            angular_momentum: None,
        }
    }

    fn result(time_series: Vec<TimeSeriesPoint>) -> SimulationResult {
        SimulationResult {
            success: true,
            method: SolverMethod::Rk4,
            events: Vec::new(),
            final_state: SimulationState::default(),
            metrics: SimulationMetrics {
                total_steps: time_series.len().saturating_sub(1) as u64,
                min_step_size: 0.01,
                max_step_size: 0.01,
                average_step_size: 0.01,
                ..Default::default()
            },
            time_series,
            errors: Vec::new(),
            warnings: Vec::new(),
            computation_time: 0.01,
            monitor_report: None,
        }
    }

    fn smooth(energy_drift: f64) -> SimulationResult {
        result(
            (0..100)
                .map(|i| {
                    let t = i as f64 * 0.01;
                    point(t, &[("x", t * t)], Some(10.0 * (1.0 - energy_drift * t)))
                })
                .collect(),
        )
    }

    #[test]
    fn test_clean_run_passes() {
        let validator = PhysicsValidator::new(PhysicsValidatorConfig::default());
        let report = validator.validate(&smooth(0.0), None);

        assert!(report.success, "{:?}", report.errors);
        assert!((report.overall_score - 1.0).abs() < 1e-12);
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn test_energy_drift_lowers_conservation_score() {
        let validator = PhysicsValidator::new(PhysicsValidatorConfig::default());
        let report = validator.validate(&smooth(0.01), None);

        let audit = &report.conservation_laws[0];
        assert_eq!(audit.law, ConservationLaw::Energy);
        assert!((audit.max_deviation - 0.0099).abs() < 1e-9);
        assert!(audit.satisfied);

        let report = validator.validate(&smooth(0.05), None);
        let conservation = report.conservation.unwrap();
        assert!(!conservation.passed);
        assert_eq!(conservation.score, 0.0);
        assert!(!report.recommendations.is_empty());
    }

    #[test]
    fn test_conservation_only_weighting() {
        let validator = PhysicsValidator::new(PhysicsValidatorConfig::conservation_only());
        let report = validator.validate(&smooth(0.005), None);

        let conservation = report.conservation.unwrap();
        assert_eq!(report.overall_score, conservation.score);
        assert!(report.constraints.is_none());
        assert!(report.causality.is_none());
    }

    #[test]
    fn test_causality_violation_is_an_error() {
        let mut run = smooth(0.0);
        run.time_series.swap(10, 11);
        let report = PhysicsValidator::new(PhysicsValidatorConfig::default()).validate(&run, None);

        let causality = report.causality.unwrap();
        assert!(!causality.passed);
        assert_eq!(causality.violations, 1);
        assert!(!report.success);
    }

    #[test]
    fn test_sawtooth_fails_stability() {
        let series = (0..50)
            .map(|i| point(i as f64 * 0.01, &[("x", if i % 2 == 0 { 1.0 } else { 2.0 })], None))
            .collect();
        let check = PhysicsValidator::new(PhysicsValidatorConfig::default())
            .check_stability(&result(series));

        assert!(!check.passed);
        assert!(check.score < 1.0);
    }

    #[test]
    fn test_collapsed_step_fails_stability() {
        let mut run = smooth(0.0);
        run.metrics.min_step_size = 1e-12;
        let check = PhysicsValidator::new(PhysicsValidatorConfig::default()).check_stability(&run);
        assert!(!check.passed);
        assert!((check.score - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_unstable_ratio() {
        assert_eq!(unstable_ratio(&[0.0, 1.0, 2.0, 3.0], 1e-6), 0.0);
        assert_eq!(unstable_ratio(&[0.0, 1.0, 0.0], 1e-6), 1.0);
    }

    #[test]
    fn test_empty_series_fails() {
        let report =
            PhysicsValidator::new(PhysicsValidatorConfig::default()).validate(&result(Vec::new()), None);
        assert!(!report.success);
        assert!(report.errors.iter().any(|e| e.contains("empty")));
    }
}
