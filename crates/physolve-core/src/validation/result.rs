//! Result validator
//!
//! Audits the time series as data, without physical meaning: completeness,
//! statistical quality, anomalies, resource use and output shape.

use super::{weighted_score, ValidationCheck};
use crate::config::ResultValidatorConfig;
use crate::simulation::{SimulationResult, TimeSeriesPoint};
use crate::stats::{mean, quantile_sorted, smoothness};
use crate::types::{Severity, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const COMPLETENESS_WEIGHT: f64 = 0.25;
pub const QUALITY_WEIGHT: f64 = 0.25;
pub const ANOMALY_WEIGHT: f64 = 0.20;
pub const PERFORMANCE_WEIGHT: f64 = 0.15;
pub const OUTPUT_WEIGHT: f64 = 0.15;

/// An interval longer than this multiple of the median step is a gap
const GAP_FACTOR: f64 = 3.0;
/// Share of a variable's range below which neighbour deviations are ignored
const RANGE_FLOOR: f64 = 0.01;
const MAX_DETAILS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesAnomalyKind {
    Spike,
    Drop,
    /// Consecutive spike and drop
    Oscillation,
}

/// A point standing out from its neighbours
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesAnomaly {
    pub variable: String,
    pub index: usize,
    pub time: f64,
    pub kind: SeriesAnomalyKind,
    pub severity: Severity,
    /// Deviation from the neighbour midpoint relative to its magnitude
    pub deviation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultValidationReport {
    pub generated_at: Timestamp,
    pub success: bool,
    pub overall_score: f64,
    pub completeness: ValidationCheck,
    pub quality: ValidationCheck,
    pub anomalies: ValidationCheck,
    pub anomaly_list: Vec<SeriesAnomaly>,
    pub performance: ValidationCheck,
    pub output: ValidationCheck,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

pub struct ResultValidator {
    config: ResultValidatorConfig,
}

impl ResultValidator {
    pub fn new(config: ResultValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResultValidatorConfig {
        &self.config
    }

    pub fn validate(&self, result: &SimulationResult) -> ResultValidationReport {
        let series = &result.time_series;
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut recommendations = Vec::new();

        if series.is_empty() {
            errors.push("Time series is empty".to_string());
        }

        let completeness = self.check_completeness(series);
        if !completeness.passed {
            warnings.extend(completeness.details.iter().cloned());
            recommendations.push(
                "Series has gaps or invalid values; check for step-size collapse".to_string(),
            );
        }

        let quality = self.check_quality(series);
        if !quality.passed {
            warnings.extend(quality.details.iter().cloned());
            recommendations.push("Values are noisy or outlying; reduce the time step".to_string());
        }

        let (anomalies, anomaly_list) = self.check_anomalies(series);
        if !anomalies.passed {
            warnings.push(format!("{} series anomalies", anomaly_list.len()));
            recommendations
                .push("Spikes or drops detected; inspect events near those times".to_string());
        }

        let performance = self.check_performance(result);
        if !performance.passed {
            warnings.extend(performance.details.iter().cloned());
            recommendations.push(
                "Run exceeded resource limits; shorten the duration or enlarge the time step"
                    .to_string(),
            );
        }

        let output = self.check_output(result);
        if !output.passed {
            warnings.extend(output.details.iter().cloned());
            recommendations.push("Output is too short; lengthen the run".to_string());
        }

        let overall_score = weighted_score(&[
            (COMPLETENESS_WEIGHT, Some(&completeness)),
            (QUALITY_WEIGHT, Some(&quality)),
            (ANOMALY_WEIGHT, Some(&anomalies)),
            (PERFORMANCE_WEIGHT, Some(&performance)),
            (OUTPUT_WEIGHT, Some(&output)),
        ]);
        let success = errors.is_empty() && overall_score >= self.config.min_score;

        tracing::info!(
            "Result validation: score {:.3}, {} anomalies",
            overall_score,
            anomaly_list.len()
        );

        ResultValidationReport {
            generated_at: Utc::now(),
            success,
            overall_score,
            completeness,
            quality,
            anomalies,
            anomaly_list,
            performance,
            output,
            errors,
            warnings,
            recommendations,
        }
    }

    /// Time gaps, missing values, NaN or infinity and absurd magnitudes
    pub fn check_completeness(&self, series: &[TimeSeriesPoint]) -> ValidationCheck {
        let mut check = ValidationCheck::new("completeness");
        if series.is_empty() {
            check.passed = false;
            check.detail("No points recorded");
            return check.with_score(0.0);
        }
        let names = variable_names(series);
        let expected = series.len() * names.len();

        let (mut missing, mut non_finite, mut absurd) = (0usize, 0usize, 0usize);
        for point in series {
            for name in &names {
                match point.variables.get(name.as_str()) {
                    None => missing += 1,
                    Some(v) if !v.is_finite() => non_finite += 1,
                    Some(v) if v.abs() > self.config.max_magnitude => absurd += 1,
                    Some(_) => {}
                }
            }
        }

        let intervals: Vec<f64> = series.windows(2).map(|w| w[1].time - w[0].time).collect();
        let mut positive: Vec<f64> = intervals.iter().copied().filter(|d| *d > 0.0).collect();
        positive.sort_by(f64::total_cmp);
        let median = quantile_sorted(&positive, 0.5);
        let gaps = intervals
            .iter()
            .filter(|d| median > 0.0 && **d > GAP_FACTOR * median)
            .count();

        for (count, what) in [
            (missing, "missing values"),
            (non_finite, "non-finite values"),
            (absurd, "values beyond the magnitude limit"),
            (gaps, "time gaps"),
        ] {
            if count > 0 {
                check.detail(format!("{} {}", count, what));
            }
        }

        let bad_values = missing + non_finite + absurd;
        check.violations = bad_values + gaps;
        check.passed = check.violations == 0;
        let value_share = if expected == 0 {
            0.0
        } else {
            bad_values as f64 / expected as f64
        };
        let gap_share = if intervals.is_empty() {
            0.0
        } else {
            gaps as f64 / intervals.len() as f64
        };
        check.deviation = value_share + gap_share;
        check.with_score(1.0 - value_share - gap_share)
    }

    /// IQR outliers, local noise against linear interpolation, smoothness
    pub fn check_quality(&self, series: &[TimeSeriesPoint]) -> ValidationCheck {
        let mut check = ValidationCheck::new("quality");
        let mut scores = Vec::new();
        let mut worst_noise = 0.0_f64;
        let mut outliers_total = 0usize;
        let mut values_total = 0usize;

        for name in variable_names(series) {
            let values = finite_values(series, &name);
            if values.len() < 3 {
                continue;
            }
            let mut sorted = values.clone();
            sorted.sort_by(f64::total_cmp);
            let q1 = quantile_sorted(&sorted, 0.25);
            let q3 = quantile_sorted(&sorted, 0.75);
            let fence = self.config.outlier_iqr_factor * (q3 - q1);
            let outliers = values
                .iter()
                .filter(|v| **v < q1 - fence || **v > q3 + fence)
                .count();

            let range = sorted[sorted.len() - 1] - sorted[0];
            let noise = if range > 0.0 {
                mean(
                    &values
                        .windows(3)
                        .map(|w| (w[1] - (w[0] + w[2]) / 2.0).abs())
                        .collect::<Vec<_>>(),
                ) / range
            } else {
                0.0
            };
            let outlier_ratio = outliers as f64 / values.len() as f64;
            if outliers > 0 && check.details.len() < MAX_DETAILS {
                check.detail(format!("{}: {} outlier(s)", name, outliers));
            }

            outliers_total += outliers;
            values_total += values.len();
            worst_noise = worst_noise.max(noise);
            scores.push(
                0.4 * (1.0 - outlier_ratio)
                    + 0.3 * (1.0 - noise.min(1.0))
                    + 0.3 * smoothness(&values),
            );
        }

        let outlier_share = if values_total == 0 {
            0.0
        } else {
            outliers_total as f64 / values_total as f64
        };
        if worst_noise > 0.05 {
            check.detail(format!("Local noise reaches {:.1}% of range", worst_noise * 100.0));
        }
        check.violations = outliers_total;
        check.deviation = worst_noise;
        check.passed = outlier_share <= 0.05 && worst_noise <= 0.05;
        let score = if scores.is_empty() { 1.0 } else { mean(&scores) };
        check.with_score(score)
    }

    /// Spikes, drops and oscillations relative to the neighbour midpoint
    pub fn check_anomalies(
        &self,
        series: &[TimeSeriesPoint],
    ) -> (ValidationCheck, Vec<SeriesAnomaly>) {
        let mut check = ValidationCheck::new("anomalies");
        let threshold = self.config.anomaly_threshold;
        let mut found: Vec<SeriesAnomaly> = Vec::new();
        let mut interior = 0usize;

        for name in variable_names(series) {
            let points: Vec<(usize, f64)> = series
                .iter()
                .enumerate()
                .filter_map(|(i, p)| p.variables.get(&name).copied().map(|v| (i, v)))
                .filter(|(_, v)| v.is_finite())
                .collect();
            if points.len() < 3 {
                continue;
            }
            let (lo, hi) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, v)| {
                (lo.min(*v), hi.max(*v))
            });
            let floor = (RANGE_FLOOR * (hi - lo)).max(1e-12);
            interior += points.len() - 2;

            let mut previous: Option<(usize, SeriesAnomalyKind)> = None;
            for w in points.windows(3) {
                let (index, value) = w[1];
                let midpoint = (w[0].1 + w[2].1) / 2.0;
                let deviation = (value - midpoint).abs() / midpoint.abs().max(floor);
                if deviation <= threshold {
                    continue;
                }
                let mut kind = if value > w[0].1 && value > w[2].1 {
                    SeriesAnomalyKind::Spike
                } else if value < w[0].1 && value < w[2].1 {
                    SeriesAnomalyKind::Drop
                } else {
                    continue;
                };
                if let Some((prev_index, prev_kind)) = previous {
                    if prev_index + 1 == index && prev_kind != kind {
                        kind = SeriesAnomalyKind::Oscillation;
                    }
                }
                previous = Some((
                    index,
                    if value > midpoint {
                        SeriesAnomalyKind::Spike
                    } else {
                        SeriesAnomalyKind::Drop
                    },
                ));
                found.push(SeriesAnomaly {
                    variable: name.clone(),
                    index,
                    time: series[index].time,
                    kind,
                    severity: Severity::from_ratio(deviation / threshold),
                    deviation,
                });
            }
        }

        for anomaly in found.iter().take(MAX_DETAILS) {
            check.detail(format!(
                "{:?} in '{}' at t = {:.4} ({})",
                anomaly.kind, anomaly.variable, anomaly.time, anomaly.severity
            ));
        }
        let penalty: f64 = found.iter().map(|a| a.severity.weight()).sum();
        check.violations = found.len();
        check.passed = found.is_empty();
        check.deviation = found.iter().map(|a| a.deviation).fold(0.0, f64::max);
        let score = if interior == 0 {
            1.0
        } else {
            1.0 - penalty / interior as f64
        };
        (check.with_score(score), found)
    }

    /// Processing time and memory footprint against the configured limits
    pub fn check_performance(&self, result: &SimulationResult) -> ValidationCheck {
        let mut check = ValidationCheck::new("performance");
        let variables = variable_names(&result.time_series).len();
        let memory = result.time_series.len() * variables * std::mem::size_of::<f64>();
        let time = result.computation_time;
        let utilization = time / self.config.max_computation_time.max(f64::EPSILON);

        check.detail(format!(
            "{:.3} s, {} bytes, {:.1}% of the time budget",
            time,
            memory,
            utilization * 100.0
        ));
        let time_score = if utilization <= 1.0 { 1.0 } else { 1.0 / utilization };
        let memory_ratio = memory as f64 / self.config.max_memory_bytes.max(1) as f64;
        let memory_score = if memory_ratio <= 1.0 { 1.0 } else { 1.0 / memory_ratio };

        check.passed = utilization <= 1.0 && memory_ratio <= 1.0;
        check.violations = (utilization > 1.0) as usize + (memory_ratio > 1.0) as usize;
        check.deviation = utilization.max(memory_ratio);
        check.with_score((time_score + memory_score) / 2.0)
    }

    /// Non-empty series, run metadata present, enough points
    pub fn check_output(&self, result: &SimulationResult) -> ValidationCheck {
        let mut check = ValidationCheck::new("output");
        let conditions = [
            (!result.time_series.is_empty(), "time series is empty"),
            (result.metrics.total_steps > 0, "no steps were recorded"),
            (
                result.time_series.len() >= self.config.min_points,
                "fewer points than required",
            ),
        ];
        for (ok, message) in conditions {
            if !ok {
                check.violations += 1;
                check.detail(format!("Output check failed: {}", message));
            }
        }
        check.passed = check.violations == 0;
        let score = 1.0 - check.violations as f64 / conditions.len() as f64;
        check.with_score(score)
    }
}

fn variable_names(series: &[TimeSeriesPoint]) -> BTreeSet<String> {
    series
        .iter()
        .flat_map(|p| p.variables.keys().cloned())
        .collect()
}

fn finite_values(series: &[TimeSeriesPoint], name: &str) -> Vec<f64> {
    series
        .iter()
        .filter_map(|p| p.variables.get(name).copied())
        .filter(|v| v.is_finite())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{SimulationMetrics, SimulationState, SolverMethod};
    use std::collections::BTreeMap;

    fn run(values: &[f64]) -> SimulationResult {
        let time_series: Vec<TimeSeriesPoint> = values
            .iter()
            .enumerate()
            .map(|(i, v)| TimeSeriesPoint {
                time: i as f64 * 0.1,
                variables: BTreeMap::from([("x".to_string(), *v)]),
                derivatives: BTreeMap::new(),
                energy: None,
                momentum: None,
                angular_momentum: None,
            })
            .collect();
        SimulationResult {
            success: true,
            method: SolverMethod::Rk4,
            events: Vec::new(),
            final_state: SimulationState::default(),
            metrics: SimulationMetrics {
                total_steps: values.len().saturating_sub(1) as u64,
                ..Default::default()
            },
            time_series,
            errors: Vec::new(),
            warnings: Vec::new(),
            computation_time: 0.05,
            monitor_report: None,
        }
    }

    fn validator() -> ResultValidator {
        ResultValidator::new(ResultValidatorConfig::default())
    }

    #[test]
    fn test_linear_series_is_clean() {
        let values: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let report = validator().validate(&run(&values));

        assert!(report.success);
        assert!(report.anomaly_list.is_empty());
        assert!(report.completeness.passed);
        assert!(report.quality.passed);
        assert!((report.overall_score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_spike_is_classified() {
        let mut values: Vec<f64> = vec![1.0; 30];
        values[15] = 10.0;
        let (check, found) = validator().check_anomalies(&run(&values).time_series);

        assert!(!check.passed);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, SeriesAnomalyKind::Spike);
        assert_eq!(found[0].index, 15);
        assert_eq!(found[0].severity, Severity::Critical);
    }

    #[test]
    fn test_alternation_is_oscillation() {
        let values: Vec<f64> = (0..10).map(|i| if i % 2 == 0 { 1.0 } else { 3.0 }).collect();
        let (_, found) = validator().check_anomalies(&run(&values).time_series);

        assert_eq!(found[0].kind, SeriesAnomalyKind::Spike);
        assert!(found[1..]
            .iter()
            .all(|a| a.kind == SeriesAnomalyKind::Oscillation));
    }

    #[test]
    fn test_completeness_counts_invalid_values_and_gaps() {
        let mut result = run(&[0.0, 1.0, f64::NAN, 3.0, 4.0, 1e20]);
        result.time_series[4].time = 2.0;
        result.time_series[5].time = 2.1;
        let check = validator().check_completeness(&result.time_series);

        assert!(!check.passed);
        assert_eq!(check.violations, 3);
        assert!(check.score < 1.0);
    }

    #[test]
    fn test_outliers_lower_quality() {
        let mut values: Vec<f64> = (0..40).map(|i| (i % 4) as f64).collect();
        values[20] = 100.0;
        let check = validator().check_quality(&run(&values).time_series);
        assert!(check.violations >= 1);
        assert!(check.score < 1.0);
    }

    #[test]
    fn test_output_and_performance_limits() {
        let mut result = run(&[1.0]);
        result.computation_time = 60.0;
        let v = validator();

        let output = v.check_output(&result);
        assert!(!output.passed);
        assert!((output.score - 1.0 / 3.0).abs() < 1e-12);

        let performance = v.check_performance(&result);
        assert!(!performance.passed);
        assert!((performance.score - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_empty_result_fails() {
        let report = validator().validate(&run(&[]));
        assert!(!report.success);
        assert!(!report.errors.is_empty());
    }
}
