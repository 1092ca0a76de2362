//! Statistical anomaly checks over the monitor history

use super::HistoryEntry;
use crate::config::MonitorConfig;
use crate::stats::{extrema_ratio, linear_slope, mean};
use crate::types::Severity;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

pub const DIVERGENCE_WINDOW: usize = 10;
pub const OSCILLATION_WINDOW: usize = 20;
pub const INSTABILITY_WINDOW: usize = 5;
pub const ENERGY_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Divergence,
    Oscillation,
    Instability,
    EnergyLeak,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnomalyKind::Divergence => "divergence",
            AnomalyKind::Oscillation => "oscillation",
            AnomalyKind::Instability => "instability",
            AnomalyKind::EnergyLeak => "energy leak",
        };
        write!(f, "{}", s)
    }
}

/// An irregularity in the recent history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub time: f64,
    /// Variable the anomaly was measured on, if any
    pub variable: Option<String>,
    pub measured: f64,
    pub threshold: f64,
    pub description: String,
}

impl Anomaly {
    fn new(
        kind: AnomalyKind,
        time: f64,
        variable: Option<&str>,
        measured: f64,
        threshold: f64,
    ) -> Self {
        let ratio = if threshold > 0.0 {
            measured / threshold
        } else {
            f64::INFINITY
        };
        let subject = variable
            .map(|v| format!(" in '{}'", v))
            .unwrap_or_default();
        Self {
            kind,
            severity: Severity::from_ratio(ratio),
            time,
            variable: variable.map(str::to_string),
            measured,
            threshold,
            description: format!(
                "{}{}: {:.4} exceeds {:.4}",
                kind, subject, measured, threshold
            ),
        }
    }

    fn ratio(&self) -> f64 {
        self.measured / self.threshold.max(f64::MIN_POSITIVE)
    }
}

/// Last `n` samples of `f` over the history, oldest first
fn window(
    history: &VecDeque<HistoryEntry>,
    n: usize,
    f: impl Fn(&HistoryEntry) -> Option<f64>,
) -> Vec<f64> {
    let skip = history.len().saturating_sub(n);
    history.iter().skip(skip).filter_map(f).collect()
}

fn integrated_variables(history: &VecDeque<HistoryEntry>) -> Vec<String> {
    history
        .back()
        .map(|e| e.state.derivatives.keys().cloned().collect())
        .unwrap_or_default()
}

/// Magnitude of a variable growing faster than the threshold, per step
fn divergence(history: &VecDeque<HistoryEntry>, config: &MonitorConfig, time: f64) -> Option<Anomaly> {
    integrated_variables(history)
        .iter()
        .filter_map(|name| {
            let samples = window(history, DIVERGENCE_WINDOW, |e| {
                e.state.value(name).map(f64::abs)
            });
            if samples.len() < DIVERGENCE_WINDOW {
                return None;
            }
            let growth = linear_slope(&samples) / mean(&samples).max(1.0);
            (growth > config.divergence_threshold).then(|| {
                Anomaly::new(
                    AnomalyKind::Divergence,
                    time,
                    Some(name),
                    growth,
                    config.divergence_threshold,
                )
            })
        })
        .max_by(|a, b| a.ratio().total_cmp(&b.ratio()))
}

/// Step-to-step flip-flopping of a variable
fn oscillation(
    history: &VecDeque<HistoryEntry>,
    config: &MonitorConfig,
    time: f64,
) -> Option<Anomaly> {
    integrated_variables(history)
        .iter()
        .filter_map(|name| {
            let samples = window(history, OSCILLATION_WINDOW, |e| e.state.value(name));
            if samples.len() < OSCILLATION_WINDOW {
                return None;
            }
            let (lo, hi) = samples
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(*v), hi.max(*v))
                });
            if hi - lo <= 1e-12 * (1.0 + hi.abs()) {
                return None;
            }
            let ratio = extrema_ratio(&samples);
            (ratio > config.oscillation_threshold).then(|| {
                Anomaly::new(
                    AnomalyKind::Oscillation,
                    time,
                    Some(name),
                    ratio,
                    config.oscillation_threshold,
                )
            })
        })
        .max_by(|a, b| a.ratio().total_cmp(&b.ratio()))
}

/// Recent stability scores below the threshold
fn instability(
    history: &VecDeque<HistoryEntry>,
    config: &MonitorConfig,
    time: f64,
) -> Option<Anomaly> {
    let scores = window(history, INSTABILITY_WINDOW, |e| {
        Some(e.performance.stability_score)
    });
    if scores.len() < INSTABILITY_WINDOW {
        return None;
    }
    let average = mean(&scores);
    if average >= config.instability_threshold {
        return None;
    }
    // Measured as the shortfall ratio so a lower score ranks as more severe
    let mut anomaly = Anomaly::new(
        AnomalyKind::Instability,
        time,
        None,
        config.instability_threshold / average.max(1e-6),
        1.0,
    );
    anomaly.description = format!(
        "instability: average stability {:.3} below {:.3}",
        average, config.instability_threshold
    );
    Some(anomaly)
}

/// Total energy trending down faster than the threshold
fn energy_leak(
    history: &VecDeque<HistoryEntry>,
    config: &MonitorConfig,
    time: f64,
) -> Option<Anomaly> {
    let energies = window(history, ENERGY_WINDOW, |e| e.state.observed.energy);
    if energies.len() < ENERGY_WINDOW {
        return None;
    }
    let loss = -linear_slope(&energies) / mean(&energies).abs().max(1.0);
    (loss > config.energy_leak_threshold).then(|| {
        Anomaly::new(
            AnomalyKind::EnergyLeak,
            time,
            Some("energy"),
            loss,
            config.energy_leak_threshold,
        )
    })
}

/// The most severe anomaly in the current history, if any
pub fn most_severe(history: &VecDeque<HistoryEntry>, config: &MonitorConfig) -> Option<Anomaly> {
    let time = history.back()?.state.time;
    [
        divergence(history, config, time),
        oscillation(history, config, time),
        instability(history, config, time),
        energy_leak(history, config, time),
    ]
    .into_iter()
    .flatten()
    .max_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then(a.ratio().total_cmp(&b.ratio()))
    })
}
