//! State monitor
//!
//! Keeps a bounded history of simulation states with per-step performance
//! figures, flags statistical anomalies and produces periodic summaries.

pub mod anomaly;

pub use anomaly::{Anomaly, AnomalyKind};

use crate::config::MonitorConfig;
use crate::events::Event;
use crate::simulation::state::SimulationState;
use crate::stats::{coefficient_of_variation, conservation_ratio, linear_slope, mean};
use crate::types::{Timestamp, Trend};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Step times considered for utilization and stability
const TIMING_WINDOW: usize = 10;
/// Stability scores considered for the trend
const TREND_WINDOW: usize = 20;
const TREND_EPSILON: f64 = 1e-3;
/// Approximate heap cost of one map entry besides the value
const ENTRY_OVERHEAD_BYTES: usize = 48;

/// Cost of one step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub step_time_ms: f64,
    /// Estimated footprint of the retained history
    pub memory_bytes: usize,
    /// Recent average step time over the frame budget
    pub cpu_utilization: f64,
    pub event_count: usize,
    pub convergence_rate: f64,
    /// Inverse spread of recent step times, in `(0, 1]`
    pub stability_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: Timestamp,
    pub state: SimulationState,
    pub events: Vec<Event>,
    pub performance: PerformanceMetrics,
}

/// Summary of the run so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorReport {
    pub generated_at: Timestamp,
    pub step_count: u64,
    pub average_step_time_ms: f64,
    pub total_events: usize,
    pub anomaly_count: usize,
    pub stability_trend: Trend,
    pub energy_conservation: f64,
    pub momentum_conservation: f64,
    pub recommendations: Vec<String>,
}

pub struct StateMonitor {
    config: MonitorConfig,
    history: VecDeque<HistoryEntry>,
    steps: u64,
    total_events: usize,
    total_step_time_ms: f64,
    anomalies: VecDeque<Anomaly>,
    anomaly_total: usize,
    reports: VecDeque<MonitorReport>,
    initial_energy: Option<f64>,
    initial_momentum: Option<f64>,
    last_update: Option<Instant>,
}

impl StateMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            history: VecDeque::with_capacity(config.max_history_size.min(1024)),
            config,
            steps: 0,
            total_events: 0,
            total_step_time_ms: 0.0,
            anomalies: VecDeque::new(),
            anomaly_total: 0,
            reports: VecDeque::new(),
            initial_energy: None,
            initial_momentum: None,
            last_update: None,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Record a state, timing the step from the previous update
    pub fn update(&mut self, state: &SimulationState) -> Option<Anomaly> {
        let now = Instant::now();
        let elapsed = self
            .last_update
            .map(|last| now.duration_since(last))
            .unwrap_or_default();
        self.last_update = Some(now);
        self.update_with_elapsed(state, elapsed)
    }

    /// Record a state that took `elapsed` to compute
    ///
    /// Returns the most severe anomaly found in the updated history.
    pub fn update_with_elapsed(
        &mut self,
        state: &SimulationState,
        elapsed: Duration,
    ) -> Option<Anomaly> {
        self.steps += 1;
        self.total_events += state.events.len();
        let step_time_ms = elapsed.as_secs_f64() * 1000.0;
        self.total_step_time_ms += step_time_ms;

        if self.initial_energy.is_none() {
            self.initial_energy = state.observed.energy;
        }
        if self.initial_momentum.is_none() {
            self.initial_momentum = state.observed.momentum;
        }

        let mut times = self.recent_step_times(TIMING_WINDOW - 1);
        times.push(step_time_ms);
        let performance = PerformanceMetrics {
            step_time_ms,
            memory_bytes: self.memory_estimate(state),
            cpu_utilization: mean(&times) / self.config.frame_budget_ms.max(f64::EPSILON),
            event_count: state.events.len(),
            convergence_rate: state.convergence.convergence_rate,
            stability_score: 1.0 / (1.0 + coefficient_of_variation(&times)),
        };

        let cap = self.config.max_history_size.max(1);
        if self.history.len() >= cap {
            self.history.pop_front();
        }
        self.history.push_back(HistoryEntry {
            timestamp: Utc::now(),
            state: state.clone(),
            events: state.events.clone(),
            performance,
        });

        let found = anomaly::most_severe(&self.history, &self.config);
        if let Some(a) = &found {
            tracing::debug!("Anomaly at t = {:.4}: {}", a.time, a.description);
            self.anomaly_total += 1;
            push_bounded(&mut self.anomalies, a.clone(), cap);
        }

        let interval = self.config.report_interval as u64;
        if interval > 0 && self.steps % interval == 0 {
            let report = self.report();
            tracing::info!(
                "Monitor: {} steps, {:.3} ms/step, {} events, {} anomalies, stability {}",
                report.step_count,
                report.average_step_time_ms,
                report.total_events,
                report.anomaly_count,
                report.stability_trend
            );
            push_bounded(&mut self.reports, report, cap);
        }

        found
    }

    /// Summary of everything recorded since the last reset
    pub fn report(&self) -> MonitorReport {
        let scores: Vec<f64> = self
            .history
            .iter()
            .skip(self.history.len().saturating_sub(TREND_WINDOW))
            .map(|e| e.performance.stability_score)
            .collect();
        let stability_trend = Trend::from_slope(linear_slope(&scores), TREND_EPSILON);

        let latest = self.history.back();
        let conservation = |initial: Option<f64>, current: Option<f64>| match (initial, current) {
            (Some(a), Some(b)) => conservation_ratio(a, b),
            _ => 1.0,
        };
        let energy_conservation = conservation(
            self.initial_energy,
            latest.and_then(|e| e.state.observed.energy),
        );
        let momentum_conservation = conservation(
            self.initial_momentum,
            latest.and_then(|e| e.state.observed.momentum),
        );
        let cpu_utilization = latest.map(|e| e.performance.cpu_utilization).unwrap_or(0.0);

        MonitorReport {
            generated_at: Utc::now(),
            step_count: self.steps,
            average_step_time_ms: if self.steps == 0 {
                0.0
            } else {
                self.total_step_time_ms / self.steps as f64
            },
            total_events: self.total_events,
            anomaly_count: self.anomaly_total,
            stability_trend,
            energy_conservation,
            momentum_conservation,
            recommendations: self.recommendations(
                stability_trend,
                energy_conservation,
                cpu_utilization,
            ),
        }
    }

    fn recommendations(
        &self,
        trend: Trend,
        energy_conservation: f64,
        cpu_utilization: f64,
    ) -> Vec<String> {
        let kinds: HashSet<AnomalyKind> = self.anomalies.iter().map(|a| a.kind).collect();
        let mut out = Vec::new();
        if kinds.contains(&AnomalyKind::Divergence) {
            out.push("Reduce the time step or switch to the adaptive solver".to_string());
        }
        if kinds.contains(&AnomalyKind::Oscillation) {
            out.push("Values alternate between steps; reduce the time step".to_string());
        }
        if kinds.contains(&AnomalyKind::EnergyLeak) || energy_conservation < 0.99 {
            out.push("Energy drifts; use rk4 or a smaller time step".to_string());
        }
        if kinds.contains(&AnomalyKind::Instability) || trend == Trend::Degrading {
            out.push("Step cost is irregular; check for a growing state or event count".to_string());
        }
        if cpu_utilization > 1.0 {
            out.push("Steps exceed the frame budget; increase the time step or simplify the model".to_string());
        }
        out
    }

    pub fn history(&self) -> &VecDeque<HistoryEntry> {
        &self.history
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.history.back()
    }

    /// Most recent anomalies, at most `max_history_size`
    pub fn anomalies(&self) -> &VecDeque<Anomaly> {
        &self.anomalies
    }

    /// Reports produced at each `report_interval`, at most `max_history_size`
    pub fn reports(&self) -> &VecDeque<MonitorReport> {
        &self.reports
    }

    pub fn step_count(&self) -> u64 {
        self.steps
    }

    /// Forget everything recorded
    pub fn reset(&mut self) {
        self.history.clear();
        self.steps = 0;
        self.total_events = 0;
        self.total_step_time_ms = 0.0;
        self.anomalies.clear();
        self.anomaly_total = 0;
        self.reports.clear();
        self.initial_energy = None;
        self.initial_momentum = None;
        self.last_update = None;
    }

    fn recent_step_times(&self, n: usize) -> Vec<f64> {
        self.history
            .iter()
            .skip(self.history.len().saturating_sub(n))
            .map(|e| e.performance.step_time_ms)
            .collect()
    }

    fn memory_estimate(&self, state: &SimulationState) -> usize {
        let values = state.variables.len() + state.derivatives.len();
        let per_entry = std::mem::size_of::<HistoryEntry>()
            + values * (std::mem::size_of::<f64>() + ENTRY_OVERHEAD_BYTES);
        per_entry * (self.history.len() + 1).min(self.config.max_history_size.max(1))
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, cap: usize) {
    while queue.len() >= cap {
        queue.pop_front();
    }
    queue.push_back(item);
}
