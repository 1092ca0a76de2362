//! Post-run validation
//!
//! Two independent auditors score a [`SimulationResult`]:
//! [`PhysicsValidator`] checks physical law, [`ResultValidator`] checks the
//! data itself. Both reduce every check to a score in `[0, 1]` and combine
//! the scores with a fixed weight table.
//!
//! [`SimulationResult`]: crate::simulation::SimulationResult

pub mod physics;
pub mod result;

pub use physics::{ConservationAudit, PhysicsValidationReport, PhysicsValidator};
pub use result::{ResultValidationReport, ResultValidator, SeriesAnomaly, SeriesAnomalyKind};

use serde::{Deserialize, Serialize};

/// Outcome of one check, the same shape for every category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub name: String,
    /// Satisfied, stable, consistent or causal, depending on the check
    pub passed: bool,
    pub score: f64,
    /// Largest deviation measured, in the check's own units
    pub deviation: f64,
    pub violations: usize,
    pub details: Vec<String>,
}

impl ValidationCheck {
    /// A passing check with a perfect score
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            score: 1.0,
            deviation: 0.0,
            violations: 0,
            details: Vec::new(),
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn detail(&mut self, detail: impl Into<String>) {
        self.details.push(detail.into());
    }
}

/// Weighted mean over the checks that ran, weights renormalized to 1
pub fn weighted_score(parts: &[(f64, Option<&ValidationCheck>)]) -> f64 {
    let present: Vec<(f64, f64)> = parts
        .iter()
        .filter_map(|(weight, check)| check.map(|c| (*weight, c.score)))
        .collect();
    let weight_sum: f64 = present.iter().map(|(w, _)| w).sum();
    if weight_sum <= 0.0 {
        return 0.0;
    }

    present
        .iter()
        .map(|(weight, score)| score * (weight / weight_sum))
        .sum()
}
