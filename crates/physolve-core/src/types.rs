//! Shared types
//!
//! Severity levels and trends used by the event detector, the state monitor
//! and both validators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type alias
pub type Timestamp = DateTime<Utc>;

/// How serious a finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Severity of a measurement that exceeded its threshold by `ratio`
    ///
    /// `ratio` is measured / threshold, so anything reported is at least 1.
    pub fn from_ratio(ratio: f64) -> Self {
        match ratio {
            r if r < 2.0 => Severity::Low,
            r if r < 5.0 => Severity::Medium,
            r if r < 10.0 => Severity::High,
            _ => Severity::Critical,
        }
    }

    /// Penalty applied when scoring, in `(0, 1]`
    pub fn weight(self) -> f64 {
        match self {
            Severity::Low => 0.25,
            Severity::Medium => 0.5,
            Severity::High => 0.75,
            Severity::Critical => 1.0,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// Direction a quality measure is moving in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Degrading,
}

impl Trend {
    /// Trend of a measure where larger is better
    pub fn from_slope(slope: f64, epsilon: f64) -> Self {
        if slope.abs() < epsilon || !slope.is_finite() {
            Trend::Stable
        } else if slope > 0.0 {
            Trend::Improving
        } else {
            Trend::Degrading
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_tiers() {
        assert_eq!(Severity::from_ratio(1.2), Severity::Low);
        assert_eq!(Severity::from_ratio(3.0), Severity::Medium);
        assert_eq!(Severity::from_ratio(7.0), Severity::High);
        assert_eq!(Severity::from_ratio(50.0), Severity::Critical);
        assert!(Severity::Critical > Severity::Low);
    }

    #[test]
    fn test_trend_from_slope() {
        assert_eq!(Trend::from_slope(0.5, 0.01), Trend::Improving);
        assert_eq!(Trend::from_slope(-0.5, 0.01), Trend::Degrading);
        assert_eq!(Trend::from_slope(0.001, 0.01), Trend::Stable);
        assert_eq!(Trend::from_slope(f64::NAN, 0.01), Trend::Stable);
    }
}
