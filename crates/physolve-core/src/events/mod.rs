//! Event detection
//!
//! Detectors compare the state before and after a step and report what
//! happened in between. They are edge-triggered: a condition that holds
//! for many steps is reported once, on the step where it starts.

pub mod detectors;

pub use detectors::{CollisionDetector, CustomDetector, StateChangeDetector};

use crate::ir::SystemIr;
use crate::simulation::state::SimulationState;
use crate::types::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// What kind of fact an event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Collision,
    BoundaryCrossing,
    StateChange,
    Custom,
}

/// A timestamped fact detected during simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: EventType,
    /// Simulated time in seconds
    pub time: f64,
    pub description: String,
    pub parameters: BTreeMap<String, serde_json::Value>,
    pub severity: Severity,
}

impl Event {
    pub fn new(event_type: EventType, time: f64, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            time,
            description: description.into(),
            parameters: BTreeMap::new(),
            severity: Severity::Low,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// One independent detector
pub trait EventDetector: Send + Sync {
    fn name(&self) -> &str;

    fn detect(&self, old: &SimulationState, new: &SimulationState, ir: &SystemIr) -> Vec<Event>;
}

/// Runs every registered detector and merges their events by time
#[derive(Default)]
pub struct CompositeDetector {
    detectors: Vec<Box<dyn EventDetector>>,
}

impl CompositeDetector {
    /// An empty composite
    pub fn new() -> Self {
        Self::default()
    }

    /// Collision, state-change and custom detectors with default thresholds
    pub fn standard() -> Self {
        let mut composite = Self::new();
        composite.add(Box::new(CollisionDetector::default()));
        composite.add(Box::new(StateChangeDetector::default()));
        composite.add(Box::new(CustomDetector::default()));
        composite
    }

    pub fn add(&mut self, detector: Box<dyn EventDetector>) {
        tracing::debug!("Registered event detector '{}'", detector.name());
        self.detectors.push(detector);
    }

    /// Remove every detector with this name; returns whether any was removed
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.detectors.len();
        self.detectors.retain(|d| d.name() != name);
        self.detectors.len() != before
    }

    pub fn names(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    pub fn detect(&self, old: &SimulationState, new: &SimulationState, ir: &SystemIr) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .detectors
            .iter()
            .flat_map(|d| d.detect(old, new, ir))
            .collect();
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::model::ProblemModel;
    use crate::ir::IrBuilder;

    struct Fixed {
        name: &'static str,
        times: Vec<f64>,
    }

    impl EventDetector for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn detect(&self, _: &SimulationState, _: &SimulationState, _: &SystemIr) -> Vec<Event> {
            self.times
                .iter()
                .map(|t| Event::new(EventType::Custom, *t, self.name))
                .collect()
        }
    }

    #[tokio::test]
    async fn test_composite_sorts_by_time() {
        let ir = IrBuilder::new()
            .convert(&ProblemModel::default())
            .await
            .ir
            .unwrap();
        let mut composite = CompositeDetector::new();
        composite.add(Box::new(Fixed {
            name: "late",
            times: vec![0.3, 0.1],
        }));
        composite.add(Box::new(Fixed {
            name: "early",
            times: vec![0.2],
        }));

        let state = SimulationState::new(0.0);
        let events = composite.detect(&state, &state, &ir);
        let times: Vec<f64> = events.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_add_and_remove() {
        let mut composite = CompositeDetector::standard();
        assert_eq!(composite.names(), vec!["collision", "state_change", "custom"]);

        assert!(composite.remove("state_change"));
        assert!(!composite.remove("state_change"));
        assert_eq!(composite.len(), 2);
    }

    #[test]
    fn test_event_builder() {
        let event = Event::new(EventType::Collision, 1.5, "a hit b")
            .with_severity(Severity::High)
            .with_parameter("distance", 0.25);
        assert_eq!(event.severity, Severity::High);
        assert_eq!(event.parameters["distance"], serde_json::json!(0.25));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "collision");
    }
}
