//! Built-in detectors

use super::{Event, EventDetector, EventType};
use crate::expr::Comparison;
use crate::ir::{Constraint, ConstraintKind, SystemIr};
use crate::simulation::state::{distance, magnitude, SimulationState};
use crate::types::Severity;
use itertools::Itertools;

/// Fraction of the step at which a comparison's margin reaches zero
fn crossing_fraction(before: f64, after: f64) -> f64 {
    if before == after {
        1.0
    } else {
        (before / (before - after)).clamp(0.0, 1.0)
    }
}

fn interpolated_time(old: &SimulationState, new: &SimulationState, fraction: f64) -> f64 {
    old.time + (new.time - old.time) * fraction
}

/// Object pairs coming into contact, and non-terminal boundaries being left
#[derive(Debug, Clone, Default)]
pub struct CollisionDetector;

impl CollisionDetector {
    fn object_collisions(
        &self,
        old: &SimulationState,
        new: &SimulationState,
        ir: &SystemIr,
    ) -> Vec<Event> {
        ir.system
            .objects
            .iter()
            .tuple_combinations()
            .filter_map(|(a, b)| {
                let contact = a.radius + b.radius;
                let before = distance(old.position_of(&a.id), old.position_of(&b.id));
                let after = distance(new.position_of(&a.id), new.position_of(&b.id));
                if after > contact || before <= contact {
                    return None;
                }
                let relative = new.velocity_of(&a.id);
                let other = new.velocity_of(&b.id);
                let speed = magnitude([
                    relative[0] - other[0],
                    relative[1] - other[1],
                    relative[2] - other[2],
                ]);
                Some(
                    Event::new(
                        EventType::Collision,
                        new.time,
                        format!("{} collided with {}", a.id, b.id),
                    )
                    .with_severity(Severity::Medium)
                    .with_parameter("object_a", a.id.as_str())
                    .with_parameter("object_b", b.id.as_str())
                    .with_parameter("distance", after)
                    .with_parameter("relative_speed", speed),
                )
            })
            .collect()
    }

    fn boundary_crossings(
        &self,
        old: &SimulationState,
        new: &SimulationState,
        ir: &SystemIr,
    ) -> Vec<Event> {
        ir.system
            .boundary_conditions
            .iter()
            .filter(|c| !c.terminal)
            .filter_map(|constraint| {
                let comparison = Comparison::parse(&constraint.expression).ok()?;
                let before = comparison.margin(old).ok()?;
                let after = comparison.margin(new).ok()?;
                if before < 0.0 || after >= 0.0 {
                    return None;
                }
                let fraction = crossing_fraction(before, after);
                Some(boundary_event(
                    constraint,
                    interpolated_time(old, new, fraction),
                ))
            })
            .collect()
    }
}

/// Event recorded when a boundary constraint stops holding
pub fn boundary_event(constraint: &Constraint, time: f64) -> Event {
    Event::new(
        EventType::BoundaryCrossing,
        time,
        format!("Boundary '{}' crossed ({})", constraint.id, constraint.expression),
    )
    .with_severity(Severity::Medium)
    .with_parameter("constraint", constraint.id.as_str())
    .with_parameter("expression", constraint.expression.as_str())
    .with_parameter("terminal", constraint.terminal)
}

impl EventDetector for CollisionDetector {
    fn name(&self) -> &str {
        "collision"
    }

    fn detect(&self, old: &SimulationState, new: &SimulationState, ir: &SystemIr) -> Vec<Event> {
        let mut events = self.object_collisions(old, new, ir);
        events.extend(self.boundary_crossings(old, new, ir));
        events
    }
}

/// Velocity reversals, acceleration jumps and energy jumps
#[derive(Debug, Clone)]
pub struct StateChangeDetector {
    /// Both speeds must exceed this for a reversal to count
    pub min_speed: f64,
    pub acceleration_jump: f64,
    /// Relative energy change that counts as a jump
    pub energy_jump: f64,
    /// Energy scale used when the previous energy is near zero
    pub energy_floor: f64,
}

impl Default for StateChangeDetector {
    fn default() -> Self {
        Self {
            min_speed: 0.1,
            acceleration_jump: 0.1,
            energy_jump: 0.1,
            energy_floor: 1.0,
        }
    }
}

impl EventDetector for StateChangeDetector {
    fn name(&self) -> &str {
        "state_change"
    }

    fn detect(&self, old: &SimulationState, new: &SimulationState, ir: &SystemIr) -> Vec<Event> {
        let mut events = Vec::new();

        for object in ir.system.objects.iter().filter(|o| !o.fixed) {
            let before = old.velocity_of(&object.id);
            let after = new.velocity_of(&object.id);
            let (speed_before, speed_after) = (magnitude(before), magnitude(after));
            if speed_before > self.min_speed && speed_after > self.min_speed {
                let dot = before[0] * after[0] + before[1] * after[1] + before[2] * after[2];
                let cosine = dot / (speed_before * speed_after);
                if cosine < 0.0 {
                    events.push(
                        Event::new(
                            EventType::StateChange,
                            new.time,
                            format!("{} reversed direction", object.id),
                        )
                        .with_parameter("object", object.id.as_str())
                        .with_parameter("cosine", cosine),
                    );
                }
            }

            let jump = (magnitude(new.acceleration_of(&object.id))
                - magnitude(old.acceleration_of(&object.id)))
            .abs();
            if jump > self.acceleration_jump {
                events.push(
                    Event::new(
                        EventType::StateChange,
                        new.time,
                        format!("{} acceleration changed by {:.3}", object.id, jump),
                    )
                    .with_severity(Severity::from_ratio(jump / self.acceleration_jump))
                    .with_parameter("object", object.id.as_str())
                    .with_parameter("jump", jump),
                );
            }
        }

        if let (Some(before), Some(after)) = (old.observed.energy, new.observed.energy) {
            let change = (after - before).abs() / before.abs().max(self.energy_floor);
            if change > self.energy_jump {
                events.push(
                    Event::new(
                        EventType::StateChange,
                        new.time,
                        format!("Energy changed by {:.1}%", change * 100.0),
                    )
                    .with_severity(Severity::from_ratio(change / self.energy_jump))
                    .with_parameter("energy_before", before)
                    .with_parameter("energy_after", after),
                );
            }
        }

        events
    }
}

/// Physical-constraint violations and speed threshold breaches
#[derive(Debug, Clone)]
pub struct CustomDetector {
    pub speed_limit: f64,
}

impl Default for CustomDetector {
    fn default() -> Self {
        Self { speed_limit: 10.0 }
    }
}

impl EventDetector for CustomDetector {
    fn name(&self) -> &str {
        "custom"
    }

    fn detect(&self, old: &SimulationState, new: &SimulationState, ir: &SystemIr) -> Vec<Event> {
        let mut events = Vec::new();

        for constraint in ir
            .system
            .constraints
            .iter()
            .filter(|c| c.kind == ConstraintKind::Physical)
        {
            let Ok(comparison) = Comparison::parse(&constraint.expression) else {
                continue;
            };
            let after = match comparison.violation(new, constraint.tolerance) {
                Ok(v) => v,
                Err(e) => {
                    tracing::debug!("Constraint '{}' not evaluable: {}", constraint.id, e);
                    continue;
                }
            };
            let before = comparison.violation(old, constraint.tolerance).unwrap_or(0.0);
            if after > 0.0 && before == 0.0 {
                events.push(
                    Event::new(
                        EventType::Custom,
                        new.time,
                        format!(
                            "Constraint '{}' violated ({})",
                            constraint.id, constraint.expression
                        ),
                    )
                    .with_severity(Severity::from_ratio(1.0 + after))
                    .with_parameter("constraint", constraint.id.as_str())
                    .with_parameter("violation", after),
                );
            }
        }

        for object in &ir.system.objects {
            let before = magnitude(old.velocity_of(&object.id));
            let after = magnitude(new.velocity_of(&object.id));
            if after > self.speed_limit && before <= self.speed_limit {
                events.push(
                    Event::new(
                        EventType::Custom,
                        new.time,
                        format!("{} exceeded speed {}", object.id, self.speed_limit),
                    )
                    .with_severity(Severity::from_ratio(after / self.speed_limit))
                    .with_parameter("object", object.id.as_str())
                    .with_parameter("speed", after),
                );
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::model::{ConstraintSpec, ObjectSpec, ProblemModel, SystemSpec};
    use crate::ir::IrBuilder;

    async fn ir_with(objects: Vec<ObjectSpec>, constraints: Vec<ConstraintSpec>) -> SystemIr {
        let model = ProblemModel {
            system: Some(SystemSpec {
                system_type: "particles".to_string(),
                objects,
                constraints,
                ..Default::default()
            }),
            ..Default::default()
        };
        IrBuilder::new().convert(&model).await.ir.unwrap()
    }

    fn ball(id: &str) -> ObjectSpec {
        ObjectSpec {
            id: id.to_string(),
            radius: Some(0.5),
            ..Default::default()
        }
    }

    fn state(time: f64, values: &[(&str, f64)]) -> SimulationState {
        let mut s = SimulationState::new(time);
        for (k, v) in values {
            s.variables.insert(k.to_string(), *v);
        }
        s
    }

    #[tokio::test]
    async fn test_collision_is_edge_triggered() {
        let ir = ir_with(vec![ball("a"), ball("b")], Vec::new()).await;
        let apart = state(0.0, &[("b_x", 2.0)]);
        let touching = state(0.1, &[("b_x", 0.9)]);
        let still_touching = state(0.2, &[("b_x", 0.8)]);

        let events = CollisionDetector.detect(&apart, &touching, &ir);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Collision);
        assert!(CollisionDetector
            .detect(&touching, &still_touching, &ir)
            .is_empty());
    }

    #[tokio::test]
    async fn test_boundary_crossing_interpolates_time() {
        let ir = ir_with(
            Vec::new(),
            vec![ConstraintSpec {
                id: Some("wall".to_string()),
                kind: ConstraintKind::Boundary,
                expression: "x < 1".to_string(),
                ..Default::default()
            }],
        )
        .await;
        let old = state(1.0, &[("x", 0.5)]);
        let new = state(2.0, &[("x", 1.5)]);

        let events = CollisionDetector.detect(&old, &new, &ir);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::BoundaryCrossing);
        assert!((events[0].time - 1.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_velocity_reversal() {
        let ir = ir_with(vec![ball("a")], Vec::new()).await;
        let up = state(0.0, &[("a_vy", 1.0)]);
        let down = state(0.1, &[("a_vy", -1.0)]);
        let slow = state(0.1, &[("a_vy", -0.05)]);

        let detector = StateChangeDetector::default();
        let events = detector.detect(&up, &down, &ir);
        assert!(events.iter().any(|e| e.description.contains("reversed")));
        assert!(detector.detect(&up, &slow, &ir).is_empty());
    }

    #[tokio::test]
    async fn test_energy_jump() {
        let ir = ir_with(Vec::new(), Vec::new()).await;
        let mut before = state(0.0, &[]);
        before.observed.energy = Some(10.0);
        let mut after = state(0.1, &[]);
        after.observed.energy = Some(11.5);

        let events = StateChangeDetector::default().detect(&before, &after, &ir);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, Severity::Low);
    }

    #[tokio::test]
    async fn test_custom_constraint_and_speed() {
        let ir = ir_with(
            vec![ball("a")],
            vec![ConstraintSpec {
                id: Some("cap".to_string()),
                expression: "a_x <= 5".to_string(),
                ..Default::default()
            }],
        )
        .await;
        let old = state(0.0, &[("a_x", 4.0), ("a_vx", 9.0)]);
        let new = state(0.1, &[("a_x", 6.0), ("a_vx", 12.0)]);

        let events = CustomDetector::default().detect(&old, &new, &ir);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.event_type == EventType::Custom));
        assert!(CustomDetector::default().detect(&new, &new, &ir).is_empty());
    }
}
