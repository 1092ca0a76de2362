//! Declarative problem model consumed by the IR builder
//!
//! This is the shape produced by the DSL layer. Every section is optional;
//! the builder substitutes documented fallbacks for whatever is missing.

use crate::ir::types::{ConstraintKind, ParameterRole};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A complete declarative problem description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemModel {
    pub metadata: Option<ProblemMetadata>,
    pub system: Option<SystemSpec>,
    pub simulation: Option<SimulationSpec>,
    pub output: Option<OutputSpec>,
}

/// Descriptive metadata, including the original problem text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemMetadata {
    pub id: Option<String>,
    pub title: String,
    /// Problem statement in natural language
    pub description: String,
    pub domain: Option<String>,
    pub difficulty: Option<String>,
    pub tags: Vec<String>,
}

/// The physical system to simulate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSpec {
    #[serde(rename = "type")]
    pub system_type: String,
    pub parameters: Vec<ParameterSpec>,
    pub objects: Vec<ObjectSpec>,
    pub constraints: Vec<ConstraintSpec>,
    pub environment: Option<EnvironmentSpec>,
    /// Explicitly declared modules, merged with the detected ones
    pub modules: Vec<ModuleSpec>,
}

/// A declared parameter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSpec {
    pub symbol: String,
    pub value: Option<f64>,
    pub unit: String,
    /// Inferred from `value` when absent
    pub role: Option<ParameterRole>,
    pub description: String,
}

impl ParameterSpec {
    /// A parameter with a known value
    pub fn given(symbol: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            value: Some(value),
            unit: unit.into(),
            role: Some(ParameterRole::Given),
            description: String::new(),
        }
    }

    /// A parameter to be solved for
    pub fn unknown(symbol: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            value: None,
            unit: unit.into(),
            role: Some(ParameterRole::Unknown),
            description: String::new(),
        }
    }
}

/// A physical body participating in the problem
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectSpec {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub mass: Option<f64>,
    pub radius: Option<f64>,
    pub position: Option<[f64; 3]>,
    pub velocity: Option<[f64; 3]>,
    /// Fixed objects are not integrated
    pub fixed: bool,
    pub properties: BTreeMap<String, f64>,
}

/// A declared constraint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintSpec {
    pub id: Option<String>,
    pub kind: ConstraintKind,
    pub expression: String,
    pub tolerance: Option<f64>,
    /// Crossing a terminal boundary ends the simulation
    pub terminal: bool,
    pub description: String,
}

/// Ambient conditions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSpec {
    pub gravity: Option<f64>,
    pub air_resistance: Option<f64>,
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub medium: Option<String>,
}

/// Requested simulation settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSpec {
    pub duration: Option<f64>,
    pub time_step: Option<f64>,
    pub solver: Option<String>,
    /// `low`, `medium` or `high`
    pub precision: Option<String>,
}

/// Requested outputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSpec {
    pub variables: Vec<String>,
    pub plots: Vec<String>,
}

/// An explicitly declared module
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub module_type: String,
    pub parameters: Vec<ParameterSpec>,
    pub equations: Vec<String>,
    pub dependencies: Vec<String>,
    pub conservation_laws: Vec<String>,
    pub energy: Option<String>,
    pub momentum: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_partial_model() {
        let json = r#"{
            "system": {
                "type": "free_fall",
                "parameters": [
                    {"symbol": "h", "value": 20, "unit": "m"},
                    {"symbol": "v", "unit": "m/s", "role": "unknown"}
                ]
            }
        }"#;
        let model: ProblemModel = serde_json::from_str(json).unwrap();

        assert!(model.metadata.is_none());
        let system = model.system.unwrap();
        assert_eq!(system.system_type, "free_fall");
        assert_eq!(system.parameters.len(), 2);
        assert_eq!(system.parameters[0].value, Some(20.0));
        assert_eq!(system.parameters[1].role, Some(ParameterRole::Unknown));
    }

    #[test]
    fn test_empty_model_deserializes() {
        let model: ProblemModel = serde_json::from_str("{}").unwrap();
        assert_eq!(model, ProblemModel::default());
    }

    #[test]
    fn test_constraint_kind_defaults_to_physical() {
        let spec: ConstraintSpec = serde_json::from_str(r#"{"expression": "x > 0"}"#).unwrap();
        assert_eq!(spec.kind, ConstraintKind::Physical);
        assert!(!spec.terminal);
    }
}
