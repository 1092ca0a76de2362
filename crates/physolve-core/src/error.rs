//! Error types for Physolve Core
//!
//! This module defines the error types used throughout the engine.
//! We use `thiserror` for ergonomic error definitions with automatic Display/Error implementations.
//!
//! Stage entry points (IR conversion, simulation, validation) never return these
//! directly to callers: they fold them into the `errors` list of their structured
//! result. The typed errors exist so internal code can use `?` and so tests can
//! match on precise failure modes.

use thiserror::Error;

/// Result type alias for Physolve operations
pub type Result<T> = std::result::Result<T, PhysolveError>;

/// Main error type for Physolve operations
#[derive(Error, Debug)]
pub enum PhysolveError {
    /// IR construction errors
    #[error("IR error: {0}")]
    Ir(#[from] IrError),

    /// Simulation errors
    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),

    /// Expression parsing/evaluation errors
    #[error("Expression error: {0}")]
    Expression(#[from] ExprError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<PhysolveError>,
    },
}

/// Errors raised while building the intermediate representation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IrError {
    #[error("Cyclic dependency detected at module '{module}'")]
    CyclicDependency { module: String },

    #[error("Equation '{equation}' has differential order {order}; at most 2 is supported")]
    UnsupportedOrder { equation: String, order: u32 },

    #[error("Module declared twice: {0}")]
    DuplicateModule(String),

    #[error("Module '{module}' depends on unknown module '{dependency}'")]
    UnknownDependency { module: String, dependency: String },
}

/// Errors raised by the numerical simulator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("Invalid simulation configuration: {0}")]
    InvalidConfig(String),

    #[error("Step size collapsed to {dt:e} at t = {time}")]
    StepSizeCollapse { time: f64, dt: f64 },

    #[error("Variable '{variable}' became non-finite at t = {time}")]
    NonFiniteState { time: f64, variable: String },
}

/// Errors raised while parsing or evaluating arithmetic expressions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Function '{name}' expects {expected} argument(s), got {actual}")]
    Arity {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Expression evaluated to a non-finite value")]
    NonFinite,

    #[error("Invalid comparison: {0}")]
    InvalidComparison(String),
}

/// Errors related to configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(e: toml::ser::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

impl PhysolveError {
    /// Add context to an error
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add lazy context to a Result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context() {
        let err = IrError::CyclicDependency {
            module: "energy".to_string(),
        };
        let err = PhysolveError::from(err);
        let err = err.context("Failed to order modules");

        let message = err.to_string();
        assert!(message.contains("Failed to order modules"));
        assert!(message.contains("energy"));
    }

    #[test]
    fn test_result_ext() {
        let result: Result<()> = Err(ExprError::UnknownSymbol("omega".to_string()).into());
        let result = result.context("Evaluating spring equation");

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Evaluating spring equation"));
    }

    #[test]
    fn test_config_error_from_toml() {
        let parsed: std::result::Result<toml::Value, _> = toml::from_str("not = [valid");
        let err = ConfigError::from(parsed.unwrap_err());
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
