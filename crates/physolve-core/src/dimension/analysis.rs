//! Dimensional inference over parsed expressions
//!
//! Symbols without a known dimension make the surrounding sub-expression
//! "unknown" rather than failing; only provable mismatches are reported.

use super::Dimension;
use crate::expr::{BinaryOp, EquationTarget, Expr, ParsedEquation};
use std::collections::BTreeMap;

/// Result of inferring an expression's dimension
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Inference {
    /// The inferred dimension, `None` when it could not be determined
    pub dimension: Option<Dimension>,
    /// Human readable descriptions of every mismatch found
    pub mismatches: Vec<String>,
}

/// Infer the dimension of `expr` given known symbol dimensions
pub fn infer(expr: &Expr, symbols: &BTreeMap<String, Dimension>) -> Inference {
    let mut mismatches = Vec::new();
    let dimension = infer_inner(expr, symbols, &mut mismatches);
    Inference {
        dimension,
        mismatches,
    }
}

fn infer_inner(
    expr: &Expr,
    symbols: &BTreeMap<String, Dimension>,
    mismatches: &mut Vec<String>,
) -> Option<Dimension> {
    match expr {
        // Zero carries any dimension
        Expr::Number(n) if *n == 0.0 => None,
        Expr::Number(_) => Some(Dimension::DIMENSIONLESS),
        Expr::Symbol(name) => match name.as_str() {
            "pi" | "π" => Some(Dimension::DIMENSIONLESS),
            _ => symbols.get(name).copied(),
        },
        Expr::Neg(inner) => infer_inner(inner, symbols, mismatches),
        Expr::Binary { op, lhs, rhs } => {
            let a = infer_inner(lhs, symbols, mismatches);
            let b = infer_inner(rhs, symbols, mismatches);
            match op {
                BinaryOp::Add | BinaryOp::Sub => match (a, b) {
                    (Some(x), Some(y)) if x != y => {
                        mismatches.push(format!("cannot add or subtract {} and {}", x, y));
                        Some(x)
                    }
                    (Some(x), _) => Some(x),
                    (None, y) => y,
                },
                BinaryOp::Mul => Some(a?.multiply(&b?)),
                BinaryOp::Div => Some(a?.divide(&b?)),
                BinaryOp::Pow => {
                    if let Some(exp_dim) = b {
                        if !exp_dim.is_dimensionless() {
                            mismatches.push(format!("exponent must be dimensionless, got {}", exp_dim));
                        }
                    }
                    let base = a?;
                    if base.is_dimensionless() {
                        return Some(base);
                    }
                    match constant_value(rhs) {
                        Some(p) => scale_dimension(&base, p).or_else(|| {
                            mismatches.push(format!("cannot raise {} to the power {}", base, p));
                            None
                        }),
                        None => {
                            mismatches.push(format!(
                                "dimensioned base {} raised to a variable power",
                                base
                            ));
                            None
                        }
                    }
                }
            }
        }
        Expr::Call { name, args } => {
            let dims: Vec<Option<Dimension>> = args
                .iter()
                .map(|a| infer_inner(a, symbols, mismatches))
                .collect();
            match name.as_str() {
                "sqrt" => {
                    let d = dims.first().copied().flatten()?;
                    scale_dimension(&d, 0.5).or_else(|| {
                        mismatches.push(format!("square root of {} is not a whole dimension", d));
                        None
                    })
                }
                "abs" => dims.first().copied().flatten(),
                "min" | "max" => {
                    if let (Some(Some(x)), Some(Some(y))) = (dims.first(), dims.get(1)) {
                        if x != y {
                            mismatches.push(format!("{} of {} and {}", name, x, y));
                        }
                    }
                    dims.iter().flatten().next().copied()
                }
                _ => {
                    for d in dims.iter().flatten() {
                        if !d.is_dimensionless() {
                            mismatches.push(format!("{} expects a dimensionless argument, got {}", name, d));
                        }
                    }
                    Some(Dimension::DIMENSIONLESS)
                }
            }
        }
    }
}

fn constant_value(expr: &Expr) -> Option<f64> {
    match expr {
        Expr::Number(n) => Some(*n),
        Expr::Neg(inner) => constant_value(inner).map(|v| -v),
        Expr::Binary {
            op: BinaryOp::Div,
            lhs,
            rhs,
        } => Some(constant_value(lhs)? / constant_value(rhs)?),
        _ => None,
    }
}

/// Multiply every exponent by `power`, if the result stays integral
fn scale_dimension(dim: &Dimension, power: f64) -> Option<Dimension> {
    let mut out = [0i32; 7];
    for (slot, e) in out.iter_mut().zip(dim.exponents()) {
        let scaled = e as f64 * power;
        if (scaled - scaled.round()).abs() > 1e-9 {
            return None;
        }
        *slot = scaled.round() as i32;
    }
    Some(Dimension::new(out))
}

/// Dimensional verdict for one equation
#[derive(Debug, Clone, PartialEq)]
pub struct EquationDimensions {
    pub lhs: Option<Dimension>,
    pub rhs: Option<Dimension>,
    pub mismatches: Vec<String>,
}

impl EquationDimensions {
    /// Consistent unless a mismatch was proven
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// Both sides had a known dimension
    pub fn is_fully_known(&self) -> bool {
        self.lhs.is_some() && self.rhs.is_some()
    }
}

/// Check both sides of an equation against each other
pub fn check_equation(
    equation: &ParsedEquation,
    symbols: &BTreeMap<String, Dimension>,
) -> EquationDimensions {
    let rhs = infer(&equation.rhs, symbols);
    let mut mismatches = rhs.mismatches;

    let lhs = match (&equation.target, &equation.lhs) {
        (EquationTarget::Derivative { variable, order }, _) => symbols
            .get(variable)
            .map(|d| d.divide(&Dimension::TIME.pow(*order as i32))),
        (_, Some(lhs_expr)) => {
            let inferred = infer(lhs_expr, symbols);
            mismatches.extend(inferred.mismatches);
            inferred.dimension
        }
        (_, None) => None,
    };

    if let (Some(l), Some(r)) = (lhs, rhs.dimension) {
        if l != r {
            mismatches.push(format!("left side is {} but right side is {}", l, r));
        }
    }

    EquationDimensions {
        lhs,
        rhs: rhs.dimension,
        mismatches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols() -> BTreeMap<String, Dimension> {
        [
            ("x", Dimension::LENGTH),
            ("v", Dimension::VELOCITY),
            ("g", Dimension::ACCELERATION),
            ("h", Dimension::LENGTH),
            ("m", Dimension::MASS),
            ("k", Dimension::parse("MT^-2")),
            ("t", Dimension::TIME),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[test]
    fn test_consistent_oscillator() {
        let eq = ParsedEquation::parse("dv/dt = -k/m*x").unwrap();
        let verdict = check_equation(&eq, &symbols());
        assert!(verdict.is_consistent(), "{:?}", verdict.mismatches);
        assert!(verdict.is_fully_known());
    }

    #[test]
    fn test_sqrt_halves_exponents() {
        let expr = Expr::parse("sqrt(2*g*h)").unwrap();
        assert_eq!(infer(&expr, &symbols()).dimension, Some(Dimension::VELOCITY));
    }

    #[test]
    fn test_addition_mismatch() {
        let eq = ParsedEquation::parse("v = x + t").unwrap();
        let verdict = check_equation(&eq, &symbols());
        assert!(!verdict.is_consistent());
    }

    #[test]
    fn test_lhs_rhs_mismatch() {
        let eq = ParsedEquation::parse("dx/dt = g").unwrap();
        let verdict = check_equation(&eq, &symbols());
        assert_eq!(verdict.mismatches.len(), 1);
    }

    #[test]
    fn test_unknown_symbols_are_not_errors() {
        let eq = ParsedEquation::parse("dv/dt = -mystery*x").unwrap();
        let verdict = check_equation(&eq, &symbols());
        assert!(verdict.is_consistent());
        assert!(verdict.rhs.is_none());
    }

    #[test]
    fn test_zero_matches_any_dimension() {
        let eq = ParsedEquation::parse("dv/dt = 0").unwrap();
        assert!(check_equation(&eq, &symbols()).is_consistent());
    }

    #[test]
    fn test_energy_expression() {
        let expr = Expr::parse("0.5*m*v^2 + m*g*h").unwrap();
        assert_eq!(infer(&expr, &symbols()).dimension, Some(Dimension::ENERGY));
    }
}
