//! Equation and constraint forms
//!
//! An equation string is `lhs = rhs`. The left-hand side decides what the
//! equation means to the simulator:
//!
//! - `dx/dt`, `d2x/dt2`, `d^2x/dt^2`, `x'`, `x''` - a differential equation
//!   for `x` of the given order
//! - a bare identifier - an algebraic assignment
//! - anything else - a relation, kept for dimensional checks only
//!
//! Constraints are comparisons `lhs OP rhs` with `OP` one of
//! `<`, `<=`, `>`, `>=`, `==`, `!=`.

use super::{Expr, ExprResult, SymbolTable};
use crate::error::ExprError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref LEIBNIZ: Regex =
        Regex::new(r"^d\^?(\d*)\s*([A-Za-z_][A-Za-z0-9_]*)\s*/\s*dt\^?(\d*)$").unwrap();
    static ref PRIMES: Regex = Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)('+)$").unwrap();
    static ref IDENT: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// What the left-hand side of an equation designates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EquationTarget {
    /// `d^n variable / dt^n`
    Derivative { variable: String, order: u32 },
    /// `variable = ...`
    Assignment { variable: String },
    /// Any other left-hand side
    Relation,
}

/// A parsed `lhs = rhs` equation
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEquation {
    pub target: EquationTarget,
    /// Left-hand side as an expression (absent for derivative forms)
    pub lhs: Option<Expr>,
    pub rhs: Expr,
}

impl ParsedEquation {
    /// Parse an equation string
    ///
    /// A string without `=` is treated as an expression whose value is the
    /// right-hand side of a relation.
    pub fn parse(expression: &str) -> ExprResult<Self> {
        let (lhs_text, rhs_text) = match split_assignment(expression) {
            Some(parts) => parts,
            None => {
                return Ok(Self {
                    target: EquationTarget::Relation,
                    lhs: None,
                    rhs: Expr::parse(expression)?,
                })
            }
        };

        let rhs = Expr::parse(rhs_text)?;
        let lhs_text = lhs_text.trim();

        if let Some(target) = parse_derivative(lhs_text) {
            return Ok(Self {
                target,
                lhs: None,
                rhs,
            });
        }

        let lhs = Expr::parse(lhs_text)?;
        let target = if IDENT.is_match(lhs_text) {
            EquationTarget::Assignment {
                variable: lhs_text.to_string(),
            }
        } else {
            EquationTarget::Relation
        };

        Ok(Self {
            target,
            lhs: Some(lhs),
            rhs,
        })
    }

    /// Differential order (0 for algebraic forms)
    pub fn order(&self) -> u32 {
        match &self.target {
            EquationTarget::Derivative { order, .. } => *order,
            _ => 0,
        }
    }
}

/// Split on the single `=` that is not part of `==`, `<=`, `>=` or `!=`
fn split_assignment(expression: &str) -> Option<(&str, &str)> {
    let bytes = expression.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'=' {
            continue;
        }
        let prev = if i > 0 { bytes[i - 1] } else { b' ' };
        let next = bytes.get(i + 1).copied().unwrap_or(b' ');
        if matches!(prev, b'=' | b'<' | b'>' | b'!') || next == b'=' {
            continue;
        }
        return Some((&expression[..i], &expression[i + 1..]));
    }
    None
}

fn parse_derivative(lhs: &str) -> Option<EquationTarget> {
    if let Some(caps) = LEIBNIZ.captures(lhs) {
        let top = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let bottom = caps.get(3).map(|m| m.as_str()).unwrap_or("");
        let order = match (top, bottom) {
            ("", "") => 1,
            (t, "") => t.parse().ok()?,
            ("", b) => b.parse().ok()?,
            (t, b) if t == b => t.parse().ok()?,
            _ => return None,
        };
        return Some(EquationTarget::Derivative {
            variable: caps[2].to_string(),
            order,
        });
    }

    PRIMES.captures(lhs).map(|caps| EquationTarget::Derivative {
        variable: caps[1].to_string(),
        order: caps[2].len() as u32,
    })
}

/// Comparison operators for constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
        };
        write!(f, "{}", s)
    }
}

/// A constraint of the form `lhs OP rhs`
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub lhs: Expr,
    pub op: CmpOp,
    pub rhs: Expr,
}

impl Comparison {
    /// Parse `lhs OP rhs`
    pub fn parse(input: &str) -> ExprResult<Self> {
        const OPERATORS: [(&str, CmpOp); 7] = [
            ("<=", CmpOp::Le),
            (">=", CmpOp::Ge),
            ("==", CmpOp::Eq),
            ("!=", CmpOp::Ne),
            ("<", CmpOp::Lt),
            (">", CmpOp::Gt),
            ("=", CmpOp::Eq),
        ];

        for (token, op) in OPERATORS {
            if let Some((lhs, rhs)) = input.split_once(token) {
                return Ok(Self {
                    lhs: Expr::parse(lhs)?,
                    op,
                    rhs: Expr::parse(rhs)?,
                });
            }
        }

        Err(ExprError::InvalidComparison(input.to_string()))
    }

    /// Signed slack: positive (or zero for `==`) when satisfied
    pub fn margin(&self, table: &dyn SymbolTable) -> ExprResult<f64> {
        let a = self.lhs.eval(table)?;
        let b = self.rhs.eval(table)?;
        Ok(match self.op {
            CmpOp::Gt | CmpOp::Ge => a - b,
            CmpOp::Lt | CmpOp::Le => b - a,
            CmpOp::Eq => -(a - b).abs(),
            CmpOp::Ne => (a - b).abs(),
        })
    }

    /// Whether the comparison holds
    pub fn holds(&self, table: &dyn SymbolTable) -> ExprResult<bool> {
        let a = self.lhs.eval(table)?;
        let b = self.rhs.eval(table)?;
        Ok(match self.op {
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
        })
    }

    /// Amount by which the comparison is violated beyond `tolerance` (0 if not)
    pub fn violation(&self, table: &dyn SymbolTable, tolerance: f64) -> ExprResult<f64> {
        let margin = self.margin(table)?;
        Ok(match self.op {
            CmpOp::Ne => {
                if margin <= tolerance {
                    tolerance - margin
                } else {
                    0.0
                }
            }
            _ => (-margin - tolerance).max(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_derivative_forms() {
        let cases = [
            ("dx/dt = v", "x", 1),
            ("d2x/dt2 = -k/m*x", "x", 2),
            ("d^2x/dt^2 = -k/m*x", "x", 2),
            ("v' = -g", "v", 1),
            ("theta'' = -g/L*sin(theta)", "theta", 2),
            ("d3y/dt3 = 0", "y", 3),
        ];
        for (text, var, order) in cases {
            let eq = ParsedEquation::parse(text).unwrap();
            assert_eq!(
                eq.target,
                EquationTarget::Derivative {
                    variable: var.to_string(),
                    order
                },
                "{}",
                text
            );
        }
    }

    #[test]
    fn test_assignment_and_relation() {
        let eq = ParsedEquation::parse("KE = 0.5*m*v^2").unwrap();
        assert_eq!(
            eq.target,
            EquationTarget::Assignment {
                variable: "KE".to_string()
            }
        );

        let eq = ParsedEquation::parse("m1*v1 + m2*v2 = m1*u1 + m2*u2").unwrap();
        assert_eq!(eq.target, EquationTarget::Relation);
        assert!(eq.lhs.is_some());
    }

    #[test]
    fn test_comparison() {
        let c = Comparison::parse("h >= 0").unwrap();
        let mut vars = BTreeMap::new();
        vars.insert("h".to_string(), 1.5);
        assert!(c.holds(&vars).unwrap());
        assert_eq!(c.margin(&vars).unwrap(), 1.5);

        vars.insert("h".to_string(), -0.25);
        assert!(!c.holds(&vars).unwrap());
        assert!((c.violation(&vars, 0.1).unwrap() - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_comparison_equality_tolerance() {
        let c = Comparison::parse("x + y == 10").unwrap();
        let vars: BTreeMap<String, f64> = [("x".into(), 4.0), ("y".into(), 6.05)].into();
        assert!(c.violation(&vars, 0.1).unwrap() == 0.0);
        let vars: BTreeMap<String, f64> = [("x".into(), 4.0), ("y".into(), 7.0)].into();
        assert!(c.violation(&vars, 0.1).unwrap() > 0.8);
    }

    #[test]
    fn test_invalid_comparison() {
        assert!(matches!(
            Comparison::parse("x + 1"),
            Err(ExprError::InvalidComparison(_))
        ));
    }
}
