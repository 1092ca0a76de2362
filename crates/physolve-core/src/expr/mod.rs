//! Arithmetic expressions over a symbol table
//!
//! Equations in the IR are stored as formula strings. This module parses them
//! into an [`Expr`] tree with a small recursive-descent parser and evaluates
//! the tree against a [`SymbolTable`]. Nothing here is algebraic: expressions
//! are only ever evaluated numerically.
//!
//! Grammar:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary (('^' | '**') unary)?
//! primary := NUMBER | IDENT | IDENT '(' args ')' | '(' expr ')'
//! ```
//!
//! # Example
//!
//! ```
//! use physolve_core::expr::Expr;
//! use std::collections::BTreeMap;
//!
//! let expr = Expr::parse("-k/m*x").unwrap();
//! let vars: BTreeMap<String, f64> =
//!     [("k".into(), 100.0), ("m".into(), 2.0), ("x".into(), 0.1)].into();
//!
//! assert_eq!(expr.eval(&vars).unwrap(), -5.0);
//! ```

pub mod equation;

use crate::error::ExprError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

pub use equation::{CmpOp, Comparison, EquationTarget, ParsedEquation};

type ExprResult<T> = std::result::Result<T, ExprError>;

/// Anything that can resolve a symbol to a number
pub trait SymbolTable {
    /// Value of `name`, if known
    fn lookup(&self, name: &str) -> Option<f64>;
}

impl SymbolTable for BTreeMap<String, f64> {
    fn lookup(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

impl SymbolTable for HashMap<String, f64> {
    fn lookup(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Parsed arithmetic expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Numeric literal
    Number(f64),
    /// Variable reference
    Symbol(String),
    /// Unary negation
    Neg(Box<Expr>),
    /// Binary operation
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Function call
    Call { name: String, args: Vec<Expr> },
}

/// Functions understood by [`Expr::eval`] with their arity
const FUNCTIONS: &[(&str, usize)] = &[
    ("sqrt", 1),
    ("abs", 1),
    ("sin", 1),
    ("cos", 1),
    ("tan", 1),
    ("asin", 1),
    ("acos", 1),
    ("atan", 1),
    ("exp", 1),
    ("ln", 1),
    ("log", 1),
    ("log10", 1),
    ("min", 2),
    ("max", 2),
];

/// Symbols resolved without a table
const BUILTIN_CONSTANTS: &[(&str, f64)] = &[("pi", std::f64::consts::PI), ("π", std::f64::consts::PI)];

impl Expr {
    /// Parse an expression string
    pub fn parse(input: &str) -> ExprResult<Expr> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expr()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(ExprError::UnexpectedToken(token.to_string())),
        }
    }

    /// Evaluate against a symbol table
    ///
    /// Unknown symbols, unknown functions and non-finite results are errors;
    /// callers decide how to degrade.
    pub fn eval(&self, table: &dyn SymbolTable) -> ExprResult<f64> {
        let value = self.eval_inner(table)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ExprError::NonFinite)
        }
    }

    fn eval_inner(&self, table: &dyn SymbolTable) -> ExprResult<f64> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Symbol(name) => table
                .lookup(name)
                .or_else(|| builtin_constant(name))
                .ok_or_else(|| ExprError::UnknownSymbol(name.clone())),
            Expr::Neg(inner) => Ok(-inner.eval_inner(table)?),
            Expr::Binary { op, lhs, rhs } => {
                let a = lhs.eval_inner(table)?;
                let b = rhs.eval_inner(table)?;
                Ok(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Pow => a.powf(b),
                })
            }
            Expr::Call { name, args } => {
                let values = args
                    .iter()
                    .map(|a| a.eval_inner(table))
                    .collect::<ExprResult<Vec<f64>>>()?;
                apply_function(name, &values)
            }
        }
    }

    /// Symbols referenced by the expression (functions and `pi` excluded)
    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Symbol(name) => {
                if builtin_constant(name).is_none() {
                    out.insert(name.clone());
                }
            }
            Expr::Neg(inner) => inner.collect_variables(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_variables(out);
                }
            }
        }
    }

    /// True when the expression is linear in `symbols`
    ///
    /// Conservative: products of two symbol-dependent factors, division by a
    /// symbol-dependent factor, powers and function calls on them are all
    /// treated as non-linear.
    pub fn is_linear_in(&self, symbols: &BTreeSet<String>) -> bool {
        let depends = |e: &Expr| e.variables().iter().any(|v| symbols.contains(v));
        match self {
            Expr::Number(_) | Expr::Symbol(_) => true,
            Expr::Neg(inner) => inner.is_linear_in(symbols),
            Expr::Binary { op, lhs, rhs } => match op {
                BinaryOp::Add | BinaryOp::Sub => {
                    lhs.is_linear_in(symbols) && rhs.is_linear_in(symbols)
                }
                BinaryOp::Mul => match (depends(lhs), depends(rhs)) {
                    (true, true) => false,
                    (true, false) => lhs.is_linear_in(symbols),
                    (false, true) => rhs.is_linear_in(symbols),
                    (false, false) => true,
                },
                BinaryOp::Div => !depends(rhs) && lhs.is_linear_in(symbols),
                BinaryOp::Pow => !depends(lhs) && !depends(rhs),
            },
            Expr::Call { args, .. } => !args.iter().any(depends),
        }
    }
}

fn builtin_constant(name: &str) -> Option<f64> {
    BUILTIN_CONSTANTS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| *v)
}

fn apply_function(name: &str, args: &[f64]) -> ExprResult<f64> {
    let arity = FUNCTIONS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, a)| *a)
        .ok_or_else(|| ExprError::UnknownFunction(name.to_string()))?;

    if args.len() != arity {
        return Err(ExprError::Arity {
            name: name.to_string(),
            expected: arity,
            actual: args.len(),
        });
    }

    let x = args[0];
    Ok(match name {
        "sqrt" => x.sqrt(),
        "abs" => x.abs(),
        "sin" => x.sin(),
        "cos" => x.cos(),
        "tan" => x.tan(),
        "asin" => x.asin(),
        "acos" => x.acos(),
        "atan" => x.atan(),
        "exp" => x.exp(),
        "ln" | "log" => x.ln(),
        "log10" => x.log10(),
        "min" => x.min(args[1]),
        "max" => x.max(args[1]),
        _ => return Err(ExprError::UnknownFunction(name.to_string())),
    })
}

/// Lexical tokens
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Op(c) => write!(f, "{}", c),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
        }
    }
}

fn tokenize(input: &str) -> ExprResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Scientific notation only when digits follow the exponent marker
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::UnexpectedChar { ch: c, pos: start })?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Op('^'));
                i += 2;
            }
            '+' | '-' | '*' | '/' | '^' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '×' | '·' => {
                tokens.push(Token::Op('*'));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            other => return Err(ExprError::UnexpectedChar { ch: other, pos: i }),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_op(&mut self, ops: &[char]) -> Option<char> {
        match self.peek() {
            Some(Token::Op(c)) if ops.contains(c) => {
                let c = *c;
                self.pos += 1;
                Some(c)
            }
            _ => None,
        }
    }

    fn expr(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.term()?;
        while let Some(op) = self.eat_op(&['+', '-']) {
            let rhs = self.term()?;
            let op = if op == '+' { BinaryOp::Add } else { BinaryOp::Sub };
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&['*', '/']) {
            let rhs = self.unary()?;
            let op = if op == '*' { BinaryOp::Mul } else { BinaryOp::Div };
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> ExprResult<Expr> {
        match self.eat_op(&['-', '+']) {
            Some('-') => Ok(Expr::Neg(Box::new(self.unary()?))),
            Some(_) => self.unary(),
            None => self.power(),
        }
    }

    fn power(&mut self) -> ExprResult<Expr> {
        let base = self.primary()?;
        if self.eat_op(&['^']).is_some() {
            let exponent = self.unary()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn primary(&mut self) -> ExprResult<Expr> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let args = self.arguments()?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Symbol(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(ExprError::UnexpectedToken(other.to_string())),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(other) => Err(ExprError::UnexpectedToken(other.to_string())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn arguments(&mut self) -> ExprResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                Some(other) => return Err(ExprError::UnexpectedToken(other.to_string())),
                None => return Err(ExprError::UnexpectedEnd),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_precedence() {
        let table = vars(&[]);
        assert_eq!(Expr::parse("1 + 2 * 3").unwrap().eval(&table).unwrap(), 7.0);
        assert_eq!(Expr::parse("(1 + 2) * 3").unwrap().eval(&table).unwrap(), 9.0);
        assert_eq!(Expr::parse("2^3^2").unwrap().eval(&table).unwrap(), 512.0);
        assert_eq!(Expr::parse("-2^2").unwrap().eval(&table).unwrap(), -4.0);
        assert_eq!(Expr::parse("2**-1").unwrap().eval(&table).unwrap(), 0.5);
        assert_eq!(Expr::parse("8 / 2 / 2").unwrap().eval(&table).unwrap(), 2.0);
    }

    #[test]
    fn test_scientific_notation() {
        let table = vars(&[("e", 2.0)]);
        assert_eq!(Expr::parse("1.5e3").unwrap().eval(&table).unwrap(), 1500.0);
        assert_eq!(Expr::parse("2e-3").unwrap().eval(&table).unwrap(), 0.002);
        // `2*e` is a product, not a malformed literal
        assert_eq!(Expr::parse("2*e").unwrap().eval(&table).unwrap(), 4.0);
    }

    #[test]
    fn test_functions() {
        let table = vars(&[("g", 9.8), ("h", 20.0)]);
        let v = Expr::parse("sqrt(2*g*h)").unwrap().eval(&table).unwrap();
        assert!((v - 19.798_989).abs() < 1e-5);
        assert_eq!(Expr::parse("max(1, 3)").unwrap().eval(&table).unwrap(), 3.0);
        assert!((Expr::parse("cos(pi)").unwrap().eval(&table).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_symbol_is_error() {
        let err = Expr::parse("a + b").unwrap().eval(&vars(&[("a", 1.0)]));
        assert_eq!(err, Err(ExprError::UnknownSymbol("b".to_string())));
    }

    #[test]
    fn test_non_finite_is_error() {
        let err = Expr::parse("1 / x").unwrap().eval(&vars(&[("x", 0.0)]));
        assert_eq!(err, Err(ExprError::NonFinite));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Expr::parse("x @ 2"),
            Err(ExprError::UnexpectedChar { ch: '@', .. })
        ));
        assert_eq!(Expr::parse("(1 + 2"), Err(ExprError::UnexpectedEnd));
        assert!(Expr::parse("1 2").is_err());
        assert!(Expr::parse("").is_err());
    }

    #[test]
    fn test_variables() {
        let expr = Expr::parse("0.5*m*v^2 + m*g*h + sin(pi*theta)").unwrap();
        let names: Vec<String> = expr.variables().into_iter().collect();
        assert_eq!(names, vec!["g", "h", "m", "theta", "v"]);
    }

    #[test]
    fn test_linearity() {
        let state: BTreeSet<String> = ["x".to_string(), "v".to_string()].into();
        assert!(Expr::parse("-k/m*x - c*v").unwrap().is_linear_in(&state));
        assert!(!Expr::parse("-k*x^2").unwrap().is_linear_in(&state));
        assert!(!Expr::parse("-g/L*sin(x)").unwrap().is_linear_in(&state));
        assert!(!Expr::parse("x*v").unwrap().is_linear_in(&state));
    }

    #[test]
    fn test_arity_checked() {
        let err = Expr::parse("max(1)").unwrap().eval(&vars(&[]));
        assert!(matches!(err, Err(ExprError::Arity { .. })));
    }
}
