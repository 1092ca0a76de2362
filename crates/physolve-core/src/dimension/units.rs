//! Unit strings to (dimension, SI scale factor)
//!
//! Handles simple symbols (`N`, `m`), SI prefixes (`km`, `mA`), products and
//! quotients (`kg*m/s^2`, `J/(mol*K)`) and Unicode superscripts (`m²`, `s⁻¹`).
//! An unknown unit resolves with scale 1 and no dimension.

use super::Dimension;
use serde::{Deserialize, Serialize};

/// Outcome of resolving a unit string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitResolution {
    /// Dimension of the unit; `None` when any factor was unrecognised
    pub dimension: Option<Dimension>,
    /// Multiply a value in this unit by `scale` to get SI
    pub scale: f64,
    /// Added after scaling (only non-zero for affine units such as °C)
    pub offset: f64,
}

impl UnitResolution {
    fn known(dimension: Dimension, scale: f64) -> Self {
        Self {
            dimension: Some(dimension),
            scale,
            offset: 0.0,
        }
    }

    fn unknown() -> Self {
        Self {
            dimension: None,
            scale: 1.0,
            offset: 0.0,
        }
    }

    /// Whether the unit was fully recognised
    pub fn is_known(&self) -> bool {
        self.dimension.is_some()
    }

    /// Convert a value expressed in this unit into SI
    pub fn to_si(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }
}

/// (symbol, [L, M, T, I, Θ, N, J], scale to SI)
const UNIT_TABLE: &[(&str, [i32; 7], f64)] = &[
    ("m", [1, 0, 0, 0, 0, 0, 0], 1.0),
    ("s", [0, 0, 1, 0, 0, 0, 0], 1.0),
    ("kg", [0, 1, 0, 0, 0, 0, 0], 1.0),
    ("g", [0, 1, 0, 0, 0, 0, 0], 1e-3),
    ("A", [0, 0, 0, 1, 0, 0, 0], 1.0),
    ("K", [0, 0, 0, 0, 1, 0, 0], 1.0),
    ("mol", [0, 0, 0, 0, 0, 1, 0], 1.0),
    ("cd", [0, 0, 0, 0, 0, 0, 1], 1.0),
    ("min", [0, 0, 1, 0, 0, 0, 0], 60.0),
    ("h", [0, 0, 1, 0, 0, 0, 0], 3600.0),
    ("hr", [0, 0, 1, 0, 0, 0, 0], 3600.0),
    ("day", [0, 0, 1, 0, 0, 0, 0], 86400.0),
    ("N", [1, 1, -2, 0, 0, 0, 0], 1.0),
    ("J", [2, 1, -2, 0, 0, 0, 0], 1.0),
    ("W", [2, 1, -3, 0, 0, 0, 0], 1.0),
    ("Pa", [-1, 1, -2, 0, 0, 0, 0], 1.0),
    ("Hz", [0, 0, -1, 0, 0, 0, 0], 1.0),
    ("C", [0, 0, 1, 1, 0, 0, 0], 1.0),
    ("V", [2, 1, -3, -1, 0, 0, 0], 1.0),
    ("ohm", [2, 1, -3, -2, 0, 0, 0], 1.0),
    ("Ω", [2, 1, -3, -2, 0, 0, 0], 1.0),
    ("F", [-2, -1, 4, 2, 0, 0, 0], 1.0),
    ("T", [0, 1, -2, -1, 0, 0, 0], 1.0),
    ("Wb", [2, 1, -2, -1, 0, 0, 0], 1.0),
    ("H", [2, 1, -2, -2, 0, 0, 0], 1.0),
    ("eV", [2, 1, -2, 0, 0, 0, 0], 1.602_176_634e-19),
    ("cal", [2, 1, -2, 0, 0, 0, 0], 4.184),
    ("L", [3, 0, 0, 0, 0, 0, 0], 1e-3),
    ("atm", [-1, 1, -2, 0, 0, 0, 0], 101_325.0),
    ("bar", [-1, 1, -2, 0, 0, 0, 0], 1e5),
    ("mph", [1, 0, -1, 0, 0, 0, 0], 0.447_04),
    ("rad", [0, 0, 0, 0, 0, 0, 0], 1.0),
    ("sr", [0, 0, 0, 0, 0, 0, 0], 1.0),
    ("deg", [0, 0, 0, 0, 0, 0, 0], std::f64::consts::PI / 180.0),
    ("°", [0, 0, 0, 0, 0, 0, 0], std::f64::consts::PI / 180.0),
    ("rev", [0, 0, 0, 0, 0, 0, 0], 2.0 * std::f64::consts::PI),
    ("lm", [0, 0, 0, 0, 0, 0, 1], 1.0),
];

const PREFIXES: &[(&str, f64)] = &[
    ("G", 1e9),
    ("M", 1e6),
    ("k", 1e3),
    ("c", 1e-2),
    ("m", 1e-3),
    ("μ", 1e-6),
    ("u", 1e-6),
    ("n", 1e-9),
    ("p", 1e-12),
];

/// Resolve a unit string
///
/// # Examples
///
/// ```
/// use physolve_core::dimension::{resolve_unit, Dimension};
///
/// let r = resolve_unit("km/h");
/// assert_eq!(r.dimension, Some(Dimension::VELOCITY));
/// assert!((r.scale - 1000.0 / 3600.0).abs() < 1e-12);
/// ```
pub fn resolve_unit(unit: &str) -> UnitResolution {
    let trimmed = unit.trim();
    match trimmed {
        "" | "1" | "-" | "dimensionless" => {
            return UnitResolution::known(Dimension::DIMENSIONLESS, 1.0)
        }
        "°C" | "degC" | "celsius" => {
            return UnitResolution {
                dimension: Some(Dimension::new([0, 0, 0, 0, 1, 0, 0])),
                scale: 1.0,
                offset: 273.15,
            }
        }
        _ => {}
    }

    let normalized = normalize(trimmed);
    resolve_expression(&normalized).unwrap_or_else(UnitResolution::unknown)
}

/// Rewrite separators and superscripts into `*`, `/`, `^n` form
fn normalize(unit: &str) -> String {
    let mut out = String::with_capacity(unit.len() + 4);
    let mut in_superscript = false;

    for ch in unit.chars() {
        let mapped = match ch {
            '⁻' => Some('-'),
            '⁰' => Some('0'),
            '¹' => Some('1'),
            '²' => Some('2'),
            '³' => Some('3'),
            '⁴' => Some('4'),
            '⁵' => Some('5'),
            '⁶' => Some('6'),
            '⁷' => Some('7'),
            '⁸' => Some('8'),
            '⁹' => Some('9'),
            _ => None,
        };

        match mapped {
            Some(c) => {
                if !in_superscript {
                    out.push('^');
                    in_superscript = true;
                }
                out.push(c);
            }
            None => {
                in_superscript = false;
                match ch {
                    '·' | '⋅' | '.' | ' ' => out.push('*'),
                    other => out.push(other),
                }
            }
        }
    }

    out
}

/// Resolve `a*b/c/(d*e)` respecting one or more levels of parentheses
fn resolve_expression(expr: &str) -> Option<UnitResolution> {
    let mut dimension = Dimension::DIMENSIONLESS;
    let mut scale = 1.0;

    for (factor, inverted) in split_top_level(expr)? {
        if factor.is_empty() {
            continue;
        }
        let (base, exponent) = split_exponent(&factor)?;

        let resolved = if let Some(inner) = base.strip_prefix('(').and_then(|b| b.strip_suffix(')')) {
            resolve_expression(inner)?
        } else if let Ok(number) = base.parse::<f64>() {
            UnitResolution::known(Dimension::DIMENSIONLESS, number)
        } else {
            resolve_symbol(&base)?
        };

        let power = if inverted { -exponent } else { exponent };
        dimension = dimension.multiply(&resolved.dimension?.pow(power));
        scale *= resolved.scale.powi(power);
    }

    Some(UnitResolution::known(dimension, scale))
}

/// Split into factors at top-level `*` and `/`, tagging denominators
fn split_top_level(expr: &str) -> Option<Vec<(String, bool)>> {
    let mut factors = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut inverted = false;

    for ch in expr.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
                current.push(ch);
            }
            '*' | '/' if depth == 0 => {
                factors.push((std::mem::take(&mut current), inverted));
                // Everything after the first slash is in the denominator
                inverted = inverted || ch == '/';
            }
            _ => current.push(ch),
        }
    }

    if depth != 0 {
        return None;
    }
    factors.push((current, inverted));
    Some(factors)
}

fn split_exponent(factor: &str) -> Option<(String, i32)> {
    if factor.starts_with('(') && factor.ends_with(')') {
        return Some((factor.to_string(), 1));
    }
    match factor.rsplit_once('^') {
        Some((base, exp)) => {
            let exponent = exp.trim_start_matches('+').parse::<i32>().ok()?;
            Some((base.to_string(), exponent))
        }
        None => Some((factor.to_string(), 1)),
    }
}

fn resolve_symbol(symbol: &str) -> Option<UnitResolution> {
    if let Some((_, dims, scale)) = UNIT_TABLE.iter().find(|(s, _, _)| *s == symbol) {
        return Some(UnitResolution::known(Dimension::new(*dims), *scale));
    }

    for (prefix, factor) in PREFIXES {
        if let Some(rest) = symbol.strip_prefix(prefix) {
            if rest.is_empty() {
                continue;
            }
            if let Some((_, dims, scale)) = UNIT_TABLE.iter().find(|(s, _, _)| *s == rest) {
                return Some(UnitResolution::known(Dimension::new(*dims), scale * factor));
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12 * b.abs().max(1.0)
    }

    #[test]
    fn test_base_units() {
        assert_eq!(resolve_unit("m").dimension, Some(Dimension::LENGTH));
        assert_eq!(resolve_unit("kg").dimension, Some(Dimension::MASS));
        assert_eq!(resolve_unit("").dimension, Some(Dimension::DIMENSIONLESS));
    }

    #[test]
    fn test_derived_and_composite() {
        assert_eq!(resolve_unit("m/s^2").dimension, Some(Dimension::ACCELERATION));
        assert_eq!(resolve_unit("kg*m/s").dimension, Some(Dimension::MOMENTUM));
        assert_eq!(
            resolve_unit("N/m").dimension,
            Some(Dimension::parse("MT^-2"))
        );
        assert_eq!(
            resolve_unit("J/(mol*K)").dimension,
            Some(Dimension::parse("L^2MT^-2N^-1Θ^-1"))
        );
        assert_eq!(resolve_unit("m/s/s").dimension, Some(Dimension::ACCELERATION));
    }

    #[test]
    fn test_prefixes() {
        let km = resolve_unit("km");
        assert_eq!(km.dimension, Some(Dimension::LENGTH));
        assert!(approx(km.scale, 1000.0));

        let mg = resolve_unit("mg");
        assert!(approx(mg.scale, 1e-6));

        let ms = resolve_unit("ms");
        assert_eq!(ms.dimension, Some(Dimension::TIME));
        assert!(approx(ms.scale, 1e-3));
    }

    #[test]
    fn test_superscripts() {
        assert_eq!(resolve_unit("m²").dimension, Some(Dimension::parse("L^2")));
        assert_eq!(resolve_unit("m·s⁻²").dimension, Some(Dimension::ACCELERATION));
    }

    #[test]
    fn test_celsius_offset() {
        let c = resolve_unit("°C");
        assert!(approx(c.to_si(25.0), 298.15));
    }

    #[test]
    fn test_unknown_unit_defaults_to_unit_scale() {
        let r = resolve_unit("furlongs");
        assert!(!r.is_known());
        assert_eq!(r.scale, 1.0);
        assert_eq!(r.to_si(3.0), 3.0);
    }
}
