//! Dimension Calculator - physical dimensions, units and constants
//!
//! A [`Dimension`] is the 7-tuple of integer exponents over the SI base
//! dimensions (L, M, T, I, Θ, N, J). Dimension strings look like
//! `L^2T^-1` or `MLT^-2`; unparseable tokens are ignored so that callers
//! always get *some* dimension back.
//!
//! # Example
//!
//! ```
//! use physolve_core::dimension::Dimension;
//!
//! let velocity = Dimension::parse("LT^-1");
//! let time = Dimension::parse("T");
//! let acceleration = velocity.divide(&time);
//!
//! assert_eq!(acceleration.to_string(), "LT^-2");
//! ```

pub mod analysis;
pub mod constants;
pub mod units;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Div, Mul};

pub use constants::{constant, PhysicalConstant, CONSTANTS};
pub use units::{resolve_unit, UnitResolution};

lazy_static! {
    static ref DIMENSION_TOKEN: Regex =
        Regex::new(r"(Θ|[LMTIKNJ])(?:\^([+-]?\d+))?").unwrap();
}

/// Symbols of the base dimensions in canonical order
const BASE_SYMBOLS: [&str; 7] = ["L", "M", "T", "I", "Θ", "N", "J"];

/// Exponents over the seven SI base dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Dimension {
    /// Length (L)
    pub length: i32,
    /// Mass (M)
    pub mass: i32,
    /// Time (T)
    pub time: i32,
    /// Electric current (I)
    pub current: i32,
    /// Thermodynamic temperature (Θ)
    pub temperature: i32,
    /// Amount of substance (N)
    pub amount: i32,
    /// Luminous intensity (J)
    pub luminosity: i32,
}

impl Dimension {
    /// The dimensionless quantity
    pub const DIMENSIONLESS: Dimension = Dimension::new([0, 0, 0, 0, 0, 0, 0]);
    /// L
    pub const LENGTH: Dimension = Dimension::new([1, 0, 0, 0, 0, 0, 0]);
    /// M
    pub const MASS: Dimension = Dimension::new([0, 1, 0, 0, 0, 0, 0]);
    /// T
    pub const TIME: Dimension = Dimension::new([0, 0, 1, 0, 0, 0, 0]);
    /// LT^-1
    pub const VELOCITY: Dimension = Dimension::new([1, 0, -1, 0, 0, 0, 0]);
    /// LT^-2
    pub const ACCELERATION: Dimension = Dimension::new([1, 0, -2, 0, 0, 0, 0]);
    /// L^2MT^-2
    pub const ENERGY: Dimension = Dimension::new([2, 1, -2, 0, 0, 0, 0]);
    /// LMT^-1
    pub const MOMENTUM: Dimension = Dimension::new([1, 1, -1, 0, 0, 0, 0]);

    /// Build a dimension from its exponent tuple (L, M, T, I, Θ, N, J)
    pub const fn new(exponents: [i32; 7]) -> Self {
        Self {
            length: exponents[0],
            mass: exponents[1],
            time: exponents[2],
            current: exponents[3],
            temperature: exponents[4],
            amount: exponents[5],
            luminosity: exponents[6],
        }
    }

    /// Exponent tuple in canonical order
    pub fn exponents(&self) -> [i32; 7] {
        [
            self.length,
            self.mass,
            self.time,
            self.current,
            self.temperature,
            self.amount,
            self.luminosity,
        ]
    }

    /// Parse a dimension string such as `L^2T^-1`
    ///
    /// Tokens that don't match `Letter(^±int)?` are skipped, and repeated
    /// letters accumulate (`LL` is `L^2`). This never fails.
    pub fn parse(input: &str) -> Self {
        let mut exponents = [0i32; 7];

        for caps in DIMENSION_TOKEN.captures_iter(input) {
            let index = match &caps[1] {
                "L" => 0,
                "M" => 1,
                "T" => 2,
                "I" => 3,
                "Θ" | "K" => 4,
                "N" => 5,
                "J" => 6,
                _ => continue,
            };
            let exponent = match caps.get(2) {
                Some(m) => match m.as_str().parse::<i32>() {
                    Ok(e) => e,
                    Err(_) => continue,
                },
                None => 1,
            };
            exponents[index] = exponents[index].saturating_add(exponent);
        }

        Self::new(exponents)
    }

    /// Componentwise sum of exponents (dimension of a product)
    pub fn multiply(&self, other: &Dimension) -> Dimension {
        let (a, b) = (self.exponents(), other.exponents());
        let mut out = [0i32; 7];
        for i in 0..7 {
            out[i] = a[i].saturating_add(b[i]);
        }
        Dimension::new(out)
    }

    /// Componentwise difference of exponents (dimension of a quotient)
    pub fn divide(&self, other: &Dimension) -> Dimension {
        let (a, b) = (self.exponents(), other.exponents());
        let mut out = [0i32; 7];
        for i in 0..7 {
            out[i] = a[i].saturating_sub(b[i]);
        }
        Dimension::new(out)
    }

    /// Raise to an integer power
    pub fn pow(&self, power: i32) -> Dimension {
        let mut out = self.exponents();
        for e in out.iter_mut() {
            *e = e.saturating_mul(power);
        }
        Dimension::new(out)
    }

    /// Check whether every exponent is zero
    pub fn is_dimensionless(&self) -> bool {
        self.exponents().iter().all(|&e| e == 0)
    }
}

impl Mul for Dimension {
    type Output = Dimension;

    fn mul(self, rhs: Dimension) -> Dimension {
        self.multiply(&rhs)
    }
}

impl Div for Dimension {
    type Output = Dimension;

    fn div(self, rhs: Dimension) -> Dimension {
        self.divide(&rhs)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "1");
        }
        for (symbol, exponent) in BASE_SYMBOLS.iter().zip(self.exponents()) {
            match exponent {
                0 => {}
                1 => write!(f, "{}", symbol)?,
                e => write!(f, "{}^{}", symbol, e)?,
            }
        }
        Ok(())
    }
}

impl From<&str> for Dimension {
    fn from(s: &str) -> Self {
        Dimension::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_simple() {
        let d = Dimension::parse("L^2T^-1");
        assert_eq!(d.length, 2);
        assert_eq!(d.time, -1);
        assert_eq!(d.mass, 0);
    }

    #[test]
    fn test_parse_ignores_garbage() {
        let d = Dimension::parse("L*X^3 T^-2 ??");
        assert_eq!(d, Dimension::ACCELERATION);
    }

    #[test]
    fn test_parse_accumulates_repeated_letters() {
        assert_eq!(Dimension::parse("LL").length, 2);
        assert_eq!(Dimension::parse("ΘK^-1"), Dimension::DIMENSIONLESS);
    }

    #[test]
    fn test_multiply_divide() {
        let force = Dimension::MASS * Dimension::ACCELERATION;
        assert_eq!(force.to_string(), "LMT^-2");
        assert_eq!(force / Dimension::MASS, Dimension::ACCELERATION);
        assert_eq!(Dimension::ENERGY, force * Dimension::LENGTH);
    }

    #[test]
    fn test_display() {
        assert_eq!(Dimension::DIMENSIONLESS.to_string(), "1");
        assert_eq!(Dimension::parse("T^-1").to_string(), "T^-1");
        assert_eq!(Dimension::parse("Θ^-1L^2MT^-2").to_string(), "L^2MT^-2Θ^-1");
    }

    #[test]
    fn test_pow() {
        assert_eq!(Dimension::VELOCITY.pow(2).to_string(), "L^2T^-2");
    }

    proptest! {
        #[test]
        fn prop_round_trip(exps in proptest::array::uniform7(-6i32..=6)) {
            let d = Dimension::new(exps);
            let rendered = d.to_string();
            let reparsed = Dimension::parse(&rendered);
            prop_assert_eq!(reparsed, d);
            prop_assert_eq!(reparsed.to_string(), rendered);
        }

        #[test]
        fn prop_parse_then_render_is_stable(input in "[LMTIΘNJ^0-9+-]{0,16}") {
            let d = Dimension::parse(&input);
            let rendered = d.to_string();
            prop_assert_eq!(Dimension::parse(&rendered).to_string(), rendered);
        }
    }
}
