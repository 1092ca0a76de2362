//! Universal physical constants
//!
//! Canonical SI value/unit/dimension triples used to seed default parameter
//! values during IR construction.

use super::Dimension;
use serde::Serialize;

/// A universal constant with its SI value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhysicalConstant {
    /// Canonical symbol (`c`, `k_B`, ...)
    pub symbol: &'static str,
    /// Alternative spellings accepted on lookup
    pub aliases: &'static [&'static str],
    /// Human readable name
    pub name: &'static str,
    /// Value in SI units
    pub value: f64,
    /// SI unit string
    pub unit: &'static str,
    /// Dimension string, parseable by [`Dimension::parse`]
    pub dimension: &'static str,
}

impl PhysicalConstant {
    /// Parsed dimension of the constant
    pub fn dimension(&self) -> Dimension {
        Dimension::parse(self.dimension)
    }
}

/// The constants table
pub const CONSTANTS: &[PhysicalConstant] = &[
    PhysicalConstant {
        symbol: "c",
        aliases: &["c0", "speed_of_light"],
        name: "Speed of light in vacuum",
        value: 299_792_458.0,
        unit: "m/s",
        dimension: "LT^-1",
    },
    PhysicalConstant {
        symbol: "h",
        aliases: &["planck"],
        name: "Planck constant",
        value: 6.626_070_15e-34,
        unit: "J*s",
        dimension: "L^2MT^-1",
    },
    PhysicalConstant {
        symbol: "hbar",
        aliases: &["h_bar"],
        name: "Reduced Planck constant",
        value: 1.054_571_817e-34,
        unit: "J*s",
        dimension: "L^2MT^-1",
    },
    PhysicalConstant {
        symbol: "k_B",
        aliases: &["kB", "k_b", "boltzmann"],
        name: "Boltzmann constant",
        value: 1.380_649e-23,
        unit: "J/K",
        dimension: "L^2MT^-2Θ^-1",
    },
    PhysicalConstant {
        symbol: "e",
        aliases: &["q_e", "elementary_charge"],
        name: "Elementary charge",
        value: 1.602_176_634e-19,
        unit: "C",
        dimension: "TI",
    },
    PhysicalConstant {
        symbol: "G",
        aliases: &["G_N", "gravitational_constant"],
        name: "Gravitational constant",
        value: 6.674_30e-11,
        unit: "m^3/(kg*s^2)",
        dimension: "L^3M^-1T^-2",
    },
    PhysicalConstant {
        symbol: "epsilon_0",
        aliases: &["eps0", "epsilon0", "ε0", "ε₀"],
        name: "Vacuum permittivity",
        value: 8.854_187_812_8e-12,
        unit: "F/m",
        dimension: "L^-3M^-1T^4I^2",
    },
    PhysicalConstant {
        symbol: "mu_0",
        aliases: &["mu0", "μ0", "μ₀"],
        name: "Vacuum permeability",
        value: 1.256_637_062_12e-6,
        unit: "H/m",
        dimension: "LMT^-2I^-2",
    },
    PhysicalConstant {
        symbol: "g",
        aliases: &["g0", "gravity"],
        name: "Standard gravitational acceleration",
        value: 9.806_65,
        unit: "m/s^2",
        dimension: "LT^-2",
    },
    PhysicalConstant {
        symbol: "R",
        aliases: &["R_gas", "gas_constant"],
        name: "Molar gas constant",
        value: 8.314_462_618,
        unit: "J/(mol*K)",
        dimension: "L^2MT^-2Θ^-1N^-1",
    },
    PhysicalConstant {
        symbol: "N_A",
        aliases: &["NA", "avogadro"],
        name: "Avogadro constant",
        value: 6.022_140_76e23,
        unit: "1/mol",
        dimension: "N^-1",
    },
    PhysicalConstant {
        symbol: "m_e",
        aliases: &["me", "electron_mass"],
        name: "Electron mass",
        value: 9.109_383_701_5e-31,
        unit: "kg",
        dimension: "M",
    },
    PhysicalConstant {
        symbol: "m_p",
        aliases: &["mp", "proton_mass"],
        name: "Proton mass",
        value: 1.672_621_923_69e-27,
        unit: "kg",
        dimension: "M",
    },
    PhysicalConstant {
        symbol: "sigma",
        aliases: &["sigma_SB", "stefan_boltzmann"],
        name: "Stefan-Boltzmann constant",
        value: 5.670_374_419e-8,
        unit: "W/(m^2*K^4)",
        dimension: "MT^-3Θ^-4",
    },
    PhysicalConstant {
        symbol: "k_e",
        aliases: &["ke", "coulomb_constant"],
        name: "Coulomb constant",
        value: 8.987_551_792_3e9,
        unit: "N*m^2/C^2",
        dimension: "L^3MT^-4I^-2",
    },
];

/// Look up a constant by symbol or alias
pub fn constant(symbol: &str) -> Option<&'static PhysicalConstant> {
    CONSTANTS
        .iter()
        .find(|c| c.symbol == symbol || c.aliases.contains(&symbol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::resolve_unit;

    #[test]
    fn test_lookup_by_alias() {
        assert_eq!(constant("kB").map(|c| c.symbol), Some("k_B"));
        assert_eq!(constant("g").map(|c| c.value), Some(9.806_65));
        assert!(constant("unobtainium").is_none());
    }

    #[test]
    fn test_units_agree_with_dimensions() {
        for c in CONSTANTS {
            let resolved = resolve_unit(c.unit);
            assert_eq!(
                resolved.dimension,
                Some(c.dimension()),
                "unit/dimension mismatch for {}",
                c.symbol
            );
        }
    }
}
