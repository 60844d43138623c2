//! Unit conversions for reporting.
//!
//! All quantities are computed in Hartree atomic units; conversions happen only when results are
//! presented.

use std::fmt;

use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "units_tests.rs"]
mod units_tests;

/// Hartree to megahertz.
pub const HARTREE_TO_MHZ: f64 = 6.579683920502e9;

/// Hartree to reciprocal centimetres.
pub const HARTREE_TO_WAVENUMBER: f64 = 219474.6313632;

/// Hartree to electronvolts.
pub const HARTREE_TO_EV: f64 = 27.211386245988;

/// Bohr to ångström.
pub const BOHR_TO_ANGSTROM: f64 = 0.529177210903;

/// An enumerated type for the energy units in which results can be reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnergyUnit {
    /// Hartree.
    Hartree,

    /// Megahertz.
    MHz,

    /// Reciprocal centimetres.
    Wavenumber,

    /// Electronvolts.
    ElectronVolt,
}

impl EnergyUnit {
    /// Returns the number of this unit in one Hartree.
    pub fn per_hartree(&self) -> f64 {
        match self {
            EnergyUnit::Hartree => 1.0,
            EnergyUnit::MHz => HARTREE_TO_MHZ,
            EnergyUnit::Wavenumber => HARTREE_TO_WAVENUMBER,
            EnergyUnit::ElectronVolt => HARTREE_TO_EV,
        }
    }

    /// Converts an energy in Hartree to this unit.
    pub fn from_hartree(&self, value: f64) -> f64 {
        value * self.per_hartree()
    }

    /// Converts an energy in this unit to Hartree.
    pub fn to_hartree(&self, value: f64) -> f64 {
        value / self.per_hartree()
    }
}

impl fmt::Display for EnergyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnergyUnit::Hartree => write!(f, "Eh"),
            EnergyUnit::MHz => write!(f, "MHz"),
            EnergyUnit::Wavenumber => write!(f, "cm^-1"),
            EnergyUnit::ElectronVolt => write!(f, "eV"),
        }
    }
}

/// Converts a length in bohr to ångström.
pub fn bohr_to_angstrom(value: f64) -> f64 {
    value * BOHR_TO_ANGSTROM
}

/// Converts a length in ångström to bohr.
pub fn angstrom_to_bohr(value: f64) -> f64 {
    value / BOHR_TO_ANGSTROM
}
