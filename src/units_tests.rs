use approx;

use crate::units::{angstrom_to_bohr, bohr_to_angstrom, EnergyUnit};

#[test]
fn test_units_energy() {
    // 1 cm^-1 is about 29979.2458 MHz.
    approx::assert_relative_eq!(
        EnergyUnit::MHz.from_hartree(1.0) / EnergyUnit::Wavenumber.from_hartree(1.0),
        29979.2458,
        max_relative = 1e-9
    );
    approx::assert_relative_eq!(EnergyUnit::ElectronVolt.from_hartree(0.5), 13.605693122994);
    approx::assert_relative_eq!(
        EnergyUnit::MHz.to_hartree(EnergyUnit::MHz.from_hartree(-1.4e-7)),
        -1.4e-7,
        max_relative = 1e-14
    );
    assert_eq!(EnergyUnit::Hartree.from_hartree(0.25), 0.25);
    assert_eq!(EnergyUnit::Wavenumber.to_string(), "cm^-1");
}

#[test]
fn test_units_length() {
    approx::assert_relative_eq!(angstrom_to_bohr(1.0), 1.8897261246257702, max_relative = 1e-12);
    approx::assert_relative_eq!(bohr_to_angstrom(angstrom_to_bohr(3.7)), 3.7, max_relative = 1e-14);
}
