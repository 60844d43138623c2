//! Pair densities of same-spin orbitals in reciprocal space.

use std::fmt;

use ndarray::{Array1, Array3, Zip};
use num_complex::Complex;

use crate::auxiliary::grid::{GridFingerprint, GridGeometry};
use crate::target::orbital::{Orbital, OrbitalSet, Representation, SpinChannel};
use crate::zfs::ZfsError;

#[cfg(test)]
#[path = "pair_density_tests.rs"]
mod pair_density_tests;

type C128 = Complex<f64>;

/// The relative tolerance used to compare pair-density magnitudes at $`\pm\mathbf{G}`$.
const SYMMETRY_TOLERANCE: f64 = 1e-8;

// ==================
// Struct definitions
// ==================

/// A structure identifying an unordered pair of same-spin orbitals of an [`OrbitalSet`] by their
/// positions in the set. The first position is always the smaller one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrbitalPair {
    /// The common spin channel of the two orbitals.
    pub spin: SpinChannel,

    /// The position of the first orbital in the set.
    pub first: usize,

    /// The position of the second orbital in the set.
    pub second: usize,
}

impl OrbitalPair {
    /// Constructs a validated pair of orbitals of a set.
    ///
    /// The positions may be given in either order.
    ///
    /// # Errors
    ///
    /// Errors with [`ZfsError::Configuration`] if a position is out of range, if both positions
    /// coincide, or if the orbitals belong to different spin channels.
    pub fn new(set: &OrbitalSet, i: usize, j: usize) -> Result<Self, ZfsError> {
        let (first, second) = if i <= j { (i, j) } else { (j, i) };
        if second >= set.len() {
            return Err(ZfsError::configuration(format!(
                "Orbital position {second} is out of range for a set of {} orbitals.",
                set.len()
            )));
        }
        if first == second {
            return Err(ZfsError::configuration(format!(
                "A pair density requires two distinct orbitals, but position {first} was given twice."
            )));
        }
        let orbitals = set.orbitals();
        let spin = orbitals[first].spin();
        if orbitals[second].spin() != spin {
            return Err(ZfsError::configuration(format!(
                "Orbitals {}{} and {}{} belong to different spin channels.",
                orbitals[first].spin(),
                orbitals[first].band(),
                orbitals[second].spin(),
                orbitals[second].band()
            )));
        }
        Ok(Self {
            spin,
            first,
            second,
        })
    }
}

impl fmt::Display for OrbitalPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) [{}]", self.first, self.second, self.spin)
    }
}

/// A structure holding the pair density
/// $`\rho_{ij}(\mathbf{G}) = \sum_{\mathbf{r}} \psi_i^*(\mathbf{r}) \psi_j(\mathbf{r})
/// e^{-i\mathbf{G}\cdot\mathbf{r}}`$ of two grid-normalised orbitals, with one value per
/// $`\mathbf{G}`$-vector in storage order.
#[derive(Clone, Debug)]
pub struct PairDensity {
    /// The spin channel of the two orbitals.
    spin: SpinChannel,

    /// The band indices of the two orbitals.
    bands: (usize, usize),

    /// The density values in storage order.
    values: Array1<C128>,

    /// The fingerprint of the grid on which the density was built.
    fingerprint: GridFingerprint,
}

impl PairDensity {
    /// Returns the spin channel of the two orbitals.
    pub fn spin(&self) -> SpinChannel {
        self.spin
    }

    /// Returns the band indices of the two orbitals.
    pub fn bands(&self) -> (usize, usize) {
        self.bands
    }

    /// Returns the density values in storage order.
    pub fn values(&self) -> &Array1<C128> {
        &self.values
    }

    /// Returns the number of values, which equals the number of $`\mathbf{G}`$-vectors.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the density holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the fingerprint of the grid on which the density was built.
    pub fn fingerprint(&self) -> &GridFingerprint {
        &self.fingerprint
    }

    /// Checks if $`|\rho(-\mathbf{G})| = |\rho(\mathbf{G})|`$ at every grid point.
    ///
    /// This holds whenever the real-space product of the two orbitals is real up to a global
    /// phase, and is what allows the $`\mathbf{G}`$-sum to be restricted to half of reciprocal
    /// space.
    pub fn has_symmetric_magnitudes(&self, grid: &GridGeometry) -> bool {
        let scale = self.values.iter().map(|x| x.norm()).fold(0.0_f64, f64::max);
        let thresh = SYMMETRY_TOLERANCE * scale;
        (0..self.values.len()).all(|k| {
            let k_neg = grid.index_of_negative(k);
            (self.values[k_neg].norm() - self.values[k].norm()).abs() <= thresh
        })
    }
}

/// A structure to build pair densities on a fixed grid.
#[derive(Clone, Debug)]
pub struct PairDensityBuilder<'a> {
    /// The grid on which pair densities are built.
    grid: &'a GridGeometry,
}

impl<'a> PairDensityBuilder<'a> {
    /// Creates a builder for pair densities on `grid`.
    pub fn new(grid: &'a GridGeometry) -> Self {
        Self { grid }
    }

    /// Builds the pair density of two orbitals of an orbital set.
    ///
    /// # Errors
    ///
    /// Errors with [`ZfsError::Configuration`] if the orbital set lives on a different grid or if
    /// the pair does not describe two distinct same-spin orbitals of the set.
    pub fn build(&self, set: &OrbitalSet, pair: OrbitalPair) -> Result<PairDensity, ZfsError> {
        let set_fingerprint = set.grid().fingerprint();
        if !self.grid.fingerprint().is_compatible(&set_fingerprint) {
            return Err(ZfsError::configuration(format!(
                "The orbital set lives on a {set_fingerprint}, but pair densities are being built on a {}.",
                self.grid.fingerprint()
            )));
        }
        let pair = OrbitalPair::new(set, pair.first, pair.second)?;
        let orbitals = set.orbitals();
        let psi_i = set.real_space(pair.first);
        let psi_j = set.real_space(pair.second);
        Ok(self.from_real_space(
            pair.spin,
            (orbitals[pair.first].band(), orbitals[pair.second].band()),
            &psi_i,
            &psi_j,
        ))
    }

    /// Builds the pair density of two standalone orbitals.
    ///
    /// # Errors
    ///
    /// Errors with [`ZfsError::Configuration`] if either orbital is not sampled on this builder's
    /// grid, or if the two orbitals belong to different spin channels.
    pub fn build_from_orbitals(
        &self,
        first: &Orbital,
        second: &Orbital,
    ) -> Result<PairDensity, ZfsError> {
        let shape = self.grid.shape();
        for orbital in [first, second] {
            if orbital.coefficients().shape() != &shape[..] {
                return Err(ZfsError::configuration(format!(
                    "Orbital {}{} has shape {:?}, but the grid has shape {:?}.",
                    orbital.spin(),
                    orbital.band(),
                    orbital.coefficients().shape(),
                    shape
                )));
            }
        }
        if first.spin() != second.spin() {
            return Err(ZfsError::configuration(format!(
                "Cross-spin pair {}{} / {}{} requested; only same-spin pairs contribute.",
                first.spin(),
                first.band(),
                second.spin(),
                second.band()
            )));
        }
        let to_real = |orbital: &Orbital| match orbital.representation() {
            Representation::RealSpace => orbital.coefficients().clone(),
            Representation::ReciprocalSpace => {
                self.grid.fft().to_real_space(orbital.coefficients())
            }
        };
        Ok(self.from_real_space(
            first.spin(),
            (first.band(), second.band()),
            &to_real(first),
            &to_real(second),
        ))
    }

    fn from_real_space(
        &self,
        spin: SpinChannel,
        bands: (usize, usize),
        psi_i: &Array3<C128>,
        psi_j: &Array3<C128>,
    ) -> PairDensity {
        let mut product = Zip::from(psi_i)
            .and(psi_j)
            .map_collect(|a, b| a.conj() * b);
        self.grid.fft().forward(&mut product);
        let values = product.iter().copied().collect::<Array1<_>>();
        PairDensity {
            spin,
            bands,
            values,
            fingerprint: self.grid.fingerprint(),
        }
    }
}
