//! The reciprocal-space dipole–dipole kernel.

use std::fmt;

use log;
use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;

use crate::auxiliary::grid::{GridFingerprint, GridGeometry};
use crate::target::tensor::{SymmetricTensor, COMPONENT_INDICES};
use crate::zfs::ZfsError;

#[cfg(test)]
#[path = "dipole_kernel_tests.rs"]
mod dipole_kernel_tests;

/// A structure holding the dipolar kernel
/// $`T_{ab}(\mathbf{G}) = 3 \hat{G}_a \hat{G}_b - \delta_{ab}`$ for every $`\mathbf{G}`$-vector of
/// a grid, with $`\mathbf{T}(\mathbf{0}) = \mathbf{0}`$.
///
/// Each row of the table holds the six independent components $`(xx, xy, xz, yy, yz, zz)`$ of one
/// $`\mathbf{G}`$-vector in storage order. The kernel also carries the half-space weights
/// $`w(\mathbf{G})`$: for every pair $`\pm\mathbf{G}`$ whose members are both stored exactly, one
/// representative has weight 2 and its partner weight 0. Every other vector has weight 1. This
/// covers self-conjugate points and vectors with a Nyquist component on an even axis, whose
/// wrapped partner is a different Cartesian vector. $`\mathbf{G} = \mathbf{0}`$ has weight 0.
///
/// A kernel is a pure function of its grid. It is built once per run and only ever read
/// afterwards.
#[derive(Clone)]
pub struct DipoleKernel {
    /// The kernel table, of shape $`N_G \times 6`$.
    table: Array2<f64>,

    /// The half-space weights, one per $`\mathbf{G}`$-vector.
    weights: Vec<f64>,

    /// The fingerprint of the grid for which this kernel was built.
    fingerprint: GridFingerprint,

    /// The cell volume of the grid for which this kernel was built, in bohr³.
    volume: f64,
}

impl DipoleKernel {
    /// Builds the kernel for a grid.
    pub fn new(grid: &GridGeometry) -> Self {
        let rows = grid
            .gvectors()
            .par_iter()
            .map(|g| match g.direction() {
                None => [0.0; 6],
                Some(ghat) => {
                    let mut row = [0.0; 6];
                    for (t, (a, b)) in row.iter_mut().zip(COMPONENT_INDICES.iter()) {
                        let delta = if a == b { 1.0 } else { 0.0 };
                        *t = 3.0 * ghat[*a] * ghat[*b] - delta;
                    }
                    row
                }
            })
            .collect::<Vec<_>>();
        let n = rows.len();
        let table = Array2::from_shape_fn((n, 6), |(k, c)| rows[k][c]);

        let gvectors = grid.gvectors();
        let weights = (0..n)
            .into_par_iter()
            .map(|k| {
                if k == grid.zero_index() {
                    return 0.0;
                }
                let k_neg = grid.index_of_negative(k);
                let m = gvectors[k].miller;
                // A Nyquist component wraps −G onto a stored vector that is not −G, so T differs
                // between the two and both must be summed explicitly.
                let exact_partner = gvectors[k_neg].miller == [-m[0], -m[1], -m[2]];
                if k_neg == k || !exact_partner {
                    1.0
                } else if k < k_neg {
                    2.0
                } else {
                    0.0
                }
            })
            .collect::<Vec<_>>();

        log::debug!(
            "Dipolar kernel built for {} G-vectors ({:.3} MiB).",
            n,
            (table.len() + weights.len()) as f64 * 8.0 / 1024.0 / 1024.0
        );

        Self {
            table,
            weights,
            fingerprint: grid.fingerprint(),
            volume: grid.volume(),
        }
    }

    /// Returns the number of $`\mathbf{G}`$-vectors covered by this kernel.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Returns `true` if the kernel covers no $`\mathbf{G}`$-vectors.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Returns the kernel table of shape $`N_G \times 6`$.
    pub fn table(&self) -> &Array2<f64> {
        &self.table
    }

    /// Returns the six kernel components at storage index `k`.
    pub fn row(&self, k: usize) -> ArrayView1<'_, f64> {
        self.table.row(k)
    }

    /// Returns the kernel at storage index `k` as a tensor.
    pub fn tensor_at(&self, k: usize) -> SymmetricTensor {
        let row = self.table.row(k);
        SymmetricTensor::new([row[0], row[1], row[2], row[3], row[4], row[5]])
    }

    /// Returns the half-space weights.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Returns the fingerprint of the grid for which this kernel was built.
    pub fn fingerprint(&self) -> &GridFingerprint {
        &self.fingerprint
    }

    /// Returns the cell volume of the grid for which this kernel was built, in bohr³.
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Returns the size of the kernel in bytes.
    pub fn n_bytes(&self) -> usize {
        (self.table.len() + self.weights.len()) * std::mem::size_of::<f64>()
    }

    /// Verifies that this kernel was built for a grid with the given fingerprint.
    ///
    /// # Errors
    ///
    /// Errors with [`ZfsError::Configuration`] on a mismatch.
    pub fn check_compatible(&self, fingerprint: &GridFingerprint) -> Result<(), ZfsError> {
        if self.fingerprint.is_compatible(fingerprint) {
            Ok(())
        } else {
            Err(ZfsError::configuration(format!(
                "The dipolar kernel was built for a {}, but is being used with a {}.",
                self.fingerprint, fingerprint
            )))
        }
    }
}

impl fmt::Debug for DipoleKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DipoleKernel")
            .field("n_gvectors", &self.len())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}
