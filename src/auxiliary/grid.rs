//! Periodic cells and their reciprocal-space grids.

use std::fmt;

use approx;
use itertools::Itertools;
use log;
use nalgebra::{Matrix3, Vector3};
use num_traits::FloatConst;
use serde::{Deserialize, Serialize};

use crate::auxiliary::fft::FourierTransform;
use crate::zfs::ZfsError;

#[cfg(test)]
#[path = "grid_tests.rs"]
mod grid_tests;

// =================
// Utility functions
// =================

/// Converts a storage index along one grid dimension into a signed Miller index.
///
/// Indices below $`\lceil n / 2 \rceil`$ are non-negative; the remaining ones wrap around to
/// negative values, following the usual FFT frequency layout.
///
/// # Arguments
///
/// * `i` - The storage index, in $`[0, n)`$.
/// * `n` - The number of grid points along this dimension.
pub fn storage_index_to_miller(i: usize, n: usize) -> i64 {
    if i < (n + 1) / 2 {
        i as i64
    } else {
        i as i64 - n as i64
    }
}

/// Converts a signed Miller index into a storage index along one grid dimension of length `n`.
pub fn miller_to_storage_index(m: i64, n: usize) -> usize {
    m.rem_euclid(n as i64) as usize
}

// ==================
// Struct definitions
// ==================

/// A structure representing one reciprocal lattice vector on the grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GVector {
    /// The integer Miller indices $`(m_1, m_2, m_3)`$ of this vector.
    pub miller: [i64; 3],

    /// The Cartesian components $`m_1 \mathbf{b}_1 + m_2 \mathbf{b}_2 + m_3 \mathbf{b}_3`$.
    pub cartesian: Vector3<f64>,

    /// The magnitude $`|\mathbf{G}|`$.
    pub magnitude: f64,
}

impl GVector {
    /// Returns `true` if this is the $`\mathbf{G} = \mathbf{0}`$ vector.
    pub fn is_zero(&self) -> bool {
        self.miller == [0, 0, 0]
    }

    /// Returns the unit vector along $`\mathbf{G}`$, or `None` for the zero vector.
    pub fn direction(&self) -> Option<Vector3<f64>> {
        if self.is_zero() {
            None
        } else {
            Some(self.cartesian / self.magnitude)
        }
    }
}

/// A lightweight description of a grid geometry that can be compared cheaply to decide whether two
/// objects were built for the same grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridFingerprint {
    /// The real-space grid shape.
    pub shape: [usize; 3],

    /// The cell vectors, row by row.
    pub cell: [[f64; 3]; 3],
}

impl GridFingerprint {
    /// Checks if two fingerprints describe the same grid, allowing for rounding in the cell
    /// vectors.
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.shape == other.shape
            && self
                .cell
                .iter()
                .flatten()
                .zip(other.cell.iter().flatten())
                .all(|(a, b)| approx::relative_eq!(*a, *b, epsilon = 1e-12, max_relative = 1e-10))
    }
}

impl fmt::Display for GridFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}×{}×{} grid in cell [{}]",
            self.shape[0],
            self.shape[1],
            self.shape[2],
            self.cell
                .iter()
                .map(|row| format!("({})", row.iter().map(|x| format!("{x:+.6}")).join(", ")))
                .join(", ")
        )
    }
}

/// An immutable structure describing a periodic cell, its reciprocal lattice and the
/// reciprocal-space vectors sampled by a real-space FFT grid.
///
/// The $`\mathbf{G}`$-vectors are stored in FFT storage order: row-major over the three storage
/// indices, with the last index running fastest. The $`\mathbf{G} = \mathbf{0}`$ vector therefore
/// always sits at a flagged position (index zero) and the list has exactly as many entries as the
/// real-space grid.
#[derive(Clone, Debug)]
pub struct GridGeometry {
    /// The cell vectors $`\mathbf{a}_i`$ as rows, in bohr.
    cell: Matrix3<f64>,

    /// The reciprocal lattice vectors $`\mathbf{b}_i`$ as rows, satisfying
    /// $`\mathbf{a}_i \cdot \mathbf{b}_j = 2\pi\delta_{ij}`$.
    reciprocal: Matrix3<f64>,

    /// The number of real-space grid points along each cell vector.
    shape: [usize; 3],

    /// The $`\mathbf{G}`$-vectors in storage order.
    gvectors: Vec<GVector>,

    /// The position of $`\mathbf{G} = \mathbf{0}`$ in [`Self::gvectors`].
    zero_index: usize,

    /// The cell volume $`\Omega`$ in bohr³.
    volume: f64,

    /// The FFT plans for this grid.
    transform: FourierTransform,
}

impl GridGeometry {
    /// Constructs the grid geometry for a cell sampled on a real-space grid of a given shape.
    ///
    /// # Arguments
    ///
    /// * `cell` - The cell vectors as rows, in bohr.
    /// * `shape` - The number of grid points along each cell vector.
    ///
    /// # Errors
    ///
    /// Errors with [`ZfsError::Configuration`] if any dimension of the shape is zero or if the
    /// cell is singular.
    pub fn new(cell: Matrix3<f64>, shape: [usize; 3]) -> Result<Self, ZfsError> {
        if shape.iter().any(|&n| n == 0) {
            return Err(ZfsError::configuration(format!(
                "Grid shape {shape:?} must have a positive number of points along every dimension."
            )));
        }
        let det = cell.determinant();
        if !det.is_finite() || det.abs() < 1e-10 {
            return Err(ZfsError::configuration(format!(
                "The cell vectors are singular or invalid (determinant {det:.3e})."
            )));
        }
        let inverse = cell.try_inverse().ok_or_else(|| {
            ZfsError::configuration("The cell vectors could not be inverted.".to_string())
        })?;
        let reciprocal = inverse.transpose() * (2.0 * f64::PI());

        let [n1, n2, n3] = shape;
        let gvectors = (0..n1)
            .cartesian_product(0..n2)
            .cartesian_product(0..n3)
            .map(|((i1, i2), i3)| {
                let miller = [
                    storage_index_to_miller(i1, n1),
                    storage_index_to_miller(i2, n2),
                    storage_index_to_miller(i3, n3),
                ];
                Self::make_gvector(&reciprocal, miller)
            })
            .collect::<Vec<_>>();

        log::debug!(
            "Grid geometry constructed: shape {:?}, {} G-vectors, volume {:.6} bohr³.",
            shape,
            gvectors.len(),
            det.abs()
        );

        Ok(Self {
            cell,
            reciprocal,
            shape,
            gvectors,
            zero_index: 0,
            volume: det.abs(),
            transform: FourierTransform::new(shape),
        })
    }

    /// Constructs the grid geometry from an externally supplied list of Miller indices.
    ///
    /// The list may be given in any order; it is validated against the grid shape and placed
    /// into storage order.
    ///
    /// # Arguments
    ///
    /// * `cell` - The cell vectors as rows, in bohr.
    /// * `shape` - The number of grid points along each cell vector.
    /// * `millers` - The Miller indices of every $`\mathbf{G}`$-vector on the grid.
    ///
    /// # Errors
    ///
    /// Errors with [`ZfsError::Configuration`] if the number of vectors differs from the number of
    /// grid points, if $`\mathbf{G} = \mathbf{0}`$ does not occur exactly once, if a Miller index
    /// lies outside the range covered by the grid, or if two vectors land on the same grid
    /// position.
    pub fn from_miller_indices(
        cell: Matrix3<f64>,
        shape: [usize; 3],
        millers: &[[i64; 3]],
    ) -> Result<Self, ZfsError> {
        let geometry = Self::new(cell, shape)?;
        if millers.len() != geometry.n_points() {
            return Err(ZfsError::configuration(format!(
                "{} G-vectors were supplied, but the {}×{}×{} grid has {} points.",
                millers.len(),
                shape[0],
                shape[1],
                shape[2],
                geometry.n_points()
            )));
        }
        let n_zeros = millers.iter().filter(|m| **m == [0, 0, 0]).count();
        if n_zeros != 1 {
            return Err(ZfsError::configuration(format!(
                "G = 0 must occur exactly once in the supplied G-vectors, but {n_zeros} occurrences were found."
            )));
        }
        let mut seen = vec![false; geometry.n_points()];
        for miller in millers {
            if let Some(d) = (0..3).find(|&d| {
                storage_index_to_miller(miller_to_storage_index(miller[d], shape[d]), shape[d])
                    != miller[d]
            }) {
                return Err(ZfsError::configuration(format!(
                    "The supplied G-vector {miller:?} lies outside the Miller index range of the grid along dimension {}.",
                    d + 1
                )));
            }
            let k = geometry.storage_index(*miller);
            if seen[k] {
                return Err(ZfsError::configuration(format!(
                    "The supplied G-vector {miller:?} duplicates another grid position."
                )));
            }
            seen[k] = true;
        }
        Ok(geometry)
    }

    fn make_gvector(reciprocal: &Matrix3<f64>, miller: [i64; 3]) -> GVector {
        let cartesian = (0..3)
            .map(|d| reciprocal.row(d).transpose() * miller[d] as f64)
            .fold(Vector3::zeros(), |acc, v| acc + v);
        GVector {
            miller,
            magnitude: cartesian.norm(),
            cartesian,
        }
    }

    /// Returns the cell vectors as rows.
    pub fn cell(&self) -> &Matrix3<f64> {
        &self.cell
    }

    /// Returns the reciprocal lattice vectors as rows.
    pub fn reciprocal(&self) -> &Matrix3<f64> {
        &self.reciprocal
    }

    /// Returns the real-space grid shape.
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Returns the total number of grid points, which is also the number of $`\mathbf{G}`$-vectors.
    pub fn n_points(&self) -> usize {
        self.shape.iter().product()
    }

    /// Returns the cell volume in bohr³.
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Returns the $`\mathbf{G}`$-vectors in storage order.
    pub fn gvectors(&self) -> &[GVector] {
        &self.gvectors
    }

    /// Returns the position of $`\mathbf{G} = \mathbf{0}`$ in the $`\mathbf{G}`$-vector list.
    pub fn zero_index(&self) -> usize {
        self.zero_index
    }

    /// Returns the FFT plans for this grid.
    pub fn fft(&self) -> &FourierTransform {
        &self.transform
    }

    /// Returns the storage index of the grid position with the given Miller indices (taken modulo
    /// the grid).
    pub fn storage_index(&self, miller: [i64; 3]) -> usize {
        let [n1, n2, n3] = self.shape;
        let i1 = miller_to_storage_index(miller[0], n1);
        let i2 = miller_to_storage_index(miller[1], n2);
        let i3 = miller_to_storage_index(miller[2], n3);
        (i1 * n2 + i2) * n3 + i3
    }

    /// Returns the storage index of $`-\mathbf{G}`$ (modulo the grid) given the storage index of
    /// $`\mathbf{G}`$.
    pub fn index_of_negative(&self, k: usize) -> usize {
        let m = self.gvectors[k].miller;
        self.storage_index([-m[0], -m[1], -m[2]])
    }

    /// Returns a fingerprint of this geometry.
    pub fn fingerprint(&self) -> GridFingerprint {
        let mut cell = [[0.0; 3]; 3];
        for (i, row) in cell.iter_mut().enumerate() {
            for (j, x) in row.iter_mut().enumerate() {
                *x = self.cell[(i, j)];
            }
        }
        GridFingerprint {
            shape: self.shape,
            cell,
        }
    }
}

impl fmt::Display for GridGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cell vectors (bohr):")?;
        for i in 0..3 {
            writeln!(
                f,
                "  a{} = ({})",
                i + 1,
                self.cell.row(i).iter().map(|x| format!("{x:+.6}")).join(", ")
            )?;
        }
        writeln!(f, "Reciprocal lattice vectors (bohr⁻¹):")?;
        for i in 0..3 {
            writeln!(
                f,
                "  b{} = ({})",
                i + 1,
                self.reciprocal
                    .row(i)
                    .iter()
                    .map(|x| format!("{x:+.6}"))
                    .join(", ")
            )?;
        }
        writeln!(f, "Cell volume: {:.6} bohr³", self.volume)?;
        writeln!(
            f,
            "Grid shape: {} × {} × {} ({} G-vectors)",
            self.shape[0],
            self.shape[1],
            self.shape[2],
            self.n_points()
        )?;
        Ok(())
    }
}
