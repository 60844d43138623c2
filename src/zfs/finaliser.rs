//! Conversion of the accumulated pair sum into the zero-field-splitting tensor and its
//! parameters.

use std::cmp::Ordering;
use std::f64::consts::PI;
use std::fmt;

use itertools::Itertools;
use log;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::target::tensor::SymmetricTensor;
use crate::zfs::{ZfsDiagnostic, ZfsError};

#[cfg(test)]
#[path = "finaliser_tests.rs"]
mod finaliser_tests;

/// The free-electron $`g`$-factor.
pub const ELECTRON_G_FACTOR: f64 = 2.00231930436256;

/// The fine-structure constant $`\alpha`$.
pub const FINE_STRUCTURE_CONSTANT: f64 = 7.2973525693e-3;

/// The default tolerance on the relative trace residual of the symmetrised tensor.
pub const DEFAULT_TRACE_TOLERANCE: f64 = 1e-6;

/// Returns the prefactor, in Hartree, that turns the accumulated pair sum
/// $`\sum_{i<j} \mathbf{C}_{ij}`$ into the spin-spin tensor for a cell of volume $`\Omega`$
/// (in bohr³):
///
/// ```math
/// p(\Omega) = -\frac{g_e^2 \alpha^2}{16} \frac{4\pi}{3\Omega}.
/// ```
pub fn dipolar_prefactor(volume: f64) -> f64 {
    let g2a2 = ELECTRON_G_FACTOR.powi(2) * FINE_STRUCTURE_CONSTANT.powi(2);
    -(g2a2 / 16.0) * 4.0 * PI / (3.0 * volume)
}

// ==================
// Struct definitions
// ==================

/// A structure holding a finalised zero-field-splitting tensor and everything derived from it.
///
/// All energies are in Hartree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZfsTensorResult {
    /// The accumulated pair sum before the prefactor was applied.
    raw: SymmetricTensor,

    /// The prefactor applied to [`Self::raw`].
    prefactor: f64,

    /// The symmetric traceless tensor.
    tensor: SymmetricTensor,

    /// The eigenvalues $`(\lambda_x, \lambda_y, \lambda_z)`$ ordered such that
    /// $`|\lambda_z| \ge |\lambda_x| \ge |\lambda_y|`$.
    eigenvalues: [f64; 3],

    /// The orthonormal eigenvectors as the columns of a matrix, in the order of
    /// [`Self::eigenvalues`].
    eigenvectors: Matrix3<f64>,

    /// $`D = \frac{3}{2} \lambda_z`$.
    d: f64,

    /// $`E = \frac{1}{2} (\lambda_x - \lambda_y)`$.
    e: f64,

    /// The trace of the symmetrised tensor relative to its norm, before the trace was removed.
    trace_residual: f64,

    /// The non-fatal diagnostics raised while finalising.
    diagnostics: Vec<ZfsDiagnostic>,
}

impl ZfsTensorResult {
    /// Returns the accumulated pair sum before the prefactor was applied.
    pub fn raw(&self) -> &SymmetricTensor {
        &self.raw
    }

    /// Returns the prefactor applied to the pair sum.
    pub fn prefactor(&self) -> f64 {
        self.prefactor
    }

    /// Returns the symmetric traceless tensor.
    pub fn tensor(&self) -> &SymmetricTensor {
        &self.tensor
    }

    /// Returns the ordered eigenvalues $`(\lambda_x, \lambda_y, \lambda_z)`$.
    pub fn eigenvalues(&self) -> &[f64; 3] {
        &self.eigenvalues
    }

    /// Returns the eigenvectors as matrix columns.
    pub fn eigenvectors(&self) -> &Matrix3<f64> {
        &self.eigenvectors
    }

    /// Returns the eigenvector belonging to the $`k`$-th ordered eigenvalue.
    pub fn eigenvector(&self, k: usize) -> Vector3<f64> {
        self.eigenvectors.column(k).into_owned()
    }

    /// Returns the axial parameter $`D`$.
    pub fn d(&self) -> f64 {
        self.d
    }

    /// Returns the rhombic parameter $`E`$.
    pub fn e(&self) -> f64 {
        self.e
    }

    /// Returns the relative trace residual observed before trace removal.
    pub fn trace_residual(&self) -> f64 {
        self.trace_residual
    }

    /// Returns the diagnostics raised while finalising.
    pub fn diagnostics(&self) -> &[ZfsDiagnostic] {
        &self.diagnostics
    }

    /// Appends a diagnostic raised elsewhere in the calculation.
    pub fn push_diagnostic(&mut self, diagnostic: ZfsDiagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

impl fmt::Display for ZfsTensorResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Spin-spin tensor (Eh):")?;
        write!(f, "{:.10}", self.tensor)?;
        writeln!(
            f,
            "Eigenvalues (Eh): x: {:+.7e}, y: {:+.7e}, z: {:+.7e}",
            self.eigenvalues[0], self.eigenvalues[1], self.eigenvalues[2]
        )?;
        writeln!(f, "D: {:+.7e} Eh", self.d)?;
        writeln!(f, "E: {:+.7e} Eh", self.e)?;
        write!(f, "Relative trace residual: {:.3e}", self.trace_residual)?;
        Ok(())
    }
}

/// A structure to finalise accumulated pair sums into zero-field-splitting tensors.
#[derive(Clone, Debug)]
pub struct TensorFinaliser {
    /// The tolerance on the relative trace residual above which a numerical warning is raised.
    trace_tolerance: f64,
}

impl Default for TensorFinaliser {
    fn default() -> Self {
        Self {
            trace_tolerance: DEFAULT_TRACE_TOLERANCE,
        }
    }
}

impl TensorFinaliser {
    /// Creates a finaliser with a given trace tolerance.
    ///
    /// # Errors
    ///
    /// Errors with [`ZfsError::Configuration`] if the tolerance is negative or not finite.
    pub fn new(trace_tolerance: f64) -> Result<Self, ZfsError> {
        if !trace_tolerance.is_finite() || trace_tolerance < 0.0 {
            return Err(ZfsError::configuration(format!(
                "Invalid trace tolerance: {trace_tolerance}."
            )));
        }
        Ok(Self { trace_tolerance })
    }

    /// Returns the trace tolerance.
    pub fn trace_tolerance(&self) -> f64 {
        self.trace_tolerance
    }

    /// Finalises the accumulated pair sum of a cell of volume `volume` (in bohr³), applying
    /// [`dipolar_prefactor`].
    ///
    /// # Errors
    ///
    /// Errors with [`ZfsError::Configuration`] if the volume is not positive or the sum is not
    /// finite.
    pub fn finalise(
        &self,
        raw: &SymmetricTensor,
        volume: f64,
    ) -> Result<ZfsTensorResult, ZfsError> {
        if !volume.is_finite() || volume <= 0.0 {
            return Err(ZfsError::configuration(format!(
                "The cell volume must be positive, but {volume} was given."
            )));
        }
        self.finalise_with_prefactor(raw, dipolar_prefactor(volume))
    }

    /// Finalises a tensor without applying any prefactor.
    ///
    /// Finalising the tensor of a previous result again reproduces that result.
    ///
    /// # Errors
    ///
    /// Errors with [`ZfsError::Configuration`] if the tensor is not finite.
    pub fn finalise_raw(&self, raw: &SymmetricTensor) -> Result<ZfsTensorResult, ZfsError> {
        self.finalise_with_prefactor(raw, 1.0)
    }

    fn finalise_with_prefactor(
        &self,
        raw: &SymmetricTensor,
        prefactor: f64,
    ) -> Result<ZfsTensorResult, ZfsError> {
        if raw.components().iter().any(|x| !x.is_finite()) {
            return Err(ZfsError::configuration(format!(
                "The accumulated tensor is not finite: {raw}"
            )));
        }
        let scaled = raw.to_matrix() * prefactor;
        let symmetrised = (scaled + scaled.transpose()) * 0.5;

        let trace = symmetrised.trace();
        let norm = symmetrised.norm();
        let trace_residual = if norm > 0.0 { trace.abs() / norm } else { 0.0 };
        let mut diagnostics = vec![];
        if trace_residual > self.trace_tolerance {
            log::warn!(
                "Relative trace residual {trace_residual:.3e} exceeds the tolerance {:.3e}.",
                self.trace_tolerance
            );
            diagnostics.push(ZfsDiagnostic::NumericalWarning {
                trace_residual,
                tolerance: self.trace_tolerance,
            });
        }

        let traceless = symmetrised - Matrix3::identity() * (trace / 3.0);
        let tensor = SymmetricTensor::from_matrix(&traceless);
        let eigen = tensor.to_matrix().symmetric_eigen();

        // Ascending |λ| gives (y, x, z).
        let order = (0..3)
            .sorted_by(|&a, &b| {
                eigen.eigenvalues[a]
                    .abs()
                    .partial_cmp(&eigen.eigenvalues[b].abs())
                    .unwrap_or(Ordering::Equal)
            })
            .collect_vec();
        let (iy, ix, iz) = (order[0], order[1], order[2]);
        let eigenvalues = [
            eigen.eigenvalues[ix],
            eigen.eigenvalues[iy],
            eigen.eigenvalues[iz],
        ];
        let eigenvectors = Matrix3::from_columns(&[
            eigen.eigenvectors.column(ix).into_owned(),
            eigen.eigenvectors.column(iy).into_owned(),
            eigen.eigenvectors.column(iz).into_owned(),
        ]);
        let d = 1.5 * eigenvalues[2];
        let e = 0.5 * (eigenvalues[0] - eigenvalues[1]);

        Ok(ZfsTensorResult {
            raw: *raw,
            prefactor,
            tensor,
            eigenvalues,
            eigenvectors,
            d,
            e,
            trace_residual,
            diagnostics,
        })
    }
}
